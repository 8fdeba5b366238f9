//! Synchronous event-log reader with iterator interface
//!
//! Provides a streaming iterator over marketplace events from a CSV log.
//! Delegates CSV format concerns to the csv_format module.
//!
//! # Design
//!
//! The SyncReader uses csv::Reader to read and deserialize rows
//! sequentially, converting each to an [`EventRecord`]. It processes one
//! row at a time without loading the whole log into memory.
//!
//! # Error Handling
//!
//! - Fatal errors (file not found, I/O errors) are returned from `new()`
//! - Individual row parsing errors are yielded as Err variants in the
//!   iterator, with line numbers for debugging; replay continues

use crate::io::csv_format::{convert_csv_record, CsvRecord};
use crate::types::EventRecord;
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::path::Path;

/// Synchronous event-log reader
///
/// Implements `Iterator`, yielding `Result<EventRecord, String>` for
/// each row of the log.
#[derive(Debug)]
pub struct SyncReader {
    reader: csv::Reader<File>,
    line_num: usize,
}

impl SyncReader {
    /// Open an event log for streaming iteration
    ///
    /// The CSV reader trims whitespace and allows flexible field counts
    /// (most events leave several columns empty).
    ///
    /// # Errors
    ///
    /// Returns an error string if the file cannot be opened.
    pub fn new(path: &Path) -> Result<Self, String> {
        let file = File::open(path)
            .map_err(|e| format!("Failed to open file '{}': {}", path.display(), e))?;

        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(file);

        Ok(Self {
            reader,
            line_num: 0,
        })
    }
}

impl Iterator for SyncReader {
    type Item = Result<EventRecord, String>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut deserializer = self.reader.deserialize::<CsvRecord>();

        match deserializer.next()? {
            Ok(csv_record) => {
                self.line_num += 1;
                // Line numbers are offset by one for the header row
                Some(
                    convert_csv_record(csv_record)
                        .map_err(|e| format!("Line {}: {}", self.line_num + 1, e)),
                )
            }
            Err(e) => {
                self.line_num += 1;
                Some(Err(format!(
                    "Line {}: CSV parse error: {}",
                    self.line_num + 1,
                    e
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "event,request,account,counterparty,amount,mode,reference,url\n";

    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    #[test]
    fn test_sync_reader_new_fails_on_missing_file() {
        let result = SyncReader::new(Path::new("nonexistent.csv"));
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("Failed to open file"));
    }

    #[test]
    fn test_sync_reader_iterates_deposit() {
        let content = format!("{}deposit,,1,,1000,paypal,pp-1,\n", HEADER);
        let file = create_temp_csv(&content);

        let reader = SyncReader::new(file.path()).unwrap();
        let records: Vec<_> = reader.collect();

        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].as_ref().unwrap(),
            &EventRecord::Deposit {
                account: 1,
                gross: Decimal::new(1000, 0),
                method: "paypal".to_string(),
                reference: "pp-1".to_string(),
            }
        );
    }

    #[test]
    fn test_sync_reader_full_workflow_log() {
        let content = format!(
            "{}\
            deposit,,1,,1000,paypal,pp-1,\n\
            create_request,1,1,2,500,existing,listing-4,https://shop.example/\n\
            accept,1,,,,,,\n\
            submit_placement,1,,,,,,https://blog.example/post\n\
            open_dispute,1,1,,,link_removed,,\n\
            resolve_dispute,1,,,200,refund_partial,,\n",
            HEADER
        );
        let file = create_temp_csv(&content);

        let reader = SyncReader::new(file.path()).unwrap();
        let records: Vec<_> = reader.filter_map(Result::ok).collect();

        assert_eq!(records.len(), 6);
        assert_eq!(records[0].name(), "deposit");
        assert_eq!(records[1].name(), "create_request");
        assert_eq!(records[2].name(), "accept");
        assert_eq!(records[3].name(), "submit_placement");
        assert_eq!(records[4].name(), "open_dispute");
        assert_eq!(records[5].name(), "resolve_dispute");
    }

    #[test]
    fn test_sync_reader_reports_line_numbers() {
        let content = format!(
            "{}\
            deposit,,1,,1000,paypal,pp-1,\n\
            deposit,,2,,abc,paypal,pp-2,\n\
            deposit,,3,,50,paypal,pp-3,\n",
            HEADER
        );
        let file = create_temp_csv(&content);

        let reader = SyncReader::new(file.path()).unwrap();
        let records: Vec<_> = reader.collect();

        assert_eq!(records.len(), 3);
        assert!(records[0].is_ok());
        assert!(records[1].is_err());
        assert!(records[2].is_ok());

        let error = records[1].as_ref().unwrap_err();
        assert!(error.contains("Line 3"));
        assert!(error.contains("Invalid amount"));
    }

    #[test]
    fn test_sync_reader_continues_after_unknown_event() {
        let content = format!(
            "{}\
            rewind,1,,,,,,\n\
            accept,1,,,,,,\n",
            HEADER
        );
        let file = create_temp_csv(&content);

        let reader = SyncReader::new(file.path()).unwrap();
        let records: Vec<_> = reader.collect();

        assert_eq!(records.len(), 2);
        assert!(records[0].is_err());
        assert!(records[1].is_ok());
    }

    #[test]
    fn test_sync_reader_handles_whitespace() {
        let content = format!("{}  deposit  ,, 1 ,, 1000 , paypal , pp-1 ,\n", HEADER);
        let file = create_temp_csv(&content);

        let reader = SyncReader::new(file.path()).unwrap();
        let records: Vec<_> = reader.filter_map(Result::ok).collect();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].account(), Some(1));
    }

    #[test]
    fn test_sync_reader_empty_log() {
        let file = create_temp_csv(HEADER);

        let reader = SyncReader::new(file.path()).unwrap();
        assert_eq!(reader.count(), 0);
    }
}
