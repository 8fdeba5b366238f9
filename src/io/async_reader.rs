//! Asynchronous event-log reader with batch interface
//!
//! Provides a streaming interface over marketplace events from a CSV
//! log. Supports batch reading for efficient async processing.
//!
//! # Design
//!
//! The AsyncReader uses:
//! - csv-async for streaming CSV parsing
//! - tokio for the async runtime
//! - batch reading so the replay pipeline can fan each batch out
//!
//! Row-level errors are logged and skipped, matching the sync reader's
//! replay-continues policy.

use crate::io::csv_format::{convert_csv_record, CsvRecord};
use crate::types::EventRecord;
use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tracing::warn;

/// Asynchronous event-log reader
///
/// Maintains streaming behavior with constant memory usage per batch.
pub struct AsyncReader<R: AsyncRead + Unpin> {
    csv_reader: csv_async::AsyncDeserializer<R>,
}

impl<R: AsyncRead + Unpin + Send + 'static> AsyncReader<R> {
    /// Create a new AsyncReader from an async byte source
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self { csv_reader }
    }

    /// Read a batch of events
    ///
    /// Reads up to `batch_size` rows, converting each to an
    /// [`EventRecord`]. Malformed rows are logged and skipped. Returns
    /// an empty vector at end of input.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<EventRecord> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut records = self.csv_reader.deserialize::<CsvRecord>();

        while batch.len() < batch_size {
            match records.next().await {
                Some(Ok(csv_record)) => match convert_csv_record(csv_record) {
                    Ok(event) => batch.push(event),
                    Err(e) => warn!("Record conversion error: {}", e),
                },
                Some(Err(e)) => warn!("CSV parse error: {}", e),
                None => break,
            }
        }

        batch
    }
}
