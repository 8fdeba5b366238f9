//! I/O module
//!
//! Handles event-log parsing and balance output.
//!
//! # Components
//!
//! - `csv_format` - CSV format handling (row conversion, output serialization)
//! - `sync_reader` - Synchronous reader with iterator interface
//! - `async_reader` - Asynchronous reader with batch interface

pub mod async_reader;
pub mod csv_format;
pub mod sync_reader;

pub use async_reader::AsyncReader;
pub use csv_format::{convert_csv_record, write_balances_csv, CsvRecord};
pub use sync_reader::SyncReader;
