//! Search and export orchestration for kbscan.
//!
//! This crate ties the crawler and the matcher together into the runs the
//! front-ends expose: batch and streaming search, CSV formatting, and the
//! CSV export stream.

pub mod csv_format;
pub mod export;
pub mod search;

pub use csv_format::{CsvRow, article_row, search_match_row, to_csv_document};
pub use export::{ExportRequest, LineStream, export_stream};
pub use search::{EventStream, SearchOptions, search, search_stream};
