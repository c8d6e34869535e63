//! Uploaded dataset management
//!
//! Datasets live in a single uploads directory as `<name>.csv` next to a
//! `<name>_metadata.json` file recording the target column, the feature
//! columns and the statistics computed at upload time.

mod stats;
mod store;

pub use stats::{column_stats, profile, value_counts, DatasetProfile, FeatureStats};
pub use store::{
    parse_preview_rows, sanitize_name, DatasetMetadata, DatasetPreview, DatasetStore, DatasetSummary,
    UploadRequest, DEFAULT_PREVIEW_ROWS, MAX_PREVIEW_ROWS,
};

use polars::prelude::*;
use std::io::Cursor;
use std::path::Path;

use crate::error::Result;

/// Cell values read as missing, in addition to empty cells
pub const MISSING_MARKERS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Parse CSV bytes with a header row.
///
/// Column types are inferred from every row.
pub fn read_csv(bytes: &[u8]) -> Result<DataFrame> {
    let null_values = MISSING_MARKERS.iter().map(|m| PlSmallStr::from_static(m)).collect();
    let parse_opts = CsvParseOptions::default().with_null_values(Some(NullValues::AllColumns(null_values)));

    let df = CsvReadOptions::default()
        .with_infer_schema_length(None)
        .with_has_header(true)
        .with_parse_options(parse_opts)
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?;
    Ok(df)
}

pub fn read_csv_file(path: &Path) -> Result<DataFrame> {
    let bytes = std::fs::read(path)?;
    read_csv(&bytes)
}
