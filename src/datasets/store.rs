//! File-backed dataset store

use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::stats::{profile, DatasetProfile};
use super::{read_csv, read_csv_file};
use crate::error::{ExoError, Result};

pub const DEFAULT_PREVIEW_ROWS: usize = 10;
pub const MAX_PREVIEW_ROWS: usize = 100;

const METADATA_SUFFIX: &str = "_metadata.json";

/// Everything recorded about an uploaded dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub dataset_name: String,
    pub filename: String,
    pub filepath: String,
    pub target_column: String,
    #[serde(flatten)]
    pub profile: DatasetProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// Row of the dataset listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub dataset_name: String,
    pub total_rows: usize,
    pub total_columns: usize,
    pub target_column: String,
    pub feature_count: usize,
}

impl From<&DatasetMetadata> for DatasetSummary {
    fn from(meta: &DatasetMetadata) -> Self {
        Self {
            dataset_name: meta.dataset_name.clone(),
            total_rows: meta.profile.total_rows,
            total_columns: meta.profile.total_columns,
            target_column: meta.target_column.clone(),
            feature_count: meta.profile.feature_columns.len(),
        }
    }
}

/// First rows of a dataset as JSON records
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetPreview {
    pub dataset_name: String,
    pub total_rows: usize,
    pub preview_rows: usize,
    pub columns: Vec<String>,
    pub data: Vec<serde_json::Map<String, Value>>,
}

/// A CSV upload awaiting validation
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub dataset_name: String,
    pub filename: String,
    pub target_column: String,
    /// Explicit feature columns; all non-target columns when `None`
    pub feature_columns: Option<Vec<String>>,
    pub content: Vec<u8>,
}

/// Turn a user-supplied name into a safe file stem.
///
/// Keeps ASCII alphanumerics, `-`, `_` and `.`, maps whitespace to `_`,
/// drops everything else and strips leading dots.
pub fn sanitize_name(raw: &str) -> Result<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        return Err(ExoError::InvalidInput(format!("Invalid dataset name: {:?}", raw)));
    }
    Ok(cleaned.to_string())
}

/// Parse the `rows` query parameter of a preview request
pub fn parse_preview_rows(raw: Option<&str>) -> usize {
    match raw.map(|s| s.trim().parse::<i64>()) {
        Some(Ok(n)) if n < 0 => 0,
        Some(Ok(n)) => (n as usize).min(MAX_PREVIEW_ROWS),
        _ => DEFAULT_PREVIEW_ROWS,
    }
}

fn any_to_json(value: AnyValue) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(v) => Value::from(v),
        AnyValue::String(v) => Value::from(v),
        AnyValue::StringOwned(v) => Value::from(v.as_str()),
        AnyValue::Int32(v) => Value::from(v),
        AnyValue::Int64(v) => Value::from(v),
        AnyValue::UInt32(v) => Value::from(v),
        AnyValue::UInt64(v) => Value::from(v),
        AnyValue::Float32(v) => serde_json::Number::from_f64(v as f64).map_or(Value::Null, Value::Number),
        AnyValue::Float64(v) => serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number),
        other => Value::from(other.to_string()),
    }
}

/// Datasets stored in one uploads directory
#[derive(Debug, Clone)]
pub struct DatasetStore {
    root: PathBuf,
}

impl DatasetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open the store, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(root);
        std::fs::create_dir_all(&store.root)?;
        Ok(store)
    }

    fn csv_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.csv", name))
    }

    fn metadata_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}{}", name, METADATA_SUFFIX))
    }

    fn not_found(name: &str) -> ExoError {
        ExoError::NotFound(format!("Dataset \"{}\" not found", name))
    }

    /// Map a requested name to its stored stem; names that cannot exist are not found
    fn locate(&self, name: &str) -> Result<String> {
        sanitize_name(name).map_err(|_| Self::not_found(name))
    }

    /// Store a CSV, validate its columns and record its metadata.
    ///
    /// The CSV is removed again if parsing, validation or the metadata
    /// write fails.
    pub fn upload(&self, request: UploadRequest) -> Result<DatasetMetadata> {
        let name = sanitize_name(&request.dataset_name)?;
        std::fs::create_dir_all(&self.root)?;

        let csv_path = self.csv_path(&name);
        std::fs::write(&csv_path, &request.content)?;

        let profiled = read_csv(&request.content)
            .map_err(|e| ExoError::InvalidInput(format!("Failed to parse CSV: {}", e)))
            .and_then(|df| profile(&df, &request.target_column, request.feature_columns.clone()));
        let profile = match profiled {
            Ok(p) => p,
            Err(e) => {
                discard_upload(&csv_path);
                return Err(e);
            }
        };

        let metadata = DatasetMetadata {
            dataset_name: name.clone(),
            filename: request.filename,
            filepath: csv_path.display().to_string(),
            target_column: request.target_column,
            profile,
            uploaded_at: Some(Utc::now()),
        };
        let written = serde_json::to_vec_pretty(&metadata)
            .map_err(ExoError::from)
            .and_then(|bytes| Ok(std::fs::write(self.metadata_path(&name), bytes)?));
        if let Err(e) = written {
            discard_upload(&csv_path);
            return Err(e);
        }

        info!(
            dataset = %name,
            rows = metadata.profile.total_rows,
            columns = metadata.profile.total_columns,
            "Dataset uploaded"
        );
        Ok(metadata)
    }

    /// Summaries of every dataset with readable metadata, sorted by name
    pub fn list(&self) -> Result<Vec<DatasetSummary>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut summaries = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            let is_metadata = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(METADATA_SUFFIX));
            if !is_metadata {
                continue;
            }

            match read_metadata(&path) {
                Ok(meta) => summaries.push(DatasetSummary::from(&meta)),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable dataset metadata"),
            }
        }

        summaries.sort_by(|a, b| a.dataset_name.cmp(&b.dataset_name));
        Ok(summaries)
    }

    pub fn info(&self, name: &str) -> Result<DatasetMetadata> {
        let stem = self.locate(name)?;
        let path = self.metadata_path(&stem);
        if !path.exists() {
            return Err(Self::not_found(name));
        }
        read_metadata(&path)
    }

    /// First `rows` rows of the dataset; callers clamp with [`parse_preview_rows`]
    pub fn preview(&self, name: &str, rows: usize) -> Result<DatasetPreview> {
        let stem = self.locate(name)?;
        let path = self.csv_path(&stem);
        if !path.exists() {
            return Err(Self::not_found(name));
        }

        let df = read_csv_file(&path)?;
        let head = df.head(Some(rows));
        let columns: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();

        let mut data = Vec::with_capacity(head.height());
        for i in 0..head.height() {
            let mut record = serde_json::Map::new();
            for col in head.get_columns() {
                record.insert(col.name().to_string(), any_to_json(col.get(i)?));
            }
            data.push(record);
        }

        Ok(DatasetPreview {
            dataset_name: stem,
            total_rows: df.height(),
            preview_rows: data.len(),
            columns,
            data,
        })
    }

    /// Remove the CSV and metadata, reporting which files existed
    pub fn delete(&self, name: &str) -> Result<Vec<&'static str>> {
        let stem = self.locate(name)?;
        let mut deleted = Vec::new();

        let csv = self.csv_path(&stem);
        if csv.exists() {
            std::fs::remove_file(&csv)?;
            deleted.push("CSV file");
        }
        let metadata = self.metadata_path(&stem);
        if metadata.exists() {
            std::fs::remove_file(&metadata)?;
            deleted.push("metadata file");
        }

        if deleted.is_empty() {
            return Err(Self::not_found(name));
        }
        info!(dataset = %stem, files = ?deleted, "Dataset deleted");
        Ok(deleted)
    }

    /// Raw CSV bytes and the attachment file name
    pub fn download(&self, name: &str) -> Result<(String, Vec<u8>)> {
        let stem = self.locate(name)?;
        let path = self.csv_path(&stem);
        if !path.exists() {
            return Err(Self::not_found(name));
        }
        Ok((format!("{}.csv", stem), std::fs::read(&path)?))
    }
}

fn discard_upload(csv_path: &Path) {
    if let Err(e) = std::fs::remove_file(csv_path) {
        warn!(path = %csv_path.display(), error = %e, "Failed to remove rejected upload");
    }
}

fn read_metadata(path: &Path) -> Result<DatasetMetadata> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::FeatureStats;

    const CSV: &str = "koi_period,koi_prad,disposition\n\
        1.0,2.0,CONFIRMED\n\
        2.0,,FALSE POSITIVE\n\
        3.0,4.0,CONFIRMED\n";

    fn request(name: &str, target: &str) -> UploadRequest {
        UploadRequest {
            dataset_name: name.to_string(),
            filename: "koi.csv".to_string(),
            target_column: target.to_string(),
            feature_columns: None,
            content: CSV.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("kepler 2024").unwrap(), "kepler_2024");
        assert_eq!(sanitize_name("../../etc/passwd").unwrap(), "etcpasswd");
        assert_eq!(sanitize_name("toi-v1.2").unwrap(), "toi-v1.2");
        assert!(sanitize_name("../").is_err());
        assert!(sanitize_name("   ").is_err());
    }

    #[test]
    fn test_parse_preview_rows() {
        assert_eq!(parse_preview_rows(None), 10);
        assert_eq!(parse_preview_rows(Some("5")), 5);
        assert_eq!(parse_preview_rows(Some("200")), 100);
        assert_eq!(parse_preview_rows(Some("-3")), 0);
        assert_eq!(parse_preview_rows(Some("many")), 10);
    }

    #[test]
    fn test_upload_info_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::open(dir.path()).unwrap();

        let meta = store.upload(request("koi", "disposition")).unwrap();
        assert_eq!(meta.profile.total_rows, 3);
        assert_eq!(meta.profile.feature_columns, vec!["koi_period", "koi_prad"]);
        assert!(dir.path().join("koi.csv").exists());
        assert!(dir.path().join("koi_metadata.json").exists());

        let info = store.info("koi").unwrap();
        assert_eq!(info, meta);
        assert!(matches!(
            info.profile.stats("koi_prad"),
            Some(FeatureStats::Numeric { missing: 1, .. })
        ));

        store.upload(request("a_first", "disposition")).unwrap();
        let names: Vec<String> = store.list().unwrap().into_iter().map(|s| s.dataset_name).collect();
        assert_eq!(names, vec!["a_first", "koi"]);
    }

    #[test]
    fn test_rejected_upload_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::open(dir.path()).unwrap();

        let err = store.upload(request("koi", "koi_disposition")).unwrap_err();
        assert!(matches!(err, ExoError::InvalidInput(_)));
        assert!(!dir.path().join("koi.csv").exists());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_failed_metadata_write_removes_csv() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::open(dir.path()).unwrap();
        // a directory in place of the metadata file makes the write fail
        std::fs::create_dir(dir.path().join("koi_metadata.json")).unwrap();

        let err = store.upload(request("koi", "disposition")).unwrap_err();
        assert!(matches!(err, ExoError::Io(_)));
        assert!(!dir.path().join("koi.csv").exists());
    }

    #[test]
    fn test_upload_reads_late_floats_and_missing_markers() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::open(dir.path()).unwrap();

        let mut csv = String::from("koi_period,koi_prad,disposition\n");
        for i in 0..1200 {
            csv.push_str(&format!("{},NA,CONFIRMED\n", i));
        }
        csv.push_str("0.5,1.25,FALSE POSITIVE\n");
        let mut req = request("koi_large", "disposition");
        req.content = csv.into_bytes();

        let meta = store.upload(req).unwrap();
        assert_eq!(meta.profile.total_rows, 1201);
        assert!(matches!(meta.profile.stats("koi_period"), Some(FeatureStats::Numeric { missing: 0, .. })));
        assert!(matches!(
            meta.profile.stats("koi_prad"),
            Some(FeatureStats::Numeric { missing: 1200, .. })
        ));

        let preview = store.preview("koi_large", 1).unwrap();
        assert!(preview.data[0]["koi_prad"].is_null());
    }

    #[test]
    fn test_preview_and_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::open(dir.path()).unwrap();
        store.upload(request("koi", "disposition")).unwrap();

        let preview = store.preview("koi", 2).unwrap();
        assert_eq!(preview.total_rows, 3);
        assert_eq!(preview.preview_rows, 2);
        assert_eq!(preview.columns, vec!["koi_period", "koi_prad", "disposition"]);
        assert_eq!(preview.data[0]["disposition"], "CONFIRMED");
        assert!(preview.data[1]["koi_prad"].is_null());
    }

    #[test]
    fn test_delete_and_download() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::open(dir.path()).unwrap();
        store.upload(request("koi", "disposition")).unwrap();

        let (filename, bytes) = store.download("koi").unwrap();
        assert_eq!(filename, "koi.csv");
        assert_eq!(bytes, CSV.as_bytes());

        assert_eq!(store.delete("koi").unwrap(), vec!["CSV file", "metadata file"]);
        assert!(matches!(store.delete("koi"), Err(ExoError::NotFound(_))));
        assert!(matches!(store.info("koi"), Err(ExoError::NotFound(_))));
        assert!(matches!(store.preview("../", 5), Err(ExoError::NotFound(_))));
    }
}
