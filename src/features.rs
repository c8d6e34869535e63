//! Human-readable feature metadata
//!
//! Each dataset may ship a side CSV with columns `feature_name`,
//! `display_name`, `description` and `type`; only `feature_name` is required.

use polars::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;
use tracing::warn;

use crate::error::{ExoError, Result};
use crate::preprocessing::Preprocessing;

/// Display metadata for one raw feature name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureInfo {
    pub display_name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl FeatureInfo {
    /// Metadata used when a feature has no mapping entry
    pub fn fallback(name: &str) -> Self {
        Self {
            display_name: name.to_string(),
            description: String::new(),
            kind: "numeric".to_string(),
        }
    }
}

fn optional_column<'a>(df: &'a DataFrame, name: &str) -> Option<&'a StringChunked> {
    df.column(name).ok().and_then(|c| c.str().ok())
}

/// Feature name → display metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FeatureMapping {
    entries: BTreeMap<String, FeatureInfo>,
}

impl FeatureMapping {
    /// Parse a mapping CSV. Empty cells fall back to the feature name,
    /// an empty description and the `numeric` type.
    pub fn from_csv(bytes: &[u8]) -> Result<Self> {
        // schema inference disabled: every column is read as a string
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .into_reader_with_file_handle(Cursor::new(bytes))
            .finish()?;

        let names = df
            .column("feature_name")
            .map_err(|_| ExoError::Data("feature mapping has no feature_name column".to_string()))?
            .str()?;
        let display = optional_column(&df, "display_name");
        let description = optional_column(&df, "description");
        let kind = optional_column(&df, "type");

        let cell = |col: Option<&StringChunked>, i: usize| {
            col.and_then(|c| c.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let mut entries = BTreeMap::new();
        for (i, name) in names.into_iter().enumerate() {
            let Some(name) = name.map(str::trim).filter(|s| !s.is_empty()) else {
                continue;
            };
            let info = FeatureInfo {
                display_name: cell(display, i).unwrap_or_else(|| name.to_string()),
                description: cell(description, i).unwrap_or_default(),
                kind: cell(kind, i).unwrap_or_else(|| "numeric".to_string()),
            };
            entries.insert(name.to_string(), info);
        }

        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_csv(&bytes)
    }

    /// Load a mapping if one is configured and present.
    ///
    /// Unreadable files are logged and treated as absent.
    pub fn load_optional(path: Option<&Path>) -> Option<Self> {
        let path = path?;
        if !path.exists() {
            return None;
        }
        match Self::load(path) {
            Ok(mapping) => Some(mapping),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load feature mapping");
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&FeatureInfo> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything a client needs to render an input for one model feature
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureDetail {
    pub name: String,
    pub default_value: f64,
    #[serde(flatten)]
    pub info: FeatureInfo,
}

/// Feature details in the artifact's declared order
pub fn feature_details(prep: &Preprocessing, mapping: Option<&FeatureMapping>) -> Vec<FeatureDetail> {
    prep.feature_names
        .iter()
        .map(|name| FeatureDetail {
            name: name.clone(),
            default_value: prep.default_value(name),
            info: mapping
                .and_then(|m| m.get(name))
                .cloned()
                .unwrap_or_else(|| FeatureInfo::fallback(name)),
        })
        .collect()
}
