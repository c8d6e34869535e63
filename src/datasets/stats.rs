//! Column statistics recorded for uploaded datasets

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{ExoError, Result};

/// Summary of one feature column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeatureStats {
    Numeric {
        mean: Option<f64>,
        std: Option<f64>,
        min: Option<f64>,
        max: Option<f64>,
        missing: usize,
    },
    Categorical {
        unique_values: usize,
        missing: usize,
    },
}

/// Shape and statistics of a parsed dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub feature_columns: Vec<String>,
    pub total_rows: usize,
    pub total_columns: usize,
    pub target_distribution: BTreeMap<String, usize>,
    /// Serialized [`FeatureStats`] keyed by column, in `feature_columns` order
    pub feature_stats: Map<String, Value>,
}

impl DatasetProfile {
    /// Statistics recorded for one feature column
    pub fn stats(&self, column: &str) -> Option<FeatureStats> {
        let value = self.feature_stats.get(column)?;
        serde_json::from_value(value.clone()).ok()
    }
}

fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int32
            | DataType::Int64
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|v| v.is_finite())
}

/// Statistics for a single column
pub fn column_stats(column: &Column) -> Result<FeatureStats> {
    let missing = column.null_count();

    if is_numeric(column.dtype()) {
        let values = column.cast(&DataType::Float64)?;
        let ca = values.f64()?;
        Ok(FeatureStats::Numeric {
            mean: finite(ca.mean()),
            std: finite(ca.std(1)),
            min: finite(ca.min()),
            max: finite(ca.max()),
            missing,
        })
    } else {
        Ok(FeatureStats::Categorical {
            unique_values: column.drop_nulls().n_unique()?,
            missing,
        })
    }
}

/// String form of a value used as a distribution key
fn value_key(value: &AnyValue) -> Option<String> {
    match value {
        AnyValue::Null => None,
        AnyValue::String(s) => Some(s.to_string()),
        AnyValue::StringOwned(s) => Some(s.to_string()),
        AnyValue::Float64(v) => Some(format!("{:?}", v)),
        AnyValue::Float32(v) => Some(format!("{:?}", v)),
        other => Some(other.to_string()),
    }
}

/// Count of each non-null value in the column
pub fn value_counts(column: &Column) -> Result<BTreeMap<String, usize>> {
    let mut counts = BTreeMap::new();
    for i in 0..column.len() {
        if let Some(key) = value_key(&column.get(i)?) {
            *counts.entry(key).or_insert(0) += 1;
        }
    }
    Ok(counts)
}

/// Validate the target and feature columns and compute every statistic an
/// upload records. Feature columns default to all columns except the target.
pub fn profile(df: &DataFrame, target: &str, feature_columns: Option<Vec<String>>) -> Result<DatasetProfile> {
    let columns: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();

    if !columns.iter().any(|c| c == target) {
        return Err(ExoError::InvalidInput(format!(
            "Target column \"{}\" not found in CSV",
            target
        )));
    }

    let feature_columns = match feature_columns {
        Some(requested) => {
            let missing: Vec<&String> = requested.iter().filter(|c| !columns.contains(c)).collect();
            if !missing.is_empty() {
                return Err(ExoError::InvalidInput(format!(
                    "Feature columns not found: {:?}",
                    missing
                )));
            }
            requested
        }
        None => columns.iter().filter(|c| c.as_str() != target).cloned().collect(),
    };

    let mut feature_stats = Map::new();
    for name in &feature_columns {
        let stats = column_stats(df.column(name)?)?;
        feature_stats.insert(name.clone(), serde_json::to_value(stats)?);
    }

    Ok(DatasetProfile {
        target_distribution: value_counts(df.column(target)?)?,
        feature_columns,
        total_rows: df.height(),
        total_columns: df.width(),
        feature_stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::read_csv;

    const CSV: &str = "koi_period,koi_prad,flag,disposition\n\
        1.5,2.0,a,CONFIRMED\n\
        2.5,,b,FALSE POSITIVE\n\
        3.5,4.0,a,CONFIRMED\n";

    #[test]
    fn test_numeric_stats() {
        let df = read_csv(CSV.as_bytes()).unwrap();
        let stats = column_stats(df.column("koi_period").unwrap()).unwrap();
        match stats {
            FeatureStats::Numeric { mean, std, min, max, missing } => {
                assert!((mean.unwrap() - 2.5).abs() < 1e-12);
                assert!((std.unwrap() - 1.0).abs() < 1e-12);
                assert_eq!(min, Some(1.5));
                assert_eq!(max, Some(3.5));
                assert_eq!(missing, 0);
            }
            other => panic!("expected numeric stats, got {:?}", other),
        }

        let prad = column_stats(df.column("koi_prad").unwrap()).unwrap();
        assert!(matches!(prad, FeatureStats::Numeric { missing: 1, .. }));
    }

    #[test]
    fn test_single_row_std_is_null() {
        let df = read_csv(b"x,y\n1.0,a\n").unwrap();
        let stats = column_stats(df.column("x").unwrap()).unwrap();
        assert!(matches!(stats, FeatureStats::Numeric { std: None, mean: Some(_), .. }));
    }

    #[test]
    fn test_categorical_stats_and_serialization() {
        let df = read_csv(CSV.as_bytes()).unwrap();
        let stats = column_stats(df.column("flag").unwrap()).unwrap();
        assert_eq!(stats, FeatureStats::Categorical { unique_values: 2, missing: 0 });

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["type"], "categorical");
        assert_eq!(json["unique_values"], 2);
    }

    #[test]
    fn test_profile_defaults_to_non_target_columns() {
        let df = read_csv(CSV.as_bytes()).unwrap();
        let profile = profile(&df, "disposition", None).unwrap();

        assert_eq!(profile.feature_columns, vec!["koi_period", "koi_prad", "flag"]);
        assert_eq!(profile.total_rows, 3);
        assert_eq!(profile.total_columns, 4);
        assert_eq!(profile.target_distribution["CONFIRMED"], 2);
        assert_eq!(profile.target_distribution["FALSE POSITIVE"], 1);
        assert_eq!(profile.feature_stats.len(), 3);
        assert_eq!(profile.stats("flag"), Some(FeatureStats::Categorical { unique_values: 2, missing: 0 }));
        assert_eq!(profile.stats("disposition"), None);
    }

    #[test]
    fn test_feature_stats_follow_column_order() {
        let df = read_csv(b"z_col,label,a_col,m_col\n1,x,2,3\n4,y,5,6\n").unwrap();
        let profile = profile(&df, "label", None).unwrap();
        let keys: Vec<&String> = profile.feature_stats.keys().collect();
        assert_eq!(keys, vec!["z_col", "a_col", "m_col"]);

        let explicit = profile_with(&df, &["m_col", "z_col"]);
        let keys: Vec<&String> = explicit.feature_stats.keys().collect();
        assert_eq!(keys, vec!["m_col", "z_col"]);

        let json = serde_json::to_string(&explicit).unwrap();
        assert!(json.find("\"m_col\":{").unwrap() < json.find("\"z_col\":{").unwrap());
    }

    fn profile_with(df: &DataFrame, columns: &[&str]) -> DatasetProfile {
        let columns = columns.iter().map(|c| c.to_string()).collect();
        profile(df, "label", Some(columns)).unwrap()
    }

    #[test]
    fn test_missing_markers_counted_as_missing() {
        let df = read_csv(b"koi_prad,disposition\n1.0,A\nNA,B\n3.0,A\nNaN,B\nnull,A\nN/A,B\n").unwrap();
        let stats = column_stats(df.column("koi_prad").unwrap()).unwrap();
        match stats {
            FeatureStats::Numeric { mean, missing, .. } => {
                assert_eq!(missing, 4);
                assert!((mean.unwrap() - 2.0).abs() < 1e-12);
            }
            other => panic!("expected numeric stats, got {:?}", other),
        }
    }

    #[test]
    fn test_profile_validation_errors() {
        let df = read_csv(CSV.as_bytes()).unwrap();

        let err = profile(&df, "label", None).unwrap_err();
        assert_eq!(err.to_string(), "Target column \"label\" not found in CSV");

        let err = profile(&df, "disposition", Some(vec!["koi_period".into(), "koi_teq".into()])).unwrap_err();
        assert!(err.to_string().starts_with("Feature columns not found"));
        assert!(err.to_string().contains("koi_teq"));
    }

    #[test]
    fn test_integer_target_keys() {
        let df = read_csv(b"x,label\n0.1,1\n0.2,0\n0.3,1\n").unwrap();
        let counts = value_counts(df.column("label").unwrap()).unwrap();
        assert_eq!(counts["1"], 2);
        assert_eq!(counts["0"], 1);
    }
}
