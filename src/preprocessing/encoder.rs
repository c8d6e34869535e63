//! Label encoder mapping class indices back to class labels

use crate::error::{ExoError, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// Fitted label encoder.
///
/// `classes[i]` is the label of encoded class `i`. Numeric labels in the
/// artifact are kept in their JSON string form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    #[serde(deserialize_with = "deserialize_labels")]
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn new(classes: Vec<String>) -> Self {
        Self { classes }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Decode an encoded class index
    pub fn inverse_transform(&self, index: usize) -> Result<&str> {
        self.classes
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| {
                ExoError::InvalidArtifact(format!(
                    "class index {} out of range for {} classes",
                    index,
                    self.classes.len()
                ))
            })
    }
}

fn deserialize_labels<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|v| match v {
            serde_json::Value::String(s) => Ok(s),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            serde_json::Value::Bool(b) => Ok(b.to_string()),
            other => Err(D::Error::custom(format!("unsupported class label: {}", other))),
        })
        .collect()
}
