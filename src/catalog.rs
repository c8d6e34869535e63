//! Static descriptions of the model families served by the API

use serde::Serialize;
use serde_json::{Map, Value};

/// Card shown to clients for one model family
#[derive(Debug, Clone, Serialize)]
pub struct ModelDescription {
    pub icon: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub accuracy: &'static str,
    /// Registry key used in prediction requests
    pub model_type: &'static str,
    pub features: &'static [&'static str],
}

pub const MODEL_DESCRIPTIONS: &[(&str, ModelDescription)] = &[
    (
        "random-forest",
        ModelDescription {
            icon: "Brain",
            title: "Random Forest Classifier",
            description: "An ensemble learning method that constructs multiple decision trees during \
                training and outputs the mode of their predictions.",
            accuracy: "94.2%",
            model_type: "rf",
            features: &[
                "Handles non-linear relationships effectively",
                "Resistant to overfitting",
                "Works well with high-dimensional data",
                "Provides feature importance rankings",
            ],
        },
    ),
    (
        "neural-network",
        ModelDescription {
            icon: "Network",
            title: "Deep Neural Network",
            description: "A multi-layered artificial neural network that learns complex patterns \
                through backpropagation and gradient descent optimization.",
            accuracy: "96.8%",
            model_type: "cnn",
            features: &[
                "Captures complex non-linear patterns",
                "Adaptive feature learning",
                "High accuracy on large datasets",
                "Handles missing data gracefully",
            ],
        },
    ),
    (
        "knn",
        ModelDescription {
            icon: "Cpu",
            title: "K-Nearest Neighbors",
            description: "A simple, instance-based learning algorithm that classifies new instances \
                based on the majority class of their k-nearest neighbors.",
            accuracy: "91.5%",
            model_type: "knn",
            features: &[
                "Effective in high-dimensional spaces",
                "Memory efficient",
                "Versatile kernel functions",
                "Robust to outliers",
            ],
        },
    ),
];

/// Descriptions keyed by family, in display order
pub fn model_catalog() -> Map<String, Value> {
    MODEL_DESCRIPTIONS
        .iter()
        .map(|(key, desc)| {
            let value = serde_json::to_value(desc).unwrap_or(Value::Null);
            (key.to_string(), value)
        })
        .collect()
}
