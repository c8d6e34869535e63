//! Prediction over loaded artifacts
//!
//! Turns caller-supplied feature mappings into aligned, scaled rows, runs the
//! classifier and formats the result as a label plus per-class confidence
//! percentages.

mod predictor;

pub use predictor::{Prediction, Predictor};
