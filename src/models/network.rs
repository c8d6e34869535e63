//! Sequential 1-D convolutional network (inference only)
//!
//! The network file lists layers in evaluation order with Keras weight
//! layouts: conv kernels are `[kernel_size][in_channels][filters]`, dense
//! kernels are `[inputs][units]`. A sample of `n` features enters as a
//! sequence of `n` steps with one channel.

use ndarray::{s, Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::Classifier;
use crate::error::{ExoError, Result};

/// Activation applied after a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
}

/// Convolution / pooling padding mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Padding {
    #[default]
    Valid,
    Same,
}

fn default_stride() -> usize {
    1
}

fn default_epsilon() -> f64 {
    1e-3
}

/// Layer as stored in the network file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerSpec {
    Conv1d {
        kernel: Vec<Vec<Vec<f64>>>,
        bias: Vec<f64>,
        #[serde(default = "default_stride")]
        strides: usize,
        #[serde(default)]
        padding: Padding,
        #[serde(default)]
        activation: Activation,
    },
    MaxPooling1d {
        pool_size: usize,
        #[serde(default)]
        strides: Option<usize>,
    },
    AveragePooling1d {
        pool_size: usize,
        #[serde(default)]
        strides: Option<usize>,
    },
    GlobalAveragePooling1d,
    GlobalMaxPooling1d,
    BatchNormalization {
        gamma: Vec<f64>,
        beta: Vec<f64>,
        moving_mean: Vec<f64>,
        moving_variance: Vec<f64>,
        #[serde(default = "default_epsilon")]
        epsilon: f64,
    },
    Flatten,
    Dropout {
        #[serde(default)]
        rate: f64,
    },
    Dense {
        kernel: Vec<Vec<f64>>,
        bias: Vec<f64>,
        #[serde(default)]
        activation: Activation,
    },
}

/// Contents of a network file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub layers: Vec<LayerSpec>,
}

/// Shape of the activation flowing between layers (batch dimension excluded)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Sequence { steps: usize, channels: usize },
    Vector(usize),
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Shape::Sequence { steps, channels } => write!(f, "({}, {})", steps, channels),
            Shape::Vector(n) => write!(f, "({})", n),
        }
    }
}

/// Activation of a single sample
#[derive(Debug, Clone)]
enum Tensor {
    /// `[steps, channels]`
    Sequence(Array2<f64>),
    Vector(Array1<f64>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolKind {
    Max,
    Average,
}

#[derive(Debug, Clone)]
enum Layer {
    Conv1d {
        /// `[kernel_size * in_channels, filters]`, row-major over (k, c)
        kernel: Array2<f64>,
        bias: Array1<f64>,
        kernel_size: usize,
        strides: usize,
        padding: Padding,
        activation: Activation,
    },
    Pool1d {
        kind: PoolKind,
        pool_size: usize,
        strides: usize,
    },
    GlobalPool1d(PoolKind),
    BatchNormalization {
        scale: Array1<f64>,
        offset: Array1<f64>,
    },
    Flatten,
    Dense {
        kernel: Array2<f64>,
        bias: Array1<f64>,
        activation: Activation,
    },
}

/// A network ready for evaluation
#[derive(Debug, Clone)]
pub struct Network {
    layers: Vec<Layer>,
    n_features: usize,
    n_classes: usize,
}

impl Network {
    /// Build a network for inputs of `n_features` steps, checking every
    /// layer's weights against the shape flowing into it.
    pub fn from_spec(spec: NetworkSpec, n_features: usize) -> Result<Self> {
        if spec.layers.is_empty() {
            return Err(ExoError::InvalidArtifact("network has no layers".to_string()));
        }

        let mut shape = Shape::Sequence { steps: n_features, channels: 1 };
        let mut layers = Vec::with_capacity(spec.layers.len());

        for (idx, layer_spec) in spec.layers.into_iter().enumerate() {
            let (layer, next) = build_layer(layer_spec, shape)
                .map_err(|msg| ExoError::InvalidArtifact(format!("layer {}: {}", idx, msg)))?;
            if let Some(layer) = layer {
                layers.push(layer);
            }
            shape = next;
        }

        let n_classes = match shape {
            Shape::Vector(n) => n,
            other => {
                return Err(ExoError::InvalidArtifact(format!(
                    "network output must be a vector, got shape {}",
                    other
                )))
            }
        };

        Ok(Self { layers, n_features, n_classes })
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    fn forward(&self, sample: &[f64]) -> Array1<f64> {
        let input = Array2::from_shape_fn((sample.len(), 1), |(i, _)| sample[i]);
        let mut tensor = Tensor::Sequence(input);
        for layer in &self.layers {
            tensor = layer.forward(tensor);
        }
        match tensor {
            Tensor::Vector(v) => v,
            // from_spec guarantees a vector output
            Tensor::Sequence(m) => m.iter().copied().collect(),
        }
    }
}

impl Classifier for Network {
    fn name(&self) -> &'static str {
        "cnn"
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn n_features(&self) -> Option<usize> {
        Some(self.n_features)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features {
            return Err(ExoError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let probs: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .flat_map_iter(|i| {
                let row: Vec<f64> = x.row(i).to_vec();
                self.forward(&row).to_vec()
            })
            .collect();

        Array2::from_shape_vec((x.nrows(), self.n_classes), probs).map_err(|e| ExoError::ShapeError {
            expected: format!("{} x {}", x.nrows(), self.n_classes),
            actual: e.to_string(),
        })
    }
}

fn pooled_steps(steps: usize, window: usize, strides: usize, padding: Padding) -> std::result::Result<usize, String> {
    if window == 0 || strides == 0 {
        return Err("window and strides must be positive".to_string());
    }
    match padding {
        Padding::Valid if steps < window => Err(format!("window {} larger than {} steps", window, steps)),
        Padding::Valid => Ok((steps - window) / strides + 1),
        Padding::Same => Ok((steps + strides - 1) / strides),
    }
}

fn build_layer(spec: LayerSpec, input: Shape) -> std::result::Result<(Option<Layer>, Shape), String> {
    match spec {
        LayerSpec::Conv1d { kernel, bias, strides, padding, activation } => {
            let Shape::Sequence { steps, channels } = input else {
                return Err(format!("conv1d expects a sequence, got {}", input));
            };
            let kernel_size = kernel.len();
            let filters = bias.len();
            let mut flat = Vec::with_capacity(kernel_size * channels * filters);
            for tap in &kernel {
                if tap.len() != channels {
                    return Err(format!("kernel tap has {} channels, input has {}", tap.len(), channels));
                }
                for weights in tap {
                    if weights.len() != filters {
                        return Err(format!("kernel has {} filters, bias has {}", weights.len(), filters));
                    }
                    flat.extend_from_slice(weights);
                }
            }
            let out_steps = pooled_steps(steps, kernel_size, strides, padding)?;
            let kernel = Array2::from_shape_vec((kernel_size * channels, filters), flat)
                .map_err(|e| e.to_string())?;
            Ok((
                Some(Layer::Conv1d {
                    kernel,
                    bias: Array1::from_vec(bias),
                    kernel_size,
                    strides,
                    padding,
                    activation,
                }),
                Shape::Sequence { steps: out_steps, channels: filters },
            ))
        }
        LayerSpec::MaxPooling1d { pool_size, strides } => pool_layer(PoolKind::Max, pool_size, strides, input),
        LayerSpec::AveragePooling1d { pool_size, strides } => {
            pool_layer(PoolKind::Average, pool_size, strides, input)
        }
        LayerSpec::GlobalAveragePooling1d => global_pool_layer(PoolKind::Average, input),
        LayerSpec::GlobalMaxPooling1d => global_pool_layer(PoolKind::Max, input),
        LayerSpec::BatchNormalization { gamma, beta, moving_mean, moving_variance, epsilon } => {
            let width = match input {
                Shape::Sequence { channels, .. } => channels,
                Shape::Vector(n) => n,
            };
            let lens = [gamma.len(), beta.len(), moving_mean.len(), moving_variance.len()];
            if lens.iter().any(|&l| l != width) {
                return Err(format!("batch normalization parameters {:?} do not match width {}", lens, width));
            }
            // y = gamma * (x - mean) / sqrt(var + eps) + beta, folded into scale/offset
            let scale: Array1<f64> = gamma
                .iter()
                .zip(&moving_variance)
                .map(|(g, v)| g / (v + epsilon).sqrt())
                .collect();
            let offset: Array1<f64> = beta
                .iter()
                .zip(&moving_mean)
                .zip(scale.iter())
                .map(|((b, m), s)| b - m * s)
                .collect();
            Ok((Some(Layer::BatchNormalization { scale, offset }), input))
        }
        LayerSpec::Flatten => {
            let width = match input {
                Shape::Sequence { steps, channels } => steps * channels,
                Shape::Vector(n) => n,
            };
            Ok((Some(Layer::Flatten), Shape::Vector(width)))
        }
        LayerSpec::Dropout { .. } => Ok((None, input)),
        LayerSpec::Dense { kernel, bias, activation } => {
            let inputs = match input {
                Shape::Sequence { channels, .. } => channels,
                Shape::Vector(n) => n,
            };
            if kernel.len() != inputs {
                return Err(format!("dense kernel has {} inputs, expected {}", kernel.len(), inputs));
            }
            let units = bias.len();
            if kernel.iter().any(|row| row.len() != units) {
                return Err(format!("dense kernel rows must have {} units", units));
            }
            let flat: Vec<f64> = kernel.into_iter().flatten().collect();
            let kernel = Array2::from_shape_vec((inputs, units), flat).map_err(|e| e.to_string())?;
            let output = match input {
                Shape::Sequence { steps, .. } => Shape::Sequence { steps, channels: units },
                Shape::Vector(_) => Shape::Vector(units),
            };
            Ok((
                Some(Layer::Dense { kernel, bias: Array1::from_vec(bias), activation }),
                output,
            ))
        }
    }
}

fn pool_layer(
    kind: PoolKind,
    pool_size: usize,
    strides: Option<usize>,
    input: Shape,
) -> std::result::Result<(Option<Layer>, Shape), String> {
    let Shape::Sequence { steps, channels } = input else {
        return Err(format!("pooling expects a sequence, got {}", input));
    };
    let strides = strides.unwrap_or(pool_size);
    let out_steps = pooled_steps(steps, pool_size, strides, Padding::Valid)?;
    Ok((
        Some(Layer::Pool1d { kind, pool_size, strides }),
        Shape::Sequence { steps: out_steps, channels },
    ))
}

fn global_pool_layer(kind: PoolKind, input: Shape) -> std::result::Result<(Option<Layer>, Shape), String> {
    let Shape::Sequence { channels, .. } = input else {
        return Err(format!("global pooling expects a sequence, got {}", input));
    };
    Ok((Some(Layer::GlobalPool1d(kind)), Shape::Vector(channels)))
}

impl Layer {
    fn forward(&self, input: Tensor) -> Tensor {
        match (self, input) {
            (
                Layer::Conv1d { kernel, bias, kernel_size, strides, padding, activation },
                Tensor::Sequence(x),
            ) => {
                let (steps, channels) = x.dim();
                let out_steps = pooled_steps(steps, *kernel_size, *strides, *padding).unwrap_or(0);
                let pad_left = match padding {
                    Padding::Valid => 0,
                    Padding::Same => {
                        let needed = ((out_steps.saturating_sub(1)) * strides + kernel_size).saturating_sub(steps);
                        needed / 2
                    }
                };

                // im2col: one row of k * c inputs per output step
                let patches = Array2::from_shape_fn((out_steps, kernel_size * channels), |(t, j)| {
                    let (tap, ch) = (j / channels, j % channels);
                    let pos = (t * strides + tap) as isize - pad_left as isize;
                    if pos < 0 || pos as usize >= steps {
                        0.0
                    } else {
                        x[[pos as usize, ch]]
                    }
                });
                let mut out = patches.dot(kernel) + bias;
                activate_rows(&mut out, *activation);
                Tensor::Sequence(out)
            }
            (Layer::Pool1d { kind, pool_size, strides }, Tensor::Sequence(x)) => {
                let (steps, channels) = x.dim();
                let out_steps = pooled_steps(steps, *pool_size, *strides, Padding::Valid).unwrap_or(0);
                let out = Array2::from_shape_fn((out_steps, channels), |(t, c)| {
                    let window = x.slice(s![t * strides..t * strides + pool_size, c]);
                    pool(*kind, window.iter().copied())
                });
                Tensor::Sequence(out)
            }
            (Layer::GlobalPool1d(kind), Tensor::Sequence(x)) => {
                let out: Array1<f64> = x
                    .axis_iter(Axis(1))
                    .map(|column| pool(*kind, column.iter().copied()))
                    .collect();
                Tensor::Vector(out)
            }
            (Layer::BatchNormalization { scale, offset }, Tensor::Sequence(x)) => {
                Tensor::Sequence(x * scale + offset)
            }
            (Layer::BatchNormalization { scale, offset }, Tensor::Vector(v)) => {
                Tensor::Vector(v * scale + offset)
            }
            // row-major over (step, channel), matching Keras Flatten
            (Layer::Flatten, Tensor::Sequence(x)) => Tensor::Vector(x.iter().copied().collect()),
            (Layer::Flatten, v @ Tensor::Vector(_)) => v,
            (Layer::Dense { kernel, bias, activation }, Tensor::Sequence(x)) => {
                let mut out = x.dot(kernel) + bias;
                activate_rows(&mut out, *activation);
                Tensor::Sequence(out)
            }
            (Layer::Dense { kernel, bias, activation }, Tensor::Vector(v)) => {
                let mut out = v.dot(kernel) + bias;
                activate(&mut out, *activation);
                Tensor::Vector(out)
            }
            // shapes are checked in from_spec
            (_, other) => other,
        }
    }
}

fn pool(kind: PoolKind, values: impl Iterator<Item = f64>) -> f64 {
    match kind {
        PoolKind::Max => values.fold(f64::NEG_INFINITY, f64::max),
        PoolKind::Average => {
            let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            if n == 0 {
                0.0
            } else {
                sum / n as f64
            }
        }
    }
}

fn activate_rows(x: &mut Array2<f64>, activation: Activation) {
    for mut row in x.rows_mut() {
        let mut owned = row.to_owned();
        activate(&mut owned, activation);
        row.assign(&owned);
    }
}

fn activate(x: &mut Array1<f64>, activation: Activation) {
    match activation {
        Activation::Linear => {}
        Activation::Relu => x.mapv_inplace(|v| v.max(0.0)),
        Activation::Sigmoid => x.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
        Activation::Tanh => x.mapv_inplace(f64::tanh),
        Activation::Softmax => {
            let max = x.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
            x.mapv_inplace(|v| (v - max).exp());
            let sum = x.sum();
            if sum > 0.0 {
                x.mapv_inplace(|v| v / sum);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn dense(kernel: Vec<Vec<f64>>, bias: Vec<f64>, activation: Activation) -> LayerSpec {
        LayerSpec::Dense { kernel, bias, activation }
    }

    #[test]
    fn test_flatten_dense_softmax() {
        let spec = NetworkSpec {
            layers: vec![
                LayerSpec::Flatten,
                dense(vec![vec![1.0, -1.0], vec![1.0, -1.0]], vec![0.0, 0.0], Activation::Softmax),
            ],
        };
        let net = Network::from_spec(spec, 2).unwrap();
        assert_eq!(net.n_classes(), 2);

        let proba = net.predict_proba(&array![[1.0, 1.0], [-1.0, -1.0]]).unwrap();
        let row_sum: f64 = proba.row(0).sum();
        assert!((row_sum - 1.0).abs() < 1e-12);
        assert!(proba[[0, 0]] > proba[[0, 1]]);
        assert!(proba[[1, 1]] > proba[[1, 0]]);
    }

    #[test]
    fn test_conv_valid_then_pool() {
        // kernel [[1]], [[1]] sums adjacent steps; max pool over pairs
        let spec = NetworkSpec {
            layers: vec![
                LayerSpec::Conv1d {
                    kernel: vec![vec![vec![1.0]], vec![vec![1.0]]],
                    bias: vec![0.0],
                    strides: 1,
                    padding: Padding::Valid,
                    activation: Activation::Relu,
                },
                LayerSpec::MaxPooling1d { pool_size: 2, strides: None },
                LayerSpec::Flatten,
                LayerSpec::Dropout { rate: 0.5 },
                dense(vec![vec![1.0]], vec![0.0], Activation::Linear),
            ],
        };
        let net = Network::from_spec(spec, 3).unwrap();
        // steps [1, 2, 4] → conv [3, 6] → pool [6]
        let out = net.forward(&[1.0, 2.0, 4.0]);
        assert_eq!(out.to_vec(), vec![6.0]);
    }

    #[test]
    fn test_conv_same_padding_keeps_length() {
        let spec = NetworkSpec {
            layers: vec![
                LayerSpec::Conv1d {
                    kernel: vec![vec![vec![1.0]], vec![vec![1.0]], vec![vec![1.0]]],
                    bias: vec![0.0],
                    strides: 1,
                    padding: Padding::Same,
                    activation: Activation::Linear,
                },
                LayerSpec::Flatten,
            ],
        };
        let net = Network::from_spec(spec, 3).unwrap();
        assert_eq!(net.forward(&[1.0, 2.0, 3.0]).to_vec(), vec![3.0, 6.0, 5.0]);
    }

    #[test]
    fn test_global_pool_and_batch_norm() {
        let spec = NetworkSpec {
            layers: vec![
                LayerSpec::BatchNormalization {
                    gamma: vec![2.0],
                    beta: vec![1.0],
                    moving_mean: vec![0.0],
                    moving_variance: vec![1.0],
                    epsilon: 0.0,
                },
                LayerSpec::GlobalAveragePooling1d,
            ],
        };
        let net = Network::from_spec(spec, 2).unwrap();
        // (2x + 1) averaged over [1, 3] = 5
        assert_eq!(net.forward(&[1.0, 3.0]).to_vec(), vec![5.0]);
    }

    #[test]
    fn test_sequence_output_is_rejected() {
        let spec = NetworkSpec {
            layers: vec![LayerSpec::Dropout { rate: 0.1 }],
        };
        assert!(Network::from_spec(spec, 4).is_err());
    }

    #[test]
    fn test_dense_shape_mismatch_is_rejected() {
        let spec = NetworkSpec {
            layers: vec![LayerSpec::Flatten, dense(vec![vec![1.0]], vec![0.0], Activation::Linear)],
        };
        let err = Network::from_spec(spec, 3).unwrap_err();
        assert!(err.to_string().contains("layer 1"));
    }

    #[test]
    fn test_deserialize_layers() {
        let spec: NetworkSpec = serde_json::from_str(
            r#"{"layers": [
                {"kind": "conv1d", "kernel": [[[0.5, -0.5]]], "bias": [0.0, 0.0], "activation": "relu"},
                {"kind": "global_max_pooling1d"},
                {"kind": "dense", "kernel": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], "bias": [0.0, 0.0, 0.1], "activation": "softmax"}
            ]}"#,
        )
        .unwrap();
        let net = Network::from_spec(spec, 4).unwrap();
        assert_eq!(net.n_classes(), 3);
        assert_eq!(net.n_layers(), 3);
    }
}
