//! Random forest classifier (inference only)

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::Classifier;
use crate::error::{ExoError, Result};

/// Decision tree node.
///
/// Nodes live in a flat array; children always sit at a higher index than
/// their parent, so traversal terminates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    /// Internal node: go left when `x[feature] <= threshold`
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Leaf with per-class sample counts (or fractions)
    Leaf { value: Vec<f64> },
}

/// A single fitted tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
}

impl DecisionTree {
    pub fn new(nodes: Vec<TreeNode>) -> Self {
        Self { nodes }
    }

    fn validate(&self, n_classes: usize) -> Result<usize> {
        if self.nodes.is_empty() {
            return Err(ExoError::InvalidArtifact("tree has no nodes".to_string()));
        }
        let mut max_feature = 0;
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split { feature, left, right, .. } => {
                    for &child in [left, right] {
                        if child <= idx || child >= self.nodes.len() {
                            return Err(ExoError::InvalidArtifact(format!(
                                "node {} has invalid child index {}",
                                idx, child
                            )));
                        }
                    }
                    max_feature = max_feature.max(*feature + 1);
                }
                TreeNode::Leaf { value } => {
                    if value.len() != n_classes {
                        return Err(ExoError::InvalidArtifact(format!(
                            "leaf {} has {} class values, expected {}",
                            idx,
                            value.len(),
                            n_classes
                        )));
                    }
                }
            }
        }
        Ok(max_feature)
    }

    /// Normalized class distribution of the leaf reached by `row`
    fn leaf_distribution(&self, row: &[f64]) -> Vec<f64> {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Split { feature, threshold, left, right } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
                TreeNode::Leaf { value } => {
                    let total: f64 = value.iter().sum();
                    return if total > 0.0 {
                        value.iter().map(|v| v / total).collect()
                    } else {
                        vec![0.0; value.len()]
                    };
                }
            }
        }
    }
}

/// Random Forest model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    n_classes: usize,
    /// Number of input features, recovered from the splits when absent
    #[serde(default)]
    n_features: Option<usize>,
    trees: Vec<DecisionTree>,
}

impl RandomForestClassifier {
    pub fn new(n_classes: usize, trees: Vec<DecisionTree>) -> Self {
        Self {
            n_classes,
            n_features: None,
            trees,
        }
    }

    pub fn n_estimators(&self) -> usize {
        self.trees.len()
    }

    /// Check every tree and record the feature width the splits need
    pub fn validate(&mut self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(ExoError::InvalidArtifact("forest has no trees".to_string()));
        }
        let mut required = 0;
        for tree in &self.trees {
            required = required.max(tree.validate(self.n_classes)?);
        }
        match self.n_features {
            Some(n) if n < required => Err(ExoError::InvalidArtifact(format!(
                "forest splits on feature {} but declares {} features",
                required - 1,
                n
            ))),
            Some(_) => Ok(()),
            None => {
                self.n_features = Some(required);
                Ok(())
            }
        }
    }

    fn class_probs(&self, row: &[f64]) -> Vec<f64> {
        let mut probs = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (p, v) in probs.iter_mut().zip(tree.leaf_distribution(row)) {
                *p += v;
            }
        }
        let n_trees = self.trees.len() as f64;
        probs.iter_mut().for_each(|p| *p /= n_trees);
        probs
    }
}

impl Classifier for RandomForestClassifier {
    fn name(&self) -> &'static str {
        "random_forest"
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    fn exact_width(&self) -> bool {
        false
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let required = self.n_features.unwrap_or(0);
        if x.ncols() < required {
            return Err(ExoError::ShapeError {
                expected: format!("at least {} features", required),
                actual: format!("{} features", x.ncols()),
            });
        }

        let probs: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .flat_map_iter(|i| {
                let row: Vec<f64> = x.row(i).to_vec();
                self.class_probs(&row)
            })
            .collect();

        Array2::from_shape_vec((x.nrows(), self.n_classes), probs).map_err(|e| ExoError::ShapeError {
            expected: format!("{} x {}", x.nrows(), self.n_classes),
            actual: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// x0 <= 0.5 → class 0, otherwise class 1
    fn stump(left: Vec<f64>, right: Vec<f64>) -> DecisionTree {
        DecisionTree::new(vec![
            TreeNode::Split { feature: 0, threshold: 0.5, left: 1, right: 2 },
            TreeNode::Leaf { value: left },
            TreeNode::Leaf { value: right },
        ])
    }

    #[test]
    fn test_forest_averages_tree_distributions() {
        let mut forest = RandomForestClassifier::new(
            2,
            vec![stump(vec![10.0, 0.0], vec![0.0, 4.0]), stump(vec![3.0, 1.0], vec![1.0, 1.0])],
        );
        forest.validate().unwrap();
        assert_eq!(forest.n_features(), Some(1));
        assert_eq!(forest.n_estimators(), 2);

        let proba = forest.predict_proba(&array![[0.0], [1.0]]).unwrap();
        assert!((proba[[0, 0]] - 0.875).abs() < 1e-12);
        assert!((proba[[0, 1]] - 0.125).abs() < 1e-12);
        assert!((proba[[1, 1]] - 0.75).abs() < 1e-12);

        assert_eq!(forest.predict(&array![[0.2], [0.9]]).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_threshold_goes_left() {
        let mut forest = RandomForestClassifier::new(2, vec![stump(vec![1.0, 0.0], vec![0.0, 1.0])]);
        forest.validate().unwrap();
        assert_eq!(forest.predict(&array![[0.5]]).unwrap(), vec![0]);
    }

    #[test]
    fn test_rejects_backward_children() {
        let mut forest = RandomForestClassifier::new(
            2,
            vec![DecisionTree::new(vec![
                TreeNode::Leaf { value: vec![1.0, 0.0] },
                TreeNode::Split { feature: 0, threshold: 0.0, left: 0, right: 0 },
            ])],
        );
        assert!(forest.validate().is_err());
    }

    #[test]
    fn test_rejects_leaf_width_mismatch() {
        let mut forest = RandomForestClassifier::new(3, vec![stump(vec![1.0, 0.0], vec![0.0, 1.0])]);
        assert!(forest.validate().is_err());
    }

    #[test]
    fn test_deserialize_nodes() {
        let mut forest: RandomForestClassifier = serde_json::from_str(
            r#"{"n_classes": 2, "trees": [{"nodes": [
                {"kind": "split", "feature": 1, "threshold": 2.0, "left": 1, "right": 2},
                {"kind": "leaf", "value": [5, 0]},
                {"kind": "leaf", "value": [0, 5]}
            ]}]}"#,
        )
        .unwrap();
        forest.validate().unwrap();
        assert_eq!(forest.n_features(), Some(2));
        assert_eq!(forest.predict(&array![[0.0, 3.0]]).unwrap(), vec![1]);
        assert!(forest.predict_proba(&array![[1.0]]).is_err());
    }
}
