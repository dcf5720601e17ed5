use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Guards tree traversal against cyclic node references.
const MAX_TREE_DEPTH: usize = 512;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("failed to encode {path}: {message}")]
    Encode { path: PathBuf, message: String },

    #[error("expected {expected} features, got {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("tree {tree} is malformed: {reason}")]
    MalformedTree { tree: usize, reason: String },

    #[error("ensemble has no trees")]
    EmptyEnsemble,

    #[error("non-finite value at position {position}")]
    NonFinite { position: usize },

    #[error("model produced a non-finite prediction")]
    NonFinitePrediction,
}

/// Anything that maps a scaled feature vector to a single RUL estimate.
pub trait Regressor: Send + Sync {
    fn predict(&self, features: &[f64]) -> Result<f64, ModelError>;
}

/// Per-feature standardization fitted on the training set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self, ModelError> {
        if mean.len() != scale.len() {
            return Err(ModelError::Dimension {
                expected: mean.len(),
                actual: scale.len(),
            });
        }
        Ok(Self { mean, scale })
    }

    pub fn dimensions(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, features: &[f64]) -> Result<Vec<f64>, ModelError> {
        if features.len() != self.dimensions() {
            return Err(ModelError::Dimension {
                expected: self.dimensions(),
                actual: features.len(),
            });
        }

        let scaled: Vec<f64> = features
            .iter()
            .zip(self.mean.iter().zip(self.scale.iter()))
            .map(|(x, (mean, scale))| {
                // Constant training columns are stored with a zero scale
                let scale = if *scale == 0.0 { 1.0 } else { *scale };
                (x - mean) / scale
            })
            .collect();

        match scaled.iter().position(|v| !v.is_finite()) {
            Some(position) => Err(ModelError::NonFinite { position }),
            None => Ok(scaled),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        read_artifact(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        write_artifact(path, self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregation {
    /// Random-forest style average of tree outputs.
    Mean,
    /// Boosting style sum, learning rate already folded into leaf values.
    Sum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    fn evaluate(&self, tree: usize, features: &[f64]) -> Result<f64, ModelError> {
        let malformed = |reason: String| ModelError::MalformedTree { tree, reason };
        let mut index = 0;
        for _ in 0..MAX_TREE_DEPTH {
            match self.nodes.get(index) {
                Some(TreeNode::Leaf { value }) => return Ok(*value),
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let x = features.get(*feature).ok_or_else(|| {
                        malformed(format!("split on missing feature {feature}"))
                    })?;
                    index = if *x <= *threshold { *left } else { *right };
                }
                None => return Err(malformed(format!("node {index} does not exist"))),
            }
        }
        Err(malformed(format!("deeper than {MAX_TREE_DEPTH} levels")))
    }
}

/// Serialized regression model artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RegressionModel {
    Linear {
        intercept: f64,
        coefficients: Vec<f64>,
    },
    TreeEnsemble {
        base_score: f64,
        aggregation: Aggregation,
        trees: Vec<Tree>,
    },
}

impl RegressionModel {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        read_artifact(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        write_artifact(path, self)
    }
}

impl Regressor for RegressionModel {
    fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        let prediction = match self {
            RegressionModel::Linear {
                intercept,
                coefficients,
            } => {
                if coefficients.len() != features.len() {
                    return Err(ModelError::Dimension {
                        expected: coefficients.len(),
                        actual: features.len(),
                    });
                }
                intercept
                    + coefficients
                        .iter()
                        .zip(features)
                        .map(|(w, x)| w * x)
                        .sum::<f64>()
            }
            RegressionModel::TreeEnsemble {
                base_score,
                aggregation,
                trees,
            } => {
                let mut total = 0.0;
                for (i, tree) in trees.iter().enumerate() {
                    total += tree.evaluate(i, features)?;
                }
                match aggregation {
                    Aggregation::Sum => base_score + total,
                    Aggregation::Mean if trees.is_empty() => {
                        return Err(ModelError::EmptyEnsemble)
                    }
                    Aggregation::Mean => base_score + total / trees.len() as f64,
                }
            }
        };

        if prediction.is_finite() {
            Ok(prediction)
        } else {
            Err(ModelError::NonFinitePrediction)
        }
    }
}

fn read_artifact<T: DeserializeOwned>(path: &Path) -> Result<T, ModelError> {
    let file = File::open(path).map_err(|source| ModelError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    bincode::deserialize_from(BufReader::new(file)).map_err(|e| ModelError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn write_artifact<T: Serialize>(path: &Path, artifact: &T) -> Result<(), ModelError> {
    let file = File::create(path).map_err(|source| ModelError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    bincode::serialize_into(&mut writer, artifact).map_err(|e| ModelError::Encode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    writer.flush().map_err(|source| ModelError::Open {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump(threshold: f64, low: f64, high: f64) -> Tree {
        Tree {
            nodes: vec![
                TreeNode::Split {
                    feature: 0,
                    threshold,
                    left: 1,
                    right: 2,
                },
                TreeNode::Leaf { value: low },
                TreeNode::Leaf { value: high },
            ],
        }
    }

    #[test]
    fn scaler_standardizes_and_tolerates_zero_scale() {
        let scaler = StandardScaler::new(vec![1.0, 5.0], vec![2.0, 0.0]).unwrap();
        assert_eq!(scaler.transform(&[3.0, 7.0]).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn scaler_rejects_wrong_length() {
        let scaler = StandardScaler::new(vec![0.0; 3], vec![1.0; 3]).unwrap();
        assert!(matches!(
            scaler.transform(&[1.0, 2.0]),
            Err(ModelError::Dimension {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn linear_model_is_dot_product_plus_intercept() {
        let model = RegressionModel::Linear {
            intercept: 600.0,
            coefficients: vec![-10.0, 2.0],
        };
        assert_eq!(model.predict(&[1.0, 5.0]).unwrap(), 600.0);
        assert!(model.predict(&[1.0]).is_err());
    }

    #[test]
    fn tree_ensembles_aggregate() {
        let trees = vec![stump(0.0, 100.0, 300.0), stump(1.0, 200.0, 400.0)];
        let forest = RegressionModel::TreeEnsemble {
            base_score: 0.0,
            aggregation: Aggregation::Mean,
            trees: trees.clone(),
        };
        assert_eq!(forest.predict(&[0.5]).unwrap(), 250.0);

        let boosted = RegressionModel::TreeEnsemble {
            base_score: 50.0,
            aggregation: Aggregation::Sum,
            trees,
        };
        assert_eq!(boosted.predict(&[2.0]).unwrap(), 750.0);
    }

    #[test]
    fn malformed_trees_are_errors() {
        let dangling = RegressionModel::TreeEnsemble {
            base_score: 0.0,
            aggregation: Aggregation::Sum,
            trees: vec![Tree {
                nodes: vec![TreeNode::Split {
                    feature: 0,
                    threshold: 0.0,
                    left: 7,
                    right: 7,
                }],
            }],
        };
        assert!(matches!(
            dangling.predict(&[1.0]),
            Err(ModelError::MalformedTree { tree: 0, .. })
        ));

        let cyclic = RegressionModel::TreeEnsemble {
            base_score: 0.0,
            aggregation: Aggregation::Sum,
            trees: vec![Tree {
                nodes: vec![TreeNode::Split {
                    feature: 0,
                    threshold: 0.0,
                    left: 0,
                    right: 0,
                }],
            }],
        };
        assert!(matches!(
            cyclic.predict(&[1.0]),
            Err(ModelError::MalformedTree { .. })
        ));

        let empty = RegressionModel::TreeEnsemble {
            base_score: 0.0,
            aggregation: Aggregation::Mean,
            trees: Vec::new(),
        };
        assert!(matches!(empty.predict(&[1.0]), Err(ModelError::EmptyEnsemble)));
    }

    #[test]
    fn artifacts_survive_disk() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("model.bin");
        let model = RegressionModel::TreeEnsemble {
            base_score: 10.0,
            aggregation: Aggregation::Sum,
            trees: vec![stump(0.5, 1.0, 2.0)],
        };
        model.save(&model_path).unwrap();
        assert_eq!(RegressionModel::load(&model_path).unwrap(), model);

        let missing = dir.path().join("absent.bin");
        assert!(matches!(
            StandardScaler::load(&missing),
            Err(ModelError::Open { .. })
        ));
    }
}
