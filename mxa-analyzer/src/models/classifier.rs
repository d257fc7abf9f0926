//! Per-tag serialized classifiers (`<tag>_model.json`)
//!
//! ```json
//! { "type": "random_forest", "classes": ["truth", "lie"],
//!   "trees": [ { "nodes": [
//!       { "split": { "feature": 12, "threshold": 0.4, "left": 1, "right": 2 } },
//!       { "leaf": { "value": [8.0, 2.0] } },
//!       { "leaf": { "value": [1.0, 9.0] } } ] } ] }
//!
//! { "type": "decision_tree", "classes": [...], "nodes": [...] }
//!
//! { "type": "logistic_regression", "classes": ["truth", "lie"],
//!   "coefficients": [...], "intercept": -0.2 }
//! ```
//!
//! Tree traversal goes left when `x[feature] <= threshold`. Leaf values are
//! class weights (counts or probabilities) normalized at prediction time.
//! Logistic regression scores the second class.

use crate::error::{ArtifactError, PredictionError};
use crate::types::Label;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Classifier family named by a method's classifier tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassifierFamily {
    RandomForest,
    DecisionTree,
    LogisticRegression,
}

impl ClassifierFamily {
    /// Accepts short (`rf`) and long (`random_forest`) tags
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "rf" | "random_forest" => Some(ClassifierFamily::RandomForest),
            "dt" | "decision_tree" => Some(ClassifierFamily::DecisionTree),
            "lr" | "logistic_regression" => Some(ClassifierFamily::LogisticRegression),
            _ => None,
        }
    }

    pub fn short_tag(&self) -> &'static str {
        match self {
            ClassifierFamily::RandomForest => "rf",
            ClassifierFamily::DecisionTree => "dt",
            ClassifierFamily::LogisticRegression => "lr",
        }
    }

    pub fn long_tag(&self) -> &'static str {
        match self {
            ClassifierFamily::RandomForest => "random_forest",
            ClassifierFamily::DecisionTree => "decision_tree",
            ClassifierFamily::LogisticRegression => "logistic_regression",
        }
    }

    /// Multiplier applied to statistical-fallback confidence
    pub fn confidence_discount(&self) -> f64 {
        match self {
            ClassifierFamily::RandomForest => 0.95,
            ClassifierFamily::DecisionTree => 0.85,
            ClassifierFamily::LogisticRegression => 0.90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f64>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SavedClassifier {
    RandomForest {
        classes: Vec<Label>,
        trees: Vec<DecisionTree>,
    },
    DecisionTree {
        classes: Vec<Label>,
        nodes: Vec<TreeNode>,
    },
    LogisticRegression {
        classes: Vec<Label>,
        coefficients: Vec<f64>,
        intercept: f64,
    },
}

impl SavedClassifier {
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let content = std::fs::read_to_string(path)?;
        let classifier: Self = serde_json::from_str(&content)?;
        classifier.validate()?;
        Ok(classifier)
    }

    pub fn family(&self) -> ClassifierFamily {
        match self {
            SavedClassifier::RandomForest { .. } => ClassifierFamily::RandomForest,
            SavedClassifier::DecisionTree { .. } => ClassifierFamily::DecisionTree,
            SavedClassifier::LogisticRegression { .. } => ClassifierFamily::LogisticRegression,
        }
    }

    pub fn classes(&self) -> &[Label] {
        match self {
            SavedClassifier::RandomForest { classes, .. }
            | SavedClassifier::DecisionTree { classes, .. }
            | SavedClassifier::LogisticRegression { classes, .. } => classes,
        }
    }

    pub fn validate(&self) -> Result<(), ArtifactError> {
        let n_classes = self.classes().len();
        if n_classes < 2 {
            return Err(ArtifactError::Invalid(format!(
                "need at least 2 classes, got {}",
                n_classes
            )));
        }

        match self {
            SavedClassifier::RandomForest { trees, .. } => {
                if trees.is_empty() {
                    return Err(ArtifactError::Invalid("forest has no trees".into()));
                }
                for (index, tree) in trees.iter().enumerate() {
                    validate_tree(&tree.nodes, n_classes)
                        .map_err(|e| ArtifactError::Invalid(format!("tree {}: {}", index, e)))?;
                }
            }
            SavedClassifier::DecisionTree { nodes, .. } => {
                validate_tree(nodes, n_classes).map_err(ArtifactError::Invalid)?;
            }
            SavedClassifier::LogisticRegression {
                coefficients,
                intercept,
                ..
            } => {
                if n_classes != 2 {
                    return Err(ArtifactError::Invalid(
                        "logistic regression is binary".into(),
                    ));
                }
                if coefficients.is_empty()
                    || !intercept.is_finite()
                    || coefficients.iter().any(|c| !c.is_finite())
                {
                    return Err(ArtifactError::Invalid(
                        "empty or non-finite coefficients".into(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Class probabilities, aligned with `classes()`
    pub fn predict_proba(&self, features: &[f32]) -> Result<Vec<f64>, PredictionError> {
        match self {
            SavedClassifier::RandomForest { classes, trees } => {
                let mut sum = vec![0.0; classes.len()];
                for tree in trees {
                    let p = tree_proba(&tree.nodes, features)?;
                    sum.iter_mut().zip(p).for_each(|(s, v)| *s += v);
                }
                let n = trees.len() as f64;
                Ok(sum.into_iter().map(|s| s / n).collect())
            }
            SavedClassifier::DecisionTree { nodes, .. } => tree_proba(nodes, features),
            SavedClassifier::LogisticRegression {
                coefficients,
                intercept,
                ..
            } => {
                if coefficients.len() != features.len() {
                    return Err(PredictionError::FeatureMismatch {
                        expected: coefficients.len(),
                        actual: features.len(),
                    });
                }
                let z: f64 = coefficients
                    .iter()
                    .zip(features)
                    .map(|(c, &x)| c * x as f64)
                    .sum::<f64>()
                    + intercept;
                let p = 1.0 / (1.0 + (-z).exp());
                Ok(vec![1.0 - p, p])
            }
        }
    }

    /// Arg-max label and its probability
    pub fn predict(&self, features: &[f32]) -> Result<(Label, f64), PredictionError> {
        let probabilities = self.predict_proba(features)?;
        let (index, probability) = probabilities
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| PredictionError::InvalidOutput("no probabilities".into()))?;

        if !probability.is_finite() {
            return Err(PredictionError::InvalidOutput(
                "non-finite probability".into(),
            ));
        }

        let label = self.classes().get(index).copied().unwrap_or(Label::Unknown);
        Ok((label, probability))
    }
}

/// Children must come after their parent, which also rules out cycles
fn validate_tree(nodes: &[TreeNode], n_classes: usize) -> Result<(), String> {
    if nodes.is_empty() {
        return Err("tree has no nodes".into());
    }
    for (index, node) in nodes.iter().enumerate() {
        match node {
            TreeNode::Split {
                threshold,
                left,
                right,
                ..
            } => {
                if *left <= index || *right <= index || *left >= nodes.len() || *right >= nodes.len()
                {
                    return Err(format!("node {}: invalid child index", index));
                }
                if !threshold.is_finite() {
                    return Err(format!("node {}: non-finite threshold", index));
                }
            }
            TreeNode::Leaf { value } => {
                if value.len() != n_classes {
                    return Err(format!(
                        "node {}: {} leaf values for {} classes",
                        index,
                        value.len(),
                        n_classes
                    ));
                }
                if value.iter().any(|v| !v.is_finite() || *v < 0.0) {
                    return Err(format!("node {}: invalid leaf value", index));
                }
            }
        }
    }
    Ok(())
}

fn tree_proba(nodes: &[TreeNode], features: &[f32]) -> Result<Vec<f64>, PredictionError> {
    let mut index = 0usize;
    loop {
        match nodes.get(index) {
            Some(TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            }) => {
                let value = features.get(*feature).ok_or(PredictionError::FeatureMismatch {
                    expected: feature + 1,
                    actual: features.len(),
                })?;
                index = if (*value as f64) <= *threshold {
                    *left
                } else {
                    *right
                };
            }
            Some(TreeNode::Leaf { value }) => {
                let total: f64 = value.iter().sum();
                if total <= 0.0 {
                    let uniform = 1.0 / value.len() as f64;
                    return Ok(vec![uniform; value.len()]);
                }
                return Ok(value.iter().map(|v| v / total).collect());
            }
            None => {
                return Err(PredictionError::InvalidOutput(format!(
                    "node index {} out of range",
                    index
                )))
            }
        }
    }
}
