//! Model artifacts consumed by the analyzer
//!
//! Every artifact is read-only after load. Formats:
//! - `holistic`: JSON dense network over a raw feature vector
//! - `classifier`: per-tag JSON random forest / decision tree / logistic regression
//! - `landmarks`: bincode ERT cascade regressing 68 facial points
//! - `backbone`: JSON convolution stack producing an embedding

pub mod backbone;
pub mod classifier;
pub mod holistic;
pub mod landmarks;

pub use backbone::{ConvBackbone, Tensor};
pub use classifier::{ClassifierFamily, SavedClassifier};
pub use holistic::DenseNetwork;
pub use landmarks::{BoundingBox, Point, Shape, ShapePredictor};
