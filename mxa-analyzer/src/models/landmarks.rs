//! 68-point landmark regressor (Ensemble of Regression Trees)
//!
//! The predictor starts from a mean shape scaled into the face box and
//! refines it through a cascade of tree ensembles. Each split compares the
//! intensity at two points anchored on the current shape estimate.
//!
//! Serialized with `bincode`; only 68-point models are accepted so that the
//! flattened landmark vector always has 136 values.

use crate::error::{ArtifactError, ExtractionError};
use crate::registry::LandmarkPredictor;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Landmark count of the iBUG annotation scheme
pub const LANDMARK_COUNT: usize = 68;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box: top-left corner plus size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Normalized [0,1] box coordinates → image coordinates
    pub fn denormalize(&self, p: Point) -> Point {
        Point::new(self.x + p.x * self.width, self.y + p.y * self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub points: Vec<Point>,
}

impl Shape {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn zeros(n: usize) -> Self {
        Self {
            points: vec![Point::new(0.0, 0.0); n],
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn add(&mut self, delta: &Shape) {
        for (p, d) in self.points.iter_mut().zip(&delta.points) {
            p.x += d.x;
            p.y += d.y;
        }
    }

    /// `[x0, y0, x1, y1, ...]`
    pub fn flatten(&self) -> Vec<f32> {
        self.points.iter().flat_map(|p| [p.x, p.y]).collect()
    }
}

/// Pixel-difference feature anchored on two landmarks
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SplitFeature {
    pub anchor1: u16,
    pub offset1: Point,
    pub anchor2: u16,
    pub offset2: Point,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ErtNode {
    Split {
        feature: SplitFeature,
        threshold: f32,
        left: u32,
        right: u32,
    },
    /// Shape delta in box-normalized units
    Leaf { delta: Shape },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<ErtNode>,
}

impl RegressionTree {
    /// Goes left when the feature value exceeds the threshold
    fn predict<F>(&self, feature_value: F) -> Option<&Shape>
    where
        F: Fn(&SplitFeature) -> f32,
    {
        let mut index = 0usize;
        for _ in 0..self.nodes.len() {
            match self.nodes.get(index)? {
                ErtNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if feature_value(feature) > *threshold {
                        *left as usize
                    } else {
                        *right as usize
                    };
                }
                ErtNode::Leaf { delta } => return Some(delta),
            }
        }
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub trees: Vec<RegressionTree>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapePredictor {
    /// Initial estimate in box-normalized [0,1] coordinates
    mean_shape: Shape,
    cascade: Vec<TreeEnsemble>,
}

impl ShapePredictor {
    pub fn new(mean_shape: Shape, cascade: Vec<TreeEnsemble>) -> Self {
        Self {
            mean_shape,
            cascade,
        }
    }

    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let model: Self = bincode::deserialize(&bytes)?;
        model.validate()?;
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> Result<(), ArtifactError> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&bincode::serialize(self)?)?;
        writer.flush()?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ArtifactError> {
        if self.mean_shape.len() != LANDMARK_COUNT {
            return Err(ArtifactError::Invalid(format!(
                "expected {} landmarks, model has {}",
                LANDMARK_COUNT,
                self.mean_shape.len()
            )));
        }

        for (stage, ensemble) in self.cascade.iter().enumerate() {
            for tree in &ensemble.trees {
                for node in &tree.nodes {
                    match node {
                        ErtNode::Leaf { delta } if delta.len() != LANDMARK_COUNT => {
                            return Err(ArtifactError::Invalid(format!(
                                "stage {}: leaf delta has {} points",
                                stage,
                                delta.len()
                            )));
                        }
                        ErtNode::Split {
                            feature,
                            left,
                            right,
                            ..
                        } => {
                            let anchors_ok = (feature.anchor1 as usize) < LANDMARK_COUNT
                                && (feature.anchor2 as usize) < LANDMARK_COUNT;
                            let children_ok = (*left as usize) < tree.nodes.len()
                                && (*right as usize) < tree.nodes.len();
                            if !anchors_ok || !children_ok {
                                return Err(ArtifactError::Invalid(format!(
                                    "stage {}: split references out-of-range index",
                                    stage
                                )));
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        Ok(())
    }

    pub fn num_cascade_stages(&self) -> usize {
        self.cascade.len()
    }

    /// Landmarks in image coordinates
    pub fn predict_shape(&self, image: &GrayImage, face: &BoundingBox) -> Shape {
        let mut shape = Shape::new(
            self.mean_shape
                .points
                .iter()
                .map(|p| face.denormalize(*p))
                .collect(),
        );

        for ensemble in &self.cascade {
            let mut delta = Shape::zeros(shape.len());
            {
                let value_of = |f: &SplitFeature| feature_value(f, &shape, face, image);
                for tree in &ensemble.trees {
                    if let Some(leaf) = tree.predict(&value_of) {
                        delta.add(leaf);
                    }
                }
            }
            for (p, d) in shape.points.iter_mut().zip(&delta.points) {
                p.x += d.x * face.width;
                p.y += d.y * face.height;
            }
        }

        shape
    }
}

impl LandmarkPredictor for ShapePredictor {
    fn num_landmarks(&self) -> usize {
        self.mean_shape.len()
    }

    fn predict(&self, image: &GrayImage, face: &BoundingBox) -> Result<Shape, ExtractionError> {
        Ok(self.predict_shape(image, face))
    }
}

fn feature_value(feature: &SplitFeature, shape: &Shape, face: &BoundingBox, image: &GrayImage) -> f32 {
    let sample = |anchor: u16, offset: Point| {
        let base = shape
            .points
            .get(anchor as usize)
            .copied()
            .unwrap_or(Point::new(0.0, 0.0));
        sample_bilinear(
            image,
            base.x + offset.x * face.width,
            base.y + offset.y * face.height,
        )
    };
    sample(feature.anchor1, feature.offset1) - sample(feature.anchor2, feature.offset2)
}

/// Bilinear intensity lookup; outside pixels read as 0
fn sample_bilinear(image: &GrayImage, x: f32, y: f32) -> f32 {
    let pixel = |px: i64, py: i64| -> f32 {
        if px < 0 || py < 0 || px >= image.width() as i64 || py >= image.height() as i64 {
            0.0
        } else {
            image.get_pixel(px as u32, py as u32)[0] as f32
        }
    };

    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let top = pixel(x0, y0) * (1.0 - fx) + pixel(x0 + 1, y0) * fx;
    let bottom = pixel(x0, y0 + 1) * (1.0 - fx) + pixel(x0 + 1, y0 + 1) * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Approximate iBUG 68-point mean face in box-normalized coordinates
pub fn default_mean_shape() -> Shape {
    const POINTS: [(f32, f32); LANDMARK_COUNT] = [
        // Jaw (0-16)
        (0.10, 0.35), (0.11, 0.45), (0.12, 0.55), (0.14, 0.65), (0.18, 0.73),
        (0.24, 0.80), (0.32, 0.85), (0.41, 0.88), (0.50, 0.89), (0.59, 0.88),
        (0.68, 0.85), (0.76, 0.80), (0.82, 0.73), (0.86, 0.65), (0.88, 0.55),
        (0.89, 0.45), (0.90, 0.35),
        // Brows (17-26)
        (0.20, 0.26), (0.25, 0.22), (0.32, 0.21), (0.38, 0.23), (0.43, 0.27),
        (0.57, 0.27), (0.62, 0.23), (0.68, 0.21), (0.75, 0.22), (0.80, 0.26),
        // Nose (27-35)
        (0.50, 0.32), (0.50, 0.40), (0.50, 0.48), (0.50, 0.55), (0.40, 0.58),
        (0.45, 0.60), (0.50, 0.62), (0.55, 0.60), (0.60, 0.58),
        // Eyes (36-47)
        (0.24, 0.32), (0.28, 0.29), (0.34, 0.29), (0.38, 0.33), (0.34, 0.35),
        (0.28, 0.35), (0.62, 0.33), (0.66, 0.29), (0.72, 0.29), (0.76, 0.32),
        (0.72, 0.35), (0.66, 0.35),
        // Mouth (48-67)
        (0.32, 0.72), (0.38, 0.68), (0.44, 0.66), (0.50, 0.67), (0.56, 0.66),
        (0.62, 0.68), (0.68, 0.72), (0.62, 0.78), (0.56, 0.80), (0.50, 0.81),
        (0.44, 0.80), (0.38, 0.78), (0.36, 0.72), (0.44, 0.70), (0.50, 0.70),
        (0.56, 0.70), (0.64, 0.72), (0.56, 0.74), (0.50, 0.75), (0.44, 0.74),
    ];
    Shape::new(POINTS.iter().map(|&(x, y)| Point::new(x, y)).collect())
}
