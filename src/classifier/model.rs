use super::label::LabelDistribution;
use crate::error::ClassifierError;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Opaque image classifier with a fixed input/output contract
pub trait Classifier: Send + Sync {
    /// Run one forward pass, producing a probability for every known label
    fn predict(&self, image: &RgbImage) -> Result<LabelDistribution, ClassifierError>;

    fn name(&self) -> &str;
}

/// Loads a classifier from a model asset on disk
pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn Classifier>, ClassifierError>;
}

/// Pick the primary asset location, or the fallback when the primary is absent
pub fn resolve_model_path(primary: &Path, fallback: &Path) -> Result<PathBuf, ClassifierError> {
    if primary.exists() {
        return Ok(primary.to_path_buf());
    }

    debug!("Model asset not found at {:?}, trying {:?}", primary, fallback);
    if fallback.exists() {
        return Ok(fallback.to_path_buf());
    }

    Err(ClassifierError::AssetMissing {
        primary: primary.to_path_buf(),
        fallback: fallback.to_path_buf(),
    })
}

/// On-disk format of a centroid model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentroidModelAsset {
    pub name: String,
    /// Softmax temperature in RGB distance units
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    pub classes: Vec<CentroidClass>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentroidClass {
    pub label: String,
    pub centroid: [f64; 3],
}

fn default_temperature() -> f64 {
    20.0
}

/// Nearest-centroid colour classifier.
///
/// Centre-crops the image to a square, averages its colour and turns the
/// distances to every class centroid into a softmax distribution.
pub struct CentroidClassifier {
    asset: CentroidModelAsset,
}

impl CentroidClassifier {
    pub fn new(asset: CentroidModelAsset, path: &Path) -> Result<Self, ClassifierError> {
        let invalid = |details: String| ClassifierError::InvalidModel {
            path: path.to_path_buf(),
            details,
        };

        if asset.classes.is_empty() {
            return Err(invalid("model has no classes".to_string()));
        }
        if !(asset.temperature.is_finite() && asset.temperature > 0.0) {
            return Err(invalid(format!("temperature must be positive, got {}", asset.temperature)));
        }

        let mut seen = HashSet::new();
        for class in &asset.classes {
            if !seen.insert(class.label.as_str()) {
                return Err(invalid(format!("duplicate label {:?}", class.label)));
            }
        }

        Ok(Self { asset })
    }

    fn mean_colour(image: &RgbImage) -> Option<[f64; 3]> {
        let (width, height) = image.dimensions();
        let side = width.min(height);
        if side == 0 {
            return None;
        }

        let x0 = (width - side) / 2;
        let y0 = (height - side) / 2;
        // Sample at most 64x64 points of the crop
        let step = (side / 64).max(1);

        let mut sum = [0.0f64; 3];
        let mut count = 0u64;
        for y in (y0..y0 + side).step_by(step as usize) {
            for x in (x0..x0 + side).step_by(step as usize) {
                let pixel = image.get_pixel(x, y).0;
                for (acc, channel) in sum.iter_mut().zip(pixel) {
                    *acc += channel as f64;
                }
                count += 1;
            }
        }

        Some(sum.map(|s| s / count as f64))
    }
}

impl Classifier for CentroidClassifier {
    fn predict(&self, image: &RgbImage) -> Result<LabelDistribution, ClassifierError> {
        let mean = Self::mean_colour(image).ok_or_else(|| ClassifierError::Inference {
            details: "image has zero area".to_string(),
        })?;

        let logits: Vec<f64> = self
            .asset
            .classes
            .iter()
            .map(|class| {
                let distance = class
                    .centroid
                    .iter()
                    .zip(mean)
                    .map(|(c, m)| (c - m).powi(2))
                    .sum::<f64>()
                    .sqrt();
                -distance / self.asset.temperature
            })
            .collect();

        let max_logit = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|l| (l - max_logit).exp()).collect();
        let total: f64 = exps.iter().sum();

        Ok(self
            .asset
            .classes
            .iter()
            .zip(exps)
            .map(|(class, e)| (class.label.clone(), e / total))
            .collect())
    }

    fn name(&self) -> &str {
        &self.asset.name
    }
}

/// Loads [`CentroidClassifier`] models from JSON assets
#[derive(Debug, Default, Clone, Copy)]
pub struct CentroidModelLoader;

impl ModelLoader for CentroidModelLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn Classifier>, ClassifierError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ClassifierError::AssetRead {
            path: path.to_path_buf(),
            source,
        })?;

        let asset: CentroidModelAsset =
            serde_json::from_str(&contents).map_err(|e| ClassifierError::InvalidModel {
                path: path.to_path_buf(),
                details: e.to_string(),
            })?;

        let classifier = CentroidClassifier::new(asset, path)?;
        info!(
            "Loaded model '{}' with {} classes from {:?}",
            classifier.name(),
            classifier.asset.classes.len(),
            path
        );
        Ok(Arc::new(classifier))
    }
}
