mod engine;
mod label;
mod model;
#[cfg(test)]
mod tests;

pub use engine::{ClassificationEngine, EngineStatsSnapshot, SubmitOutcome};
pub use label::{clean_label, ClassificationCandidate, ClassificationResult, LabelDistribution};
pub use model::{
    resolve_model_path, CentroidClass, CentroidClassifier, CentroidModelAsset, CentroidModelLoader,
    Classifier, ModelLoader,
};
