use super::*;
use crate::app::state::{state_channel, StateUpdate};
use crate::config::ClassifierConfig;
use crate::error::ClassifierError;
use crate::frame::{FrameFormat, RawFrame};
use crate::status::{ModelStatus, RunStatus};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};

const MODEL_JSON: &str = r#"{
    "name": "test-centroids",
    "classes": [
        { "label": "n02123045 tabby, tabby cat", "centroid": [201.0, 132.0, 70.0] },
        { "label": "n09428293 seashore, coast", "centroid": [40.0, 70.0, 190.0] },
        { "label": "n04285008 sports car, sport car", "centroid": [180.0, 30.0, 40.0] }
    ]
}"#;

fn test_config(model_path: PathBuf, fallback: PathBuf) -> ClassifierConfig {
    ClassifierConfig {
        model_path,
        fallback_model_path: fallback,
        confidence_threshold: 0.30,
    }
}

fn solid_frame(id: u64, rgb: [u8; 3]) -> RawFrame {
    RawFrame::new(id, SystemTime::now(), rgb.repeat(32 * 24), 32, 24, FrameFormat::Rgb24)
}

fn running() -> watch::Receiver<RunStatus> {
    let (sender, receiver) = watch::channel(RunStatus::Running);
    // Receivers keep the last value after the sender is dropped
    drop(sender);
    receiver
}

/// Classifier returning a fixed distribution, optionally blocking until released
struct ScriptedClassifier {
    distribution: LabelDistribution,
    gate: Option<Arc<AtomicBool>>,
    calls: AtomicU32,
}

impl ScriptedClassifier {
    fn new(entries: &[(&str, f64)]) -> Self {
        Self {
            distribution: entries.iter().map(|(l, p)| (l.to_string(), *p)).collect(),
            gate: None,
            calls: AtomicU32::new(0),
        }
    }

    fn gated(entries: &[(&str, f64)], gate: Arc<AtomicBool>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(entries)
        }
    }
}

impl Classifier for ScriptedClassifier {
    fn predict(&self, _image: &RgbImage) -> Result<LabelDistribution, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            while !gate.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(2));
            }
        }
        Ok(self.distribution.clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Hands out a prepared classifier and counts load attempts
struct PreparedLoader {
    classifier: Arc<ScriptedClassifier>,
    loads: AtomicU32,
}

impl PreparedLoader {
    fn new(classifier: Arc<ScriptedClassifier>) -> Self {
        Self {
            classifier,
            loads: AtomicU32::new(0),
        }
    }
}

impl ModelLoader for PreparedLoader {
    fn load(&self, _path: &Path) -> Result<Arc<dyn Classifier>, ClassifierError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.classifier.clone())
    }
}

fn placeholder_asset(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("model.bin");
    std::fs::write(&path, b"weights").unwrap();
    path
}

async fn ready_engine(
    classifier: Arc<ScriptedClassifier>,
) -> (Arc<ClassificationEngine>, mpsc::UnboundedReceiver<StateUpdate>, TempDir) {
    let dir = TempDir::new().unwrap();
    let asset = placeholder_asset(&dir);
    let (handle, updates) = state_channel();
    let engine = Arc::new(ClassificationEngine::new(
        test_config(asset, dir.path().join("fallback.bin")),
        Arc::new(PreparedLoader::new(classifier)),
        handle,
    ));
    assert_eq!(engine.load_model().await, ModelStatus::Success);
    (engine, updates, dir)
}

#[tokio::test]
async fn test_load_model_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let asset = placeholder_asset(&dir);
    let loader = Arc::new(PreparedLoader::new(Arc::new(ScriptedClassifier::new(&[("a", 1.0)]))));
    let (handle, mut updates) = state_channel();
    let engine = ClassificationEngine::new(
        test_config(asset, dir.path().join("fallback.bin")),
        loader.clone(),
        handle,
    );

    assert_eq!(engine.status(), ModelStatus::NotStarted);
    assert_eq!(engine.load_model().await, ModelStatus::Success);
    assert_eq!(engine.load_model().await, ModelStatus::Success);
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);

    assert!(matches!(updates.try_recv(), Ok(StateUpdate::ModelStatus(ModelStatus::Loading))));
    assert!(matches!(updates.try_recv(), Ok(StateUpdate::ModelStatus(ModelStatus::Success))));
    assert!(updates.try_recv().is_err());
}

#[tokio::test]
async fn test_load_model_uses_fallback_location() {
    let dir = TempDir::new().unwrap();
    let fallback = dir.path().join("Resnet50.json");
    std::fs::write(&fallback, MODEL_JSON).unwrap();

    let (handle, _updates) = state_channel();
    let engine = ClassificationEngine::new(
        test_config(dir.path().join("missing/model.json"), fallback),
        Arc::new(CentroidModelLoader),
        handle,
    );

    assert_eq!(engine.load_model().await, ModelStatus::Success);

    let candidate = engine.classify(&solid_frame(1, [200, 130, 72])).unwrap();
    assert_eq!(candidate.label, "n02123045 tabby, tabby cat");
    assert!(candidate.confidence > 0.9);
    assert_eq!(candidate.distribution.len(), 3);
}

#[tokio::test]
async fn test_missing_asset_fails_without_retry() {
    let dir = TempDir::new().unwrap();
    let (handle, _updates) = state_channel();
    let engine = Arc::new(ClassificationEngine::new(
        test_config(dir.path().join("a.json"), dir.path().join("b.json")),
        Arc::new(CentroidModelLoader),
        handle,
    ));

    assert_eq!(engine.load_model().await, ModelStatus::Failed);
    // Terminal: a second call does not try again
    assert_eq!(engine.load_model().await, ModelStatus::Failed);

    assert!(engine.classify(&solid_frame(1, [0, 0, 0])).is_none());
    assert!(matches!(
        engine.try_submit(solid_frame(2, [0, 0, 0]), running()),
        SubmitOutcome::NotReady
    ));
}

#[tokio::test]
async fn test_invalid_model_asset_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("model.json");
    std::fs::write(&path, r#"{ "name": "empty", "classes": [] }"#).unwrap();

    let (handle, _updates) = state_channel();
    let engine = ClassificationEngine::new(
        test_config(path.clone(), path),
        Arc::new(CentroidModelLoader),
        handle,
    );

    assert_eq!(engine.load_model().await, ModelStatus::Failed);
}

#[tokio::test]
async fn test_undecodable_frame_yields_no_candidate() {
    let classifier = Arc::new(ScriptedClassifier::new(&[("a", 1.0)]));
    let (engine, _updates, _dir) = ready_engine(classifier.clone()).await;

    let truncated = RawFrame::new(1, SystemTime::now(), vec![0; 10], 32, 24, FrameFormat::Rgb24);
    assert!(engine.classify(&truncated).is_none());
    assert_eq!(engine.stats().decode_failures, 1);

    let oversized = RawFrame::new(2, SystemTime::now(), vec![0; 12], u32::MAX, u32::MAX, FrameFormat::Rgb24);
    assert!(engine.classify(&oversized).is_none());
    assert_eq!(engine.stats().decode_failures, 2);
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_second_frame_dropped_while_inference_in_flight() {
    let gate = Arc::new(AtomicBool::new(false));
    let classifier = Arc::new(ScriptedClassifier::gated(
        &[("n02123045 tabby, tabby cat", 0.8), ("n00000001 other", 0.2)],
        gate.clone(),
    ));
    let (engine, mut updates, _dir) = ready_engine(classifier.clone()).await;
    while updates.try_recv().is_ok() {}

    let first = match engine.try_submit(solid_frame(1, [0, 0, 0]), running()) {
        SubmitOutcome::Started(handle) => handle,
        other => panic!("Expected inference to start, got {:?}", other),
    };
    assert!(engine.is_busy());

    assert!(matches!(
        engine.try_submit(solid_frame(2, [0, 0, 0]), running()),
        SubmitOutcome::Busy
    ));
    assert_eq!(engine.stats().dropped_busy, 1);

    gate.store(true, Ordering::SeqCst);
    let result = first.await.unwrap().unwrap();
    assert_eq!(result.label, "Tabby");
    assert_eq!(result.frame_id, 1);
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    assert!(!engine.is_busy());

    match updates.recv().await.unwrap() {
        StateUpdate::Classification(published) => assert_eq!(published.frame_id, 1),
        other => panic!("Unexpected update: {:?}", other),
    }

    // Free again once the first inference finished
    assert!(matches!(
        engine.try_submit(solid_frame(3, [0, 0, 0]), running()),
        SubmitOutcome::Started(_)
    ));
}

#[tokio::test]
async fn test_result_discarded_after_capture_stops() {
    let classifier = Arc::new(ScriptedClassifier::new(&[("n02123045 tabby", 0.9)]));
    let (engine, mut updates, _dir) = ready_engine(classifier).await;
    while updates.try_recv().is_ok() {}

    let (_run_sender, stopped) = watch::channel(RunStatus::Stopped);
    let SubmitOutcome::Started(handle) = engine.try_submit(solid_frame(1, [0, 0, 0]), stopped) else {
        panic!("Expected inference to start");
    };

    assert!(handle.await.unwrap().is_none());
    assert_eq!(engine.stats().discarded_stale, 1);
    assert!(updates.try_recv().is_err());
}

#[tokio::test]
async fn test_threshold_applied_to_published_results() {
    let below = Arc::new(ScriptedClassifier::new(&[("n02123045 tabby", 0.29), ("other", 0.2)]));
    let (engine, _updates, _dir) = ready_engine(below).await;

    let SubmitOutcome::Started(handle) = engine.try_submit(solid_frame(1, [0, 0, 0]), running()) else {
        panic!("Expected inference to start");
    };
    assert!(handle.await.unwrap().is_none());
    assert_eq!(engine.stats().rejected_below_threshold, 1);

    let at = Arc::new(ScriptedClassifier::new(&[("n02123045 tabby", 0.30), ("other", 0.2)]));
    let (engine, _updates, _dir) = ready_engine(at).await;

    let SubmitOutcome::Started(handle) = engine.try_submit(solid_frame(2, [0, 0, 0]), running()) else {
        panic!("Expected inference to start");
    };
    let result = handle.await.unwrap().unwrap();
    assert_eq!(result.label, "Tabby");
    assert_eq!(result.confidence, 0.30);
}

#[test]
fn test_centroid_classifier_validates_asset() {
    let asset = CentroidModelAsset {
        name: "dup".to_string(),
        temperature: 20.0,
        classes: vec![
            CentroidClass {
                label: "a".to_string(),
                centroid: [0.0, 0.0, 0.0],
            },
            CentroidClass {
                label: "a".to_string(),
                centroid: [1.0, 1.0, 1.0],
            },
        ],
    };
    assert!(matches!(
        CentroidClassifier::new(asset, Path::new("dup.json")),
        Err(ClassifierError::InvalidModel { .. })
    ));
}

#[test]
fn test_centroid_distribution_sums_to_one() {
    let asset: CentroidModelAsset = serde_json::from_str(MODEL_JSON).unwrap();
    let classifier = CentroidClassifier::new(asset, Path::new("model.json")).unwrap();

    let image = RgbImage::from_pixel(40, 30, image::Rgb([180, 30, 40]));
    let distribution = classifier.predict(&image).unwrap();

    let total: f64 = distribution.values().sum();
    assert!((total - 1.0).abs() < 1e-9);

    let best = ClassificationCandidate::from_distribution(distribution, 0).unwrap();
    assert_eq!(clean_label(&best.label), "Sports car");
}

#[test]
fn test_resolve_model_path_prefers_primary() {
    let dir = TempDir::new().unwrap();
    let primary = dir.path().join("primary.json");
    let fallback = dir.path().join("fallback.json");
    std::fs::write(&primary, "{}").unwrap();
    std::fs::write(&fallback, "{}").unwrap();

    assert_eq!(resolve_model_path(&primary, &fallback).unwrap(), primary);

    std::fs::remove_file(&primary).unwrap();
    assert_eq!(resolve_model_path(&primary, &fallback).unwrap(), fallback);

    std::fs::remove_file(&fallback).unwrap();
    assert!(matches!(
        resolve_model_path(&primary, &fallback),
        Err(ClassifierError::AssetMissing { .. })
    ));
}
