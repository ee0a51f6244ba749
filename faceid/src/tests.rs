use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    AddStatus, BoundingBox, ChooseType, DeleteStatus, Detection, FaceDetector, FaceId,
    FaceIdError, FeatureExtractor, FeatureVector, Models, Params, PersonId, Recognizer, Record,
    Registry, Result, SaveMode, SearchType, codec,
};

// ---------------------------------------------------------------------------
// Fake collaborators
// ---------------------------------------------------------------------------

const DIM: usize = 3;

/// Image bytes -> faces in that image, each with the embedding the fake
/// extractor returns for it.
type SceneMap = HashMap<Vec<u8>, Vec<(BoundingBox, Vec<f32>)>>;

struct FakeDetector(Arc<SceneMap>);

impl FaceDetector for FakeDetector {
    fn detect(&self, image: &[u8]) -> Result<Detection> {
        let faces = self
            .0
            .get(image)
            .ok_or_else(|| FaceIdError::ImageDecode("unknown image".into()))?;
        Ok(Detection {
            width: 400,
            height: 400,
            faces: faces.iter().map(|(b, _)| *b).collect(),
        })
    }
}

struct FakeExtractor {
    scenes: Arc<SceneMap>,
    calls: Arc<AtomicUsize>,
}

impl FeatureExtractor for FakeExtractor {
    fn extract(&self, image: &[u8], face: &BoundingBox) -> Result<FeatureVector> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.scenes
            .get(image)
            .and_then(|faces| faces.iter().find(|(b, _)| b == face))
            .map(|(_, f)| FeatureVector::from(f.clone()))
            .ok_or_else(|| FaceIdError::Extractor(format!("no face at {face:?}")))
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

fn face(x: i32, size: i32) -> BoundingBox {
    BoundingBox::new(x, 100, x + size, 100 + size)
}

fn scenes() -> SceneMap {
    let mut m = SceneMap::new();
    m.insert(b"alice-1".to_vec(), vec![(face(10, 120), vec![1.0, 0.0, 0.0])]);
    m.insert(b"alice-2".to_vec(), vec![(face(10, 120), vec![0.9, 0.1, 0.0])]);
    m.insert(b"bob-1".to_vec(), vec![(face(10, 120), vec![0.0, 1.0, 0.0])]);
    m.insert(b"carol-1".to_vec(), vec![(face(10, 120), vec![0.0, 0.0, 1.0])]);
    m.insert(b"alice-query".to_vec(), vec![(face(10, 120), vec![0.95, 0.05, 0.0])]);
    m.insert(b"empty-room".to_vec(), vec![]);
    // Bob small on the left, Alice large on the right.
    m.insert(
        b"pair".to_vec(),
        vec![
            (face(0, 100), vec![0.0, 1.0, 0.0]),
            (face(200, 180), vec![1.0, 0.0, 0.0]),
        ],
    );
    // A face below the default minimum width (0.2 * 400 = 80).
    m.insert(b"tiny".to_vec(), vec![(face(0, 40), vec![1.0, 0.0, 0.0])]);
    m.insert(b"wrong-dim".to_vec(), vec![(face(10, 120), vec![1.0, 0.0])]);
    m
}

fn new_models(calls: Arc<AtomicUsize>) -> Models {
    let scenes = Arc::new(scenes());
    Models {
        detector: Box::new(FakeDetector(Arc::clone(&scenes))),
        extractor: Box::new(FakeExtractor { scenes, calls }),
    }
}

fn new_recognizer() -> Recognizer {
    Recognizer::new(Arc::new(new_models(Arc::new(AtomicUsize::new(0)))))
}

fn enrolled() -> Recognizer {
    let rec = new_recognizer();
    assert_eq!(rec.add_face(b"alice-1", "alice", "a1").unwrap(), AddStatus::Added);
    assert_eq!(rec.add_face(b"alice-2", "alice", "a2").unwrap(), AddStatus::Added);
    assert_eq!(rec.add_face(b"bob-1", "bob", "b1").unwrap(), AddStatus::Added);
    assert_eq!(rec.add_face(b"carol-1", "carol", "c1").unwrap(), AddStatus::Added);
    rec
}

// ---------------------------------------------------------------------------
// Enrolment
// ---------------------------------------------------------------------------

#[test]
fn add_face_and_recognize() {
    let rec = enrolled();
    assert_eq!(rec.len(), 4);

    let out = rec.recognize(b"alice-query", 10, SearchType::PersonLevelMax).unwrap();
    assert!(out.valid);
    assert_eq!(out.results.len(), 3);
    assert_eq!(out.results[0].person_id, "alice");
    assert!(out.results.windows(2).all(|w| w[0].score >= w[1].score));

    let out = rec.recognize(b"alice-query", 10, SearchType::FaceLevel).unwrap();
    assert_eq!(out.results.len(), 4);
    assert_eq!(out.results[0].person_id, "alice");
    assert_eq!(out.results[1].person_id, "alice");
}

#[test]
fn duplicate_key_is_its_own_status() {
    let rec = enrolled();
    let status = rec.add_face(b"bob-1", "alice", "a1").unwrap();
    assert_eq!(status, AddStatus::Duplicate);
    assert_eq!(rec.len(), 4);
}

#[test]
fn no_face_leaves_gallery_untouched() {
    let rec = enrolled();
    assert_eq!(rec.add_face(b"empty-room", "dave", "d1").unwrap(), AddStatus::NoValidFace);
    assert_eq!(rec.add_face(b"tiny", "dave", "d1").unwrap(), AddStatus::NoValidFace);
    assert_eq!(rec.len(), 4);

    let out = rec.recognize(b"empty-room", 5, SearchType::FaceLevel).unwrap();
    assert!(!out.valid);
    assert!(out.results.is_empty());
}

#[test]
fn invalid_ids_are_rejected_before_detection() {
    let calls = Arc::new(AtomicUsize::new(0));
    let rec = Recognizer::new(Arc::new(new_models(Arc::clone(&calls))));
    let long = "x".repeat(24);
    assert!(matches!(
        rec.add_face(b"alice-1", &long, "a1"),
        Err(FaceIdError::InvalidInput(_))
    ));
    assert!(matches!(
        rec.add_face(b"alice-1", "alice", ""),
        Err(FaceIdError::InvalidInput(_))
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(rec.is_empty());
}

#[test]
fn collaborator_failures_propagate() {
    let rec = new_recognizer();
    assert!(matches!(
        rec.add_face(b"not-an-image", "alice", "a1"),
        Err(FaceIdError::ImageDecode(_))
    ));
    assert!(matches!(
        rec.add_face(b"wrong-dim", "alice", "a1"),
        Err(FaceIdError::InvalidOutput(_))
    ));
    assert!(matches!(
        rec.recognize(b"", 5, SearchType::FaceLevel),
        Err(FaceIdError::InvalidInput(_))
    ));
    assert!(rec.is_empty());
}

#[test]
fn add_feature_checks_dimension() {
    let rec = new_recognizer();
    assert_eq!(
        rec.add_feature("erin", "e1", vec![0.5, 0.5, 0.0]).unwrap(),
        AddStatus::Added
    );
    assert!(matches!(
        rec.add_feature("erin", "e2", vec![0.5, 0.5]),
        Err(FaceIdError::InvalidInput(_))
    ));
    assert_eq!(rec.len(), 1);
}

// ---------------------------------------------------------------------------
// Choose policy
// ---------------------------------------------------------------------------

#[test]
fn require_exactly_one_rejects_multi_face_images() {
    let rec = enrolled();
    rec.set_params(Params {
        choose_type: ChooseType::RequireExactlyOne,
        ..Params::default()
    })
    .unwrap();

    assert_eq!(rec.add_face(b"pair", "frank", "f1").unwrap(), AddStatus::NoValidFace);
    assert_eq!(rec.add_face(b"empty-room", "frank", "f1").unwrap(), AddStatus::NoValidFace);
    assert!(!rec.recognize(b"pair", 5, SearchType::FaceLevel).unwrap().valid);
    assert!(!rec.recognize(b"empty-room", 5, SearchType::FaceLevel).unwrap().valid);

    // A single face is still fine.
    assert!(rec.recognize(b"bob-1", 5, SearchType::FaceLevel).unwrap().valid);
}

#[test]
fn pick_largest_uses_the_bigger_face() {
    let rec = enrolled();
    assert_eq!(rec.params().choose_type, ChooseType::PickLargest);

    let out = rec.recognize(b"pair", 1, SearchType::PersonLevelMax).unwrap();
    assert!(out.valid);
    assert_eq!(out.results.len(), 1);
    assert_eq!(out.results[0].person_id, "alice");
}

#[test]
fn set_params_rejects_invalid_values() {
    let rec = new_recognizer();
    let err = rec
        .set_params(Params {
            expand_ratio: 0.5,
            ..Params::default()
        })
        .unwrap_err();
    assert!(matches!(err, FaceIdError::InvalidInput(_)));
    assert_eq!(rec.params(), Params::default());
}

#[test]
fn detect_reports_filtered_boxes() {
    let rec = new_recognizer();
    assert_eq!(rec.detect(b"pair").unwrap().len(), 2);
    assert!(rec.detect(b"tiny").unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Recognition
// ---------------------------------------------------------------------------

#[test]
fn empty_gallery_is_valid_with_no_results() {
    let rec = new_recognizer();
    for st in [
        SearchType::FaceLevel,
        SearchType::PersonLevelMax,
        SearchType::PersonLevelAvg,
    ] {
        let out = rec.recognize(b"alice-query", 10, st).unwrap();
        assert!(out.valid);
        assert!(out.results.is_empty());
    }
}

#[test]
fn result_count_is_capped() {
    let rec = enrolled();
    let out = rec.recognize(b"alice-query", 2, SearchType::FaceLevel).unwrap();
    assert_eq!(out.results.len(), 2);

    let out = rec.recognize(b"alice-query", 100, SearchType::PersonLevelAvg).unwrap();
    assert_eq!(out.results.len(), 3);

    assert!(matches!(
        rec.recognize(b"alice-query", 0, SearchType::FaceLevel),
        Err(FaceIdError::InvalidInput(_))
    ));
}

#[test]
fn min_score_filter() {
    let rec = enrolled();
    let out = rec
        .recognize(b"alice-query", 10, SearchType::FaceLevel)
        .unwrap()
        .with_min_score(0.9);
    assert_eq!(out.results.len(), 2);
    assert!(out.results.iter().all(|r| r.person_id == "alice"));
}

#[test]
fn concurrent_recognize_is_deterministic() {
    let rec = enrolled();
    let want = rec.recognize(b"alice-query", 10, SearchType::FaceLevel).unwrap();

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let rec = &rec;
                s.spawn(move || {
                    let st = [
                        SearchType::FaceLevel,
                        SearchType::PersonLevelMax,
                        SearchType::PersonLevelAvg,
                    ][i % 3];
                    (st, rec.recognize(b"alice-query", 10, st).unwrap())
                })
            })
            .collect();
        for h in handles {
            let (st, got) = h.join().unwrap();
            let expected = rec.recognize(b"alice-query", 10, st).unwrap();
            assert_eq!(got, expected);
            if st == SearchType::FaceLevel {
                assert_eq!(got, want);
            }
        }
    });
}

#[test]
fn del_face_is_memory_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("faces.gal");

    let rec = enrolled();
    rec.save(&path, SaveMode::Full).unwrap();

    assert_eq!(rec.del_face("bob", "b1").unwrap(), DeleteStatus::Deleted);
    assert_eq!(rec.del_face("bob", "b1").unwrap(), DeleteStatus::NotFound);
    assert_eq!(rec.len(), 3);
    assert_eq!(codec::load_all(&path).unwrap().len(), 4);

    let out = rec.recognize(b"bob-1", 10, SearchType::PersonLevelMax).unwrap();
    assert!(out.results.iter().all(|r| r.person_id != "bob"));
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn incremental_save_appends_only_new_faces() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("faces.gal");
    Registry::create_gallery(&path).unwrap();

    let rec = new_recognizer();
    rec.add_face(b"alice-1", "alice", "a1").unwrap();
    rec.add_face(b"bob-1", "bob", "b1").unwrap();
    assert_eq!(rec.save(&path, SaveMode::Incremental).unwrap(), 2);
    assert_eq!(rec.pending_len(), 0);

    rec.add_face(b"carol-1", "carol", "c1").unwrap();
    assert_eq!(rec.save(&path, SaveMode::Incremental).unwrap(), 1);
    assert_eq!(rec.save(&path, SaveMode::Incremental).unwrap(), 0);

    let other = new_recognizer();
    assert_eq!(other.load(&path).unwrap(), 3);
    assert_eq!(other.records(), rec.records());
}

#[test]
fn incremental_save_keeps_deleted_records_until_full_save() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("faces.gal");

    let rec = enrolled();
    rec.save(&path, SaveMode::Incremental).unwrap();
    rec.del_face("carol", "c1").unwrap();
    rec.save(&path, SaveMode::Incremental).unwrap();
    assert_eq!(codec::load_all(&path).unwrap().len(), 4);

    rec.save(&path, SaveMode::Full).unwrap();
    assert_eq!(codec::load_all(&path).unwrap().len(), 3);
}

#[test]
fn failed_save_keeps_pending_faces() {
    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("missing").join("faces.gal");
    let good = dir.path().join("faces.gal");

    let rec = enrolled();
    assert!(matches!(
        rec.save(&bad, SaveMode::Incremental),
        Err(FaceIdError::FileOpen { .. })
    ));
    assert!(rec.save(&bad, SaveMode::Full).is_err());
    assert_eq!(rec.pending_len(), 4);

    assert_eq!(rec.save(&good, SaveMode::Incremental).unwrap(), 4);
    assert_eq!(rec.pending_len(), 0);
}

#[test]
fn failed_load_keeps_gallery() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("faces.gal");

    let rec = enrolled();
    rec.save(&path, SaveMode::Full).unwrap();

    // Chop the last record in half.
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

    let other = new_recognizer();
    other.add_feature("zed", "z1", vec![0.0, 0.0, 1.0]).unwrap();
    assert!(matches!(other.load(&path), Err(FaceIdError::CorruptFile { .. })));
    assert_eq!(other.len(), 1);
    assert!(matches!(
        other.load(dir.path().join("absent.gal")),
        Err(FaceIdError::FileOpen { .. })
    ));
    assert_eq!(other.len(), 1);
}

#[test]
fn load_replaces_gallery_and_counts_as_saved() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("faces.gal");
    enrolled().save(&path, SaveMode::Full).unwrap();

    let rec = new_recognizer();
    rec.add_feature("zed", "z1", vec![0.0, 0.0, 1.0]).unwrap();
    rec.load(&path).unwrap();
    assert_eq!(rec.len(), 4);
    assert_eq!(rec.pending_len(), 0);
    assert_eq!(rec.add_face(b"alice-1", "alice", "a1").unwrap(), AddStatus::Duplicate);
}

#[test]
fn reenrolled_face_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("faces.gal");

    let rec = new_recognizer();
    rec.add_feature("alice", "a1", vec![1.0, 0.0, 0.0]).unwrap();
    rec.add_feature("bob", "b1", vec![0.0, 0.0, 1.0]).unwrap();
    rec.save(&path, SaveMode::Incremental).unwrap();

    assert_eq!(rec.del_face("alice", "a1").unwrap(), DeleteStatus::Deleted);
    rec.add_feature("alice", "a1", vec![0.0, 1.0, 0.0]).unwrap();
    assert_eq!(rec.save(&path, SaveMode::Incremental).unwrap(), 1);

    // Both copies of alice/a1 are in the file; the newer one must win.
    assert_eq!(codec::load_all(&path).unwrap().len(), 3);
    let other = new_recognizer();
    assert_eq!(other.load(&path).unwrap(), 2);
    assert_eq!(other.records(), rec.records());
}

#[test]
fn load_rejects_foreign_dimension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("faces.gal");
    let records = vec![
        Record::new(
            PersonId::new("alice").unwrap(),
            FaceId::new("a1").unwrap(),
            vec![1.0, 0.0, 0.0],
        ),
        Record::new(
            PersonId::new("bob").unwrap(),
            FaceId::new("b1").unwrap(),
            vec![1.0, 0.0],
        ),
    ];
    codec::rewrite_all(&path, &records).unwrap();

    let rec = new_recognizer();
    rec.add_feature("zed", "z1", vec![0.0, 0.0, 1.0]).unwrap();
    let err = rec.load(&path).unwrap_err();
    assert!(matches!(err, FaceIdError::CorruptFile { .. }), "{err}");
    assert_eq!(rec.len(), 1);
    assert_eq!(rec.records()[0].person_id, "zed");
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct CountingLoader {
    loads: Arc<AtomicUsize>,
}

impl crate::ModelLoader for CountingLoader {
    fn load(&self, model_dir: &Path) -> Result<Models> {
        if model_dir.ends_with("broken") {
            return Err(FaceIdError::DetectorModelInit(format!(
                "{}: missing detector model",
                model_dir.display()
            )));
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(new_models(Arc::new(AtomicUsize::new(0))))
    }
}

#[test]
fn models_load_once_across_instances() {
    let loads = Arc::new(AtomicUsize::new(0));
    let registry = Registry::new(CountingLoader {
        loads: Arc::clone(&loads),
    });

    let ids: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| registry.create("models").unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(registry.len(), 8);
    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 8);
}

#[test]
fn model_init_failure_is_reported_and_not_cached() {
    let loads = Arc::new(AtomicUsize::new(0));
    let registry = Registry::new(CountingLoader {
        loads: Arc::clone(&loads),
    });

    assert!(matches!(
        registry.create("models/broken"),
        Err(FaceIdError::DetectorModelInit(_))
    ));
    assert!(!registry.models_loaded());
    assert!(registry.is_empty());

    registry.create("models").unwrap();
    assert!(registry.models_loaded());
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[test]
fn destroyed_instance_is_invalid() {
    let registry = Registry::new(|_: &Path| -> Result<Models> {
        Ok(new_models(Arc::new(AtomicUsize::new(0))))
    });
    let id = registry.create("models").unwrap();

    let rec = registry.get(id).unwrap();
    rec.add_face(b"alice-1", "alice", "a1").unwrap();

    registry.destroy(id).unwrap();
    assert!(matches!(registry.get(id), Err(FaceIdError::InvalidInstance(_))));
    assert!(matches!(registry.destroy(id), Err(FaceIdError::InvalidInstance(_))));

    // A handle obtained before destroy still works until dropped.
    assert_eq!(rec.len(), 1);

    // Instances do not share galleries.
    let other = registry.get(registry.create("models").unwrap()).unwrap();
    assert!(other.is_empty());
}
