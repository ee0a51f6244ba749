use std::fmt;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::codec;
use crate::error::{FaceIdError, Result};
use crate::gallery::{AddOutcome, DeleteOutcome, Gallery};
use crate::matcher;
use crate::model::Models;
use crate::params::Params;
use crate::select::{choose_face, select_faces};
use crate::types::{BoundingBox, FaceId, FeatureVector, PersonId, Record, SearchResult, SearchType};

/// Outcome of [`Recognizer::add_face`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddStatus {
    /// The face was enrolled.
    Added = 0,
    /// No usable face: none found, or not exactly one under
    /// [`crate::ChooseType::RequireExactlyOne`]. The gallery is unchanged.
    NoValidFace = 1,
    /// The `(person, face)` key is already enrolled.
    Duplicate = 2,
}

/// Outcome of [`Recognizer::del_face`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    Deleted = 0,
    NotFound = 1,
}

/// Which records [`Recognizer::save`] writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Append the faces added since the last save.
    Incremental,
    /// Rewrite the file with the whole in-memory gallery.
    Full,
}

/// Result of [`Recognizer::recognize`].
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    /// False when the image held no usable face; `results` is then empty.
    pub valid: bool,
    /// Ranked matches, at most the requested count.
    pub results: Vec<SearchResult>,
}

impl Recognition {
    fn invalid() -> Self {
        Self {
            valid: false,
            results: Vec::new(),
        }
    }

    /// Drops results scoring below `min_score`.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.results.retain(|r| r.score >= min_score);
        self
    }
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Detecting,
    NoFace,
    Extracting,
    Matching,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detecting => write!(f, "detecting"),
            Self::NoFace => write!(f, "no_face"),
            Self::Extracting => write!(f, "extracting"),
            Self::Matching => write!(f, "matching"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// A face recognition instance: one gallery plus the shared models.
///
/// Thread-safe. `recognize` calls share the gallery; `add_face`,
/// `del_face`, `load` and `save` take it exclusively. Detection and
/// extraction run outside the gallery lock.
///
/// Dropping a recognizer discards unsaved changes.
pub struct Recognizer {
    models: Arc<Models>,
    params: RwLock<Params>,
    gallery: RwLock<Gallery>,
}

impl Recognizer {
    /// Creates a recognizer with default [`Params`] and an empty gallery.
    pub fn new(models: Arc<Models>) -> Self {
        Self {
            models,
            params: RwLock::new(Params::default()),
            gallery: RwLock::new(Gallery::new()),
        }
    }

    /// Replaces the face selection settings.
    pub fn set_params(&self, params: Params) -> Result<()> {
        params.validate()?;
        *self.params.write() = params;
        Ok(())
    }

    pub fn params(&self) -> Params {
        *self.params.read()
    }

    /// Returns the usable faces in `image`: detector boxes after the size
    /// filter and expansion.
    pub fn detect(&self, image: &[u8]) -> Result<Vec<BoundingBox>> {
        if image.is_empty() {
            return Err(FaceIdError::InvalidInput("image is empty".into()));
        }
        debug!(stage = %Stage::Detecting, bytes = image.len());
        let detection = self.models.detector.detect(image)?;
        select_faces(&detection, &self.params())
    }

    /// Replaces the in-memory gallery with the content of `path`.
    ///
    /// All or nothing: on error the current gallery is kept. Every record
    /// must match the extractor's dimension, otherwise the file is
    /// rejected as corrupt. Repeated keys keep their last occurrence.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let records = codec::load_all(path)?;
        let want = self.models.extractor.dimension();
        if let Some(r) = records.iter().find(|r| r.feature.dim() != want) {
            return Err(FaceIdError::corrupt(
                path,
                format!(
                    "{}/{} has feature dimension {}, want {want}",
                    r.person_id,
                    r.face_id,
                    r.feature.dim()
                ),
            ));
        }

        let (loaded, skipped) = Gallery::from_saved(records);
        for r in &skipped {
            warn!(
                path = %path.display(),
                person = %r.person_id,
                face = %r.face_id,
                "skipping superseded gallery record"
            );
        }
        let n = loaded.len();
        *self.gallery.write() = loaded;
        info!(path = %path.display(), faces = n, "gallery loaded");
        Ok(n)
    }

    /// Writes the gallery to `path`.
    ///
    /// A failed save keeps the pending faces so the save can be repeated.
    /// Deletions only reach the file through [`SaveMode::Full`].
    pub fn save(&self, path: impl AsRef<Path>, mode: SaveMode) -> Result<usize> {
        let path = path.as_ref();
        let mut gallery = self.gallery.write();
        let watermark = gallery.watermark();
        let n = match mode {
            SaveMode::Incremental => {
                let pending = gallery.pending();
                codec::append_all(path, &pending)?;
                pending.len()
            }
            SaveMode::Full => {
                codec::rewrite_all(path, gallery.records())?;
                gallery.len()
            }
        };
        gallery.mark_saved(watermark);
        info!(path = %path.display(), ?mode, faces = n, "gallery saved");
        Ok(n)
    }

    /// Detects, extracts and enrols one face of `image`.
    pub fn add_face(&self, image: &[u8], person_id: &str, face_id: &str) -> Result<AddStatus> {
        let person_id = PersonId::new(person_id)?;
        let face_id = FaceId::new(face_id)?;

        let Some(feature) = self.extract_chosen(image)? else {
            return Ok(AddStatus::NoValidFace);
        };
        Ok(self.insert(Record::new(person_id, face_id, feature)))
    }

    /// Enrols a precomputed embedding.
    pub fn add_feature(
        &self,
        person_id: &str,
        face_id: &str,
        feature: impl Into<FeatureVector>,
    ) -> Result<AddStatus> {
        let person_id = PersonId::new(person_id)?;
        let face_id = FaceId::new(face_id)?;
        let feature = feature.into();
        self.check_dimension(&feature)
            .map_err(FaceIdError::InvalidInput)?;
        Ok(self.insert(Record::new(person_id, face_id, feature)))
    }

    /// Removes one face from the in-memory gallery. Never touches disk.
    pub fn del_face(&self, person_id: &str, face_id: &str) -> Result<DeleteStatus> {
        PersonId::new(person_id)?;
        FaceId::new(face_id)?;
        let status = match self.gallery.write().delete(person_id, face_id) {
            DeleteOutcome::Deleted => DeleteStatus::Deleted,
            DeleteOutcome::NotFound => DeleteStatus::NotFound,
        };
        debug!(person = person_id, face = face_id, ?status, "del_face");
        Ok(status)
    }

    /// Identifies the face in `image` against the gallery.
    ///
    /// Returns `valid == false` and no results when the image holds no
    /// usable face. Otherwise returns at most `top_k` ranked results; fewer
    /// when the gallery has fewer candidates.
    pub fn recognize(
        &self,
        image: &[u8],
        top_k: usize,
        search_type: SearchType,
    ) -> Result<Recognition> {
        if top_k == 0 {
            return Err(FaceIdError::InvalidInput("top_k must be positive".into()));
        }
        let Some(feature) = self.extract_chosen(image)? else {
            return Ok(Recognition::invalid());
        };
        self.search_feature(&feature, top_k, search_type)
    }

    /// Matches a precomputed embedding against the gallery.
    pub fn search_feature(
        &self,
        feature: &FeatureVector,
        top_k: usize,
        search_type: SearchType,
    ) -> Result<Recognition> {
        self.check_dimension(feature)
            .map_err(FaceIdError::InvalidInput)?;
        debug!(stage = %Stage::Matching, %search_type, top_k);

        let extractor = &self.models.extractor;
        let gallery = self.gallery.read();
        let results = matcher::search(
            feature.as_slice(),
            gallery.records(),
            search_type,
            top_k,
            |a, b| extractor.similarity(a, b),
        )?;
        drop(gallery);

        debug!(stage = %Stage::Done, results = results.len());
        Ok(Recognition {
            valid: true,
            results,
        })
    }

    /// Returns a snapshot of the enrolled faces in insertion order.
    pub fn records(&self) -> Vec<Record> {
        self.gallery.read().records().to_vec()
    }

    /// Returns the number of faces added since the last save.
    pub fn pending_len(&self) -> usize {
        self.gallery.read().pending_len()
    }

    pub fn len(&self) -> usize {
        self.gallery.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, record: Record) -> AddStatus {
        let (person, face) = (record.person_id.clone(), record.face_id.clone());
        let status = match self.gallery.write().add(record) {
            AddOutcome::Inserted => AddStatus::Added,
            AddOutcome::DuplicateKey => AddStatus::Duplicate,
        };
        debug!(%person, %face, ?status, "add_face");
        status
    }

    // Returns None when no face passes the choose policy.
    fn extract_chosen(&self, image: &[u8]) -> Result<Option<FeatureVector>> {
        let faces = self.detect(image)?;
        let choose_type = self.params().choose_type;
        let Some(face) = choose_face(&faces, choose_type) else {
            debug!(stage = %Stage::NoFace, faces = faces.len(), ?choose_type);
            return Ok(None);
        };

        debug!(stage = %Stage::Extracting, ?face);
        let feature = self.models.extractor.extract(image, &face)?;
        self.check_dimension(&feature)
            .map_err(FaceIdError::InvalidOutput)?;
        Ok(Some(feature))
    }

    fn check_dimension(&self, feature: &FeatureVector) -> std::result::Result<(), String> {
        let want = self.models.extractor.dimension();
        if feature.dim() != want {
            return Err(format!("feature dimension {}, want {want}", feature.dim()));
        }
        Ok(())
    }
}

impl fmt::Debug for Recognizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recognizer")
            .field("params", &self.params())
            .field("faces", &self.len())
            .finish()
    }
}
