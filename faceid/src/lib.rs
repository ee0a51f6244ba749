//! Face identity gallery with persistent enrolment and 1:N search.
//!
//! # Pipeline
//!
//! 1. [`FaceDetector::detect`]: encoded image -> face boxes
//! 2. [`select_faces`] / [`choose_face`]: size filter, expansion and the
//!    [`ChooseType`] policy reduce the boxes to one face
//! 3. [`FeatureExtractor::extract`]: face region -> [`FeatureVector`]
//! 4. [`matcher::search`]: brute-force scoring against the [`Gallery`],
//!    aggregated per [`SearchType`] and truncated to the requested count
//!
//! Detection and extraction models are collaborators supplied through a
//! [`ModelLoader`]; this crate never decodes images itself.
//!
//! # Usage
//!
//! ```ignore
//! use giztoy_faceid::{Registry, SaveMode, SearchType};
//!
//! let registry = Registry::new(my_loader);
//! Registry::create_gallery("faces.gal")?;
//!
//! let id = registry.create("./models")?;
//! let rec = registry.get(id)?;
//! rec.load("faces.gal")?;
//! rec.add_face(&jpeg, "alice", "front")?;
//! rec.save("faces.gal", SaveMode::Incremental)?;
//!
//! let out = rec.recognize(&query_jpeg, 10, SearchType::PersonLevelMax)?;
//! if out.valid {
//!     for r in &out.results {
//!         println!("{} {} {:.3}", r.person_id, r.face_id, r.score);
//!     }
//! }
//! registry.destroy(id)?;
//! ```
//!
//! # Persistence
//!
//! [`SaveMode::Incremental`] appends the faces added since the last save;
//! [`SaveMode::Full`] rewrites the file atomically. Deletions are memory
//! only until the next full save.

pub mod codec;
mod error;
mod gallery;
pub mod matcher;
mod model;
mod params;
mod recognizer;
mod registry;
mod select;
mod similarity;
mod types;

pub use error::{FaceIdError, Result};
pub use gallery::{AddOutcome, DeleteOutcome, Gallery};
pub use model::{Detection, FaceDetector, FeatureExtractor, ModelLoader, Models};
pub use params::{DEFAULT_EXPAND_RATIO, DEFAULT_MIN_DETECT_WIDTH_RATIO, Params};
pub use recognizer::{AddStatus, DeleteStatus, Recognition, Recognizer, SaveMode};
pub use registry::{InstanceId, Registry};
pub use select::{choose_face, select_faces};
pub use similarity::cosine_similarity;
pub use types::{
    BoundingBox, ChooseType, FaceId, FeatureVector, MAX_ID_LEN, PersonId, Record, SearchResult,
    SearchType,
};

#[cfg(test)]
mod tests;
