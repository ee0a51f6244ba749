use std::fmt;
use std::path::Path;

use crate::error::Result;
use crate::similarity::cosine_similarity;
use crate::types::{BoundingBox, FeatureVector};

/// Faces found in one image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    /// Decoded image width in pixels.
    pub width: u32,
    /// Decoded image height in pixels.
    pub height: u32,
    /// Raw detector boxes, in detector order.
    pub faces: Vec<BoundingBox>,
}

/// Locates faces in encoded image bytes (BMP, JPEG, PNG).
///
/// Undecodable input must be reported as
/// [`crate::FaceIdError::ImageDecode`].
///
/// # Thread Safety
///
/// Implementations must be safe for concurrent use.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, image: &[u8]) -> Result<Detection>;
}

/// Computes a face embedding for one region of an encoded image.
///
/// # Thread Safety
///
/// Implementations must be safe for concurrent use.
pub trait FeatureExtractor: Send + Sync {
    /// Extracts the embedding of the face inside `face`.
    fn extract(&self, image: &[u8], face: &BoundingBox) -> Result<FeatureVector>;

    /// Returns the dimensionality of the embeddings (e.g., 512).
    fn dimension(&self) -> usize;

    /// Scores two embeddings of this model; higher means more similar.
    /// Must be commutative.
    fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        cosine_similarity(a, b)
    }
}

/// The loaded detector and extractor, shared by every recognizer of a
/// process.
pub struct Models {
    pub detector: Box<dyn FaceDetector>,
    pub extractor: Box<dyn FeatureExtractor>,
}

impl fmt::Debug for Models {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Models")
            .field("dimension", &self.extractor.dimension())
            .finish()
    }
}

/// Loads [`Models`] from a model directory.
///
/// Failures should be reported as
/// [`crate::FaceIdError::DetectorModelInit`] or
/// [`crate::FaceIdError::ExtractorModelInit`].
pub trait ModelLoader: Send + Sync {
    fn load(&self, model_dir: &Path) -> Result<Models>;
}

impl<F> ModelLoader for F
where
    F: Fn(&Path) -> Result<Models> + Send + Sync,
{
    fn load(&self, model_dir: &Path) -> Result<Models> {
        self(model_dir)
    }
}
