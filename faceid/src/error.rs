use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by faceid operations.
///
/// Operation outcomes such as a duplicate key, a missing face or an image
/// without a usable face are not errors; they are reported through
/// [`crate::AddStatus`], [`crate::DeleteStatus`] and
/// [`crate::Recognition::valid`].
#[derive(Debug, Error)]
pub enum FaceIdError {
    #[error("faceid: invalid instance {0}")]
    InvalidInstance(u64),

    #[error("faceid: allocation failed: {0}")]
    AllocationFailure(String),

    #[error("faceid: detector model init failed: {0}")]
    DetectorModelInit(String),

    #[error("faceid: extractor model init failed: {0}")]
    ExtractorModelInit(String),

    #[error("faceid: invalid input: {0}")]
    InvalidInput(String),

    #[error("faceid: invalid output: {0}")]
    InvalidOutput(String),

    #[error("faceid: open {}: {source}", .path.display())]
    FileOpen { path: PathBuf, source: io::Error },

    #[error("faceid: read {}: {source}", .path.display())]
    FileRead { path: PathBuf, source: io::Error },

    #[error("faceid: write {}: {source}", .path.display())]
    FileWrite { path: PathBuf, source: io::Error },

    #[error("faceid: corrupt gallery {}: {reason}", .path.display())]
    CorruptFile { path: PathBuf, reason: String },

    #[error("faceid: image decode failed: {0}")]
    ImageDecode(String),

    #[error("faceid: detector: {0}")]
    Detector(String),

    #[error("faceid: extractor: {0}")]
    Extractor(String),
}

impl FaceIdError {
    /// Returns the FRSDK-compatible status code for this error.
    ///
    /// Collaborator runtime failures without a dedicated code map to the
    /// model-init code of the same collaborator.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidInstance(_) => -10001,
            Self::AllocationFailure(_) => -9999,
            Self::DetectorModelInit(_) | Self::Detector(_) => -9998,
            Self::ExtractorModelInit(_) | Self::Extractor(_) => -9997,
            Self::InvalidInput(_) => -9996,
            Self::InvalidOutput(_) => -9995,
            Self::FileOpen { .. } => -9994,
            Self::FileRead { .. } => -9993,
            Self::FileWrite { .. } => -9992,
            Self::CorruptFile { .. } => -9991,
            Self::ImageDecode(_) => -9990,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptFile {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FaceIdError>;
