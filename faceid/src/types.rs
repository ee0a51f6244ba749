use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{FaceIdError, Result};

/// Maximum length in bytes of a person or face identifier.
///
/// Matches the 24-byte NUL-terminated fields of the FRSDK gallery format.
pub const MAX_ID_LEN: usize = 23;

fn validate_id(id: &str, what: &str) -> Result<()> {
    if id.is_empty() {
        return Err(FaceIdError::InvalidInput(format!("{what} is empty")));
    }
    if id.len() > MAX_ID_LEN {
        return Err(FaceIdError::InvalidInput(format!(
            "{what} {id:?} is {} bytes, max {MAX_ID_LEN}",
            id.len()
        )));
    }
    if id.contains('\0') {
        return Err(FaceIdError::InvalidInput(format!("{what} {id:?} contains NUL")));
    }
    Ok(())
}

macro_rules! bounded_id {
    ($(#[$meta:meta])* $name:ident, $what:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            /// Validates and wraps an identifier. Over-long, empty or
            /// NUL-containing input is rejected, never truncated.
            pub fn new(id: impl Into<String>) -> Result<Self> {
                let id = id.into();
                validate_id(&id, $what)?;
                Ok(Self(id))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<&str> for $name {
            type Error = FaceIdError;

            fn try_from(id: &str) -> Result<Self> {
                Self::new(id)
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

bounded_id!(
    /// Identifies an enrolled person.
    PersonId,
    "person id"
);

bounded_id!(
    /// Distinguishes the faces enrolled for one person.
    FaceId,
    "face id"
);

/// Immutable face embedding produced by a [`crate::FeatureExtractor`].
///
/// Cloning is cheap; clones share the same buffer.
#[derive(Clone, PartialEq)]
pub struct FeatureVector(Arc<[f32]>);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Returns the number of components.
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f32>> for FeatureVector {
    fn from(v: Vec<f32>) -> Self {
        Self(v.into())
    }
}

impl From<&[f32]> for FeatureVector {
    fn from(v: &[f32]) -> Self {
        Self(v.into())
    }
}

impl fmt::Debug for FeatureVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureVector")
            .field("dim", &self.dim())
            .finish()
    }
}

/// Face rectangle in source-image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl BoundingBox {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i64 {
        self.right as i64 - self.left as i64
    }

    pub fn height(&self) -> i64 {
        self.bottom as i64 - self.top as i64
    }

    pub fn area(&self) -> i64 {
        self.width() * self.height()
    }

    /// Reports whether `right > left` and `bottom > top`.
    pub fn is_valid(&self) -> bool {
        self.right > self.left && self.bottom > self.top
    }
}

/// One enrolled face: identity keys plus its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub person_id: PersonId,
    pub face_id: FaceId,
    pub feature: FeatureVector,
}

impl Record {
    pub fn new(person_id: PersonId, face_id: FaceId, feature: impl Into<FeatureVector>) -> Self {
        Self {
            person_id,
            face_id,
            feature: feature.into(),
        }
    }

    /// Returns true if this record carries the given key.
    pub fn has_key(&self, person_id: &str, face_id: &str) -> bool {
        self.person_id.as_str() == person_id && self.face_id.as_str() == face_id
    }
}

/// A ranked match returned by the matching engine.
///
/// In person-level searches `face_id` names the face that produced (or best
/// represents) the aggregated score.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub person_id: PersonId,
    pub face_id: FaceId,
    pub score: f32,
}

/// Aggregation and ranking granularity of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    /// Rank individual faces; a person may appear more than once.
    FaceLevel = 0,
    /// One result per person, scored by the best of their faces.
    PersonLevelMax = 1,
    /// One result per person, scored by the mean over all their faces.
    PersonLevelAvg = 2,
}

impl TryFrom<i32> for SearchType {
    type Error = FaceIdError;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            0 => Ok(Self::FaceLevel),
            1 => Ok(Self::PersonLevelMax),
            2 => Ok(Self::PersonLevelAvg),
            _ => Err(FaceIdError::InvalidInput(format!("unknown search type {code}"))),
        }
    }
}

impl FromStr for SearchType {
    type Err = FaceIdError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "face_level" | "face-level" | "face" => Ok(Self::FaceLevel),
            "person_level_max" | "person-level-max" | "max" => Ok(Self::PersonLevelMax),
            "person_level_avg" | "person-level-avg" | "avg" => Ok(Self::PersonLevelAvg),
            other => match other.parse::<i32>() {
                Ok(code) => Self::try_from(code),
                Err(_) => Err(FaceIdError::InvalidInput(format!(
                    "unknown search type {other:?}"
                ))),
            },
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FaceLevel => write!(f, "face_level"),
            Self::PersonLevelMax => write!(f, "person_level_max"),
            Self::PersonLevelAvg => write!(f, "person_level_avg"),
        }
    }
}

/// How an image with several detected faces is reduced to one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChooseType {
    /// Only images with exactly one detected face are accepted.
    RequireExactlyOne = 0,
    /// The largest detected face is used.
    #[default]
    PickLargest = 1,
}

impl TryFrom<i32> for ChooseType {
    type Error = FaceIdError;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            0 => Ok(Self::RequireExactlyOne),
            1 => Ok(Self::PickLargest),
            _ => Err(FaceIdError::InvalidInput(format!("unknown choose type {code}"))),
        }
    }
}
