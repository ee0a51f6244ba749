use serde::{Deserialize, Serialize};

use crate::error::{FaceIdError, Result};
use crate::types::ChooseType;

/// Default minimum face width as a fraction of the longer image side.
pub const DEFAULT_MIN_DETECT_WIDTH_RATIO: f64 = 0.2;

/// Default box expansion factor (no expansion).
pub const DEFAULT_EXPAND_RATIO: f64 = 1.0;

/// Per-recognizer face selection settings.
///
/// Affects both enrolment and recognition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// How images with several faces are handled.
    pub choose_type: ChooseType,

    /// Faces narrower than `ratio * max(width, height)` are ignored.
    /// E.g. a 1000x1500 image with ratio 0.1 ignores faces under 150px.
    pub min_detect_width_ratio: f64,

    /// Multiplier applied to detected boxes about their centre before
    /// selection and extraction. Must be >= 1.0.
    pub expand_ratio: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            choose_type: ChooseType::default(),
            min_detect_width_ratio: DEFAULT_MIN_DETECT_WIDTH_RATIO,
            expand_ratio: DEFAULT_EXPAND_RATIO,
        }
    }
}

impl Params {
    pub fn validate(&self) -> Result<()> {
        let r = self.min_detect_width_ratio;
        if !(r > 0.0 && r <= 1.0) {
            return Err(FaceIdError::InvalidInput(format!(
                "min_detect_width_ratio must be in (0, 1], got {r}"
            )));
        }
        let e = self.expand_ratio;
        if !(e.is_finite() && e >= 1.0) {
            return Err(FaceIdError::InvalidInput(format!(
                "expand_ratio must be >= 1.0, got {e}"
            )));
        }
        Ok(())
    }
}
