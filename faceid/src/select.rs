use crate::error::{FaceIdError, Result};
use crate::model::Detection;
use crate::params::Params;
use crate::types::{BoundingBox, ChooseType};

/// Filters and expands raw detector boxes.
///
/// Boxes narrower than `min_detect_width_ratio * max(width, height)` are
/// dropped; the rest are scaled by `expand_ratio` about their centre and
/// clamped to the image. Detector output with a zero image size or a
/// degenerate box is rejected.
pub fn select_faces(detection: &Detection, params: &Params) -> Result<Vec<BoundingBox>> {
    if detection.width == 0 || detection.height == 0 {
        return Err(FaceIdError::InvalidOutput(format!(
            "detector reported image size {}x{}",
            detection.width, detection.height
        )));
    }
    if let Some(b) = detection.faces.iter().find(|b| !b.is_valid()) {
        return Err(FaceIdError::InvalidOutput(format!("detector returned degenerate box {b:?}")));
    }

    let longer = detection.width.max(detection.height) as f64;
    let min_width = params.min_detect_width_ratio * longer;

    Ok(detection
        .faces
        .iter()
        .filter(|b| b.width() as f64 >= min_width)
        .filter_map(|b| expand(b, params.expand_ratio, detection.width, detection.height))
        .collect())
}

fn expand(b: &BoundingBox, ratio: f64, width: u32, height: u32) -> Option<BoundingBox> {
    let cx = (b.left as f64 + b.right as f64) / 2.0;
    let cy = (b.top as f64 + b.bottom as f64) / 2.0;
    let hw = b.width() as f64 * ratio / 2.0;
    let hh = b.height() as f64 * ratio / 2.0;

    let clamp_x = |v: f64| v.round().clamp(0.0, width as f64) as i32;
    let clamp_y = |v: f64| v.round().clamp(0.0, height as f64) as i32;

    let out = BoundingBox::new(
        clamp_x(cx - hw),
        clamp_y(cy - hh),
        clamp_x(cx + hw),
        clamp_y(cy + hh),
    );
    // A box lying entirely outside the image collapses to nothing.
    out.is_valid().then_some(out)
}

/// Picks the face to enrol or recognize.
///
/// - [`ChooseType::RequireExactlyOne`]: the only box, or `None` when there
///   are zero or several.
/// - [`ChooseType::PickLargest`]: the box with the largest area (first on
///   ties), or `None` when there are none.
pub fn choose_face(faces: &[BoundingBox], choose_type: ChooseType) -> Option<BoundingBox> {
    match choose_type {
        ChooseType::RequireExactlyOne => match faces {
            [only] => Some(*only),
            _ => None,
        },
        ChooseType::PickLargest => faces.iter().copied().reduce(|best, b| {
            if b.area() > best.area() { b } else { best }
        }),
    }
}
