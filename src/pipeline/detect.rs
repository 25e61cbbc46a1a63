//! Boundary with the face detection model.
//!
//! The model runs outside this process (in the browser, next to the upload) and
//! reports what it found as a [`DetectionReport`]. Reports are validated here
//! before anything downstream can compare descriptors.

use serde::{Deserialize, Serialize};

use crate::error::{FaceSwapError, Result};
use crate::models::{BoundingBox, DetectedFace, DetectionIndex, DetectionPass, Descriptor, Frame, PassId};
use crate::utils::ids::IdAllocator;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportedFace {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub descriptor: Descriptor,
}

/// Detector output for one image: the frame its boxes are measured in, and the
/// faces in detector order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    pub frame: Frame,
    #[serde(default)]
    pub faces: Vec<ReportedFace>,
}

impl DetectionReport {
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| FaceSwapError::validation(format!("malformed detections: {}", e)))
    }

    /// Checks frame, boxes, and that every descriptor has the same length
    /// (and `expected_dim`, when the session already has one).
    pub fn validate(&self, expected_dim: Option<usize>) -> Result<()> {
        if !self.frame.is_valid() {
            return Err(FaceSwapError::validation("detection frame must have positive size"));
        }
        let mut dim = expected_dim;
        for (i, face) in self.faces.iter().enumerate() {
            if !face.bbox.is_finite() || face.bbox.width < 0.0 || face.bbox.height < 0.0 {
                return Err(FaceSwapError::validation(format!("face {} has an invalid box", i)));
            }
            if face.descriptor.is_empty() || !face.descriptor.is_finite() {
                return Err(FaceSwapError::validation(format!("face {} has an invalid descriptor", i)));
            }
            match dim {
                Some(d) if d != face.descriptor.len() => {
                    return Err(FaceSwapError::validation(format!(
                        "face {} descriptor has {} values, expected {}",
                        i,
                        face.descriptor.len(),
                        d
                    )));
                }
                Some(_) => {}
                None => dim = Some(face.descriptor.len()),
            }
        }
        Ok(())
    }

    /// Validate and stamp the report with fresh pass/face ids.
    pub fn into_pass(self, ids: &IdAllocator, expected_dim: Option<usize>) -> Result<DetectionPass> {
        self.validate(expected_dim)?;
        let pass_id: PassId = ids.next();
        let faces = self
            .faces
            .into_iter()
            .enumerate()
            .map(|(index, face)| DetectedFace {
                id: ids.next(),
                index: DetectionIndex { pass: pass_id, index },
                bbox: face.bbox,
                descriptor: face.descriptor,
            })
            .collect();
        Ok(DetectionPass { id: pass_id, frame: self.frame, faces })
    }
}

/// `data.faces` of the provider's extract_face reply, as boxes.
pub fn provider_face_boxes(payload: &serde_json::Value) -> Option<Vec<BoundingBox>> {
    let faces = payload.get("data")?.get("faces")?.as_array()?;
    faces
        .iter()
        .map(|corners| {
            let c = corners.as_array()?;
            if c.len() != 4 {
                return None;
            }
            let mut out = [0.0f64; 4];
            for (slot, v) in out.iter_mut().zip(c) {
                *slot = v.as_f64()?;
            }
            Some(BoundingBox::from_corners(out))
        })
        .collect()
}
