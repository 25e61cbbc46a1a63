//! Payload for the provider's multi-face swap job.
//!
//! `index` always addresses the full detection sequence of the source photo,
//! so excluded faces leave gaps: with faces `[target, kept, target]` the
//! provider receives `index: [0, 2]`.

use std::collections::BTreeSet;

use base64::Engine as _;
use serde::Serialize;

use crate::error::{FaceSwapError, Result};
use crate::models::{DetectionIndex, ImageData, PassId};

/// One image as the provider accepts it: inline base64 or a URL it can fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ImagePayload {
    Inline { name: String, data: String },
    Url(String),
}

impl From<&ImageData> for ImagePayload {
    fn from(img: &ImageData) -> Self {
        ImagePayload::Inline {
            name: img.name.clone(),
            data: base64::engine::general_purpose::STANDARD.encode(&img.bytes),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SwapRequest {
    pub source_image: ImagePayload,
    pub face_image: Vec<ImagePayload>,
    pub index: Vec<usize>,
    pub webhook: String,
}

/// Which replacement goes where.
#[derive(Debug, Clone)]
pub enum Replacement {
    /// One image per chosen target.
    PerTarget(Vec<(DetectionIndex, ImagePayload)>),
    /// One image for every target.
    Broadcast(ImagePayload),
}

pub struct SwapRequestBuilder {
    webhook: String,
    source: Option<(PassId, ImagePayload)>,
    targets: Vec<DetectionIndex>,
    replacement: Option<Replacement>,
}

impl SwapRequestBuilder {
    pub fn new(webhook: impl Into<String>) -> Self {
        Self { webhook: webhook.into(), source: None, targets: Vec::new(), replacement: None }
    }

    /// Source photo and the detection pass its indices come from.
    pub fn source(mut self, pass: PassId, image: impl Into<ImagePayload>) -> Self {
        self.source = Some((pass, image.into()));
        self
    }

    /// Faces eligible for replacement, as positions in the full pass.
    pub fn targets(mut self, targets: impl IntoIterator<Item = DetectionIndex>) -> Self {
        self.targets = targets.into_iter().collect();
        self
    }

    pub fn replacement(mut self, replacement: Replacement) -> Self {
        self.replacement = Some(replacement);
        self
    }

    pub fn broadcast(self, image: impl Into<ImagePayload>) -> Self {
        self.replacement(Replacement::Broadcast(image.into()))
    }

    pub fn per_target(self, images: Vec<(DetectionIndex, ImagePayload)>) -> Self {
        self.replacement(Replacement::PerTarget(images))
    }

    pub fn build(self) -> Result<SwapRequest> {
        let (pass, source_image) = self.source.ok_or(FaceSwapError::MissingSource)?;
        let replacement = self.replacement.ok_or(FaceSwapError::MissingTargets)?;
        if self.targets.is_empty() {
            return Err(FaceSwapError::MissingTargets);
        }
        for t in &self.targets {
            if t.pass != pass {
                return Err(FaceSwapError::StaleDetection { expected: pass, found: t.pass });
            }
        }

        let (face_image, index) = match replacement {
            Replacement::Broadcast(image) => {
                let mut seen = BTreeSet::new();
                let index = self
                    .targets
                    .iter()
                    .map(|t| t.index)
                    .filter(|i| seen.insert(*i))
                    .collect();
                (vec![image], index)
            }
            Replacement::PerTarget(images) => {
                if images.is_empty() {
                    return Err(FaceSwapError::MissingTargets);
                }
                let mut seen = BTreeSet::new();
                let mut face_image = Vec::with_capacity(images.len());
                let mut index = Vec::with_capacity(images.len());
                for (target, image) in images {
                    if target.pass != pass {
                        return Err(FaceSwapError::StaleDetection { expected: pass, found: target.pass });
                    }
                    if !self.targets.contains(&target) {
                        return Err(FaceSwapError::validation(format!(
                            "face {} is not a swap target",
                            target.index
                        )));
                    }
                    if !seen.insert(target.index) {
                        return Err(FaceSwapError::validation(format!(
                            "face {} has more than one replacement",
                            target.index
                        )));
                    }
                    face_image.push(image);
                    index.push(target.index);
                }
                (face_image, index)
            }
        };

        Ok(SwapRequest { source_image, face_image, index, webhook: self.webhook })
    }
}

impl From<ImageData> for ImagePayload {
    fn from(img: ImageData) -> Self {
        ImagePayload::from(&img)
    }
}
