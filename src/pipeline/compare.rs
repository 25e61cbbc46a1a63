// Comparison board
// ----------------
//
// Photos the user compared against the registry, with per-face scores. Scores
// are derived from the registry; `refresh` recomputes them whenever the
// registry revision moves so a rename or removal never leaves stale rows.

use serde::Serialize;

use crate::models::{BoundingBox, CompareId, DetectionPass, Descriptor, Frame, RegisteredId};
use crate::pipeline::registry::FaceRegistry;
use crate::pipeline::similarity::{display_percent, similarity_percent};

#[derive(Debug, Clone, Serialize)]
pub struct Score {
    pub registered_id: RegisteredId,
    pub name: String,
    /// Unclamped; may be negative.
    pub similarity_percent: f64,
    /// Clamped to 0..=100 for drawing bars.
    pub display_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FaceComparison {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    #[serde(skip)]
    pub descriptor: Descriptor,
    pub scores: Vec<Score>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparedImage {
    pub id: CompareId,
    pub name: String,
    pub frame: Frame,
    pub face_count: usize,
    pub faces: Vec<FaceComparison>,
}

/// Scores for one descriptor against every registered face, best first.
/// Equal scores keep registry order.
pub fn score_against(registry: &FaceRegistry, descriptor: &Descriptor) -> Vec<Score> {
    let mut scores: Vec<Score> = registry
        .list()
        .iter()
        .map(|face| {
            let similarity = similarity_percent(descriptor, &face.descriptor);
            Score {
                registered_id: face.id,
                name: face.name.clone(),
                similarity_percent: similarity,
                display_percent: display_percent(similarity),
            }
        })
        .collect();
    scores.sort_by(|a, b| {
        b.similarity_percent
            .partial_cmp(&a.similarity_percent)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scores
}

#[derive(Default)]
pub struct ComparisonBoard {
    images: Vec<ComparedImage>,
    revision: u64,
}

impl ComparisonBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn images(&self) -> &[ComparedImage] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.images.iter().flat_map(|img| img.faces.first()).map(|f| f.descriptor.len()).next()
    }

    /// Registry revision the current scores were computed against.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn add(&mut self, id: CompareId, name: String, pass: &DetectionPass, registry: &FaceRegistry) -> &ComparedImage {
        self.refresh(registry);
        let faces = pass
            .faces
            .iter()
            .map(|face| FaceComparison {
                bbox: face.bbox,
                descriptor: face.descriptor.clone(),
                scores: score_against(registry, &face.descriptor),
            })
            .collect::<Vec<_>>();
        self.images.push(ComparedImage { id, name, frame: pass.frame, face_count: faces.len(), faces });
        &self.images[self.images.len() - 1]
    }

    pub fn remove(&mut self, id: CompareId) -> bool {
        let before = self.images.len();
        self.images.retain(|img| img.id != id);
        self.images.len() != before
    }

    pub fn clear(&mut self) {
        self.images.clear();
    }

    /// Recompute every score if the registry changed since the last pass.
    /// Returns whether anything was recomputed.
    pub fn refresh(&mut self, registry: &FaceRegistry) -> bool {
        if self.revision == registry.revision() {
            return false;
        }
        for image in &mut self.images {
            for face in &mut image.faces {
                face.scores = score_against(registry, &face.descriptor);
            }
        }
        self.revision = registry.revision();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DetectedFace, DetectedId, DetectionIndex, ImageData, PassId};
    use crate::pipeline::registry::FaceSample;
    use crate::utils::ids::IdAllocator;
    use std::sync::Arc;

    fn sample(values: &[f32]) -> FaceSample {
        FaceSample {
            descriptor: Descriptor::new(values.to_vec()),
            image: ImageData::new("ref.png", vec![1u8]),
            bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            frame: Frame::new(10.0, 10.0),
        }
    }

    fn pass(descriptors: &[&[f32]]) -> DetectionPass {
        let faces = descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| DetectedFace {
                id: DetectedId(i as u64 + 100),
                index: DetectionIndex { pass: PassId(9), index: i },
                bbox: BoundingBox::new(i as f64, 0.0, 1.0, 1.0),
                descriptor: Descriptor::new(d.to_vec()),
            })
            .collect();
        DetectionPass { id: PassId(9), frame: Frame::new(10.0, 10.0), faces }
    }

    #[test]
    fn test_scores_sorted_best_first() {
        let mut reg = FaceRegistry::new(10, Arc::new(IdAllocator::new()));
        let far = reg.register("Far", sample(&[1.0, 0.0])).unwrap();
        let near = reg.register("Near", sample(&[0.1, 0.0])).unwrap();
        let scores = score_against(&reg, &Descriptor::new(vec![0.0, 0.0]));
        assert_eq!(scores[0].registered_id, near);
        assert_eq!(scores[1].registered_id, far);
        assert!((scores[0].similarity_percent - 90.0).abs() < 1e-4);
    }

    #[test]
    fn test_refresh_follows_registry_changes() {
        let mut reg = FaceRegistry::new(10, Arc::new(IdAllocator::new()));
        let ana = reg.register("Ana", sample(&[0.0, 0.0])).unwrap();
        let mut board = ComparisonBoard::new();
        board.add(CompareId(1), "party.jpg".into(), &pass(&[&[0.0, 0.0], &[3.0, 4.0]]), &reg);
        assert_eq!(board.images()[0].faces[1].scores[0].similarity_percent, -400.0);
        assert_eq!(board.images()[0].faces[1].scores[0].display_percent, 0.0);

        reg.rename(ana, "Anna").unwrap();
        assert!(board.refresh(&reg));
        assert_eq!(board.images()[0].faces[0].scores[0].name, "Anna");
        assert!(!board.refresh(&reg));

        reg.remove(ana).unwrap();
        board.refresh(&reg);
        assert!(board.images()[0].faces.iter().all(|f| f.scores.is_empty()));
        assert_eq!(board.revision(), reg.revision());
    }

    #[test]
    fn test_remove_image() {
        let reg = FaceRegistry::new(10, Arc::new(IdAllocator::new()));
        let mut board = ComparisonBoard::new();
        board.add(CompareId(1), "a.jpg".into(), &pass(&[&[0.0]]), &reg);
        board.add(CompareId(2), "b.jpg".into(), &pass(&[&[0.0]]), &reg);
        assert!(board.remove(CompareId(1)));
        assert!(!board.remove(CompareId(1)));
        assert_eq!(board.len(), 1);
    }
}
