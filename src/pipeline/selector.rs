use serde::Serialize;

use crate::error::{FaceSwapError, Result};
use crate::models::{DetectionIndex, DetectionPass, PassId, RegisteredId};
use crate::pipeline::registry::FaceRegistry;
use crate::pipeline::similarity::Matcher;

/// Fewest faces a swap photo needs: one registered face to keep, one to replace.
pub const MIN_SWAP_FACES: usize = 2;

#[derive(Debug, Clone, Serialize)]
pub struct ExcludedFace {
    pub index: DetectionIndex,
    pub registered_id: RegisteredId,
    pub name: String,
    pub distance: f64,
}

/// Partition of one detection pass into registered (kept) and target (swapped) faces.
#[derive(Debug, Clone, Serialize)]
pub struct SwapSelection {
    pub pass: PassId,
    pub excluded: Vec<ExcludedFace>,
    pub targets: Vec<DetectionIndex>,
}

impl SwapSelection {
    pub fn target_positions(&self) -> Vec<usize> {
        self.targets.iter().map(|t| t.index).collect()
    }

    pub fn is_target(&self, index: DetectionIndex) -> bool {
        self.targets.contains(&index)
    }

    pub fn is_excluded(&self, index: DetectionIndex) -> bool {
        self.excluded.iter().any(|e| e.index == index)
    }
}

/// Classify every face in `pass`.
///
/// A face is excluded when it matches any registered face; the recorded match
/// is the closest one (registry order breaks ties). Indices stay positions in
/// the full, unfiltered pass.
pub fn classify(pass: &DetectionPass, registry: &FaceRegistry, matcher: &Matcher) -> Result<SwapSelection> {
    match pass.len() {
        0 => return Err(FaceSwapError::NoFaces),
        n if n < MIN_SWAP_FACES => return Err(FaceSwapError::InsufficientFaces { found: n }),
        _ => {}
    }
    let mut excluded = Vec::new();
    let mut targets = Vec::new();
    for face in &pass.faces {
        let candidates = registry.list().iter().map(|r| (r.id, &r.descriptor));
        match matcher.best_match(&face.descriptor, candidates) {
            Some((registered_id, distance)) => {
                let name = registry.get(registered_id).map(|r| r.name.clone()).unwrap_or_default();
                excluded.push(ExcludedFace { index: face.index, registered_id, name, distance });
            }
            None => targets.push(face.index),
        }
    }
    Ok(SwapSelection { pass: pass.id, excluded, targets })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoundingBox, DetectedFace, DetectedId, Descriptor, Frame, ImageData};
    use crate::pipeline::registry::FaceSample;
    use crate::utils::ids::IdAllocator;
    use std::sync::Arc;

    fn registry_with(descriptors: &[(&str, &[f32])]) -> FaceRegistry {
        let mut reg = FaceRegistry::new(10, Arc::new(IdAllocator::new()));
        for (name, d) in descriptors {
            reg.register(
                name,
                FaceSample {
                    descriptor: Descriptor::new(d.to_vec()),
                    image: ImageData::new("ref.jpg", vec![0u8]),
                    bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
                    frame: Frame::new(1.0, 1.0),
                },
            )
            .unwrap();
        }
        reg
    }

    fn pass(descriptors: &[&[f32]]) -> DetectionPass {
        let id = PassId(5);
        let faces = descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| DetectedFace {
                id: DetectedId(i as u64),
                index: DetectionIndex { pass: id, index: i },
                bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
                descriptor: Descriptor::new(d.to_vec()),
            })
            .collect();
        DetectionPass { id, frame: Frame::new(100.0, 100.0), faces }
    }

    #[test]
    fn test_registered_face_is_excluded() {
        let d = [0.1f32, 0.2, 0.3];
        let other = [0.9f32, -0.4, 0.3];
        let reg = registry_with(&[("Ana", &d)]);
        let sel = classify(&pass(&[&d, &other]), &reg, &Matcher::default()).unwrap();
        assert_eq!(sel.excluded.len(), 1);
        assert_eq!(sel.excluded[0].index.index, 0);
        assert_eq!(sel.excluded[0].name, "Ana");
        assert_eq!(sel.target_positions(), vec![1]);
    }

    #[test]
    fn test_targets_keep_original_positions() {
        let kept = [0.0f32, 0.0];
        let reg = registry_with(&[("Bo", &kept)]);
        let sel = classify(&pass(&[&[1.0, 1.0], &kept, &[-1.0, 2.0]]), &reg, &Matcher::default()).unwrap();
        assert_eq!(sel.target_positions(), vec![0, 2]);
        assert!(sel.is_excluded(DetectionIndex { pass: PassId(5), index: 1 }));
    }

    #[test]
    fn test_best_match_is_recorded() {
        let probe = [0.0f32, 0.0];
        let reg = registry_with(&[("Close", &[0.3, 0.0]), ("Closer", &[0.1, 0.0])]);
        let sel = classify(&pass(&[&probe, &[5.0, 5.0]]), &reg, &Matcher::default()).unwrap();
        assert_eq!(sel.excluded[0].name, "Closer");
    }

    #[test]
    fn test_face_count_guards() {
        let reg = registry_with(&[]);
        assert!(matches!(classify(&pass(&[]), &reg, &Matcher::default()), Err(FaceSwapError::NoFaces)));
        assert!(matches!(
            classify(&pass(&[&[0.0]]), &reg, &Matcher::default()),
            Err(FaceSwapError::InsufficientFaces { found: 1 })
        ));
    }

    #[test]
    fn test_empty_registry_targets_everyone() {
        let reg = registry_with(&[]);
        let sel = classify(&pass(&[&[0.0], &[1.0]]), &reg, &Matcher::default()).unwrap();
        assert!(sel.excluded.is_empty());
        assert_eq!(sel.target_positions(), vec![0, 1]);
    }

    #[test]
    fn test_threshold_is_configurable() {
        let reg = registry_with(&[("Ana", &[0.0, 0.0])]);
        let p = pass(&[&[0.5, 0.0], &[3.0, 0.0]]);
        let strict = classify(&p, &reg, &Matcher::new(0.4)).unwrap();
        let loose = classify(&p, &reg, &Matcher::new(0.6)).unwrap();
        assert_eq!(strict.target_positions(), vec![0, 1]);
        assert_eq!(loose.target_positions(), vec![1]);
    }
}
