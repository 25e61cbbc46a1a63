// Face registry
// -------------
//
// Named reference identities for one session, kept in insertion order. Every
// mutation bumps `revision` so cached comparisons can tell they are stale.

use std::sync::Arc;

use crate::error::{FaceSwapError, Result};
use crate::models::{BoundingBox, Descriptor, Frame, ImageData, RegisteredFace, RegisteredId};
use crate::utils::ids::IdAllocator;

pub const DEFAULT_MAX_REGISTERED: usize = 10;

/// Descriptor, image and where the face sits in that image.
#[derive(Debug, Clone)]
pub struct FaceSample {
    pub descriptor: Descriptor,
    pub image: ImageData,
    pub bbox: BoundingBox,
    pub frame: Frame,
}

pub struct FaceRegistry {
    faces: Vec<RegisteredFace>,
    max: usize,
    revision: u64,
    ids: Arc<IdAllocator>,
}

impl FaceRegistry {
    pub fn new(max: usize, ids: Arc<IdAllocator>) -> Self {
        Self { faces: Vec::new(), max, revision: 0, ids }
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn is_full(&self) -> bool {
        self.faces.len() >= self.max
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Descriptor length every registered face shares, if any are registered.
    pub fn dimension(&self) -> Option<usize> {
        self.faces.first().map(|f| f.descriptor.len())
    }

    pub fn list(&self) -> &[RegisteredFace] {
        &self.faces
    }

    pub fn get(&self, id: RegisteredId) -> Option<&RegisteredFace> {
        self.faces.iter().find(|f| f.id == id)
    }

    pub fn register(&mut self, name: &str, sample: FaceSample) -> Result<RegisteredId> {
        if self.is_full() {
            return Err(FaceSwapError::CapacityExceeded { max: self.max });
        }
        let name = clean_name(name)?;
        self.check_sample(&sample, None)?;
        let id: RegisteredId = self.ids.next();
        self.faces.push(RegisteredFace {
            id,
            name,
            descriptor: sample.descriptor,
            reference_image: sample.image,
            bbox: sample.bbox,
            reference_frame: sample.frame,
        });
        self.revision += 1;
        Ok(id)
    }

    pub fn rename(&mut self, id: RegisteredId, name: &str) -> Result<()> {
        let name = clean_name(name)?;
        let face = self.get_mut(id)?;
        face.name = name;
        self.revision += 1;
        Ok(())
    }

    pub fn replace_image(&mut self, id: RegisteredId, sample: FaceSample) -> Result<()> {
        self.get(id).ok_or(FaceSwapError::FaceNotFound(id))?;
        self.check_sample(&sample, Some(id))?;
        let face = self.get_mut(id)?;
        face.descriptor = sample.descriptor;
        face.reference_image = sample.image;
        face.bbox = sample.bbox;
        face.reference_frame = sample.frame;
        self.revision += 1;
        Ok(())
    }

    pub fn remove(&mut self, id: RegisteredId) -> Result<RegisteredFace> {
        let pos = self
            .faces
            .iter()
            .position(|f| f.id == id)
            .ok_or(FaceSwapError::FaceNotFound(id))?;
        let removed = self.faces.remove(pos);
        self.revision += 1;
        Ok(removed)
    }

    pub fn clear(&mut self) {
        if !self.faces.is_empty() {
            self.faces.clear();
            self.revision += 1;
        }
    }

    fn get_mut(&mut self, id: RegisteredId) -> Result<&mut RegisteredFace> {
        self.faces
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or(FaceSwapError::FaceNotFound(id))
    }

    // A face being re-imaged is the only one allowed to change the dimension.
    fn check_sample(&self, sample: &FaceSample, replacing: Option<RegisteredId>) -> Result<()> {
        if sample.descriptor.is_empty() || !sample.descriptor.is_finite() {
            return Err(FaceSwapError::validation("descriptor must be non-empty and finite"));
        }
        let mut others = self.faces.iter().filter(|f| Some(f.id) != replacing);
        if let Some(other) = others.next() {
            if other.descriptor.len() != sample.descriptor.len() {
                return Err(FaceSwapError::validation(format!(
                    "descriptor has {} values, registry uses {}",
                    sample.descriptor.len(),
                    other.descriptor.len()
                )));
            }
        }
        Ok(())
    }
}

fn clean_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(FaceSwapError::validation("name must not be empty"));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(seed: f32) -> FaceSample {
        FaceSample {
            descriptor: Descriptor::new(vec![seed, seed * 0.5, 0.1]),
            image: ImageData::new("ref.jpg", vec![0u8; 4]),
            bbox: BoundingBox::new(1.0, 2.0, 3.0, 4.0),
            frame: Frame::new(100.0, 100.0),
        }
    }

    fn registry(max: usize) -> FaceRegistry {
        FaceRegistry::new(max, Arc::new(IdAllocator::new()))
    }

    #[test]
    fn test_eleventh_registration_fails() {
        let mut reg = registry(DEFAULT_MAX_REGISTERED);
        for i in 0..10 {
            reg.register(&format!("person {}", i), sample(i as f32)).unwrap();
        }
        let err = reg.register("one too many", sample(99.0)).unwrap_err();
        assert!(matches!(err, FaceSwapError::CapacityExceeded { max: 10 }));
        assert_eq!(reg.len(), 10);
    }

    #[test]
    fn test_list_keeps_insertion_order() {
        let mut reg = registry(5);
        let a = reg.register("Ana", sample(1.0)).unwrap();
        let b = reg.register("Bo", sample(2.0)).unwrap();
        let c = reg.register("Cy", sample(3.0)).unwrap();
        reg.remove(b).unwrap();
        let ids: Vec<_> = reg.list().iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![a, c]);
    }

    #[test]
    fn test_mutations_bump_revision() {
        let mut reg = registry(5);
        let id = reg.register("Ana", sample(1.0)).unwrap();
        let r1 = reg.revision();
        reg.rename(id, "  Anna ").unwrap();
        assert_eq!(reg.get(id).unwrap().name, "Anna");
        let r2 = reg.revision();
        reg.replace_image(id, sample(4.0)).unwrap();
        let r3 = reg.revision();
        reg.remove(id).unwrap();
        let r4 = reg.revision();
        assert!(r1 < r2 && r2 < r3 && r3 < r4);
    }

    #[test]
    fn test_unknown_ids_are_not_found() {
        let mut reg = registry(5);
        let missing = RegisteredId(42);
        assert!(matches!(reg.rename(missing, "x"), Err(FaceSwapError::FaceNotFound(_))));
        assert!(matches!(reg.replace_image(missing, sample(1.0)), Err(FaceSwapError::FaceNotFound(_))));
        assert!(matches!(reg.remove(missing), Err(FaceSwapError::FaceNotFound(_))));
        assert_eq!(reg.revision(), 0);
    }

    #[test]
    fn test_rejects_mismatched_dimension_and_blank_names() {
        let mut reg = registry(5);
        reg.register("Ana", sample(1.0)).unwrap();
        let mut odd = sample(2.0);
        odd.descriptor = Descriptor::new(vec![0.1; 5]);
        assert!(matches!(reg.register("Bo", odd), Err(FaceSwapError::Validation(_))));
        assert!(matches!(reg.register("   ", sample(2.0)), Err(FaceSwapError::Validation(_))));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_sole_face_may_change_dimension_on_reimage() {
        let mut reg = registry(5);
        let id = reg.register("Ana", sample(1.0)).unwrap();
        let mut wider = sample(2.0);
        wider.descriptor = Descriptor::new(vec![0.2; 8]);
        reg.replace_image(id, wider).unwrap();
        assert_eq!(reg.dimension(), Some(8));
    }
}
