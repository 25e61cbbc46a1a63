// Swap workflow
// -------------
//
// Idle -> PhotoLoaded -> Detecting -> Detected -> Classified -> Building
//      -> Submitted -> Completed | Failed
//
// One workflow per session, tracking the photo currently being prepared for a
// swap. Loading a new photo restarts it from PhotoLoaded.

use serde::Serialize;

use crate::error::{FaceSwapError, Result};
use crate::models::{DetectionPass, ImageData};
use crate::pipeline::registry::FaceRegistry;
use crate::pipeline::selector::{classify, SwapSelection};
use crate::pipeline::similarity::Matcher;
use crate::provider::callback::CallbackOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapStage {
    Idle,
    PhotoLoaded,
    Detecting,
    Detected,
    Classified,
    Building,
    Submitted,
    Completed,
    Failed,
}

/// What the builder needs from a classified workflow.
#[derive(Debug, Clone)]
pub struct BuildInput {
    pub photo: ImageData,
    pub selection: SwapSelection,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStatus {
    pub stage: SwapStage,
    pub photo: Option<String>,
    pub face_count: usize,
    pub selection: Option<SwapSelection>,
    pub task_id: Option<String>,
    pub result_image: Option<String>,
    pub failure: Option<String>,
}

pub struct SwapWorkflow {
    stage: SwapStage,
    photo: Option<ImageData>,
    pass: Option<DetectionPass>,
    selection: Option<SwapSelection>,
    task_id: Option<String>,
    result_image: Option<String>,
    failure: Option<String>,
}

impl Default for SwapWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

impl SwapWorkflow {
    pub fn new() -> Self {
        Self {
            stage: SwapStage::Idle,
            photo: None,
            pass: None,
            selection: None,
            task_id: None,
            result_image: None,
            failure: None,
        }
    }

    pub fn stage(&self) -> SwapStage {
        self.stage
    }

    pub fn photo(&self) -> Option<&ImageData> {
        self.photo.as_ref()
    }

    pub fn pass(&self) -> Option<&DetectionPass> {
        self.pass.as_ref()
    }

    pub fn selection(&self) -> Option<&SwapSelection> {
        self.selection.as_ref()
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    pub fn load_photo(&mut self, photo: ImageData) -> Result<()> {
        self.require_not(&[SwapStage::Detecting, SwapStage::Building], "load a photo")?;
        *self = Self::new();
        self.photo = Some(photo);
        self.stage = SwapStage::PhotoLoaded;
        Ok(())
    }

    pub fn begin_detection(&mut self) -> Result<()> {
        self.require(&[SwapStage::PhotoLoaded], "start detection")?;
        self.stage = SwapStage::Detecting;
        Ok(())
    }

    pub fn finish_detection(&mut self, pass: DetectionPass) -> Result<()> {
        self.require(&[SwapStage::Detecting], "finish detection")?;
        self.pass = Some(pass);
        self.stage = SwapStage::Detected;
        Ok(())
    }

    /// Detection failed; the photo stays loaded.
    pub fn abort_detection(&mut self) {
        if self.stage == SwapStage::Detecting {
            self.stage = SwapStage::PhotoLoaded;
        }
    }

    /// Detected -> Classified. Too few faces discards the detections and
    /// returns to PhotoLoaded.
    pub fn classify(&mut self, registry: &FaceRegistry, matcher: &Matcher) -> Result<&SwapSelection> {
        self.require(&[SwapStage::Detected, SwapStage::Classified], "classify faces")?;
        let pass = self.pass.as_ref().ok_or(FaceSwapError::NoFaces)?;
        match classify(pass, registry, matcher) {
            Ok(selection) => {
                self.stage = SwapStage::Classified;
                Ok(self.selection.insert(selection))
            }
            Err(e) => {
                self.pass = None;
                self.selection = None;
                self.stage = SwapStage::PhotoLoaded;
                Err(e)
            }
        }
    }

    /// Re-derive the selection after a registry change. No-op unless classified.
    pub fn refresh(&mut self, registry: &FaceRegistry, matcher: &Matcher) {
        if self.stage != SwapStage::Classified {
            return;
        }
        if let Some(pass) = &self.pass {
            if let Ok(selection) = classify(pass, registry, matcher) {
                self.selection = Some(selection);
            }
        }
    }

    pub fn begin_build(&mut self) -> Result<BuildInput> {
        self.require(&[SwapStage::Classified], "start a swap")?;
        let selection = self.selection.clone().ok_or(FaceSwapError::MissingTargets)?;
        if selection.targets.is_empty() {
            return Err(FaceSwapError::NoTargets);
        }
        let photo = self.photo.clone().ok_or(FaceSwapError::MissingSource)?;
        self.stage = SwapStage::Building;
        Ok(BuildInput { photo, selection })
    }

    /// The request could not be built; the selection is still usable.
    pub fn abort_build(&mut self) {
        if self.stage == SwapStage::Building {
            self.stage = SwapStage::Classified;
        }
    }

    pub fn submitted(&mut self, task_id: String) -> Result<()> {
        self.require(&[SwapStage::Building], "record a submission")?;
        self.task_id = Some(task_id);
        self.stage = SwapStage::Submitted;
        Ok(())
    }

    /// The provider refused the job at submission time.
    pub fn submission_failed(&mut self, reason: String) {
        if self.stage == SwapStage::Building {
            self.failure = Some(reason);
            self.stage = SwapStage::Failed;
        }
    }

    /// Apply a callback outcome if it is for this workflow's task.
    pub fn apply_outcome(&mut self, outcome: &CallbackOutcome) -> bool {
        if self.stage != SwapStage::Submitted || self.task_id.as_deref() != Some(outcome.task_id()) {
            return false;
        }
        match outcome {
            CallbackOutcome::Completed { result_image, .. } => {
                self.result_image = Some(result_image.clone());
                self.stage = SwapStage::Completed;
            }
            CallbackOutcome::Failed { message, .. } => {
                self.failure = Some(message.clone().unwrap_or_else(|| "swap task failed".to_string()));
                self.stage = SwapStage::Failed;
            }
        }
        true
    }

    pub fn status(&self) -> WorkflowStatus {
        WorkflowStatus {
            stage: self.stage,
            photo: self.photo.as_ref().map(|p| p.name.clone()),
            face_count: self.pass.as_ref().map(|p| p.len()).unwrap_or(0),
            selection: self.selection.clone(),
            task_id: self.task_id.clone(),
            result_image: self.result_image.clone(),
            failure: self.failure.clone(),
        }
    }

    fn require(&self, allowed: &[SwapStage], action: &'static str) -> Result<()> {
        if allowed.contains(&self.stage) {
            Ok(())
        } else {
            Err(FaceSwapError::InvalidStage { action, stage: self.stage })
        }
    }

    fn require_not(&self, forbidden: &[SwapStage], action: &'static str) -> Result<()> {
        if forbidden.contains(&self.stage) {
            Err(FaceSwapError::InvalidStage { action, stage: self.stage })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoundingBox, DetectedFace, DetectedId, DetectionIndex, Descriptor, Frame, PassId};
    use crate::pipeline::registry::FaceSample;
    use crate::utils::ids::IdAllocator;
    use std::sync::Arc;

    fn pass(descriptors: &[&[f32]]) -> DetectionPass {
        let id = PassId(11);
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
        DetectionPass { id, frame: Frame::new(10.0, 10.0), faces }
    }

    fn registry(descriptors: &[&[f32]]) -> FaceRegistry {
        let mut reg = FaceRegistry::new(10, Arc::new(IdAllocator::new()));
        for (i, d) in descriptors.iter().enumerate() {
            reg.register(
                &format!("p{}", i),
                FaceSample {
                    descriptor: Descriptor::new(d.to_vec()),
                    image: ImageData::new("r.jpg", vec![0u8]),
                    bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
                    frame: Frame::new(1.0, 1.0),
                },
            )
            .unwrap();
        }
        reg
    }

    fn detected(descriptors: &[&[f32]]) -> SwapWorkflow {
        let mut wf = SwapWorkflow::new();
        wf.load_photo(ImageData::new("group.jpg", vec![1u8, 2, 3])).unwrap();
        wf.begin_detection().unwrap();
        wf.finish_detection(pass(descriptors)).unwrap();
        wf
    }

    #[test]
    fn test_happy_path_to_completed() {
        let reg = registry(&[&[0.0, 0.0]]);
        let mut wf = detected(&[&[0.0, 0.0], &[1.0, 1.0]]);
        wf.classify(&reg, &Matcher::default()).unwrap();
        assert_eq!(wf.stage(), SwapStage::Classified);
        let input = wf.begin_build().unwrap();
        assert_eq!(input.selection.target_positions(), vec![1]);
        wf.submitted("t1".into()).unwrap();

        let other = CallbackOutcome::Completed { task_id: "t2".into(), result_image: "http://x/z.jpg".into() };
        assert!(!wf.apply_outcome(&other));
        let done = CallbackOutcome::Completed { task_id: "t1".into(), result_image: "http://x/y.jpg".into() };
        assert!(wf.apply_outcome(&done));
        assert_eq!(wf.stage(), SwapStage::Completed);
        assert_eq!(wf.status().result_image.as_deref(), Some("http://x/y.jpg"));
    }

    #[test]
    fn test_no_targets_blocks_swap() {
        let reg = registry(&[&[0.0, 0.0], &[1.0, 1.0]]);
        let mut wf = detected(&[&[0.0, 0.0], &[1.0, 1.0]]);
        wf.classify(&reg, &Matcher::default()).unwrap();
        assert!(matches!(wf.begin_build(), Err(FaceSwapError::NoTargets)));
        assert_eq!(wf.stage(), SwapStage::Classified);
    }

    #[test]
    fn test_single_face_aborts_classification() {
        let reg = registry(&[]);
        let mut wf = detected(&[&[0.0, 0.0]]);
        assert!(matches!(wf.classify(&reg, &Matcher::default()), Err(FaceSwapError::InsufficientFaces { found: 1 })));
        assert_eq!(wf.stage(), SwapStage::PhotoLoaded);
        assert!(wf.pass().is_none());
    }

    #[test]
    fn test_out_of_order_transitions_rejected() {
        let mut wf = SwapWorkflow::new();
        assert!(matches!(wf.begin_detection(), Err(FaceSwapError::InvalidStage { .. })));
        assert!(matches!(wf.begin_build(), Err(FaceSwapError::InvalidStage { .. })));
        wf.load_photo(ImageData::new("a.jpg", vec![0u8])).unwrap();
        wf.begin_detection().unwrap();
        assert!(matches!(
            wf.load_photo(ImageData::new("b.jpg", vec![0u8])),
            Err(FaceSwapError::InvalidStage { .. })
        ));
        wf.abort_detection();
        assert_eq!(wf.stage(), SwapStage::PhotoLoaded);
    }

    #[test]
    fn test_refresh_tracks_registry() {
        let mut reg = registry(&[]);
        let mut wf = detected(&[&[0.0, 0.0], &[1.0, 1.0]]);
        wf.classify(&reg, &Matcher::default()).unwrap();
        assert_eq!(wf.selection().unwrap().targets.len(), 2);
        reg.register(
            "late",
            FaceSample {
                descriptor: Descriptor::new(vec![1.0, 1.0]),
                image: ImageData::new("r.jpg", vec![0u8]),
                bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
                frame: Frame::new(1.0, 1.0),
            },
        )
        .unwrap();
        wf.refresh(&reg, &Matcher::default());
        assert_eq!(wf.selection().unwrap().target_positions(), vec![0]);
    }

    #[test]
    fn test_failure_callback_and_submission_failure() {
        let reg = registry(&[]);
        let mut wf = detected(&[&[0.0, 0.0], &[1.0, 1.0]]);
        wf.classify(&reg, &Matcher::default()).unwrap();
        wf.begin_build().unwrap();
        wf.submission_failed("provider down".into());
        assert_eq!(wf.stage(), SwapStage::Failed);

        let mut wf = detected(&[&[0.0, 0.0], &[1.0, 1.0]]);
        wf.classify(&reg, &Matcher::default()).unwrap();
        wf.begin_build().unwrap();
        wf.submitted("t9".into()).unwrap();
        assert!(wf.apply_outcome(&CallbackOutcome::Failed { task_id: "t9".into(), message: None }));
        assert_eq!(wf.stage(), SwapStage::Failed);
    }
}
