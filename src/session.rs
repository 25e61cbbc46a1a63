// Sessions
// --------
//
// A session is one user's working set: their registry, the group photo they
// are picking faces from, their comparison board and their swap workflow.
// Nothing is shared between sessions except the id allocator.
//
// Each session sits behind a `SessionHandle`. The state mutex is only held for
// synchronous work; the busy flag spans a whole request (upload parsing,
// provider round trip) so a second detection or submission fails fast instead
// of queueing behind the first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;

use crate::error::{FaceSwapError, Result};
use crate::models::{
    BoundingBox, CompareId, DetectionIndex, DetectionPass, Frame, ImageData, RegisteredFace, RegisteredId, SessionId,
};
use crate::pipeline::compare::{ComparedImage, ComparisonBoard};
use crate::pipeline::detect::DetectionReport;
use crate::pipeline::registry::{FaceRegistry, FaceSample};
use crate::pipeline::request::{ImagePayload, SwapRequest, SwapRequestBuilder};
use crate::pipeline::selector::SwapSelection;
use crate::pipeline::similarity::Matcher;
use crate::pipeline::workflow::{SwapWorkflow, WorkflowStatus};
use crate::provider::callback::JobLedger;
use crate::provider::client::SwapSubmission;
use crate::utils::ids::IdAllocator;

/// Registered face as clients see it; the reference image stays server side.
#[derive(Debug, Clone, Serialize)]
pub struct FaceView {
    pub id: RegisteredId,
    pub name: String,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub reference_frame: Frame,
    pub image_name: String,
    pub dimension: usize,
}

impl From<&RegisteredFace> for FaceView {
    fn from(face: &RegisteredFace) -> Self {
        Self {
            id: face.id,
            name: face.name.clone(),
            bbox: face.bbox,
            reference_frame: face.reference_frame,
            image_name: face.reference_image.name.clone(),
            dimension: face.descriptor.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupFace {
    pub index: usize,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    /// Set once this face was registered from the group photo.
    pub registered_id: Option<RegisteredId>,
    /// Closest registered identity under the threshold, if any.
    pub matches: Option<String>,
}

struct GroupPhoto {
    image: ImageData,
    pass: DetectionPass,
    registered: HashMap<usize, RegisteredId>,
}

/// Replacement images for a swap, before they are tied to a detection pass.
#[derive(Debug, Clone)]
pub enum SwapImages {
    /// Same face for every target.
    Broadcast(ImageData),
    /// Explicit (position, image) pairs; positions index the full pass.
    PerTarget(Vec<(usize, ImageData)>),
}

/// What an incoming detection report is about to replace, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Incoming {
    Addition,
    GroupPhoto,
    SwapPhoto,
    Reimage(RegisteredId),
}

pub struct Session {
    id: SessionId,
    registry: FaceRegistry,
    group: Option<GroupPhoto>,
    board: ComparisonBoard,
    workflow: SwapWorkflow,
    matcher: Matcher,
    ids: Arc<IdAllocator>,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId, max_registered: usize, matcher: Matcher, ids: Arc<IdAllocator>) -> Self {
        Self {
            id,
            registry: FaceRegistry::new(max_registered, ids.clone()),
            group: None,
            board: ComparisonBoard::new(),
            workflow: SwapWorkflow::new(),
            matcher,
            ids,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn registry(&self) -> &FaceRegistry {
        &self.registry
    }

    pub fn workflow(&self) -> &SwapWorkflow {
        &self.workflow
    }

    pub fn faces(&self) -> Vec<FaceView> {
        self.registry.list().iter().map(FaceView::from).collect()
    }

    fn face_view(&self, id: RegisteredId) -> Result<FaceView> {
        self.registry.get(id).map(FaceView::from).ok_or(FaceSwapError::FaceNotFound(id))
    }

    /// Descriptor length of everything the session holds, leaving out the
    /// slot `incoming` replaces. All stored descriptors share it.
    fn held_dimension(&self, incoming: Incoming) -> Option<usize> {
        let registry = match incoming {
            Incoming::Reimage(id) => {
                self.registry.list().iter().find(|f| f.id != id).map(|f| f.descriptor.len())
            }
            _ => self.registry.dimension(),
        };
        let group = match incoming {
            Incoming::GroupPhoto => None,
            _ => self.group.as_ref().and_then(|g| g.pass.dimension()),
        };
        let swap = match incoming {
            Incoming::SwapPhoto => None,
            _ => self.workflow.pass().and_then(DetectionPass::dimension),
        };
        registry.or_else(|| self.board.dimension()).or(group).or(swap)
    }

    fn detect(&self, report: DetectionReport, incoming: Incoming) -> Result<DetectionPass> {
        report.into_pass(&self.ids, self.held_dimension(incoming))
    }

    // Derived views must never outlive a registry change.
    fn registry_changed(&mut self) {
        self.board.refresh(&self.registry);
        self.workflow.refresh(&self.registry, &self.matcher);
    }

    /// Register from a photo that must contain exactly one face.
    pub fn register_single(&mut self, name: &str, image: ImageData, report: DetectionReport) -> Result<FaceView> {
        if self.registry.is_full() {
            return Err(FaceSwapError::CapacityExceeded { max: self.registry.max() });
        }
        let pass = self.detect(report, Incoming::Addition)?;
        let face = match pass.faces.as_slice() {
            [] => return Err(FaceSwapError::NoFaces),
            [face] => face,
            many => {
                return Err(FaceSwapError::validation(format!(
                    "found {} faces; upload a photo with exactly one face or use a group photo",
                    many.len()
                )))
            }
        };
        let sample = FaceSample { descriptor: face.descriptor.clone(), image, bbox: face.bbox, frame: pass.frame };
        let id = self.registry.register(name, sample)?;
        self.registry_changed();
        tracing::info!(session = %self.id, face = %id, "registered face");
        self.face_view(id)
    }

    pub fn load_group(&mut self, image: ImageData, report: DetectionReport) -> Result<Vec<GroupFace>> {
        let pass = self.detect(report, Incoming::GroupPhoto)?;
        if pass.is_empty() {
            return Err(FaceSwapError::NoFaces);
        }
        self.group = Some(GroupPhoto { image, pass, registered: HashMap::new() });
        self.group_faces()
    }

    pub fn group_faces(&self) -> Result<Vec<GroupFace>> {
        let group = self.group.as_ref().ok_or_else(|| FaceSwapError::NotFound("group photo".into()))?;
        Ok(group
            .pass
            .faces
            .iter()
            .map(|face| {
                let candidates = self.registry.list().iter().map(|r| (r.id, &r.descriptor));
                let matches = self
                    .matcher
                    .best_match(&face.descriptor, candidates)
                    .and_then(|(id, _)| self.registry.get(id))
                    .map(|r| r.name.clone());
                GroupFace {
                    index: face.index.index,
                    bbox: face.bbox,
                    registered_id: group.registered.get(&face.index.index).copied(),
                    matches,
                }
            })
            .collect())
    }

    pub fn register_from_group(&mut self, index: usize, name: &str) -> Result<FaceView> {
        let group = self.group.as_ref().ok_or_else(|| FaceSwapError::NotFound("group photo".into()))?;
        let face = group
            .pass
            .face(DetectionIndex { pass: group.pass.id, index })
            .ok_or_else(|| FaceSwapError::NotFound(format!("group face {}", index)))?;
        if let Some(existing) = group.registered.get(&index) {
            return Err(FaceSwapError::validation(format!("group face {} is already registered as {}", index, existing)));
        }
        let sample = FaceSample {
            descriptor: face.descriptor.clone(),
            image: group.image.clone(),
            bbox: face.bbox,
            frame: group.pass.frame,
        };
        let id = self.registry.register(name, sample)?;
        if let Some(group) = self.group.as_mut() {
            group.registered.insert(index, id);
        }
        self.registry_changed();
        tracing::info!(session = %self.id, face = %id, index, "registered face from group photo");
        self.face_view(id)
    }

    pub fn rename(&mut self, id: RegisteredId, name: &str) -> Result<FaceView> {
        self.registry.rename(id, name)?;
        self.registry_changed();
        self.face_view(id)
    }

    /// New reference image for an existing identity; its first detected face wins.
    pub fn replace_image(&mut self, id: RegisteredId, image: ImageData, report: DetectionReport) -> Result<FaceView> {
        if self.registry.get(id).is_none() {
            return Err(FaceSwapError::FaceNotFound(id));
        }
        let pass = self.detect(report, Incoming::Reimage(id))?;
        let face = pass.faces.first().ok_or(FaceSwapError::NoFaces)?;
        let sample = FaceSample { descriptor: face.descriptor.clone(), image, bbox: face.bbox, frame: pass.frame };
        self.registry.replace_image(id, sample)?;
        self.registry_changed();
        self.face_view(id)
    }

    pub fn remove(&mut self, id: RegisteredId) -> Result<FaceView> {
        let removed = self.registry.remove(id)?;
        if let Some(group) = self.group.as_mut() {
            group.registered.retain(|_, r| *r != id);
        }
        self.registry_changed();
        Ok(FaceView::from(&removed))
    }

    pub fn compare(&mut self, name: String, report: DetectionReport) -> Result<ComparedImage> {
        let pass = self.detect(report, Incoming::Addition)?;
        if pass.is_empty() {
            return Err(FaceSwapError::NoFaces);
        }
        let id: CompareId = self.ids.next();
        Ok(self.board.add(id, name, &pass, &self.registry).clone())
    }

    pub fn comparisons(&self) -> &[ComparedImage] {
        self.board.images()
    }

    pub fn remove_comparison(&mut self, id: CompareId) -> Result<()> {
        if self.board.remove(id) {
            Ok(())
        } else {
            Err(FaceSwapError::NotFound(id.to_string()))
        }
    }

    /// Load, detect and classify in one step.
    pub fn load_swap_photo(&mut self, photo: ImageData, report: DetectionReport) -> Result<SwapSelection> {
        self.workflow.load_photo(photo)?;
        self.workflow.begin_detection()?;
        let pass = match self.detect(report, Incoming::SwapPhoto) {
            Ok(pass) => pass,
            Err(e) => {
                self.workflow.abort_detection();
                return Err(e);
            }
        };
        self.workflow.finish_detection(pass)?;
        let selection = self.workflow.classify(&self.registry, &self.matcher)?;
        tracing::info!(
            session = %self.id,
            excluded = selection.excluded.len(),
            targets = selection.targets.len(),
            "classified swap photo"
        );
        Ok(selection.clone())
    }

    /// Build the provider request. On success the workflow is `Building`
    /// until `finish_swap` records what the provider said.
    pub fn begin_swap(&mut self, images: SwapImages, webhook: &str) -> Result<SwapRequest> {
        let input = self.workflow.begin_build()?;
        let pass = input.selection.pass;
        let builder = SwapRequestBuilder::new(webhook)
            .source(pass, &input.photo)
            .targets(input.selection.targets.iter().copied());
        let builder = match images {
            SwapImages::Broadcast(image) => builder.broadcast(&image),
            SwapImages::PerTarget(pairs) => builder.per_target(
                pairs
                    .into_iter()
                    .map(|(index, image)| (DetectionIndex { pass, index }, ImagePayload::from(&image)))
                    .collect(),
            ),
        };
        builder.build().map_err(|e| {
            self.workflow.abort_build();
            e
        })
    }

    pub fn finish_swap(&mut self, result: &Result<SwapSubmission>) -> Result<()> {
        match result {
            Ok(submission) => self.workflow.submitted(submission.task_id.clone()),
            Err(e) => {
                self.workflow.submission_failed(e.to_string());
                Ok(())
            }
        }
    }

    /// Workflow status, after pulling in any outcome the ledger already holds.
    pub fn swap_status(&mut self, ledger: &JobLedger) -> WorkflowStatus {
        if let Some(outcome) = self.workflow.task_id().and_then(|t| ledger.get(t)).and_then(|job| job.outcome()) {
            self.workflow.apply_outcome(&outcome);
        }
        self.workflow.status()
    }

    /// Snapshot for rendering the masked preview outside the lock.
    pub fn preview_input(&self) -> Result<(ImageData, DetectionPass, SwapSelection)> {
        match (self.workflow.photo(), self.workflow.pass(), self.workflow.selection()) {
            (Some(photo), Some(pass), Some(selection)) => Ok((photo.clone(), pass.clone(), selection.clone())),
            _ => Err(FaceSwapError::InvalidStage { action: "preview a swap", stage: self.workflow.stage() }),
        }
    }
}

pub struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct SessionHandle {
    id: SessionId,
    busy: AtomicBool,
    state: Mutex<Session>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Claim the session for one long-running request, or fail with `Busy`.
    pub fn try_begin(&self) -> Result<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| FaceSwapError::Busy)?;
        Ok(BusyGuard { flag: &self.busy })
    }

    pub fn lock(&self) -> MutexGuard<'_, Session> {
        self.state.lock()
    }
}

pub struct SessionStore {
    sessions: Mutex<HashMap<SessionId, Arc<SessionHandle>>>,
    ids: Arc<IdAllocator>,
    max_registered: usize,
    matcher: Matcher,
}

impl SessionStore {
    pub fn new(ids: Arc<IdAllocator>, max_registered: usize, matcher: Matcher) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), ids, max_registered, matcher }
    }

    pub fn create(&self) -> Arc<SessionHandle> {
        let id: SessionId = self.ids.next();
        let handle = Arc::new(SessionHandle {
            id,
            busy: AtomicBool::new(false),
            state: Mutex::new(Session::new(id, self.max_registered, self.matcher, self.ids.clone())),
        });
        self.sessions.lock().insert(id, handle.clone());
        tracing::info!(session = %id, "session created");
        handle
    }

    pub fn get(&self, id: SessionId) -> Result<Arc<SessionHandle>> {
        self.sessions.lock().get(&id).cloned().ok_or(FaceSwapError::SessionNotFound(id))
    }

    pub fn remove(&self, id: SessionId) -> Result<()> {
        self.sessions.lock().remove(&id).map(|_| ()).ok_or(FaceSwapError::SessionNotFound(id))
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
