// Completion webhook
// ------------------
//
// The provider reports each job exactly once, out of band, as
// `{success, task_id, result_image}`. Outcomes land in the `JobLedger`, keyed
// only by task id, where sessions and `GET /jobs/:task_id` pick them up.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::error::{FaceSwapError, Result};
use crate::models::SessionId;

#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    Completed { task_id: String, result_image: String },
    Failed { task_id: String, message: Option<String> },
}

impl CallbackOutcome {
    pub fn task_id(&self) -> &str {
        match self {
            Self::Completed { task_id, .. } | Self::Failed { task_id, .. } => task_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// `success` arrives as `1`/`0` from the provider; booleans are accepted too.
fn success_flag(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn non_empty_str<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
}

pub fn parse_callback(body: &Value) -> Result<CallbackOutcome> {
    let success = body
        .get("success")
        .and_then(success_flag)
        .ok_or_else(|| FaceSwapError::InvalidCallback("success must be 1 or 0".into()))?;
    let task_id = non_empty_str(body, "task_id")
        .ok_or_else(|| FaceSwapError::InvalidCallback("missing task_id".into()))?
        .to_string();

    if !success {
        let message = non_empty_str(body, "message").or_else(|| non_empty_str(body, "msg")).map(String::from);
        return Ok(CallbackOutcome::Failed { task_id, message });
    }
    let result_image = non_empty_str(body, "result_image")
        .ok_or_else(|| FaceSwapError::InvalidCallback(format!("task {} succeeded without result_image", task_id)))?
        .to_string();
    Ok(CallbackOutcome::Completed { task_id, result_image })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Submitted,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwapJob {
    pub task_id: String,
    pub status: JobStatus,
    pub session: Option<SessionId>,
    pub result_image: Option<String>,
    pub message: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl SwapJob {
    /// Outcome for sessions reconciling against the ledger.
    pub fn outcome(&self) -> Option<CallbackOutcome> {
        match self.status {
            JobStatus::Submitted => None,
            JobStatus::Completed => Some(CallbackOutcome::Completed {
                task_id: self.task_id.clone(),
                result_image: self.result_image.clone().unwrap_or_default(),
            }),
            JobStatus::Failed => Some(CallbackOutcome::Failed {
                task_id: self.task_id.clone(),
                message: self.message.clone(),
            }),
        }
    }
}

/// Every job this process submitted or heard about.
#[derive(Default)]
pub struct JobLedger {
    jobs: Mutex<HashMap<String, SwapJob>>,
}

impl JobLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submitted(&self, task_id: &str, session: Option<SessionId>) {
        let now = Utc::now();
        let mut jobs = self.jobs.lock();
        let job = jobs.entry(task_id.to_string()).or_insert_with(|| SwapJob {
            task_id: task_id.to_string(),
            status: JobStatus::Submitted,
            session,
            result_image: None,
            message: None,
            submitted_at: Some(now),
            updated_at: now,
        });
        // The webhook can beat the submission reply; keep its outcome.
        job.session = job.session.or(session);
        job.submitted_at.get_or_insert(now);
    }

    /// Record a callback. Unknown task ids are kept too, without a session.
    /// Returns whether the task was submitted by this process.
    pub fn apply(&self, outcome: &CallbackOutcome) -> bool {
        let now = Utc::now();
        let mut jobs = self.jobs.lock();
        let known = jobs.contains_key(outcome.task_id());
        let job = jobs.entry(outcome.task_id().to_string()).or_insert_with(|| SwapJob {
            task_id: outcome.task_id().to_string(),
            status: JobStatus::Submitted,
            session: None,
            result_image: None,
            message: None,
            submitted_at: None,
            updated_at: now,
        });
        match outcome {
            CallbackOutcome::Completed { result_image, .. } => {
                job.status = JobStatus::Completed;
                job.result_image = Some(result_image.clone());
                job.message = None;
            }
            CallbackOutcome::Failed { message, .. } => {
                job.status = JobStatus::Failed;
                job.message = message.clone();
            }
        }
        job.updated_at = now;
        known
    }

    pub fn get(&self, task_id: &str) -> Option<SwapJob> {
        self.jobs.lock().get(task_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
