use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

pub struct Stats {
    detection_passes: AtomicU64,
    faces_detected: AtomicU64,
    registrations: AtomicU64,
    comparisons: AtomicU64,
    jobs_submitted: AtomicU64,
    submissions_failed: AtomicU64,
    callbacks_completed: AtomicU64,
    callbacks_failed: AtomicU64,
    callbacks_rejected: AtomicU64,
    started: Instant,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub detection_passes: u64,
    pub faces_detected: u64,
    pub registrations: u64,
    pub comparisons: u64,
    pub jobs_submitted: u64,
    pub submissions_failed: u64,
    pub callbacks_completed: u64,
    pub callbacks_failed: u64,
    pub callbacks_rejected: u64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            detection_passes: AtomicU64::new(0),
            faces_detected: AtomicU64::new(0),
            registrations: AtomicU64::new(0),
            comparisons: AtomicU64::new(0),
            jobs_submitted: AtomicU64::new(0),
            submissions_failed: AtomicU64::new(0),
            callbacks_completed: AtomicU64::new(0),
            callbacks_failed: AtomicU64::new(0),
            callbacks_rejected: AtomicU64::new(0),
            started: Instant::now(),
        }
    }
    pub fn inc_detection_pass(&self, faces: usize) {
        self.detection_passes.fetch_add(1, Ordering::Relaxed);
        self.faces_detected.fetch_add(faces as u64, Ordering::Relaxed);
    }
    pub fn inc_registrations(&self) { self.registrations.fetch_add(1, Ordering::Relaxed); }
    pub fn inc_comparisons(&self) { self.comparisons.fetch_add(1, Ordering::Relaxed); }
    pub fn inc_jobs_submitted(&self) { self.jobs_submitted.fetch_add(1, Ordering::Relaxed); }
    pub fn inc_submissions_failed(&self) { self.submissions_failed.fetch_add(1, Ordering::Relaxed); }
    pub fn inc_callback(&self, success: bool) {
        if success {
            self.callbacks_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.callbacks_failed.fetch_add(1, Ordering::Relaxed);
        }
    }
    pub fn inc_callbacks_rejected(&self) { self.callbacks_rejected.fetch_add(1, Ordering::Relaxed); }
    pub fn uptime_secs(&self) -> u64 { self.started.elapsed().as_secs() }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self.uptime_secs(),
            detection_passes: self.detection_passes.load(Ordering::Relaxed),
            faces_detected: self.faces_detected.load(Ordering::Relaxed),
            registrations: self.registrations.load(Ordering::Relaxed),
            comparisons: self.comparisons.load(Ordering::Relaxed),
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            submissions_failed: self.submissions_failed.load(Ordering::Relaxed),
            callbacks_completed: self.callbacks_completed.load(Ordering::Relaxed),
            callbacks_failed: self.callbacks_failed.load(Ordering::Relaxed),
            callbacks_rejected: self.callbacks_rejected.load(Ordering::Relaxed),
        }
    }

    /// Zero all counters; uptime keeps running.
    pub fn reset(&self) {
        for counter in [
            &self.detection_passes,
            &self.faces_detected,
            &self.registrations,
            &self.comparisons,
            &self.jobs_submitted,
            &self.submissions_failed,
            &self.callbacks_completed,
            &self.callbacks_failed,
            &self.callbacks_rejected,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
