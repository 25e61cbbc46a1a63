pub mod callback;
pub mod client;

pub use callback::{parse_callback, CallbackOutcome, JobLedger, JobStatus, SwapJob};
pub use client::{SwapProvider, SwapSubmission};
