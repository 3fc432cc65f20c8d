//! Submission domain - intake, dispatch and status tracking of code submissions
//!
//! Architecture:
//!   HTTP handler / scheduler → actions::* → kernel traits (store, staging, delivery)

pub mod actions;
pub mod errors;
pub mod models;

// Re-export commonly used types
pub use errors::{SubmissionError, SubmissionResult};
pub use models::{DispatchClaim, NewSubmission, Submission, SubmissionStatus};
