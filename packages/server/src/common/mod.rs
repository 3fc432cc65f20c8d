// Common types and utilities shared across the application

pub mod id;
pub mod secret;

pub use id::SubmissionId;
pub use secret::{generate_secret, verify_secret, HashedSecret};
