pub mod submission;
pub mod submission_store;

pub use submission::*;
pub use submission_store::PostgresSubmissionStore;
