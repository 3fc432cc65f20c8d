//! Submission domain actions - business logic functions
//!
//! Actions are async functions called from the HTTP handlers and the dispatch
//! scheduler. They take `&ServerDeps` and never touch SQL directly.

mod dispatch;
mod intake;
mod query_status;
mod update_status;

pub use dispatch::{dispatch_next, DispatchOutcome};
pub use intake::{submit_code, validate_intake, IntakeReceipt, MAX_USERNAME_LEN};
pub use query_status::fetch_submission_status;
pub use update_status::update_submission_status;
