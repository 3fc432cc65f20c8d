//! Kernel module - server infrastructure and dependencies.

pub mod deps;
pub mod ftp;
pub mod scheduled_tasks;
pub mod staging;
pub mod test_dependencies;
pub mod traits;

pub use deps::{LifecycleSettings, ServerDeps};
pub use ftp::FtpDelivery;
pub use scheduled_tasks::start_dispatch_scheduler;
pub use staging::FsArtifactStaging;
pub use test_dependencies::TestDependencies;
pub use traits::*;
