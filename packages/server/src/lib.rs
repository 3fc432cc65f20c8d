// Code Submission Server - Core
//
// This crate tracks code submissions through their lifecycle:
// intake → dispatch to the remote file store → status updates → status queries.
// Architecture follows domain-driven design; infrastructure sits behind the
// Base* traits in kernel/ so actions can run against in-memory doubles.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
