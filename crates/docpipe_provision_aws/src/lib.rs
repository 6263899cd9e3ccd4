//! AWS-oriented adapters and handlers for pipeline provisioning.
//!
//! This crate owns cloud integration details (SDK clients, the operator
//! CLI, and per-service adapters) and keeps orchestration logic behind
//! adapter trait seams so it stays testable without an AWS account.
//! See `crates/docpipe_provision_aws/README.md` for ownership boundaries.

pub mod adapters;
pub mod handlers;
