//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod workflow_run_repo;

pub use workflow_run_repo::WorkflowRunRepo;
