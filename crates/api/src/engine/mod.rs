//! Generation engine glue.
//!
//! [`runner::GenerationRunner`] drives one request from raw parameters to
//! an encoded image; [`run_log::RunLog`] is its cache and audit seam.

pub mod run_log;
pub mod runner;
