//! Row structs and insert DTOs.

pub mod workflow_run;
