//! Poser API server library.
//!
//! Exposes config, state, error handling, the generation runner and the
//! router so integration tests and the binary entrypoint share them.

pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
