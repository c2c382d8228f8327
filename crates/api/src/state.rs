use std::sync::Arc;

use crate::config::ServerConfig;
use crate::engine::runner::GenerationRunner;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything lives behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Template loading, engine execution and the run log.
    pub runner: Arc<GenerationRunner>,
}
