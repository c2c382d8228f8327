pub mod generation;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// POST /portrait                    portrait (or portrait_dt)
/// POST /portrait/image
/// POST /pose                        pose (or pose_dt)
/// POST /pose/image
/// POST /portrait-to-pose
/// POST /portrait-to-pose/image
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(generation::router())
}
