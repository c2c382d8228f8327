//! Route definitions for the generation endpoints.

use axum::routing::post;
use axum::Router;

use crate::handlers::generation;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/portrait", post(generation::portrait))
        .route("/portrait/image", post(generation::portrait_image))
        .route("/pose", post(generation::pose))
        .route("/pose/image", post(generation::pose_image))
        .route("/portrait-to-pose", post(generation::portrait_to_pose))
        .route("/portrait-to-pose/image", post(generation::portrait_to_pose_image))
}
