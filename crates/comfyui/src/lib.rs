//! ComfyUI REST and WebSocket client.
//!
//! Submits transformed job templates, follows one push-notification
//! session per submission until a terminal event, and downloads the
//! produced image.

pub mod api;
pub mod client;
pub mod executor;
pub mod messages;
pub mod output;
pub mod session;
