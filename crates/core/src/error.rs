/// Failure value shared by every layer below the HTTP router.
///
/// Each variant carries a human-readable message; the router maps the
/// variant to a status code.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A template path or slot mapping is missing for a process kind.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A template file exists but is not a node document.
    #[error("Template format error: {0}")]
    TemplateFormat(String),

    /// The engine was unreachable or answered with a non-success status.
    #[error("Engine transport error: {0}")]
    Transport(String),

    /// The engine reported that the job itself failed.
    #[error("Engine execution failed: {0}")]
    EngineExecution(String),

    /// The completion wait exceeded its deadline.
    #[error("Timed out after {secs}s waiting for the engine")]
    Timeout { secs: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}
