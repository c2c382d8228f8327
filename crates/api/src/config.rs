/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8001`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `330`). Must exceed
    /// `max_timeout_secs` so the engine wait ends first.
    pub request_timeout_secs: u64,
    /// ComfyUI HTTP base URL.
    pub comfyui_url: String,
    /// ComfyUI WebSocket base URL.
    pub comfyui_ws_url: String,
    /// Directory holding the workflow template files.
    pub workflows_dir: String,
    /// Completion wait used when a request gives no `timeout`.
    pub default_timeout_secs: u64,
    /// Largest `timeout` a request may ask for.
    pub max_timeout_secs: u64,
    /// PostgreSQL URL for the run log; `None` disables it.
    pub database_url: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `8001`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `330`                      |
    /// | `COMFYUI_URL`          | `http://localhost:8000`    |
    /// | `COMFYUI_WS_URL`       | derived from `COMFYUI_URL` |
    /// | `WORKFLOWS_DIR`        | `workflows`                |
    /// | `DEFAULT_TIMEOUT_SECS` | `20`                       |
    /// | `MAX_TIMEOUT_SECS`     | `300`                      |
    /// | `DATABASE_URL`         | unset                      |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8001".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs = env_u64("REQUEST_TIMEOUT_SECS", 330);

        let comfyui_url = std::env::var("COMFYUI_URL")
            .unwrap_or_else(|_| "http://localhost:8000".into())
            .trim_end_matches('/')
            .to_string();
        let comfyui_ws_url = std::env::var("COMFYUI_WS_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| derive_ws_url(&comfyui_url));

        let workflows_dir = std::env::var("WORKFLOWS_DIR").unwrap_or_else(|_| "workflows".into());

        let default_timeout_secs = env_u64("DEFAULT_TIMEOUT_SECS", 20);
        let max_timeout_secs = env_u64("MAX_TIMEOUT_SECS", 300);
        assert!(
            (1..=max_timeout_secs).contains(&default_timeout_secs),
            "DEFAULT_TIMEOUT_SECS must be between 1 and MAX_TIMEOUT_SECS"
        );

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            comfyui_url,
            comfyui_ws_url,
            workflows_dir,
            default_timeout_secs,
            max_timeout_secs,
            database_url,
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid u64")),
        Err(_) => default,
    }
}

/// WebSocket URL for an HTTP base URL (`http` → `ws`, `https` → `wss`).
pub fn derive_ws_url(http_url: &str) -> String {
    if let Some(rest) = http_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = http_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        http_url.to_string()
    }
}
