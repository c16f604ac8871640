use std::net::SocketAddr;

/// Largest accepted request body, in bytes.
pub const DEFAULT_UPLOAD_LIMIT: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Require a bearer access token on `/api/predict/`.
    pub require_auth: bool,
    pub upload_limit: usize,
    /// Allowed CORS origins; empty means permissive.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            require_auth: false,
            upload_limit: DEFAULT_UPLOAD_LIMIT,
            cors_origins: Vec::new(),
        }
    }
}
