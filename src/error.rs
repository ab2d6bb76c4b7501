// Error types for the tool cache.
// Handles GitHub API errors, cache store errors, and configuration errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolCacheError {
    #[error("GitHub API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("Authentication failed: invalid or expired token")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded, resets at {reset_at}")]
    RateLimited { reset_at: String },

    #[error("Missing GITHUB_TOKEN environment variable")]
    MissingToken,

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Cache store error: {0}")]
    Cache(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl ToolCacheError {
    /// Whether this is a business failure to report inside an operation
    /// result: bad input, or the upstream API rejecting the request.
    pub fn is_business_error(&self) -> bool {
        matches!(
            self,
            ToolCacheError::Unauthorized
                | ToolCacheError::NotFound(_)
                | ToolCacheError::RateLimited { .. }
                | ToolCacheError::InvalidParams(_)
                | ToolCacheError::Other(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ToolCacheError>;
