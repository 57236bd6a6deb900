use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Closed error taxonomy returned to MCP tool callers. Every Canvas-facing
/// failure mode funnels into one of these variants so the server can build a
/// consistent machine-readable error envelope (see `CoreError::code`).
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("Canvas API error ({status}): {message}")]
    CanvasApi { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("anonymization failed: {0}")]
    Anonymization(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("insufficient permissions: {0}")]
    InsufficientPermissions(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Stable machine-readable code for the error envelope, one per taxonomy
    /// member. Kept distinct from `Display`, which is for humans.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "validation",
            CoreError::NotFound(_) => "not-found",
            CoreError::Unauthorized(_) => "unauthorized",
            CoreError::Forbidden(_) => "forbidden",
            CoreError::RateLimited(_) => "rate-limited",
            CoreError::CanvasApi { .. } => "canvas-api",
            CoreError::Network(_) => "network",
            CoreError::Timeout(_) => "timeout",
            CoreError::Anonymization(_) => "anonymization",
            CoreError::Cache(_) => "cache",
            CoreError::InvalidParameter { .. } => "invalid-parameter",
            CoreError::Duplicate(_) => "duplicate",
            CoreError::InsufficientPermissions(_) => "insufficient-permissions",
            CoreError::Config(_) => "config",
            CoreError::Io(_) => "io",
            CoreError::Json(_) => "json",
        }
    }

    /// JSON error envelope shape returned by tool handlers: `{"error": {"code": ..., "message": ...}}`.
    pub fn to_envelope(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn display_messages_are_stable() {
        let err = CoreError::NotFound("course 12345".to_string());
        assert_eq!(err.to_string(), "not found: course 12345");
        assert_eq!(err.code(), "not-found");
    }

    #[test]
    fn envelope_shape_matches_error_contract() {
        let err = CoreError::RateLimited("retry after 4s".to_string());
        let envelope = err.to_envelope();
        assert_eq!(envelope["error"]["code"], "rate-limited");
        assert_eq!(envelope["error"]["message"], "rate limited: retry after 4s");
    }

    #[test]
    fn canvas_api_error_carries_status() {
        let err = CoreError::CanvasApi {
            status: 422,
            message: "invalid grade".to_string(),
        };
        assert_eq!(err.to_string(), "Canvas API error (422): invalid grade");
    }
}
