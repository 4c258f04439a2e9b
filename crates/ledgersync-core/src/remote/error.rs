use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Version conflict on {0} - the blob changed since its token was read")]
    Conflict(String),

    #[error("Unauthorized - write token may be invalid or expired")]
    Unauthorized,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timed out")]
    Timeout,

    #[error("Remote store unreachable: {0}")]
    Unreachable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl RemoteError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Map a non-success status from a write or metadata request.
    ///
    /// The contents API answers 409 when the supplied SHA is stale and 422
    /// when a SHA is missing for a file that already exists; both mean
    /// another writer got there first.
    pub fn from_status(status: reqwest::StatusCode, path: &str, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => RemoteError::Unauthorized,
            403 => RemoteError::AccessDenied(truncated),
            409 | 422 => RemoteError::Conflict(path.to_string()),
            429 => RemoteError::RateLimited,
            500..=599 => RemoteError::ServerError(truncated),
            _ => RemoteError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, RemoteError::Conflict(_))
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            RemoteError::Timeout => true,
            RemoteError::Network(e) => e.is_timeout(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_conflicts() {
        let path = "data/gastos.json";
        assert!(RemoteError::from_status(StatusCode::CONFLICT, path, "").is_conflict());
        assert!(RemoteError::from_status(StatusCode::UNPROCESSABLE_ENTITY, path, "").is_conflict());
        assert!(!RemoteError::from_status(StatusCode::BAD_GATEWAY, path, "").is_conflict());
    }

    #[test]
    fn test_from_status_mapping() {
        let path = "p";
        assert!(matches!(
            RemoteError::from_status(StatusCode::UNAUTHORIZED, path, ""),
            RemoteError::Unauthorized
        ));
        assert!(matches!(
            RemoteError::from_status(StatusCode::FORBIDDEN, path, "nope"),
            RemoteError::AccessDenied(ref b) if b == "nope"
        ));
        assert!(matches!(
            RemoteError::from_status(StatusCode::TOO_MANY_REQUESTS, path, ""),
            RemoteError::RateLimited
        ));
        assert!(matches!(
            RemoteError::from_status(StatusCode::IM_A_TEAPOT, path, ""),
            RemoteError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_truncate_body() {
        let long = "é".repeat(400);
        let truncated = RemoteError::truncate_body(&long);
        assert!(truncated.contains("truncated, 800 total bytes"));
        assert_eq!(RemoteError::truncate_body("short"), "short");
    }
}
