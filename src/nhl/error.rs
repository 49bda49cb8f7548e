use thiserror::Error;

/// Failure of a single data-source call. Every variant is transient: the
/// fetcher answers all of them with a deferred retry.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Malformed JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl FetchError {
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let body = if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        };
        FetchError::Status { status, body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(2000);
        match FetchError::from_status(reqwest::StatusCode::BAD_GATEWAY, &body) {
            FetchError::Status { status, body } => {
                assert_eq!(status.as_u16(), 502);
                assert!(body.starts_with(&"x".repeat(500)));
                assert!(body.ends_with("(truncated, 2000 total bytes)"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn short_bodies_are_kept() {
        let err = FetchError::from_status(reqwest::StatusCode::NOT_FOUND, "gone");
        assert_eq!(err.to_string(), "HTTP 404 Not Found: gone");
    }
}
