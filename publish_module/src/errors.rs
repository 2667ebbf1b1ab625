use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("http error: {0}")]
    Http(String),
    #[error("LinkedIn {step} returned status {status}: {body}")]
    Status {
        step: &'static str,
        status: u16,
        body: String,
    },
    #[error("LinkedIn {step} response was malformed: {message}")]
    Decode { step: &'static str, message: String },
    #[error("failed to read image {source_ref}: {message}")]
    ImageRead { source_ref: String, message: String },
}

impl PublishError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            PublishError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn category(&self) -> Option<ErrorCategory> {
        self.status_code().map(categorize_status)
    }
}

/// Human-facing classification of a LinkedIn API status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ErrorCategory {
    pub status_code: u16,
    pub category: &'static str,
    pub recommended_action: &'static str,
    pub retry_recommended: bool,
}

pub fn categorize_status(status_code: u16) -> ErrorCategory {
    let (category, recommended_action) = match status_code {
        400 => (
            "Bad Request - Check post content and format",
            "Review post content format and LinkedIn API requirements",
        ),
        401 => (
            "Unauthorized - Invalid or expired access token",
            "Refresh or regenerate LinkedIn access token",
        ),
        403 => (
            "Forbidden - Insufficient permissions",
            "Check LinkedIn app permissions and user authorization",
        ),
        404 => (
            "Not Found - Invalid endpoint or resource",
            "Verify API endpoints and user profile accessibility",
        ),
        422 => (
            "Unprocessable Entity - Content policy violation",
            "Review content for policy violations or inappropriate material",
        ),
        429 => (
            "Rate Limited - Too many requests",
            "Implement exponential backoff and reduce request frequency",
        ),
        500 => (
            "Internal Server Error - LinkedIn API issue",
            "Wait and retry, LinkedIn API may be experiencing issues",
        ),
        _ => (
            "Unknown Error",
            "Contact LinkedIn API support for assistance",
        ),
    };
    ErrorCategory {
        status_code,
        category,
        recommended_action,
        retry_recommended: matches!(status_code, 429 | 500 | 502 | 503 | 504),
    }
}
