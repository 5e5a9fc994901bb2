use thiserror::Error;

/// Uniform failure surfaced by every backend call.
///
/// Nothing here is fatal: screens keep their last good state and show the
/// message returned by [`ApiError::user_message`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    #[error("could not reach {path}: {message}")]
    Transport { path: String, message: String },

    #[error("{path} answered {status}: {}", message.as_deref().unwrap_or("no details"))]
    Rejected {
        path: String,
        status: u16,
        message: Option<String>,
    },

    #[error("unexpected response from {path}: {message}")]
    Decode { path: String, message: String },

    /// Caught before any request was sent.
    #[error("{0}")]
    Precondition(String),
}

impl ApiError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    /// Text to show next to the triggering control.
    ///
    /// Server-provided `error` messages and client-side precondition
    /// messages are shown verbatim; everything else collapses to `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Rejected {
                message: Some(message),
                ..
            } => message.clone(),
            ApiError::Precondition(message) => message.clone(),
            _ => fallback.to_string(),
        }
    }
}
