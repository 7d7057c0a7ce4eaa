use thiserror::Error;
use tracing::error;

use crate::llm::LlmError;
use crate::{Response, StatusCode};

/// Errors a handler answers with before any stream has started.
///
/// Once a stream is open, failures travel in-band as an error frame instead.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body is missing a field or has the wrong shape.
    #[error("{0}")]
    Validation(String),

    #[error("AI SDK not initialized")]
    NotInitialized,

    /// The provider refused or failed the call before the first fragment.
    #[error("upstream provider request failed")]
    Upstream(#[source] LlmError),
}

impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::NotInitialized => Self::NotInitialized,
            LlmError::InvalidRequest(message) => Self::Validation(message),
            other => Self::Upstream(other),
        }
    }
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::NotInitialized => StatusCode::BadRequest,
            Self::Upstream(_) => StatusCode::BadGateway,
        }
    }

    /// Renders the error body. Upstream detail is logged here and kept off the wire.
    pub fn into_response(self) -> Response {
        if let Self::Upstream(source) = &self {
            error!(error = %source, "upstream request failed");
        }
        Response::error(self.status(), self.to_string())
    }
}
