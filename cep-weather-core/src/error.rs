use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::model::ErrorBody;

/// Coarse classification of an upstream lookup failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    NotFound,
    Transport,
    Decode,
}

/// Failure of a single call to the postal directory or the weather service.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("postal code not found")]
    NotFound,

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream responded with status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid upstream url: {0}")]
    Url(#[from] url::ParseError),
}

impl LookupError {
    pub fn kind(&self) -> Failure {
        match self {
            LookupError::NotFound => Failure::NotFound,
            LookupError::Transport(_) | LookupError::UpstreamStatus { .. } | LookupError::Url(_) => {
                Failure::Transport
            }
            LookupError::Decode(_) => Failure::Decode,
        }
    }
}

/// Request-terminating outcomes of the finder and validator handlers.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid request body")]
    InvalidBody,

    #[error("CEP is required")]
    MissingCode,

    #[error("CEP must be at least {min} characters long")]
    CodeTooShort { min: usize },

    #[error("Cannot find zipcode")]
    NotFoundUpstream,

    #[error("Internal server error")]
    UpstreamUnavailable,

    #[error("Failed to call external API")]
    ForwardFailed,

    #[error("Failed to decode external API response")]
    ForwardDecode,
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::InvalidBody | ServiceError::MissingCode => StatusCode::BAD_REQUEST,
            ServiceError::CodeTooShort { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::NotFoundUpstream => StatusCode::NOT_FOUND,
            ServiceError::UpstreamUnavailable
            | ServiceError::ForwardFailed
            | ServiceError::ForwardDecode => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<LookupError> for ServiceError {
    fn from(err: LookupError) -> Self {
        match err.kind() {
            Failure::NotFound => ServiceError::NotFoundUpstream,
            Failure::Transport | Failure::Decode => ServiceError::UpstreamUnavailable,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            // Failures of the inter-service call use the JSON envelope.
            ServiceError::ForwardFailed | ServiceError::ForwardDecode => (
                status,
                Json(ErrorBody {
                    error: self.to_string(),
                }),
            )
                .into_response(),
            _ => (status, self.to_string()).into_response(),
        }
    }
}

/// Shortens an upstream body for log output without splitting a character.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
