//! Request-level error type.
//!
//! Internal failures are logged with full detail but only a generic
//! plain-text message reaches the caller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::error;
use thiserror::Error;

use crate::errors::PersistenceError;

#[derive(Debug, Error)]
pub enum ServerError {
    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The conversation store failed while the pipeline was running.
    #[error("persistence failure: {0}")]
    Persistence(#[from] PersistenceError),

    /// An unclassified internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match &self {
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::Persistence(e) => {
                error!("Conversation store error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "conversation store unavailable".to_owned(),
                )
            }
            ServerError::Internal(m) => {
                error!("Internal server error: {}", m);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        (status, client_message).into_response()
    }
}
