//! HTTP boundary over the counter store and quiz manager.
//!
//! Validation failures come back as 4xx with a plain-text reason, store and
//! disk failures as 5xx.

mod handlers;

pub use handlers::{AppState, SubmitRequest, VisitResult, router};

use crate::core::TallyError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

#[derive(Debug)]
pub enum WebError {
    Store(TallyError),
    Input(String),
}

impl From<TallyError> for WebError {
    fn from(err: TallyError) -> Self {
        WebError::Store(err)
    }
}

impl WebError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebError::Input(_) => StatusCode::BAD_REQUEST,
            WebError::Store(TallyError::NotFound(_)) => StatusCode::NOT_FOUND,
            WebError::Store(TallyError::OutOfRange { .. }) => StatusCode::BAD_REQUEST,
            WebError::Store(TallyError::InvalidName(_)) => StatusCode::BAD_REQUEST,
            WebError::Store(TallyError::FetchFailed(_)) => StatusCode::BAD_GATEWAY,
            WebError::Store(TallyError::PersistFailed(_) | TallyError::LoadFailed(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let WebError::Store(err) = &self {
            if !err.is_client_error() {
                error!(status = status.as_u16(), error = %err, "request failed");
            }
        }
        let message = match self {
            WebError::Store(err) => err.to_string(),
            WebError::Input(msg) => msg,
        };
        (status, message).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WebError>;
