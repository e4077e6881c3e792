use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;

use crate::store::StoreError;

pub(crate) struct Error {
    status_code: StatusCode,
    message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        (
            self.status_code,
            [("content-type", "application/json")],
            Json(json!({
                "error": self.message,
            })),
        )
            .into_response()
    }
}

impl Error {
    pub(crate) fn new(status_code: StatusCode, message: String) -> Self {
        Self {
            status_code,
            message,
        }
    }

    pub(crate) fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.to_owned())
    }

    pub(crate) fn forbidden(message: &str) -> Self {
        Self::new(StatusCode::FORBIDDEN, message.to_owned())
    }

    pub(crate) fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, message.to_owned())
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        let status_code = match &e {
            StoreError::SessionGone | StoreError::PlayerGone => StatusCode::GONE,
            StoreError::RoundNotStarted
            | StoreError::RoundOver
            | StoreError::WrongRound { .. }
            | StoreError::AlreadySubmitted
            | StoreError::MidScoring
            | StoreError::NoPlayers => StatusCode::CONFLICT,
            StoreError::Db(inner) => {
                tracing::error!(error = %inner, "database error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status_code, e.to_string())
    }
}
