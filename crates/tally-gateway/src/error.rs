// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tally_agent::TurnFailed;
use tally_core::TallyError;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable machine-readable code.
    pub code: String,
    /// Set when the request reached a conversation before failing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// An error with the HTTP status it should be returned with.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: message.into(),
                code: code.to_string(),
                conversation_id: None,
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "turn_in_progress", message)
    }

    /// A turn that ran and failed.
    pub fn from_turn(failed: TurnFailed, conversation_id: String) -> Self {
        let mut err = Self::new(status_for(&failed.code), &failed.code, failed.message);
        err.body.conversation_id = Some(conversation_id);
        err
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<TallyError> for ApiError {
    fn from(e: TallyError) -> Self {
        Self::new(status_for(e.code()), e.code(), e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn status_for(code: &str) -> StatusCode {
    match code {
        "not_found" => StatusCode::NOT_FOUND,
        "configuration_error" | "cancelled" => StatusCode::SERVICE_UNAVAILABLE,
        "provider_transient" | "provider_permanent" | "providers_exhausted" | "timeout" => {
            StatusCode::BAD_GATEWAY
        }
        "loop_limit_exceeded" => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_codes() {
        assert_eq!(
            ApiError::from(TallyError::NotFound("conversation c1".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(TallyError::Config("no providers".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        let failed = TurnFailed {
            code: "providers_exhausted".into(),
            message: "All language model providers are unavailable right now.".into(),
        };
        assert_eq!(
            ApiError::from_turn(failed, "c1".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(TallyError::Internal("boom".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
