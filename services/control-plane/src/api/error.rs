//! API error responses.

use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::Error;

/// RFC 7807 style problem body.
#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    pub code: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub problem: ProblemDetails,
}

impl ApiError {
    fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        let code = code.into();
        let title = status
            .canonical_reason()
            .unwrap_or("Unknown Error")
            .to_string();
        Self {
            status,
            problem: ProblemDetails {
                r#type: format!("https://convoy.dev/problems/{code}"),
                title,
                status: status.as_u16(),
                detail: detail.into(),
                code,
            },
        }
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }

    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, message)
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(msg) => Self::not_found("not_found", msg),
            Error::Validation(msg) => Self::bad_request("validation_failed", msg),
            Error::Persistence(e) => {
                tracing::error!(error = %e, "Storage operation failed");
                Self::internal("internal_error", "Storage operation failed")
            }
            Error::Transport(e) => {
                tracing::error!(error = %e, "Node transport failed");
                Self::internal("internal_error", "Node transport failed")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.problem)).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_statuses() {
        let not_found: ApiError = Error::NotFound("node x not found".to_string()).into();
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);

        let validation: ApiError = Error::Validation("bad payload".to_string()).into();
        assert_eq!(validation.status, StatusCode::BAD_REQUEST);
        assert_eq!(validation.problem.code, "validation_failed");
        assert_eq!(validation.problem.detail, "bad payload");
    }

    #[test]
    fn problem_body_serializes_type_field() {
        let err = ApiError::not_found("not_found", "gone");
        let json = serde_json::to_value(&err.problem).unwrap();
        assert_eq!(json["type"], "https://convoy.dev/problems/not_found");
        assert_eq!(json["status"], 404);
    }
}
