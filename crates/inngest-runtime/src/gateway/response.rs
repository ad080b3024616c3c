//! Maps an [`ExecutionResult`] onto the HTTP status/body pairs the
//! Executor expects. See spec §6 "Response bodies".

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::middleware::ExecutionResult;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    name: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack: Option<&'a str>,
}

/// Render one [`ExecutionResult`] as the HTTP response the Executor
/// expects, with `Server-Timing` attached from `timing`.
pub fn into_http_response(result: ExecutionResult, timing: &str) -> Response {
    let mut response = match result {
        ExecutionResult::FunctionResolved { data } => (StatusCode::OK, Json(data)).into_response(),
        ExecutionResult::StepRan { op } => (StatusCode::PARTIAL_CONTENT, Json(op)).into_response(),
        ExecutionResult::StepsFound { ops } => (StatusCode::PARTIAL_CONTENT, Json(ops)).into_response(),
        ExecutionResult::FunctionRejected { error, retriable } => {
            let body = ErrorBody {
                name: &error.name,
                message: &error.message,
                stack: error.stack.as_deref(),
            };
            let status = if retriable {
                StatusCode::INTERNAL_SERVER_ERROR
            } else {
                StatusCode::BAD_REQUEST
            };
            let mut resp = (status, Json(body)).into_response();
            if retriable {
                resp.headers_mut().insert("Retry-After", HeaderValue::from_static("1"));
            }
            resp
        }
        ExecutionResult::StepNotFound { .. } => StatusCode::NOT_FOUND.into_response(),
    };

    if !timing.is_empty() {
        if let Ok(value) = HeaderValue::from_str(timing) {
            response.headers_mut().insert("Server-Timing", value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use inngest_core::{OutgoingOp, SerializedError};

    #[test]
    fn function_resolved_is_200() {
        let resp = into_http_response(
            ExecutionResult::FunctionResolved {
                data: serde_json::json!({"ok": true}),
            },
            "",
        );
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn step_ran_is_206() {
        let resp = into_http_response(
            ExecutionResult::StepRan {
                op: OutgoingOp::ran("h1", serde_json::json!(1)),
            },
            "",
        );
        assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
    }

    #[test]
    fn retriable_rejection_is_500_with_retry_after() {
        let resp = into_http_response(
            ExecutionResult::FunctionRejected {
                error: SerializedError::new("Error", "boom"),
                retriable: true,
            },
            "",
        );
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(resp.headers().get("Retry-After").is_some());
    }

    #[test]
    fn non_retriable_rejection_is_400() {
        let resp = into_http_response(
            ExecutionResult::FunctionRejected {
                error: SerializedError::new("NonRetriableError", "no"),
                retriable: false,
            },
            "",
        );
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(resp.headers().get("Retry-After").is_none());
    }

    #[test]
    fn step_not_found_is_404() {
        let resp = into_http_response(
            ExecutionResult::StepNotFound {
                hashed_id: "h1".into(),
            },
            "",
        );
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
