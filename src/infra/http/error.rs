use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::{ErrorReport, ServiceError};

const SOURCE: &str = "infra::http::api";

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const VALIDATION: &str = "validation_error";
    pub const TIMEOUT: &str = "timeout";
    pub const REQUEST_CANCELED: &str = "request_canceled";
    pub const INTERNAL: &str = "internal_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    detail: Option<ServiceError>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
            detail: None,
        }
    }

    pub fn validation(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::VALIDATION, message, hint)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<ServiceError> for ApiError {
    fn from(error: ServiceError) -> Self {
        let mut api = if error.is_timeout() {
            Self::new(
                StatusCode::GATEWAY_TIMEOUT,
                codes::TIMEOUT,
                "request timed out",
                None,
            )
        } else if matches!(error, ServiceError::Canceled) {
            Self::new(
                StatusCode::REQUEST_TIMEOUT,
                codes::REQUEST_CANCELED,
                "request canceled",
                None,
            )
        } else {
            Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::INTERNAL,
                "internal server error",
                None,
            )
        };
        api.detail = Some(error);
        api
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report = match &self.detail {
            Some(detail) => ErrorReport::from_error(SOURCE, self.status, detail),
            None => ErrorReport::from_message(
                SOURCE,
                self.status,
                format!(
                    "{}: {}",
                    self.code,
                    self.hint.as_deref().unwrap_or(self.message)
                ),
            ),
        };
        // Internal causes stay in the log; the body only carries the public message.
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repos::RepoError;

    #[test]
    fn service_errors_map_to_statuses() {
        let cases = [
            (
                ServiceError::DeadlineExceeded,
                StatusCode::GATEWAY_TIMEOUT,
                codes::TIMEOUT,
            ),
            (
                ServiceError::Repo(RepoError::Timeout),
                StatusCode::GATEWAY_TIMEOUT,
                codes::TIMEOUT,
            ),
            (
                ServiceError::Canceled,
                StatusCode::REQUEST_TIMEOUT,
                codes::REQUEST_CANCELED,
            ),
            (
                ServiceError::Repo(RepoError::from_persistence("connection reset")),
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::INTERNAL,
            ),
        ];

        for (error, status, code) in cases {
            let api = ApiError::from(error);
            assert_eq!(api.status(), status);
            assert_eq!(api.code(), code);
        }
    }

    #[test]
    fn response_carries_error_report() {
        let error = ServiceError::Repo(RepoError::from_persistence("connection reset"));
        let response = ApiError::from(error).into_response();
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.source, SOURCE);
        assert_eq!(report.messages[0], "persistence error: connection reset");
    }
}
