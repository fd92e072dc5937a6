use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::catalog::CatalogError;
use crate::application::error::ErrorReport;
use crate::application::ingest::IngestError;
use crate::infra::uploads::UploadStorageError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const NOT_FOUND: &str = "not_found";
    pub const CAPACITY_REACHED: &str = "capacity_reached";
    pub const DUPLICATE: &str = "duplicate";
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";
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
    message: String,
    hint: Option<String>,
    report: Option<ErrorReport>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: impl Into<String>,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            hint,
            report: None,
        }
    }

    pub fn invalid_input(message: impl Into<String>, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::INVALID_INPUT, message, hint)
    }

    pub fn not_found(message: impl Into<String>, hint: Option<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, hint)
    }

    /// A 500 whose detail goes to the logs only.
    pub fn internal(source: &'static str, error: &dyn std::error::Error) -> Self {
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        Self {
            status,
            code: codes::INTERNAL,
            message: "Internal server error".to_string(),
            hint: None,
            report: Some(ErrorReport::from_error(source, status, error)),
        }
    }

    /// Map an extractor rejection onto the JSON error body.
    pub fn rejected(what: &str, status: StatusCode, detail: String) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::payload_too_large();
        }
        if status.is_server_error() {
            let mut err = Self::new(status, codes::INTERNAL, "Internal server error", None);
            err.report = Some(ErrorReport::from_message(
                "infra::http::extract",
                status,
                format!("{what}: {detail}"),
            ));
            return err;
        }
        Self::invalid_input(format!("Invalid {what}"), Some(detail))
    }

    fn payload_too_large() -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            codes::PAYLOAD_TOO_LARGE,
            "Upload exceeds the request size limit",
            None,
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report = self.report.unwrap_or_else(|| {
            ErrorReport::from_message(
                "infra::http::api",
                self.status,
                format!(
                    "{}: {}",
                    self.code,
                    self.hint.as_deref().unwrap_or(&self.message)
                ),
            )
        });
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message,
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        report.attach(&mut response);
        response
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Validation(err) => ApiError::invalid_input(err.message(), None),
            CatalogError::NotFound { kind, id } => ApiError::not_found(
                "Asset not found",
                Some(format!("no {kind} with id `{id}`")),
            ),
            CatalogError::Repo(err) => ApiError::internal("application::catalog", &err),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Validation(err) => ApiError::invalid_input(err.message(), None),
            IngestError::Conflict { kind, id } => ApiError::new(
                StatusCode::BAD_REQUEST,
                codes::DUPLICATE,
                format!("A {kind} with this id already exists"),
                Some(format!("id `{id}` is taken")),
            ),
            IngestError::Capacity { kind, limit } => ApiError::new(
                StatusCode::BAD_REQUEST,
                codes::CAPACITY_REACHED,
                format!("{} capacity reached", kind.collection()),
                Some(format!("at most {limit} {} may be stored", kind.collection())),
            ),
            IngestError::Storage(UploadStorageError::EmptyPayload) => {
                ApiError::invalid_input("Uploaded file is empty", None)
            }
            IngestError::Storage(err) => ApiError::internal("application::ingest::storage", &err),
            IngestError::Repo(err) => ApiError::internal("application::ingest", &err),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::payload_too_large()
        } else {
            ApiError::invalid_input("Invalid multipart payload", Some(err.body_text()))
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::application::repos::RepoError;
    use crate::domain::error::DomainError;
    use crate::domain::types::AssetKind;

    use super::*;

    #[test]
    fn validation_maps_to_invalid_input() {
        let err = ApiError::from(CatalogError::Validation(DomainError::validation(
            "asset id must not be empty",
        )));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), codes::INVALID_INPUT);
    }

    #[test]
    fn store_failures_hide_detail() {
        let err = ApiError::from(CatalogError::Repo(RepoError::from_persistence(
            "connection reset by peer",
        )));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), codes::INTERNAL);
        assert!(!err.message.contains("connection reset"));
        assert!(err.report.is_some());
    }

    #[test]
    fn capacity_and_conflict_are_client_errors() {
        let capacity = ApiError::from(IngestError::Capacity {
            kind: AssetKind::Photo,
            limit: 50,
        });
        assert_eq!(capacity.status(), StatusCode::BAD_REQUEST);
        assert_eq!(capacity.code(), codes::CAPACITY_REACHED);

        let conflict = ApiError::from(IngestError::Conflict {
            kind: AssetKind::Video,
            id: "v1".to_string(),
        });
        assert_eq!(conflict.status(), StatusCode::BAD_REQUEST);
        assert_eq!(conflict.code(), codes::DUPLICATE);
    }

    #[test]
    fn rejections_keep_their_class() {
        let bad = ApiError::rejected(
            "query string",
            StatusCode::BAD_REQUEST,
            "duplicate field `page`".to_string(),
        );
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
        assert_eq!(bad.code(), codes::INVALID_INPUT);
        assert_eq!(bad.message, "Invalid query string");

        let large = ApiError::rejected("body", StatusCode::PAYLOAD_TOO_LARGE, String::new());
        assert_eq!(large.code(), codes::PAYLOAD_TOO_LARGE);

        let broken = ApiError::rejected(
            "path",
            StatusCode::INTERNAL_SERVER_ERROR,
            "no path parameters found".to_string(),
        );
        assert_eq!(broken.code(), codes::INTERNAL);
        assert!(broken.hint.is_none());
        assert!(broken.report.is_some());
    }
}
