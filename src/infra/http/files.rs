use std::io::ErrorKind;

use axum::{
    body::Body,
    extract::State,
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use bytes::Bytes;

use crate::infra::uploads::UploadStorageError;

use super::error::ApiError;
use super::extract::ApiPath;
use super::state::ApiState;

const SOURCE: &str = "infra::http::files::serve_upload";

pub async fn serve_upload(
    State(state): State<ApiState>,
    ApiPath(path): ApiPath<String>,
) -> Response {
    match state.storage.read(&path).await {
        Ok(bytes) => build_upload_response(&path, bytes),
        Err(UploadStorageError::InvalidPath) => upload_not_found(),
        Err(UploadStorageError::Io(err)) if err.kind() == ErrorKind::NotFound => {
            upload_not_found()
        }
        Err(err) => ApiError::internal(SOURCE, &err).into_response(),
    }
}

fn upload_not_found() -> Response {
    ApiError::not_found(
        "Upload not found",
        Some("the requested upload is not available".to_string()),
    )
    .into_response()
}

fn build_upload_response(path: &str, bytes: Bytes) -> Response {
    let length = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_response_guesses_mime_and_is_immutable() {
        let response = build_upload_response("2025/01/02/abc-cat.png", Bytes::from_static(b"png"));
        let headers = response.headers();
        assert_eq!(headers[CONTENT_TYPE], "image/png");
        assert_eq!(headers[CONTENT_LENGTH], "3");
        assert!(
            headers[CACHE_CONTROL]
                .to_str()
                .expect("ascii header")
                .contains("immutable")
        );
    }

    #[test]
    fn unknown_extension_falls_back_to_octet_stream() {
        let response = build_upload_response("blob", Bytes::from_static(b"x"));
        assert_eq!(response.headers()[CONTENT_TYPE], "application/octet-stream");
    }
}
