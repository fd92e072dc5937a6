//! Extractors whose rejections use the JSON error body.

use axum::extract::{FromRequest, FromRequestParts, Multipart, Path, Query, Request};
use axum::http::request::Parts;
use serde::de::DeserializeOwned;

use super::error::ApiError;

/// [`Query`] that rejects with [`ApiError`].
#[derive(Debug, Clone)]
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| {
                ApiError::rejected("query string", rejection.status(), rejection.body_text())
            })?;
        Ok(Self(value))
    }
}

/// [`Path`] that rejects with [`ApiError`].
#[derive(Debug, Clone)]
pub struct ApiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| {
                ApiError::rejected("path", rejection.status(), rejection.body_text())
            })?;
        Ok(Self(value))
    }
}

/// [`Multipart`] that rejects with [`ApiError`].
pub struct ApiMultipart(pub Multipart);

impl<S> FromRequest<S> for ApiMultipart
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Multipart::from_request(req, state)
            .await
            .map(Self)
            .map_err(|rejection| {
                ApiError::rejected("multipart body", rejection.status(), rejection.body_text())
            })
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{self, StatusCode};
    use serde::Deserialize;

    use super::super::error::codes;
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Window {
        #[allow(dead_code)]
        page: Option<String>,
    }

    #[tokio::test]
    async fn repeated_query_field_is_invalid_input() {
        let (mut parts, _) = http::Request::builder()
            .uri("/v1/photos?page=1&page=2")
            .body(Body::empty())
            .expect("request")
            .into_parts();

        let err = ApiQuery::<Window>::from_request_parts(&mut parts, &())
            .await
            .expect_err("duplicate field");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), codes::INVALID_INPUT);
    }

    #[tokio::test]
    async fn multipart_without_boundary_is_invalid_input() {
        let request = http::Request::builder()
            .method("POST")
            .uri("/v1/photos/upload")
            .body(Body::from("not multipart"))
            .expect("request");

        let err = match ApiMultipart::from_request(request, &()).await {
            Ok(_) => panic!("plain body must be rejected"),
            Err(err) => err,
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), codes::INVALID_INPUT);
    }
}
