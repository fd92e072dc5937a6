mod assets;
mod error;
mod extract;
mod files;
mod health;
mod middleware;
mod state;

pub use error::{ApiError, ApiErrorBody, ApiErrorMessage, codes};
pub use health::HealthBody;
pub use middleware::RequestContext;
pub use state::ApiState;

use std::any::Any;

use axum::{
    Extension, Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::catch_panic::CatchPanicLayer;

use crate::application::error::ErrorReport;
use crate::domain::types::AssetKind;

use self::middleware::{log_responses, set_request_context};

/// Assemble the public router: per-kind asset routes, health, and blob retrieval.
pub fn build_router(state: ApiState, max_request_bytes: usize) -> Router {
    let mut router = Router::new();
    for kind in AssetKind::ALL {
        router = router.merge(asset_routes(kind));
    }

    router
        .route("/health", get(health::health))
        .route("/uploads/{*path}", get(files::serve_upload))
        .fallback(route_not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

fn asset_routes(kind: AssetKind) -> Router<ApiState> {
    let base = format!("/v1/{}", kind.collection());
    Router::new()
        .route(&base, get(assets::list_assets))
        .route(&format!("{base}/upload"), post(assets::upload_asset))
        .route(
            &format!("{base}/{{id}}"),
            get(assets::get_asset).delete(assets::delete_asset),
        )
        .layer(Extension(kind))
}

async fn route_not_found() -> Response {
    ApiError::not_found("Route not found", None).into_response()
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else {
        "handler panicked".to_string()
    };

    let mut response = ApiError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        codes::INTERNAL,
        "Internal server error",
        None,
    )
    .into_response();
    ErrorReport::from_message(
        "infra::http::panic",
        StatusCode::INTERNAL_SERVER_ERROR,
        detail,
    )
    .attach(&mut response);
    response
}
