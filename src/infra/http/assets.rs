//! `/v1/{photos,videos}` handlers. The asset kind arrives as a route extension.

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::application::ingest::{UploadFile, UploadRequest};
use crate::application::pagination::AssetPage;
use crate::domain::types::AssetKind;

use super::error::ApiError;
use super::extract::{ApiMultipart, ApiPath, ApiQuery};
use super::state::ApiState;

const TAGS_FIELD: &str = "tags";
const TITLE_FIELD: &str = "title";

/// Raw listing parameters. Kept as strings so parsing errors surface as 400s
/// with a useful message instead of a generic rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    tags: Option<String>,
    tag: Option<String>,
    page: Option<String>,
    limit: Option<String>,
}

pub async fn get_asset(
    State(state): State<ApiState>,
    Extension(kind): Extension<AssetKind>,
    ApiPath(id): ApiPath<String>,
) -> Result<Response, ApiError> {
    let record = state.catalog.get_by_id(kind, Some(&id)).await?;
    Ok(Json(record).into_response())
}

/// `?tags=` selects the any-of tag search; otherwise the default listing.
pub async fn list_assets(
    State(state): State<ApiState>,
    Extension(kind): Extension<AssetKind>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Response, ApiError> {
    if query.tags.is_some() {
        let page = state
            .catalog
            .list_by_tags(
                kind,
                query.tags.as_deref(),
                query.page.as_deref(),
                query.limit.as_deref(),
            )
            .await?;
        return Ok(Json(tag_search_body(page)).into_response());
    }

    let page = state
        .catalog
        .list_all(
            kind,
            query.page.as_deref(),
            query.limit.as_deref(),
            query.tag.as_deref(),
        )
        .await?;
    Ok(Json(listing_body(kind, page)).into_response())
}

pub async fn upload_asset(
    State(state): State<ApiState>,
    Extension(kind): Extension<AssetKind>,
    ApiMultipart(mut multipart): ApiMultipart,
) -> Result<Response, ApiError> {
    let mut request = UploadRequest::default();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };

        if name == kind.file_field() {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let data = field.bytes().await?;
            request.file = Some(UploadFile { file_name, data });
        } else if name == TAGS_FIELD {
            request.tags_json = Some(field.text().await?);
        } else if name == TITLE_FIELD {
            request.title = Some(field.text().await?);
        } else if name == kind.id_field() {
            request.requested_id = Some(field.text().await?);
        }
    }

    let record = state.ingest.ingest(kind, request).await?;
    Ok((StatusCode::CREATED, Json(record)).into_response())
}

pub async fn delete_asset(
    State(state): State<ApiState>,
    Extension(kind): Extension<AssetKind>,
    ApiPath(id): ApiPath<String>,
) -> Result<Response, ApiError> {
    let record = state.catalog.soft_delete(kind, Some(&id)).await?;
    Ok(Json(record).into_response())
}

fn tag_search_body(page: AssetPage) -> Value {
    json!({
        "items": page.items,
        "totalCount": page.total_count,
        "totalPages": page.total_pages,
        "currentPage": page.current_page,
    })
}

/// Listing responses name the collection: `photos`/`totalPhotos` or `videos`/`totalVideos`.
fn listing_body(kind: AssetKind, page: AssetPage) -> Value {
    let mut body = Map::new();
    body.insert(kind.collection().to_string(), json!(page.items));
    body.insert(kind.total_field().to_string(), json!(page.total_count));
    body.insert("totalPages".to_string(), json!(page.total_pages));
    body.insert("currentPage".to_string(), json!(page.current_page));
    body.insert("hasNextPage".to_string(), json!(page.has_next_page));
    body.insert("hasPreviousPage".to_string(), json!(page.has_previous_page));
    Value::Object(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> AssetPage {
        AssetPage {
            items: Vec::new(),
            total_count: 25,
            total_pages: 3,
            current_page: Some(2),
            has_next_page: true,
            has_previous_page: true,
        }
    }

    #[test]
    fn listing_body_uses_collection_names() {
        let body = listing_body(AssetKind::Video, page());
        assert!(body["videos"].is_array());
        assert_eq!(body["totalVideos"], 25);
        assert_eq!(body["hasNextPage"], true);
        assert!(body.get("photos").is_none());
    }

    #[test]
    fn tag_search_body_has_no_navigation_flags() {
        let body = tag_search_body(page());
        assert_eq!(body["totalCount"], 25);
        assert_eq!(body["currentPage"], 2);
        assert!(body.get("hasNextPage").is_none());
    }
}
