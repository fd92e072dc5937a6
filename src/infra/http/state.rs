use std::sync::Arc;

use crate::application::catalog::CatalogService;
use crate::application::ingest::IngestService;
use crate::application::repos::AssetsRepo;
use crate::infra::uploads::UploadStorage;

/// Shared handles for every HTTP handler.
#[derive(Clone)]
pub struct ApiState {
    pub catalog: CatalogService,
    pub ingest: IngestService,
    pub repo: Arc<dyn AssetsRepo>,
    pub storage: Arc<UploadStorage>,
}
