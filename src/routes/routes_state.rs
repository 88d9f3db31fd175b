use std::sync::Arc;

use blob_store::BlobStorage;

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct RouteState {
    pub blob_storage: Arc<BlobStorage>,
    pub config: Arc<ServerConfig>,
}
