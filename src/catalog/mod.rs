pub mod http;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::SyncError;
use crate::models::MediaInfo;

pub use http::HttpCatalog;

/// Lookup into the catalog owned by the ingestion subsystem.
#[async_trait]
pub trait MediaCatalog: Send + Sync {
    /// `Ok(None)` means the media id is unknown.
    async fn get_media_by_id(&self, media_id: &str) -> Result<Option<MediaInfo>, SyncError>;
}

/// Build the catalog configured for this process
pub fn from_config(config: &Config) -> Arc<dyn MediaCatalog> {
    match &config.catalog_url {
        Some(url) => {
            tracing::info!(catalog_url = %url, "Using HTTP media catalog");
            Arc::new(HttpCatalog::new(url.clone()))
        }
        None => {
            tracing::info!(
                media_count = config.catalog_media_ids.len(),
                "Using static media catalog"
            );
            Arc::new(StaticCatalog::from_ids(config.catalog_media_ids.iter().cloned()))
        }
    }
}

/// In-memory catalog, seeded from configuration or tests
#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    media: HashMap<String, MediaInfo>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids(ids: impl IntoIterator<Item = String>) -> Self {
        let mut catalog = Self::new();
        for id in ids {
            catalog.insert(MediaInfo::new(id));
        }
        catalog
    }

    pub fn with_media(mut self, media: MediaInfo) -> Self {
        self.insert(media);
        self
    }

    pub fn insert(&mut self, media: MediaInfo) {
        self.media.insert(media.media_id.clone(), media);
    }

    pub fn len(&self) -> usize {
        self.media.len()
    }

    pub fn is_empty(&self) -> bool {
        self.media.is_empty()
    }
}

#[async_trait]
impl MediaCatalog for StaticCatalog {
    async fn get_media_by_id(&self, media_id: &str) -> Result<Option<MediaInfo>, SyncError> {
        Ok(self.media.get(media_id).cloned())
    }
}
