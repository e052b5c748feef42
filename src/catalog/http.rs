use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};

use crate::catalog::MediaCatalog;
use crate::error::SyncError;
use crate::models::MediaInfo;

/// Catalog backed by the cataloging service's HTTP API (`GET /media/{id}`)
#[derive(Clone)]
pub struct HttpCatalog {
    client: Client,
    base_url: String,
}

impl HttpCatalog {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// `{base}/media/{id}` with the id percent-encoded as one path segment.
    fn media_url(&self, media_id: &str) -> Result<Url, SyncError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SyncError::CatalogUnavailable(format!("bad catalog url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| SyncError::CatalogUnavailable("catalog url cannot be a base".to_string()))?
            .pop_if_empty()
            .push("media")
            .push(media_id);
        Ok(url)
    }
}

#[async_trait]
impl MediaCatalog for HttpCatalog {
    async fn get_media_by_id(&self, media_id: &str) -> Result<Option<MediaInfo>, SyncError> {
        if media_id.is_empty() || media_id.contains('/') {
            return Ok(None);
        }

        let res = self
            .client
            .get(self.media_url(media_id)?)
            .send()
            .await
            .map_err(|e| SyncError::CatalogUnavailable(e.to_string()))?;

        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            tracing::warn!(media_id = %media_id, status = %status, "Catalog lookup failed");
            return Err(SyncError::CatalogUnavailable(format!(
                "catalog returned {}: {}",
                status, body
            )));
        }

        let media = res
            .json::<MediaInfo>()
            .await
            .map_err(|e| SyncError::CatalogUnavailable(format!("bad catalog payload: {}", e)))?;

        if media.media_id != media_id {
            tracing::warn!(
                requested = %media_id,
                returned = %media.media_id,
                "Catalog returned a different media item"
            );
            return Ok(None);
        }

        Ok(Some(media))
    }
}
