//! Remote video catalog: listing videos and their episodes.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::CatalogConfig;
use crate::error::{Result, EpisubError};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VideoRef {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EpisodeRef {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(rename = "videourl", default, deserialize_with = "null_as_empty")]
    pub media_url: String,
}

impl EpisodeRef {
    pub fn has_media(&self) -> bool {
        !self.media_url.trim().is_empty()
    }
}

/// Catalog ids arrive as JSON numbers or strings
fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A listing is either a bare array or an object carrying it in `data`
#[derive(Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Bare(Vec<T>),
    Wrapped { data: Vec<T> },
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Bare(items) => items,
            Listing::Wrapped { data } => data,
        }
    }
}

/// Source of videos and episodes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn list_videos(&self) -> Result<Vec<VideoRef>>;

    async fn list_episodes(&self, video_id: &str) -> Result<Vec<EpisodeRef>>;
}

/// Catalog served over HTTP as JSON
pub struct HttpCatalogClient {
    client: Client,
    base_url: String,
}

impl HttpCatalogClient {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_listing<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<T>> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("Requesting catalog listing: {} {:?}", url, query);

        let response = self.client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| EpisubError::Catalog(format!("request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(EpisubError::Catalog(format!(
                "{} answered {}",
                url,
                response.status()
            )));
        }

        let listing: Listing<T> = response
            .json()
            .await
            .map_err(|e| EpisubError::Catalog(format!("unexpected listing from {}: {}", url, e)))?;

        Ok(listing.into_vec())
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn list_videos(&self) -> Result<Vec<VideoRef>> {
        self.get_listing("getAllVideoList", &[]).await
    }

    async fn list_episodes(&self, video_id: &str) -> Result<Vec<EpisodeRef>> {
        self.get_listing("getVideoEpisode", &[("vid", video_id)]).await
    }
}

/// Walks the catalog, turning listing failures into empty listings
pub struct CatalogWalker {
    client: Box<dyn CatalogClient>,
}

impl CatalogWalker {
    pub fn new(client: Box<dyn CatalogClient>) -> Self {
        Self { client }
    }

    pub async fn videos(&self) -> Vec<VideoRef> {
        match self.client.list_videos().await {
            Ok(videos) => {
                info!("Catalog lists {} videos", videos.len());
                videos
            }
            Err(e) => {
                warn!("Failed to list videos, nothing to process: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn episodes(&self, video: &VideoRef) -> Vec<EpisodeRef> {
        match self.client.list_episodes(&video.id).await {
            Ok(episodes) => {
                debug!(video = %video.id, "Video has {} episodes", episodes.len());
                episodes
            }
            Err(e) => {
                warn!(video = %video.id, "Failed to list episodes, skipping video: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_listing_with_numeric_ids() {
        let listing: Listing<VideoRef> =
            serde_json::from_str(r#"[{"id": 12, "title": "Drama"}, {"id": "x7"}]"#).unwrap();
        let videos = listing.into_vec();
        assert_eq!(videos[0].id, "12");
        assert_eq!(videos[0].title.as_deref(), Some("Drama"));
        assert_eq!(videos[1].id, "x7");
        assert_eq!(videos[1].title, None);
    }

    #[test]
    fn test_wrapped_listing_and_missing_media() {
        let listing: Listing<EpisodeRef> = serde_json::from_str(
            r#"{"data": [
                {"id": 1, "videourl": "https://cdn/1.mp4", "name": "ep1"},
                {"id": 2, "videourl": null},
                {"id": 3},
                {"id": 4, "videourl": "  "}
            ]}"#,
        )
        .unwrap();
        let episodes = listing.into_vec();
        assert_eq!(episodes.len(), 4);
        assert!(episodes[0].has_media());
        assert!(episodes.iter().skip(1).all(|e| !e.has_media()));
    }

    #[tokio::test]
    async fn test_walker_soft_fails() {
        let mut client = MockCatalogClient::new();
        client
            .expect_list_videos()
            .returning(|| Err(EpisubError::Catalog("503".to_string())));
        client
            .expect_list_episodes()
            .returning(|_| Err(EpisubError::Catalog("404".to_string())));

        let walker = CatalogWalker::new(Box::new(client));
        assert!(walker.videos().await.is_empty());

        let video = VideoRef { id: "1".to_string(), title: None };
        assert!(walker.episodes(&video).await.is_empty());
    }

    #[tokio::test]
    async fn test_walker_passes_video_id() {
        let mut client = MockCatalogClient::new();
        client
            .expect_list_episodes()
            .withf(|id| id.to_string() == "42")
            .times(1)
            .returning(|_| {
                Ok(vec![EpisodeRef { id: "1".to_string(), media_url: "u1".to_string() }])
            });

        let walker = CatalogWalker::new(Box::new(client));
        let video = VideoRef { id: "42".to_string(), title: None };
        assert_eq!(walker.episodes(&video).await.len(), 1);
    }
}
