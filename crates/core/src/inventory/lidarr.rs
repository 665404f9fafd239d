//! Lidarr API client.
//!
//! Lidarr has served its API under several prefixes across versions, so each
//! resource is tried under `/api/v1`, `/api` and `/api/v3` in turn.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::{Inventory, InventoryArtist, InventoryError, InventoryReleaseGroup};
use crate::config::LidarrConfig;

const API_PREFIXES: &[&str] = &["/api/v1", "/api", "/api/v3"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LidarrArtist {
    #[serde(default)]
    foreign_artist_id: Option<String>,
    #[serde(default)]
    mb_id: Option<String>,
    #[serde(default)]
    artist_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LidarrAlbum {
    #[serde(default)]
    foreign_album_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    artist: Option<LidarrAlbumArtist>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LidarrAlbumArtist {
    #[serde(default)]
    foreign_artist_id: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Lidarr inventory client.
pub struct LidarrClient {
    client: Client,
    base_url: String,
    api_key: String,
    /// Albums grouped by artist; Lidarr only lists albums in bulk.
    albums: OnceCell<HashMap<String, Vec<InventoryReleaseGroup>>>,
}

impl LidarrClient {
    pub fn new(config: &LidarrConfig) -> Result<Self, InventoryError> {
        let client = Client::builder()
            .user_agent(format!("lidarr-cache-warmer/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| InventoryError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            albums: OnceCell::new(),
        })
    }

    /// GET `resource` under the first API prefix that serves it.
    async fn get_json<T: DeserializeOwned>(&self, resource: &str) -> Result<T, InventoryError> {
        let mut last_error = None;

        for prefix in API_PREFIXES {
            let path = format!("{}/{}", prefix, resource);
            let url = format!("{}{}", self.base_url, path);
            debug!("Lidarr request: {}", url);

            let response = match self
                .client
                .get(&url)
                .header("X-Api-Key", &self.api_key)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!("Lidarr request to {} failed: {}", url, e);
                    last_error = Some(InventoryError::Http(e.to_string()));
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                continue;
            }
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(InventoryError::Unauthorized(status.as_u16()));
            }
            if !status.is_success() {
                last_error = Some(InventoryError::Api {
                    path,
                    status: status.as_u16(),
                });
                continue;
            }

            return response.json::<T>().await.map_err(|e| {
                InventoryError::Parse(format!("Failed to parse {} response: {}", resource, e))
            });
        }

        Err(last_error.unwrap_or_else(|| InventoryError::NoEndpoint(resource.to_string())))
    }

    async fn load_albums(&self) -> Result<HashMap<String, Vec<InventoryReleaseGroup>>, InventoryError> {
        let albums: Vec<LidarrAlbum> = self.get_json("album").await?;
        let mut by_artist: HashMap<String, Vec<InventoryReleaseGroup>> = HashMap::new();
        let mut skipped = 0usize;

        for album in albums {
            let artist_id = album.artist.and_then(|a| non_blank(a.foreign_artist_id));
            match (non_blank(album.foreign_album_id), artist_id) {
                (Some(id), Some(artist_id)) => {
                    by_artist
                        .entry(artist_id)
                        .or_default()
                        .push(InventoryReleaseGroup {
                            id,
                            title: non_blank(album.title),
                        });
                }
                _ => skipped += 1,
            }
        }

        if skipped > 0 {
            debug!("Skipped {} Lidarr albums without MusicBrainz ids", skipped);
        }
        Ok(by_artist)
    }
}

#[async_trait]
impl Inventory for LidarrClient {
    async fn list_artists(&self) -> Result<Vec<InventoryArtist>, InventoryError> {
        let artists: Vec<LidarrArtist> = self.get_json("artist").await?;
        Ok(artists
            .into_iter()
            .filter_map(|a| {
                let id = non_blank(a.foreign_artist_id).or_else(|| non_blank(a.mb_id))?;
                Some(InventoryArtist {
                    id,
                    name: non_blank(a.artist_name),
                })
            })
            .collect())
    }

    async fn list_release_groups(
        &self,
        artist_id: &str,
    ) -> Result<Vec<InventoryReleaseGroup>, InventoryError> {
        let albums = self.albums.get_or_try_init(|| self.load_albums()).await?;
        Ok(albums.get(artist_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubResponse, StubServer};

    fn config(base_url: &str) -> LidarrConfig {
        LidarrConfig {
            base_url: base_url.to_string(),
            api_key: "secret".to_string(),
            verify_ssl: true,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_falls_back_to_next_prefix() {
        let server = StubServer::start(vec![(
            "/api/artist".to_string(),
            StubResponse::json(
                200,
                r#"[{"foreignArtistId":"a1","artistName":"One"},{"artistName":"No Id"},{"mbId":"a2"}]"#,
            ),
        )])
        .await
        .unwrap();

        let client = LidarrClient::new(&config(&server.url())).unwrap();
        let artists = client.list_artists().await.unwrap();

        assert_eq!(
            artists,
            vec![
                InventoryArtist {
                    id: "a1".into(),
                    name: Some("One".into())
                },
                InventoryArtist {
                    id: "a2".into(),
                    name: None
                },
            ]
        );

        let requests = server.requests().await;
        assert_eq!(requests[0].path, "/api/v1/artist");
        assert_eq!(requests[1].path, "/api/artist");
        assert_eq!(requests[1].header("x-api-key"), Some("secret"));
    }

    #[tokio::test]
    async fn test_albums_fetched_once_and_grouped() {
        let server = StubServer::start(vec![(
            "/api/v1/album".to_string(),
            StubResponse::json(
                200,
                r#"[
                    {"foreignAlbumId":"rg1","title":"First","artist":{"foreignArtistId":"a1"}},
                    {"foreignAlbumId":"rg2","title":"","artist":{"foreignArtistId":"a1"}},
                    {"foreignAlbumId":"rg3","title":"Other","artist":{"foreignArtistId":"a2"}},
                    {"foreignAlbumId":"rg4","title":"Orphan"}
                ]"#,
            ),
        )])
        .await
        .unwrap();

        let client = LidarrClient::new(&config(&server.url())).unwrap();
        let a1 = client.list_release_groups("a1").await.unwrap();
        let a2 = client.list_release_groups("a2").await.unwrap();
        let missing = client.list_release_groups("zzz").await.unwrap();

        assert_eq!(a1.len(), 2);
        assert_eq!(a1[1].title, None);
        assert_eq!(a2[0].id, "rg3");
        assert!(missing.is_empty());
        assert_eq!(server.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_is_fatal() {
        let server = StubServer::start(vec![(
            "/api/v1/artist".to_string(),
            StubResponse::json(401, "{}"),
        )])
        .await
        .unwrap();

        let client = LidarrClient::new(&config(&server.url())).unwrap();
        let err = client.list_artists().await.unwrap_err();
        assert!(matches!(err, InventoryError::Unauthorized(401)));
        assert_eq!(server.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_no_endpoint() {
        let server = StubServer::start(Vec::new()).await.unwrap();
        let client = LidarrClient::new(&config(&server.url())).unwrap();
        let err = client.list_artists().await.unwrap_err();
        assert!(matches!(err, InventoryError::NoEndpoint(_)));
    }
}
