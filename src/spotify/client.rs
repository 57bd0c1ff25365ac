//! Spotify Web API 客户端
//!
//! 使用调用方提供的 Bearer 令牌（OAuth 流程不在本 crate 内）；GET /search 取曲目，
//! GET /me 取用户 id，POST /users/{id}/playlists 建歌单，POST /playlists/{id}/tracks 每批 100 条加曲目。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::spotify::{Catalog, CatalogError, CreatedPlaylist, Track};

/// 单次加曲目请求的上限（Spotify API 限制）
const ADD_ITEMS_BATCH: usize = 100;
/// 单次搜索请求的上限（Spotify API 限制）
const SEARCH_MAX_LIMIT: usize = 50;

pub struct SpotifyClient {
    client: Client,
    api_base: String,
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    tracks: TrackPage,
}

#[derive(Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<TrackItem>,
}

#[derive(Deserialize)]
struct TrackItem {
    name: String,
    uri: String,
    #[serde(default)]
    artists: Vec<NamedItem>,
    album: AlbumItem,
}

#[derive(Deserialize)]
struct NamedItem {
    name: String,
}

#[derive(Deserialize)]
struct AlbumItem {
    name: String,
    #[serde(default)]
    release_date: String,
}

#[derive(Deserialize)]
struct UserProfile {
    id: String,
}

#[derive(Deserialize)]
struct PlaylistObject {
    id: String,
    name: String,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Deserialize, Default)]
struct ExternalUrls {
    spotify: Option<String>,
}

impl From<TrackItem> for Track {
    fn from(item: TrackItem) -> Self {
        Track {
            name: item.name,
            uri: item.uri,
            artist: item
                .artists
                .into_iter()
                .next()
                .map(|a| a.name)
                .unwrap_or_default(),
            album: item.album.name,
            release_date: item.album.release_date,
        }
    }
}

impl SpotifyClient {
    /// `timeout_secs` 为 0 时不设超时
    pub fn new(
        api_base: impl Into<String>,
        access_token: Option<String>,
        timeout_secs: u64,
    ) -> Self {
        let mut builder =
            Client::builder().user_agent(concat!("sporky/", env!("CARGO_PKG_VERSION")));
        if timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(timeout_secs));
        }
        let client = builder.build().unwrap_or_default();
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            access_token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    fn authorized(&self, req: RequestBuilder) -> Result<RequestBuilder, CatalogError> {
        let token = self
            .access_token
            .as_deref()
            .ok_or_else(|| {
                CatalogError::Unauthorized("no Spotify access token configured".into())
            })?;
        Ok(req.bearer_auth(token))
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        req: RequestBuilder,
    ) -> Result<T, CatalogError> {
        let resp = self
            .authorized(req)?
            .send()
            .await
            .map_err(|e| CatalogError::Request(e.to_string()))?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(CatalogError::Unauthorized("access token rejected".into()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CatalogError::Http {
                status: status.as_u16(),
                body,
            });
        }
        resp.json::<T>()
            .await
            .map_err(|e| CatalogError::Decode(e.to_string()))
    }

    async fn current_user_id(&self) -> Result<String, CatalogError> {
        let profile: UserProfile = self.send_json(self.client.get(self.url("me"))).await?;
        Ok(profile.id)
    }
}

#[async_trait]
impl Catalog for SpotifyClient {
    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>, CatalogError> {
        let limit = limit.clamp(1, SEARCH_MAX_LIMIT);
        tracing::info!(query = %query, limit, "spotify search");
        let limit_param = limit.to_string();
        let req = self.client.get(self.url("search")).query(&[
            ("q", query),
            ("type", "track"),
            ("limit", limit_param.as_str()),
        ]);
        let resp: SearchResponse = self.send_json(req).await?;
        Ok(resp.tracks.items.into_iter().map(Track::from).collect())
    }

    async fn create_playlist(
        &self,
        name: &str,
        description: &str,
        uris: &[String],
    ) -> Result<CreatedPlaylist, CatalogError> {
        let user_id = self.current_user_id().await?;
        tracing::info!(
            user = %user_id,
            name = %name,
            tracks = uris.len(),
            "spotify create playlist"
        );

        let req = self
            .client
            .post(self.url(&format!("users/{user_id}/playlists")))
            .json(&json!({ "name": name, "description": description, "public": true }));
        let playlist: PlaylistObject = self.send_json(req).await?;

        for batch in uris.chunks(ADD_ITEMS_BATCH) {
            let req = self
                .client
                .post(self.url(&format!("playlists/{}/tracks", playlist.id)))
                .json(&json!({ "uris": batch }));
            let _: serde_json::Value = self.send_json(req).await?;
        }

        Ok(CreatedPlaylist {
            id: playlist.id,
            name: playlist.name,
            url: playlist.external_urls.spotify,
            track_count: uris.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_item_conversion() {
        let item: TrackItem = serde_json::from_value(json!({
            "name": "Song",
            "uri": "spotify:track:1",
            "artists": [{"name": "First"}, {"name": "Second"}],
            "album": {"name": "Album", "release_date": "1999-03-01"}
        }))
        .unwrap();
        let track = Track::from(item);
        assert_eq!(track.artist, "First");
        assert_eq!(track.album, "Album");
        assert_eq!(track.release_year(), Some(1999));
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let client = SpotifyClient::new("http://127.0.0.1:9", None, 1);
        let err = client.search_tracks("rock", 5).await.unwrap_err();
        assert!(matches!(err, CatalogError::Unauthorized(_)));
    }

    #[test]
    fn test_url_join() {
        let client = SpotifyClient::new("https://api.spotify.com/v1/", None, 1);
        assert_eq!(client.url("/search"), "https://api.spotify.com/v1/search");
    }
}
