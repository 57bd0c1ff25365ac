//! 内存曲库（测试与离线模式）
//!
//! 搜索返回预置曲目中名称 / 艺人 / 专辑包含任一查询词的条目（无匹配时返回全部）；
//! 可注入搜索失败；记录每次搜索与创建的歌单，便于断言。

use std::sync::Mutex;

use async_trait::async_trait;

use crate::spotify::{Catalog, CatalogError, CreatedPlaylist, Track};

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    tracks: Vec<Track>,
    search_failure: Option<CatalogError>,
    searches: Mutex<Vec<String>>,
    created: Mutex<Vec<(String, Vec<String>)>>,
}

impl InMemoryCatalog {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self {
            tracks,
            ..Self::default()
        }
    }

    /// 所有搜索都返回给定错误
    pub fn failing_search(mut self, err: CatalogError) -> Self {
        self.search_failure = Some(err);
        self
    }

    /// 少量内置曲目，供离线演示
    pub fn demo() -> Self {
        let t = |name: &str, artist: &str, album: &str, id: &str, date: &str| Track {
            name: name.into(),
            artist: artist.into(),
            album: album.into(),
            uri: format!("spotify:track:{id}"),
            release_date: date.into(),
        };
        Self::new(vec![
            t("Levitating", "Dua Lipa", "Future Nostalgia", "demo01", "2020-03-27"),
            t("Blinding Lights", "The Weeknd", "After Hours", "demo02", "2020-03-20"),
            t("Shake It Off", "Taylor Swift", "1989", "demo03", "2014-10-27"),
            t("Uptown Funk", "Mark Ronson", "Uptown Special", "demo04", "2015-01-12"),
            t("Bohemian Rhapsody", "Queen", "A Night at the Opera", "demo05", "1975-11-21"),
            t("Smells Like Teen Spirit", "Nirvana", "Nevermind", "demo06", "1991-09-24"),
            t("So What", "Miles Davis", "Kind of Blue", "demo07", "1959-08-17"),
            t("Take Five", "The Dave Brubeck Quartet", "Time Out", "demo08", "1959-12-14"),
        ])
    }

    pub fn searches(&self) -> Vec<String> {
        self.searches.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// 已创建的歌单：(名称, URI 列表)
    pub fn created_playlists(&self) -> Vec<(String, Vec<String>)> {
        self.created.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>, CatalogError> {
        if let Ok(mut s) = self.searches.lock() {
            s.push(query.to_string());
        }
        if let Some(err) = &self.search_failure {
            return Err(err.clone());
        }
        let words: Vec<String> = query
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect();
        let matches: Vec<Track> = self
            .tracks
            .iter()
            .filter(|t| {
                let hay = format!("{} {} {}", t.name, t.artist, t.album).to_lowercase();
                words.iter().any(|w| hay.contains(w.as_str()))
            })
            .cloned()
            .collect();
        let pool = if matches.is_empty() { self.tracks.clone() } else { matches };
        Ok(pool.into_iter().take(limit).collect())
    }

    async fn create_playlist(
        &self,
        name: &str,
        _description: &str,
        uris: &[String],
    ) -> Result<CreatedPlaylist, CatalogError> {
        let id = {
            let mut created = self
                .created
                .lock()
                .map_err(|_| CatalogError::Request("catalog state poisoned".into()))?;
            created.push((name.to_string(), uris.to_vec()));
            format!("playlist{}", created.len())
        };
        Ok(CreatedPlaylist {
            url: Some(format!("https://open.spotify.com/playlist/{id}")),
            id,
            name: name.to_string(),
            track_count: uris.len(),
        })
    }
}
