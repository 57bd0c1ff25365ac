//! 曲库层：曲目模型、Catalog 抽象、Spotify Web API 客户端与内存实现

pub mod catalog;
pub mod client;
pub mod mock;
pub mod track;

pub use catalog::{Catalog, CatalogError, CreatedPlaylist};
pub use client::SpotifyClient;
pub use mock::InMemoryCatalog;
pub use track::{collect_tracks, dedup_by_uri, filter_by_year, tracks_from_value, Track};
