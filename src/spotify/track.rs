//! 曲目：以 URI 唯一标识；任何曲目列表合并都按 URI 去重并保留首次出现顺序

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub release_date: String,
}

impl Track {
    /// 发行年份（release_date 前四位，可能只有年份）
    pub fn release_year(&self) -> Option<i32> {
        self.release_date.get(..4)?.parse().ok()
    }
}

/// 按 URI 去重，保留首次出现顺序；空 URI 的曲目丢弃
pub fn dedup_by_uri(tracks: impl IntoIterator<Item = Track>) -> Vec<Track> {
    let mut seen = HashSet::new();
    tracks
        .into_iter()
        .filter(|t| !t.uri.is_empty() && seen.insert(t.uri.clone()))
        .collect()
}

/// 只保留发行年份不晚于 `max_year` 的曲目；年份无法解析的丢弃
pub fn filter_by_year(tracks: Vec<Track>, max_year: i32) -> Vec<Track> {
    tracks
        .into_iter()
        .filter(|t| t.release_year().is_some_and(|y| y <= max_year))
        .collect()
}

/// 从 JSON 值中宽松解析曲目列表：数组中无法解析的元素跳过
pub fn tracks_from_value(value: &Value) -> Vec<Track> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect(),
        Value::Object(obj) => obj.get("tracks").map(tracks_from_value).unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// 汇总一组工具结果中的全部曲目（按结果顺序），并按 URI 去重
pub fn collect_tracks<'a>(results: impl IntoIterator<Item = &'a Value>) -> Vec<Track> {
    let all = results
        .into_iter()
        .filter_map(|r| r.get("tracks"))
        .flat_map(tracks_from_value);
    dedup_by_uri(all)
}
