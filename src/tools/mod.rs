//! 工具层：注册表、输入 schema、四个曲库 / 记忆工具与带审计的执行器

pub mod executor;
pub mod memory;
pub mod registry;
pub mod save;
pub mod schema;
pub mod search;

use std::sync::Arc;

use crate::spotify::Catalog;
use crate::store::SessionMemory;

pub use executor::ToolExecutor;
pub use memory::{CommitPlaylistTool, ReadPlaylistTool, COMMIT_TOOL, READ_TOOL};
pub use registry::{parse_args, Tool, ToolError, ToolRegistry};
pub use save::{SaveToSpotifyTool, SAVE_TOOL};
pub use search::{SearchTool, SEARCH_TOOL};

/// 固定工具集：search / commit / read / save
pub fn default_registry(
    catalog: Arc<dyn Catalog>,
    memory: SessionMemory,
    search_limit: usize,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(SearchTool::new(catalog.clone()).with_default_limit(search_limit));
    registry.register(CommitPlaylistTool::new(memory.clone()));
    registry.register(ReadPlaylistTool::new(memory));
    registry.register(SaveToSpotifyTool::new(catalog));
    registry
}
