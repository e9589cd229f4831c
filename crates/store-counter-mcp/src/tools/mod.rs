//! MCP tool implementations.

pub mod detection_ingest;
pub mod registry;
pub mod scene_at;
pub mod scene_current;
pub mod scene_totals;
pub mod session_end;
pub mod session_list;
pub mod session_start;
pub mod timeline_query;
pub mod timeline_scrub;

pub use registry::ToolRegistry;
