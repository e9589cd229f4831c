//! MCP resource implementations.

pub mod registry;
pub mod scene;
pub mod sessions;
pub mod templates;
pub mod timeline;

pub use registry::ResourceRegistry;
