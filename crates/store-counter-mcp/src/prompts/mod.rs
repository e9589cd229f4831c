//! MCP prompt implementations.

pub mod registry;
pub mod report;
pub mod scrub;

pub use registry::PromptRegistry;
