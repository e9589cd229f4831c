//! Store Counter MCP Server: occupancy counting sessions over JSON-RPC.

pub mod config;
pub mod prompts;
pub mod protocol;
pub mod repl;
pub mod replay;
pub mod resources;
pub mod session;
pub mod tools;
pub mod transport;
pub mod types;

pub use config::{load_engine_config, resolve_config_path};
pub use protocol::ProtocolHandler;
pub use replay::{replay_file, replay_reader, ReplayReport};
pub use transport::StdioTransport;
