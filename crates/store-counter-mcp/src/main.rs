//! Store Counter MCP Server: entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use store_counter::{BucketLogReader, SessionRegistry};
use store_counter_mcp::config::load_engine_config;
use store_counter_mcp::protocol::ProtocolHandler;
use store_counter_mcp::replay::replay_file;
use store_counter_mcp::tools::ToolRegistry;
use store_counter_mcp::transport::StdioTransport;

#[derive(Parser)]
#[command(
    name = "store-counter-mcp",
    about = "MCP server for Store Counter: live people counts, demographics and a scrubbable timeline",
    version
)]
struct Cli {
    /// Path to an engine config JSON file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Directory for .occl bucket logs. Also reads STORE_COUNTER_LOG_DIR.
    #[arg(long, global = true)]
    log_dir: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server over stdio (default).
    Serve,

    /// Start MCP server over HTTP, with live scene streams at /sessions/{id}/live.
    #[cfg(feature = "sse")]
    ServeHttp {
        /// Listen address (host:port).
        #[arg(long, default_value = "127.0.0.1:3200")]
        addr: String,

        /// Bearer token for authentication.
        /// Also reads from STORE_COUNTER_TOKEN env var.
        #[arg(long)]
        token: Option<String>,

        /// Enable multi-tenant mode (one session registry per X-User-ID).
        #[arg(long)]
        multi_tenant: bool,
    },

    /// Replay a JSONL detection file through a fresh session and print the report.
    Replay {
        /// File with one detection object per line.
        file: PathBuf,

        /// Include the per-bucket present-count series.
        #[arg(long)]
        timeline: bool,
    },

    /// Validate an .occl bucket log.
    Validate {
        /// Path to the .occl file.
        file: PathBuf,
    },

    /// Print server capabilities as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   store-counter-mcp completions bash > ~/.local/share/bash-completion/completions/store-counter-mcp
    ///   store-counter-mcp completions zsh > ~/.zfunc/_store-counter-mcp
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },

    /// Launch interactive REPL mode.
    Repl,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let config = load_engine_config(cli.config.as_deref(), cli.log_dir.as_deref())?;
            let registry = Arc::new(SessionRegistry::new(config)?);
            let handler = ProtocolHandler::new(registry);
            let transport = StdioTransport::new(handler);
            transport.run().await?;
        }

        #[cfg(feature = "sse")]
        Commands::ServeHttp {
            addr,
            token,
            multi_tenant,
        } => {
            use store_counter_mcp::session::TenantRegistry;
            use store_counter_mcp::transport::sse::{ServerMode, SseTransport};
            use tokio::sync::Mutex;

            // CLI flag > env var
            let effective_token = token.or_else(|| std::env::var("STORE_COUNTER_TOKEN").ok());
            let config = load_engine_config(cli.config.as_deref(), cli.log_dir.as_deref())?;

            let server_mode = if multi_tenant {
                tracing::info!("Store Counter MCP server (multi-tenant)");
                if let Some(dir) = &config.log_dir {
                    tracing::info!("Log dir: {}", dir.display());
                }
                ServerMode::MultiTenant {
                    registry: Arc::new(Mutex::new(TenantRegistry::new(config))),
                }
            } else {
                tracing::info!("Store Counter MCP server");
                let registry = Arc::new(SessionRegistry::new(config)?);
                ServerMode::Single(Arc::new(ProtocolHandler::new(registry)))
            };

            if effective_token.is_some() {
                tracing::info!("Auth: bearer token required");
            }

            let transport = SseTransport::with_config(effective_token, server_mode);
            transport.run(&addr).await?;
        }

        Commands::Replay { file, timeline } => {
            let config = load_engine_config(cli.config.as_deref(), cli.log_dir.as_deref())?;
            let registry = SessionRegistry::new(config)?;
            let report = replay_file(&registry, &file)?;

            let mut output = serde_json::json!({
                "report": report,
                "demographics": report.summary.totals.breakdown(),
            });
            if timeline {
                let session = registry.get(report.summary.session_id)?;
                output["timeline"] = serde_json::json!(session.query().timeline_counts());
            }
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Commands::Validate { file } => match BucketLogReader::read_from_file(&file) {
            Ok(log) => {
                if let Err(e) = log.verify() {
                    eprintln!("Invalid bucket log: {e}");
                    std::process::exit(1);
                }
                println!("Valid bucket log: {}", file.display());
                println!("  Session: {}", log.header.session_id);
                println!("  Window:  {}ms", log.header.window_ms);
                println!("  Buckets: {}", log.records.len());
                if log.truncated {
                    println!("  Warning: truncated tail record ignored");
                }
            }
            Err(e) => {
                eprintln!("Invalid bucket log: {e}");
                std::process::exit(1);
            }
        },

        Commands::Info => {
            let capabilities = store_counter_mcp::types::InitializeResult::default_result();
            let tools = ToolRegistry::list_tools();
            let info = serde_json::json!({
                "server": capabilities.server_info,
                "protocol_version": capabilities.protocol_version,
                "capabilities": capabilities.capabilities,
                "tools": tools.iter().map(|t| &t.name).collect::<Vec<_>>(),
                "tool_count": tools.len(),
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "store-counter-mcp", &mut std::io::stdout());
        }

        Commands::Repl => {
            let config = load_engine_config(cli.config.as_deref(), cli.log_dir.as_deref())?;
            store_counter_mcp::repl::run(config)?;
        }
    }

    Ok(())
}
