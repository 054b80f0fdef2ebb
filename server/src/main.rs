//! litehub binary: thin CLI shell over the [`litehub_server`] library crate.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::info;

use litehub_server::mcp::{run_mcp, McpServer};
use litehub_server::ops::Gateway;
use litehub_server::tools::Registry;
use litehub_server::{load_config, tokenizer};

/// Paginated git and GitHub operations as MCP tools.
#[derive(Parser)]
#[command(name = "litehub", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (default: ./.litehub.toml, then ~/.litehub/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// git executable (overrides config)
    #[arg(long)]
    git_bin: Option<String>,

    /// gh executable (overrides config)
    #[arg(long)]
    gh_bin: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP over stdio (default)
    Serve,
    /// Check the tool registry against the context budget
    Budget {
        /// Token counter: bytes-estimate (default) or tiktoken
        #[arg(long, default_value = "bytes-estimate")]
        tokenizer: String,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn main() {
    // stdout carries JSON-RPC; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("litehub=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Budget { tokenizer: name }) => {
            let tok = tokenizer::create_tokenizer(&name);
            let report = Registry::new().budget(tok.as_ref());
            if report.ok {
                println!("{}", serde_json::json!(report));
            } else {
                println!("{}", report.exceeded_json());
                std::process::exit(1);
            }
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "litehub", &mut std::io::stdout());
        }
        Some(Commands::Serve) | None => {
            let mut config = load_config(cli.config.as_deref());
            if let Some(git_bin) = cli.git_bin {
                config.git_bin = git_bin;
            }
            if let Some(gh_bin) = cli.gh_bin {
                config.gh_bin = gh_bin;
            }
            info!(
                git = config.git_bin.as_str(),
                gh = config.gh_bin.as_str(),
                max_attempts = config.max_attempts,
                "Starting"
            );
            let server = McpServer::new(Gateway::system(&config));
            run_mcp(&server);
        }
    }
}
