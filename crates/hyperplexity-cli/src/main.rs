//! Hyperplexity CLI: MCP server for AI table validation.
//!
//! With no subcommand (or `serve`) the binary speaks MCP over stdio. The
//! other subcommands call the same adapter directly, which is handy for
//! checking credentials or inspecting a job from a terminal.

use clap::{Parser, Subcommand};
use hyperplexity_cli::commands;
use hyperplexity_core::adapter::GetUsageRequest;
use hyperplexity_core::ClientConfig;

/// Hyperplexity MCP server and CLI
#[derive(Parser)]
#[command(
    name = "mcp-server-hyperplexity",
    version,
    about = "Hyperplexity MCP server for AI table validation over stdio"
)]
pub struct Cli {
    /// Hyperplexity API key (hpx_live_...)
    #[arg(long, env = "HYPERPLEXITY_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// API base URL
    #[arg(long, env = "HYPERPLEXITY_API_URL")]
    api_url: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HYPERPLEXITY_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP over stdio (default)
    Serve,

    /// List the tools the server exposes
    Tools,

    /// Show the account credit balance
    Balance,

    /// Show API usage history
    Usage {
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<String>,
        /// Last day (YYYY-MM-DD)
        #[arg(long)]
        end_date: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        offset: Option<u32>,
    },

    /// Inspect jobs
    Job {
        #[command(subcommand)]
        action: JobAction,
    },

    /// Call any tool by name with JSON arguments
    Call {
        /// Tool name (e.g. "get_job_status")
        #[arg(long)]
        tool: String,
        /// Tool arguments as a JSON string
        #[arg(long, default_value = "{}")]
        args: String,
    },
}

#[derive(Subcommand)]
enum JobAction {
    /// One-shot job status
    Status {
        /// Job ID
        job_id: String,
    },
    /// Progress messages
    Messages {
        /// Job ID
        job_id: String,
        /// Only messages after this sequence number
        #[arg(long)]
        since_seq: Option<i64>,
        /// Keep polling until the job finishes
        #[arg(long, short = 'f')]
        follow: bool,
        /// Poll interval in seconds (with --follow)
        #[arg(long, default_value_t = 15)]
        interval: u64,
    },
    /// Block until the job needs attention
    Wait {
        /// Job ID
        job_id: String,
        #[arg(long)]
        timeout_seconds: Option<u64>,
        #[arg(long)]
        poll_interval: Option<u64>,
    },
    /// Results of a completed job
    Results {
        /// Job ID
        job_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr: stdout carries MCP frames or command output.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "hyperplexity_core=warn,hyperplexity_mcp=info,hyperplexity_cli=info".into()
            }),
        )
        .init();

    let command = cli.command.unwrap_or(Commands::Serve);
    let result = match command {
        Commands::Tools => commands::call::tools(),
        command => match ClientConfig::resolve(cli.api_key, cli.api_url, cli.timeout_secs) {
            Ok(config) => execute(&config, command).await,
            Err(e) => Err(e.to_string()),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn execute(config: &ClientConfig, command: Commands) -> Result<(), String> {
    if let Commands::Serve = command {
        return commands::serve::run(config).await;
    }

    let adapter = commands::init_adapter(config)?;
    match command {
        Commands::Balance => commands::account::balance(&adapter).await,
        Commands::Usage {
            start_date,
            end_date,
            limit,
            offset,
        } => {
            let req = GetUsageRequest {
                start_date,
                end_date,
                limit,
                offset,
            };
            commands::account::usage(&adapter, req).await
        }
        Commands::Job { action } => match action {
            JobAction::Status { job_id } => commands::job::status(&adapter, &job_id).await,
            JobAction::Messages {
                job_id,
                since_seq,
                follow,
                interval,
            } => commands::job::messages(&adapter, &job_id, since_seq, follow, interval).await,
            JobAction::Wait {
                job_id,
                timeout_seconds,
                poll_interval,
            } => commands::job::wait(&adapter, &job_id, timeout_seconds, poll_interval).await,
            JobAction::Results { job_id } => commands::job::results(&adapter, &job_id).await,
        },
        Commands::Call { tool, args } => commands::call::call(&adapter, &tool, &args).await,
        Commands::Serve | Commands::Tools => Ok(()),
    }
}
