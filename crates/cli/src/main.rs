//! DashLens CLI
//!
//! Main entry point for the dashlens command-line tool.
//! Refreshes dashboard contexts and picks the ones relevant to a question.

mod commands;

use clap::{Parser, Subcommand};
use commands::{IndexCommand, RefreshCommand, SelectCommand, StatusCommand};
use dashlens_context::ContextSystem;
use dashlens_core::{config::AppConfig, logging, AppResult, LogFormat};
use std::path::PathBuf;

/// DashLens - context cache and relevance retrieval for BI dashboards
#[derive(Parser, Debug)]
#[command(name = "dashlens")]
#[command(about = "Context cache and relevance retrieval for BI dashboards", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "DASHLENS_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "DASHLENS_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Log line format (text, json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// LLM provider used for ranking (ollama, openai)
    #[arg(short, long, global = true, env = "DASHLENS_RANKING_PROVIDER")]
    provider: Option<String>,

    /// Ranking model identifier
    #[arg(short, long, global = true, env = "DASHLENS_RANKING_MODEL")]
    model: Option<String>,

    /// Days before a dashboard context expires
    #[arg(long, global = true, env = "DASHLENS_TTL_DAYS")]
    ttl_days: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Regenerate expired dashboard contexts
    Refresh(RefreshCommand),

    /// Pick the dashboards most relevant to a question
    Select(SelectCommand),

    /// Show cache and index status
    Status(StatusCommand),

    /// Vector index maintenance
    Index(IndexCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse();

    // The workspace decides which config file is read
    let config = AppConfig::load_for(cli.workspace.clone(), cli.config.clone())?;

    let mut config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.ttl_days,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }

    logging::init_logging(
        config.log_level.as_deref(),
        config.no_color,
        config.log_format,
    )?;
    config.validate()?;

    tracing::info!("DashLens starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!(
        "Embeddings: {}/{}",
        config.embedding.provider,
        config.embedding.model
    );
    tracing::debug!("Ranking: {}/{}", config.ranking.provider, config.ranking.model);

    config.ensure_state_dir()?;

    let command_name = match &cli.command {
        Commands::Refresh(_) => "refresh",
        Commands::Select(_) => "select",
        Commands::Status(_) => "status",
        Commands::Index(_) => "index",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let system = ContextSystem::from_config(&config).await?;

    let result = match cli.command {
        Commands::Refresh(cmd) => cmd.execute(system).await,
        Commands::Select(cmd) => cmd.execute(&system).await,
        Commands::Status(cmd) => cmd.execute(&system).await,
        Commands::Index(cmd) => cmd.execute(&system).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
