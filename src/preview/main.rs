use anyhow::Result;
use clap::Parser;

#[path = "../shared/mod.rs"]
mod shared;
#[path = "mod.rs"]
mod preview;

use shared::config::PreviewConfig;

#[derive(Parser)]
#[command(name = "tsbx-preview")]
#[command(about = "TaskSandbox Preview - resolve and preview sandbox file attachments")]
struct Args {
    /// Backend API URL (overrides the config file)
    #[arg(long, env = "TSBX_BACKEND_URL")]
    backend_url: Option<String>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: preview::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, config_path) = PreviewConfig::load_default()?;
    if let Some(url) = args.backend_url {
        config.backend_url = url.trim().trim_end_matches('/').to_string();
    }

    let level = if args.verbose { "debug" } else { "info" };
    let _guards = shared::logging::init_service_logging(&config.log_dir, "tsbx_preview", level)?;
    tracing::debug!("Config path: {}", config_path.display());

    if let Err(e) = preview::run(config, args.command).await {
        tracing::error!("tsbx-preview failed: {}", e);
        return Err(e);
    }

    Ok(())
}
