use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use upload_notifier::{AppConfig, Resolution, Secrets, SourceOutcome, UploadNotifier};

#[derive(Debug, Parser)]
#[command(name = "upload-notifier", version, about = "Posts new channel uploads to chat, once each")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "NOTIFIER_CONFIG", default_value = "notifier.toml")]
    config: PathBuf,

    /// Log notifications instead of posting them; nothing is recorded
    #[arg(long)]
    dry_run: bool,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true)]
    youtube_api_key: Option<String>,

    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    discord_token: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll on the configured interval until interrupted (default)
    Run,
    /// Run a single poll cycle and print what happened
    Once,
    /// Look up the channel ID for a handle or channel URL
    Resolve { handle: String },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    let secrets = Secrets {
        youtube_api_key: cli.youtube_api_key.clone(),
        discord_token: cli.discord_token.clone(),
    };

    let notifier = UploadNotifier::from_config(&config, &secrets, cli.dry_run)
        .await
        .context("starting upload notifier")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(notifier).await,
        Command::Once => once(notifier).await,
        Command::Resolve { handle } => resolve(notifier, &handle).await,
    }
}

async fn run(notifier: UploadNotifier) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut scheduler = notifier.start(shutdown_rx);

    tokio::select! {
        result = &mut scheduler => {
            return result.context("scheduler task failed")?.context("scheduler stopped");
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("Could not listen for Ctrl-C: {}", e);
            }
            info!("Shutdown requested, waiting for the current cycle to finish");
        }
    }

    let _ = shutdown_tx.send(true);
    match scheduler.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e).context("scheduler stopped with an error"),
        Err(e) => {
            error!("Scheduler task ended abnormally: {}", e);
            Err(e.into())
        }
    }
}

async fn once(notifier: UploadNotifier) -> Result<()> {
    let report = notifier.check_now().await.context("poll cycle failed")?;
    for entry in &report.sources {
        let detail = match &entry.outcome {
            SourceOutcome::Notified { item_id, destination } => format!("{} -> {}", item_id, destination),
            SourceOutcome::NoNewItem { item_id: Some(id) } => format!("latest {}", id),
            SourceOutcome::NoNewItem { item_id: None } => "no videos".to_string(),
            SourceOutcome::NotifyFailed { item_id, reason, recorded, .. } => {
                format!("{}: {} (recorded: {})", item_id, reason, recorded)
            }
            SourceOutcome::FetchFailed { stage, reason } => format!("{}: {}", stage, reason),
            SourceOutcome::StoreFailed { item_id, reason } => format!("{}: {}", item_id, reason),
            SourceOutcome::Skipped => String::new(),
        };
        println!("{:<28} {:<24} {}", entry.source, entry.outcome.kind(), detail);
    }
    println!("{}", report.summary());
    Ok(())
}

async fn resolve(notifier: UploadNotifier, handle: &str) -> Result<()> {
    match notifier.resolve(handle).await? {
        Resolution::Resolved(id) => println!("{}", id),
        Resolution::NotFound => anyhow::bail!("no channel found for {}", handle),
    }
    Ok(())
}
