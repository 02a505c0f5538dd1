use anyhow::{bail, Context};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rootwatch::cli::{Cli, Command, CommitTransfersArgs, RelayArgs, VerifyArgs};
use rootwatch::{Config, ReconciliationVerifier, WatcherRegistry, WatcherService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match &cli.env {
        Some(path) => {
            dotenv::from_path(path).with_context(|| format!("loading {}", path.display()))?;
        }
        None => {
            dotenv::dotenv().ok();
        }
    }

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    match cli.command {
        Command::Start(args) => start(config, args.dry).await,
        Command::CommitTransfers(args) => commit_transfers(config, args).await,
        Command::RelayL1ToL2Message(args) => relay_messages(config, args).await,
        Command::VerifyCommits(args) => verify_commits(config, args).await,
    }
}

async fn start(config: Config, dry: bool) -> anyhow::Result<()> {
    if dry {
        warn!("Dry run: no transactions will be sent");
    }

    let service = Arc::new(WatcherService::new(config, dry)?);
    let cancel = service.cancel_token();
    let runner = tokio::spawn(Arc::clone(&service).run());

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("listening for ctrl-c")?;
            service.shutdown();
        }
        _ = cancel.cancelled() => {}
    }

    runner.await.context("watcher service panicked")??;
    Ok(())
}

fn registry(config: &Config, dry: bool) -> anyhow::Result<WatcherRegistry> {
    config.validate()?;
    if !dry && !config.has_signer() {
        bail!(
            "A signer is required unless running dry; set {}",
            rootwatch::config::SIGNER_KEY_ENV
        );
    }

    let gateway = Arc::new(rootwatch::gateway::EvmGateway::from_config(config)?);
    let events = WatcherService::event_source(config)?;
    Ok(WatcherRegistry::build(config, gateway, events, dry)?)
}

async fn commit_transfers(config: Config, args: CommitTransfersArgs) -> anyhow::Result<()> {
    let (source, destination, token) = args.validate()?;
    let registry = registry(&config, args.dry)?;

    let watcher = registry.commit_watcher(source, token)?;
    let decision = watcher.commit_now(destination).await?;

    info!(
        "{} {}→{}: {}",
        token,
        source,
        destination,
        serde_json::to_string(&decision)?
    );
    Ok(())
}

async fn relay_messages(config: Config, args: RelayArgs) -> anyhow::Result<()> {
    let request = args.to_request()?;
    let registry = registry(&config, args.dry)?;

    let watcher = registry.relay_watcher(request.chain, request.token)?;
    let report = watcher.relay_all(&request).await;

    for (tx_hash, outcome) in &report.relayed {
        info!("{}: {}", tx_hash, serde_json::to_string(outcome)?);
    }

    if !report.is_success() {
        bail!("{} of {} relays failed", report.failures.len(), request.tx_hashes.len());
    }
    Ok(())
}

async fn verify_commits(config: Config, args: VerifyArgs) -> anyhow::Result<()> {
    config.validate()?;
    config.ensure_pair(args.chain, args.token)?;

    let verifier = ReconciliationVerifier::new(
        WatcherService::event_source(&config)?,
        config.stall_timeout(),
    );
    let report = verifier.verify(args.chain, args.token).await?;

    for line in report.summary_lines() {
        println!("{}", line);
    }
    Ok(())
}
