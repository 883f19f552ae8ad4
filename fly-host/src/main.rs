// flydrop host: runs one bridge session against an in-memory node until Ctrl+C / SIGTERM.

mod config;
mod node;

use std::path::PathBuf;

use anyhow::{bail, Context};
use fly_bridge::messages::{CommandRequest, CoreEvent, QueryRequest, QueryResponse};
use fly_bridge::Bridge;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    let mut dir_override: Option<PathBuf> = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("fly-host {}", VERSION);
                return Ok(());
            }
            "--dir" => match args.next() {
                Some(d) => dir_override = Some(PathBuf::from(d)),
                None => bail!("--dir needs a path"),
            },
            other => bail!("unknown argument {other:?}"),
        }
    }

    let mut cfg = config::load();
    if let Some(dir) = dir_override {
        cfg.working_dir = dir;
    }
    init_tracing(&cfg.log);

    let rt = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    rt.block_on(run(cfg))
}

async fn run(cfg: config::Config) -> anyhow::Result<()> {
    let native = node::loopback_node(&cfg.node_name, cfg.bridge.naming);
    let bridge = Bridge::initialize(native, &cfg.working_dir, on_event, &cfg.bridge)
        .await
        .with_context(|| format!("initializing bridge in {}", cfg.working_dir.display()))?;
    tracing::info!(dir = %bridge.directory().display(), "bridge ready");

    if let Some(QueryResponse::Conf(conf)) = bridge.query(&QueryRequest::GetConf).await?.ok() {
        tracing::info!(name = %conf.name, id = %conf.id, known = conf.known_peers.len(), "node config");
    }
    bridge
        .command(&CommandRequest::StartDiscovery)
        .await?
        .into_result()
        .context("starting discovery")?;

    shutdown_signal().await?;
    tracing::info!("shutting down");

    if let Err(e) = bridge.command(&CommandRequest::StopDiscovery).await {
        tracing::warn!(error = %e, "stop discovery failed");
    }
    let stats = bridge.event_stats();
    bridge.dispose()?;
    tracing::info!(
        received = stats.received,
        delivered = stats.delivered,
        malformed = stats.malformed,
        "bridge disposed"
    );
    Ok(())
}

async fn on_event(event: CoreEvent) {
    match event {
        CoreEvent::Discovered(peer) => {
            tracing::info!(peer = %peer.id, name = %peer.name, addr = %peer.addr, "peer discovered")
        }
        CoreEvent::AskLaunchUri(peer, session, uri) | CoreEvent::LaunchUri(peer, session, uri) => {
            tracing::info!(%peer, session, %uri, "peer launch request")
        }
        other => tracing::info!(event = ?other, "peer session update"),
    }
}

/// RUST_LOG wins over the configured filter.
fn init_tracing(fallback: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r.context("waiting for Ctrl+C")?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.context("waiting for Ctrl+C")?;
    }
    Ok(())
}
