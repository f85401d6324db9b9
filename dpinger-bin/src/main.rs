use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures::TryStreamExt;
use tracing::{debug, error, info, warn};

mod logging;
mod startup_health;

use dpinger_config::AppConfig;
use dpinger_icmp::IcmpEngine;
use dpinger_inventory::{Channel, HostRegistry, NatsClient, Reconciler, decode_and_reconcile, sync_request};
use startup_health::verify_background_task_running;

/// distributed ICMP reachability prober
#[derive(Debug, Parser)]
#[command(name = "dpinger")]
struct Cli {
    /// path to the TOML config file
    #[arg(short = 'c', long = "config", default_value = "./dpinger.toml")]
    config: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // config load failures print to stderr; the logger isn't up yet (§7 "ConfigError").
    let config = AppConfig::parse(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    let _log_guards = logging::init(&config.log).context("failed to initialize logging")?;
    debug!(?config, "loaded config");

    let rt = tokio::runtime::Builder::new_multi_thread()
        .thread_name("dpinger")
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    rt.block_on(run(config))
}

async fn run(config: AppConfig) -> Result<()> {
    let engine = Arc::new(IcmpEngine::new().context("failed to initialize ICMP engine")?);
    let registry = Arc::new(HostRegistry::new());

    let bus = NatsClient::new(&config.nats);
    bus.connect().await.context("failed to connect to NATS")?;

    let reconciler = Arc::new(Reconciler::new(
        engine.clone(),
        registry.clone(),
        bus.clone(),
        config.probes,
        config.default_ping_interval_sec,
    ));

    let mut stream = bus
        .subscribe_db()
        .await
        .context("failed to subscribe to db channel")?;

    let sub_reconciler = reconciler.clone();
    let mut sub_task = tokio::spawn(async move {
        loop {
            match stream.try_next().await {
                Ok(Some(message)) => {
                    // hand the message to its own task so decoding message N+1
                    // never waits on message N's ack round-trip (§4.6, §5).
                    let reconciler = sub_reconciler.clone();
                    tokio::spawn(async move {
                        decode_and_reconcile(&reconciler, &message.payload);
                        if let Err(err) = message.ack().await {
                            warn!(?err, "failed to ack db message");
                        }
                    });
                }
                Ok(None) => {
                    info!("db subscription stream closed");
                    break;
                }
                Err(err) => {
                    error!(?err, "error reading from db subscription");
                }
            }
        }
    });

    // keep the process's exit code fatal-startup-only: a subscription that
    // dies in its first moments means the reconciler will never run (§7).
    verify_background_task_running("db subscription", &mut sub_task)
        .await
        .context("db subscription failed startup check")?;

    info!("requesting initial catalog snapshot");
    if let Err(err) = bus.publish(Channel::Db, sync_request()?).await {
        warn!(?err, "failed to publish initial sync request");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received, exiting");

    sub_task.abort();
    bus.disconnect().await;

    Ok(())
}
