use std::sync::Arc;

use eyre::WrapErr;
use tokio::select;
use tokio::signal::unix;
use tokio::signal::unix::SignalKind;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{filter::Targets, layer::Layer, prelude::*, util::SubscriberInitExt};

use flokiseed_dns::{CloudflareSink, RecordAction, RecordMessage, RecordWorker};

use crate::{
    cli::{arguments, seeder::Seeder},
    config::{LoggerConfig, SeederConfig},
};

pub async fn run(args: arguments::Run) -> eyre::Result<()> {
    let config = SeederConfig::from_path(args.config)?;
    init_tracing(&config.logger)?;

    let seeder = Seeder::new(config).await?;
    seeder.run();

    let mut sigterm =
        unix::signal(SignalKind::terminate()).expect("Failed to create SIGTERM signal handler");
    let mut sigint =
        unix::signal(SignalKind::interrupt()).expect("Failed to create SIGINT signal handler");

    select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM signal");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT signal");
        }
    }

    seeder.shutdown().await;

    Ok(())
}

/// Ad-hoc record maintenance: feed one message per address through the
/// sequential record worker and exit once the queue is drained.
pub async fn records(args: arguments::Records) -> eyre::Result<()> {
    let config = SeederConfig::from_path(args.config)?;
    init_tracing(&config.logger)?;

    let sink = Arc::new(
        CloudflareSink::new(&config.dns.api_token, &config.dns.hostname)
            .await
            .wrap_err("failed to initialize the DNS backend")?,
    );

    let (tx, rx) = flume::bounded(64);
    let worker = RecordWorker::new(sink, rx);
    let handle = tokio::spawn(worker.run(CancellationToken::new()));

    let (action, ips) = match args.command {
        arguments::RecordCommand::Add { ips } => (RecordAction::Add, ips),
        arguments::RecordCommand::Delete { ips } => (RecordAction::Delete, ips),
    };

    for ip in ips {
        tx.send_async(RecordMessage {
            domain: config.dns.hostname.clone(),
            ip,
            action,
        })
        .await
        .map_err(|_| eyre::eyre!("record worker stopped early"))?;
    }

    // The worker drains the queue and stops once the sender is gone.
    drop(tx);
    handle.await.wrap_err("record worker failed")?;

    Ok(())
}

fn init_tracing(logger: &LoggerConfig) -> eyre::Result<()> {
    let mut filter = Targets::new()
        .with_target("flokiseedd", logger.level)
        .with_target("flokiseed_book", logger.level)
        .with_target("flokiseed_crawler", logger.level)
        .with_target("flokiseed_dns", logger.level)
        .with_target("flokiseed_peer", logger.level)
        .with_default(logger.level);

    for (target, level) in logger.target_overrides()? {
        filter = filter.with_target(target, level);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter))
        .try_init()?;

    Ok(())
}
