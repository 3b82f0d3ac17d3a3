use std::sync::Arc;

use clap::Parser;
use metricat::{
    actors::{AlertHandle, AlertSchedule, ScraperHandle, StorageHandle},
    alerting::{AlertEngine, RuleCache, StoreRuleSource},
    api::{ApiConfig, ApiState, spawn_api_server},
    bus::{InProcessBus, MessageBus},
    config::{Config, read_config_file},
    gateway::Gateway,
    storage::{self, StorageBackend},
};
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("metricat", LevelFilter::TRACE),
        ("metricat_hub", LevelFilter::TRACE),
        ("tower_http", LevelFilter::DEBUG),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;

    let store = storage::open_backend(&config.storage, config.default_user_id).await?;

    if let Some(bootstrap) = &config.bootstrap {
        storage::bootstrap(store.as_ref(), bootstrap).await?;
    }

    let bus = Arc::new(InProcessBus::new(
        config.bus.queue_capacity,
        config.bus.publish_timeout(),
    ));

    let (storage_worker, alert_worker) = dispatch_workers(&config, &store, bus.as_ref()).await?;
    let scrapers = dispatch_scrapers(&config, bus.clone());

    let gateway = Gateway::new(store.clone(), bus.clone()).with_subject(&config.bus.subject);
    let state = ApiState::new(store.clone(), gateway)
        .with_workers(storage_worker.clone(), alert_worker.clone());
    let addr = spawn_api_server(ApiConfig::from(&config.api), state).await?;
    info!("hub ready on {addr}");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    for scraper in &scrapers {
        if let Err(e) = scraper.shutdown().await {
            error!("{}: {e:#}", scraper.name);
        }
    }

    // closing the bus ends both subscriptions, in-flight messages are dropped
    bus.close().await;
    for result in [storage_worker.shutdown().await, alert_worker.shutdown().await] {
        if let Err(e) = result {
            trace!("worker already stopped: {e:#}");
        }
    }

    store.close().await?;

    Ok(())
}

async fn dispatch_workers(
    config: &Config,
    store: &Arc<dyn StorageBackend>,
    bus: &dyn MessageBus,
) -> anyhow::Result<(StorageHandle, AlertHandle)> {
    let storage_worker = StorageHandle::spawn(
        store.clone(),
        bus,
        &config.bus.subject,
        &config.bus.storage_group,
    )
    .await?;

    let engine = AlertEngine::new(RuleCache::new()).with_default_user(config.default_user_id);
    let schedule = AlertSchedule::from(&config.alerting);
    let alert_worker = AlertHandle::spawn(
        engine,
        Arc::new(StoreRuleSource::new(store.clone())),
        bus,
        &config.bus.subject,
        &config.bus.alert_group,
        schedule,
        Some(store.clone()),
    )
    .await?;

    Ok((storage_worker, alert_worker))
}

fn dispatch_scrapers(config: &Config, bus: Arc<InProcessBus>) -> Vec<ScraperHandle> {
    let mut handles = vec![];
    for scraper in &config.scrapers {
        match ScraperHandle::spawn(scraper.clone(), bus.clone(), &config.bus.subject) {
            Ok(handle) => {
                info!("scraping {} from {}", scraper.name, scraper.url);
                handles.push(handle);
            }
            Err(e) => error!("{}: {e:#}", scraper.name),
        }
    }
    handles
}
