use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use metricat::{
    agent::{IngestClient, SystemSampler},
    exposition::{parse_exposition, render_exposition},
    util::{get_agent_addr, get_agent_port, unix_now},
};
use rocket::{State, figment::Figment, get, http::ContentType, routes};
use sysinfo::System;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

type SharedSampler = Arc<Mutex<SystemSampler>>;

#[derive(Debug, Clone, Parser)]
struct Args {
    /// API key for the ingest endpoint; pushing is disabled without one
    #[arg(long)]
    key: Option<String>,

    /// Ingest endpoint of the hub
    #[arg(long, default_value = "http://127.0.0.1:8080/api/ingest")]
    ingest: String,

    /// Seconds between pushes
    #[arg(long, default_value_t = 5)]
    interval: u64,

    /// Name of this agent in logs (defaults to the host name)
    #[arg(long)]
    name: Option<String>,

    /// Port of the local /metrics feed (overrides AGENT_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Additional exposition feed whose samples are pushed along
    #[arg(long)]
    scrape: Option<String>,
}

#[get("/metrics")]
#[instrument(skip_all)]
async fn metrics(sampler: &State<SharedSampler>) -> (ContentType, String) {
    let series = sampler.lock().await.sample(unix_now());
    (ContentType::Plain, render_exposition(&series))
}

#[get("/ping")]
fn ping() {}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("metricat", LevelFilter::TRACE),
        ("metricat_agent", LevelFilter::TRACE),
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

fn get_config(port: Option<u16>) -> Figment {
    rocket::Config::figment()
        .merge(("port", port.unwrap_or_else(get_agent_port)))
        .merge(("address", get_agent_addr()))
        .merge(("workers", 1))
}

#[instrument(skip_all, fields(agent = %name))]
async fn push_loop(
    name: String,
    client: IngestClient,
    sampler: SharedSampler,
    scrape: Option<String>,
    interval: Duration,
) {
    let http = reqwest::Client::new();
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        let mut series = sampler.lock().await.sample(unix_now());

        if let Some(url) = &scrape {
            match scrape_feed(&http, url).await {
                Ok(scraped) => series.extend(scraped),
                Err(e) => warn!("{url}: {e:#}"),
            }
        }

        let total = series.len();
        let accepted = client.push_all(&series).await;
        debug!("pushed {accepted}/{total} samples");
    }
}

async fn scrape_feed(
    http: &reqwest::Client,
    url: &str,
) -> anyhow::Result<Vec<metricat::TimeSeries>> {
    let response = http
        .get(url)
        .timeout(Duration::from_secs(2))
        .send()
        .await
        .context("request failed")?
        .error_for_status()?;
    let body = response.bytes().await.context("failed to read body")?;

    trace!("{url}: scraped {} bytes", body.len());
    Ok(parse_exposition(Cursor::new(body), unix_now())?)
}

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let name = args
        .name
        .clone()
        .or_else(System::host_name)
        .unwrap_or_else(|| String::from("unknown"));

    let sampler: SharedSampler = Arc::new(Mutex::new(SystemSampler::new()));

    match &args.key {
        Some(key) => {
            let client = IngestClient::new(&args.ingest, key)?;
            info!("{name}: pushing to {} every {}s", args.ingest, args.interval);
            tokio::spawn(push_loop(
                name.clone(),
                client,
                sampler.clone(),
                args.scrape.clone(),
                Duration::from_secs(args.interval.max(1)),
            ));
        }
        None => info!("{name}: no API key given, serving /metrics only"),
    }

    rocket::custom(get_config(args.port))
        .manage(sampler)
        .mount("/", routes![metrics, ping])
        .launch()
        .await
        .map_err(|e| anyhow::anyhow!("agent server failed: {e}"))?;

    Ok(())
}
