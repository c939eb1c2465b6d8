use clap::Parser;
use itertools::Itertools;
use job_harvester::{
    bayt::BaytSource,
    browser::ChromiumEngine,
    config::{Overrides, RunConfig, DEFAULT_USER_AGENT},
    feed::{FeedClient, FeedSource, JobSpyClient},
    fetch::HttpFetcher,
    naukrigulf::NaukrigulfSource,
    output::write_csv,
    progress::TracingProgress,
    storage::JobStore,
    HarvestError, Orchestrator, SourceKind, SourceType,
};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const STORE_NAME: &str = "harvest";

/// Harvest job listings from several boards into one table.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// JSON run configuration; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Search query, repeatable
    #[arg(short, long = "query")]
    queries: Vec<String>,

    /// Source to harvest, repeatable (default: all)
    #[arg(short, long = "source", value_enum)]
    sources: Vec<SourceKind>,

    #[arg(long)]
    max_pages: Option<u32>,

    /// Workers per source
    #[arg(long)]
    concurrency: Option<usize>,

    /// Retries per page before it is skipped
    #[arg(long)]
    retries: Option<u32>,

    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Location passed to the aggregator feeds
    #[arg(long)]
    location: Option<String>,

    /// CSV file to write the merged table to
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// SQLite database to store the merged table in
    #[arg(long)]
    sqlite: Option<PathBuf>,

    #[arg(long)]
    feed_endpoint: Option<String>,
}

impl Cli {
    fn overrides(self) -> Overrides {
        Overrides {
            queries: self.queries,
            sources: self.sources,
            max_pages: self.max_pages,
            concurrency: self.concurrency,
            retries: self.retries,
            deadline_secs: self.deadline_secs,
            location: self.location,
            csv: self.output,
            sqlite: self.sqlite,
            feed_endpoint: self.feed_endpoint,
        }
    }
}

fn build_orchestrator(config: &RunConfig) -> Result<Orchestrator, HarvestError> {
    let mut orchestrator = Orchestrator::new()
        .with_progress(Arc::new(TracingProgress::new()))
        .with_deadline(config.deadline());
    let mut feed: Option<Arc<dyn FeedClient>> = None;

    for kind in config.sources.iter().copied().unique() {
        let policy = config.policy(kind);
        orchestrator = match kind.source_type() {
            SourceType::StaticHtml => {
                let fetcher = Arc::new(HttpFetcher::new(REQUEST_TIMEOUT)?);
                orchestrator.with_source(BaytSource::new(fetcher, DEFAULT_USER_AGENT)?, policy)
            }
            SourceType::Browser => {
                let engine =
                    ChromiumEngine::new(&config.browser.user_agent, config.browser.headless);
                orchestrator.with_source(
                    NaukrigulfSource::new(engine, config.browser.clone()),
                    policy,
                )
            }
            SourceType::Feed => {
                let client = match &feed {
                    Some(client) => Arc::clone(client),
                    None => {
                        let client: Arc<dyn FeedClient> =
                            Arc::new(JobSpyClient::new(&config.feed, REQUEST_TIMEOUT)?);
                        feed = Some(Arc::clone(&client));
                        client
                    }
                };
                let source =
                    FeedSource::new(kind, client, &config.location, config.feed.results_per_page)?;
                orchestrator.with_source(source, policy)
            }
        };
    }

    Ok(orchestrator)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| {
                "info,html5ever=error,selectors=error,hyper=warn,reqwest=info,sqlx=warn,chromiumoxide=warn".into()
            }),
        )
        .with(ErrorLayer::default())
        .init();

    let cli = Cli::parse();
    let file_config = match &cli.config {
        Some(path) => RunConfig::from_file(path)?,
        None => RunConfig::default(),
    };
    let config = file_config.apply(cli.overrides());
    config.validate()?;

    let orchestrator = build_orchestrator(&config)?;
    info!(
        "Sources: {}; queries: {}",
        orchestrator.sources().iter().join(", "),
        config.queries.len()
    );

    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight pages");
            interrupt.cancel();
        }
    });

    let harvest = orchestrator.run(&config.queries, &token).await;

    if let Some(path) = &config.csv {
        write_csv(&harvest.records, path)?;
    }
    if let Some(path) = &config.sqlite {
        let store = JobStore::open(path, STORE_NAME).await?;
        let saved = store.save(&harvest.records).await?;
        info!("Stored {} record(s) in {}", saved, path.display());
    }
    if config.csv.is_none() && config.sqlite.is_none() {
        for record in &harvest.records {
            println!("{}", record);
        }
    }

    Ok(())
}
