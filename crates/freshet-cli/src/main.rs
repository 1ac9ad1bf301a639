use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use freshet_client::{ReqwestFetcher, SelectorExtractor};
use freshet_core::job::JobStatus;
use freshet_core::job_queue::JobQueue;
use freshet_core::resource::ResourceKind;
use freshet_core::traits::Extractor;
use freshet_core::{
    BootstrapTrigger, ScrapeConfig, ScrapeCoordinator, SystemClock, TracingWorkerReporter,
    WorkerService,
};
use freshet_db::{Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "freshet", version, about = "Freshness-driven catalog scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume scrape jobs until interrupted
    Worker {
        /// Worker id (defaults to a random one)
        #[arg(long, env = "FRESHET_WORKER_ID")]
        worker_id: Option<String>,

        /// Seconds to wait between polls while the queue is empty
        #[arg(long, env = "FRESHET_POLL_INTERVAL_SECS", default_value_t = 5)]
        poll_interval: u64,
    },

    /// Seed the crawl with a root navigation scrape if nothing is stored yet
    Bootstrap,

    /// Run a freshness check and enqueue a scrape when it is due
    Trigger {
        #[command(subcommand)]
        scope: TriggerScope,
    },

    /// List scrape jobs
    Jobs {
        /// Filter by status (pending, running, failed)
        #[arg(short, long)]
        status: Option<String>,

        /// Number of jobs to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Requeue a failed job with a fresh attempt budget
    Retry {
        /// Job id, as shown by `jobs`
        job_id: String,
    },

    /// Fetch one page and print the records it yields, without storing them
    Extract {
        /// Record kind to extract (navigation, category, product)
        #[arg(short, long)]
        kind: String,

        /// Page to fetch
        #[arg(short, long)]
        url: String,
    },
}

#[derive(Subcommand)]
enum TriggerScope {
    /// The top-level navigation
    Navigation,
    /// Categories under a navigation item
    Category { navigation_id: String },
    /// Products under a category
    Product { category_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("freshet=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ScrapeConfig::from_env().context("Invalid scrape configuration")?;

    match cli.command {
        Commands::Worker {
            worker_id,
            poll_interval,
        } => cmd_worker(&config, worker_id, Duration::from_secs(poll_interval)).await,
        Commands::Bootstrap => cmd_bootstrap(&config).await,
        Commands::Trigger { scope } => cmd_trigger(&config, scope).await,
        Commands::Jobs { status, limit } => cmd_jobs(&config, status, limit).await,
        Commands::Retry { job_id } => cmd_retry(&config, &job_id).await,
        Commands::Extract { kind, url } => cmd_extract(&config, &kind, &url).await,
    }
}

/// Connect to PostgreSQL using DATABASE_URL and apply migrations.
async fn connect_db() -> Result<Database> {
    let db_config = DatabaseConfig::from_env()?;
    let db = Database::connect(&db_config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await?;
    Ok(db)
}

fn extractor(config: &ScrapeConfig) -> Result<SelectorExtractor<ReqwestFetcher>> {
    let fetcher =
        ReqwestFetcher::with_timeout(config.job_timeout).context("Failed to create HTTP client")?;
    Ok(SelectorExtractor::new(fetcher))
}

async fn cmd_worker(
    config: &ScrapeConfig,
    worker_id: Option<String>,
    poll_interval: Duration,
) -> Result<()> {
    if !config.queue_enabled {
        bail!("Scrape queue is disabled; set SCRAPE_QUEUE_ENABLED=true to run a worker");
    }

    let db = connect_db().await?;
    let mut worker_config = config.worker_config().with_poll_interval(poll_interval);
    if let Some(id) = worker_id {
        worker_config = worker_config.with_worker_id(id);
    }

    let worker = WorkerService::new(
        db.job_queue(config.retry, config.lease),
        extractor(config)?,
        db.catalog_repo(),
        SystemClock,
        worker_config,
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received, finishing current job");
        }
        signal_cancel.cancel();
    });

    let result = worker.run(cancel, &TracingWorkerReporter).await;
    db.close().await;
    result?;
    Ok(())
}

async fn cmd_bootstrap(config: &ScrapeConfig) -> Result<()> {
    let db = connect_db().await?;
    let queue = db.queue_backend(config.queue_enabled, config.retry, config.lease);

    let bootstrap = BootstrapTrigger::new(
        queue,
        db.catalog_repo(),
        config.locators(),
        config.retry.max_attempts,
    );
    let outcome = bootstrap.run_once().await;
    println!("{outcome:?}");

    db.close().await;
    Ok(())
}

async fn cmd_trigger(config: &ScrapeConfig, scope: TriggerScope) -> Result<()> {
    let db = connect_db().await?;
    let coordinator = ScrapeCoordinator::new(
        db.queue_backend(config.queue_enabled, config.retry, config.lease),
        db.catalog_repo(),
        config.staleness_policy(SystemClock),
        config.locators(),
        config.retry.max_attempts,
    );

    let outcome = match scope {
        TriggerScope::Navigation => coordinator.trigger_navigation_scrape().await?,
        TriggerScope::Category { navigation_id } => {
            coordinator.trigger_category_scrape(&navigation_id).await?
        }
        TriggerScope::Product { category_id } => {
            coordinator.trigger_product_scrape(&category_id).await?
        }
    };
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    db.close().await;
    Ok(())
}

async fn cmd_jobs(config: &ScrapeConfig, status: Option<String>, limit: usize) -> Result<()> {
    let status = status
        .map(|s| s.parse::<JobStatus>().map_err(|e| anyhow::anyhow!(e)))
        .transpose()?;

    let db = connect_db().await?;
    let queue = db.job_queue(config.retry, config.lease);
    let jobs = queue.list_jobs(status, limit).await?;

    if jobs.is_empty() {
        println!("No scrape jobs found");
    } else {
        for job in &jobs {
            println!(
                "  [{:<7}] {} {:<10} attempts {}/{}  {}{}",
                job.status.as_str(),
                job.id,
                job.kind.as_str(),
                job.attempts,
                job.max_attempts,
                job.locator,
                job.last_error
                    .as_deref()
                    .map(|e| format!("  ({e})"))
                    .unwrap_or_default(),
            );
        }
        println!("\nTotal: {} jobs", jobs.len());
    }

    db.close().await;
    Ok(())
}

async fn cmd_retry(config: &ScrapeConfig, job_id: &str) -> Result<()> {
    let db = connect_db().await?;
    let revived = db
        .job_queue(config.retry, config.lease)
        .retry_failed(job_id)
        .await;
    db.close().await;

    match revived? {
        Some(job) => {
            println!("Requeued {} {} ({})", job.kind, job.locator, job.id);
            Ok(())
        }
        None => bail!("No failed job with id '{job_id}'"),
    }
}

async fn cmd_extract(config: &ScrapeConfig, kind: &str, url: &str) -> Result<()> {
    let kind: ResourceKind = kind.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    tracing::info!(%kind, %url, "Extracting");
    let records = extractor(config)?.extract(kind, url).await?;
    tracing::info!(records = records.len(), "Extraction complete");

    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}
