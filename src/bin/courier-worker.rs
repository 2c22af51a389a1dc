//! Courier worker - consumes the configured job queues until Ctrl-C.
//!
//! Settings come from flags, then `COURIER_*` / `REDIS_*` environment
//! variables (a `.env` file is loaded first), then defaults.

use clap::Parser;
use courier::courier_log::{self, error, info, warn};
use courier::prelude::*;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// Courier background job worker
#[derive(Parser, Debug)]
#[command(name = "courier-worker")]
#[command(author = "Pegasus Heavy Industries LLC")]
#[command(version)]
#[command(about = "Consume Courier job queues with retries and a dead letter queue")]
struct Cli {
    /// Redis/Valkey connection URL
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Keep queues in process memory instead of Redis (development only)
    #[arg(long)]
    memory: bool,

    /// Queues to consume, comma separated
    #[arg(short, long, value_delimiter = ',')]
    queues: Vec<String>,

    /// Sleep between polls of an empty queue, in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Fail processor calls running longer than this many seconds
    #[arg(long)]
    job_timeout_secs: Option<u64>,

    /// Keep undecodable entries in this list instead of dropping them
    #[arg(long)]
    poison_queue: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Ignore if .env doesn't exist
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    courier_log::init();
    if cli.verbose {
        courier_log::set_debug(true);
    }
    if tracing::subscriber::set_global_default(courier_log::tracing_compat::subscriber()).is_err() {
        warn!("A tracing subscriber was already installed");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("courier-worker failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn worker_config(cli: &Cli) -> QueueResult<WorkerConfig> {
    let mut config = WorkerConfig::from_env()?;

    if !cli.queues.is_empty() {
        config = config.with_queues(cli.queues.iter().map(|q| q.trim().to_string()));
    }
    if let Some(ms) = cli.poll_interval_ms {
        config = config.with_poll_interval(Duration::from_millis(ms));
    }
    if let Some(secs) = cli.job_timeout_secs.filter(|secs| *secs > 0) {
        config = config.with_job_timeout(Duration::from_secs(secs));
    }
    if let Some(poison) = &cli.poison_queue {
        config = config.with_poison_queue(poison.clone());
    }

    config.validate()?;
    Ok(config)
}

async fn open_store(cli: &Cli) -> QueueResult<Arc<dyn QueueStore>> {
    if cli.memory {
        warn!("Using in-memory queues; jobs are lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let mut redis_config = RedisConfig::from_env();
    if let Some(url) = &cli.redis_url {
        redis_config = redis_config.url(url.clone());
    }
    let redis = RedisService::new(redis_config.build()).await?;
    redis.health_check().await?;
    Ok(Arc::new(RedisStore::new(Arc::new(redis))))
}

async fn run(cli: Cli) -> QueueResult<()> {
    let config = worker_config(&cli)?;
    let store = open_store(&cli).await?;
    let events: Arc<dyn EventSink> = Arc::new(LogEventSink);

    let mut registry = ProcessorRegistry::new();
    registry.register(EmailJobProcessor::new(Arc::new(LogEmailSender)))?;
    info!("Registered processors: {}", registry.job_types().join(", "));

    let mut pool = WorkerPool::new(store, Arc::new(registry), events, config);
    pool.start()?;
    info!("courier-worker running, press Ctrl-C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }

    pool.shutdown().await
}
