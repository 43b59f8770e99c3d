//! `patchsmith serve`

use anyhow::Result;
use tracing::{info, warn};

use patchsmith::config::ServiceConfig;
use patchsmith::jobs::{JobQueue, JobStore};
use patchsmith::server;

pub async fn cmd_serve(mut config: ServiceConfig, port: Option<u16>) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    for warning in config.validate() {
        warn!("{}", warning);
    }

    let runner = super::build_runner(&config)?;
    let (queue, workers) = JobQueue::start(JobStore::default(), runner, config.queue.clone());
    info!(concurrency = config.queue.concurrency, "worker pool started");

    server::start_server(&config.server, queue).await?;
    // In-flight jobs are abandoned on shutdown.
    workers.abort();
    Ok(())
}
