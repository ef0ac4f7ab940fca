//! media-repo server entry point.
//!
//! Boots the MCP server on stdio transport and runs cache maintenance in the
//! background. Logging goes to stderr to avoid interfering with the JSON-RPC
//! protocol on stdout.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

use mediarepo_client::{MaintenanceReport, MediaRepo};
use mediarepo_core::{AppConfig, SharedConfig};

mod error;
mod handler;
mod tools;

/// How often cold cache entries and expired failures are swept.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    let repo = Arc::new(MediaRepo::new(Arc::new(SharedConfig::new(config)))?);

    tracing::info!("Starting media-repo server on stdio transport");

    let maintenance = tokio::spawn(run_maintenance(Arc::clone(&repo)));

    let handler = handler::MediaRepoServer::new(repo);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;
    maintenance.abort();

    Ok(())
}

async fn run_maintenance(repo: Arc<MediaRepo>) {
    let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
    interval.tick().await;

    loop {
        interval.tick().await;
        let report = repo.run_maintenance().await;
        if report != MaintenanceReport::default() {
            tracing::info!(
                media_evicted = report.media_evicted,
                previews_evicted = report.previews_evicted,
                failures_purged = report.failures_purged,
                "maintenance"
            );
        }
    }
}
