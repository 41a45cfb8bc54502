mod config;

use crate::config::Config;
use anyhow::{bail, Context};
use clap::Parser;
use scan_transfer::{TransferClient, TransferConfig};
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();
    let config = Config::parse();
    tracing::info!(config = ?config, "scan_upload starting with configuration");

    let mut transfer = TransferConfig {
        timeout: Duration::from_secs(config.timeout_secs),
        ..TransferConfig::default()
    };
    if let Some(dir) = &config.download_dir {
        transfer.download_dir = dir.clone();
    }
    let client = TransferClient::new(transfer)?;

    if config.check {
        let root = config.service_root();
        let health = client
            .health(root)
            .await
            .with_context(|| format!("health check against {root} failed"))?;
        if !health.is_healthy() {
            bail!("service at {root} reports status '{}'", health.status);
        }
        tracing::info!(status = %health.status, timestamp = ?health.timestamp, "Service healthy");
    }

    let json = if let Some(shoe) = &config.shoe {
        let result = client
            .match_scans(&config.service_url("match"), &config.scan, shoe)
            .await
            .with_context(|| {
                format!("matching {} against {} failed", config.scan.display(), shoe.display())
            })?;
        serde_json::to_string_pretty(&result)?
    } else if config.summary {
        let result = client
            .process_summary(&config.service_url("process"), &config.scan)
            .await
            .with_context(|| format!("measuring {} failed", config.scan.display()))?;
        serde_json::to_string_pretty(&result)?
    } else {
        let result = client
            .upload_and_fetch(&config.endpoint, &config.scan)
            .await
            .with_context(|| format!("processing {} failed", config.scan.display()))?;
        serde_json::to_string_pretty(&result)?
    };

    println!("{json}");
    Ok(())
}
