use clap::Parser;
use std::path::PathBuf;

/// `scan_upload` - Sends one foot scan to the processing service.
///
/// Uploads the PLY file, stores the processed point cloud the service returns,
/// and prints the measurements it reported as JSON on stdout.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// The PLY scan to upload.
    pub scan: PathBuf,

    /// Full URL of the processing endpoint, e.g.
    /// `http://localhost:8000/process-with-file`.
    #[arg(long, env = "FOOTSCAN_ENDPOINT")]
    pub endpoint: String,

    /// Directory the processed point cloud is written into.
    ///
    /// Defaults to the system temporary directory.
    #[arg(long, env = "FOOTSCAN_DOWNLOAD_DIR")]
    pub download_dir: Option<PathBuf>,

    /// Whole-request timeout in seconds.
    #[arg(long, env = "FOOTSCAN_TIMEOUT_SECS", default_value_t = 300)]
    pub timeout_secs: u64,

    /// Match the scan against this shoe scan via `<service>/match` and print the
    /// match result instead of processing the scan.
    #[arg(long, conflicts_with = "summary")]
    pub shoe: Option<PathBuf>,

    /// Only request the measurements via `<service>/process`; no processed
    /// point cloud is downloaded.
    #[arg(long)]
    pub summary: bool,

    /// Query `<service>/health` before uploading and abort if it is not healthy.
    ///
    /// The service root is the endpoint URL with its last path segment removed.
    #[arg(long)]
    pub check: bool,
}

impl Config {
    /// `<service root>/<path>`.
    pub fn service_url(&self, path: &str) -> String {
        format!("{}/{}", self.service_root(), path)
    }

    /// Service root derived from the endpoint (`.../process-with-file` -> `...`).
    pub fn service_root(&self) -> &str {
        let trimmed = self.endpoint.trim_end_matches('/');
        match trimmed.rsplit_once('/') {
            Some((root, _)) if root.contains("://") && !root.ends_with('/') => root,
            _ => trimmed,
        }
    }
}
