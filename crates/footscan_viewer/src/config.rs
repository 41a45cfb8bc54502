use crate::{camera::CameraConfig, renderer::RenderConfig};
use clap::Parser;
use scan_transfer::TransferConfig;
use std::{path::PathBuf, time::Duration};

/// `footscan_viewer` - Interactive viewer for processed foot scans.
///
/// Shows a local PLY file, or uploads it to the processing service first and
/// shows the cloud it sends back together with its measurements.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// PLY file to display (or to upload, with `--upload`).
    #[arg(long, env = "FOOTSCAN_SCAN")]
    pub scan: Option<PathBuf>,

    /// Send `--scan` to the processing service and display the result.
    #[arg(long, requires = "scan", env = "FOOTSCAN_UPLOAD")]
    pub upload: bool,

    /// Full URL of the processing endpoint.
    #[arg(
        long,
        env = "FOOTSCAN_ENDPOINT",
        default_value = "http://localhost:8000/process-with-file"
    )]
    pub endpoint: String,

    /// Point sprite size in pixels.
    #[arg(long, env = "FOOTSCAN_POINT_SIZE", default_value_t = 4.0)]
    pub point_size: f32,

    /// Vertical field of view in degrees.
    #[arg(long, env = "FOOTSCAN_FOV_DEG", default_value_t = 60.0)]
    pub fov_deg: f32,

    /// Directory the processed point cloud is written into.
    #[arg(long, env = "FOOTSCAN_DOWNLOAD_DIR")]
    pub download_dir: Option<PathBuf>,

    /// Whole-request timeout in seconds.
    #[arg(long, env = "FOOTSCAN_TIMEOUT_SECS", default_value_t = 300)]
    pub timeout_secs: u64,
}

impl Config {
    pub fn transfer_config(&self) -> TransferConfig {
        let mut transfer = TransferConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            ..TransferConfig::default()
        };
        if let Some(dir) = &self.download_dir {
            transfer.download_dir = dir.clone();
        }
        transfer
    }

    /// Out-of-range field of view falls back to the default.
    pub fn camera_config(&self) -> CameraConfig {
        let mut camera = CameraConfig::default();
        if self.fov_deg.is_finite() && self.fov_deg > 1.0 && self.fov_deg < 179.0 {
            camera.fov_y = self.fov_deg.to_radians();
        }
        camera
    }

    pub fn render_config(&self) -> RenderConfig {
        let mut render = RenderConfig {
            camera: self.camera_config(),
            ..RenderConfig::default()
        };
        if self.point_size.is_finite() && self.point_size > 0.0 {
            render.point_size_px = self.point_size;
        }
        render
    }
}
