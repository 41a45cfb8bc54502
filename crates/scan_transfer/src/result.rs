use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Foot measurements as reported by the service. Units are whatever the
/// service measured in (millimetres for the production scanner); a value the
/// service did not send is NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Measurements {
    pub foot_length: f64,
    pub foot_width: f64,
    pub circumference: f64,
    pub dorsum_height_50: f64,
    /// Arch height index.
    pub ahi: f64,
}

impl Measurements {
    /// Label/value pairs in display order.
    pub fn labelled(&self) -> [(&'static str, f64); 5] {
        [
            ("Foot length", self.foot_length),
            ("Foot width", self.foot_width),
            ("Circumference", self.circumference),
            ("Dorsum height (50%)", self.dorsum_height_50),
            ("AHI", self.ahi),
        ]
    }
}

/// Outcome of one successful upload-and-fetch round trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadResult {
    pub measurements: Measurements,
    /// Point count claimed by the service; 0 when it did not say.
    pub point_count: u64,
    pub overview_text: Option<String>,
    pub analysis_source: Option<String>,
    pub processing_succeeded: Option<bool>,
    /// Where the processed point cloud was written.
    pub saved_file_path: PathBuf,
    pub suggested_filename: String,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}

/// JSON body of the measurement-only endpoint (`POST /process`): the same
/// analysis as an upload-and-fetch, without the processed cloud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSummary {
    #[serde(default)]
    pub success: bool,
    pub foot_length: f64,
    pub foot_width: f64,
    #[serde(default)]
    pub point_count: u64,
    #[serde(default)]
    pub original_filename: Option<String>,
    #[serde(default)]
    pub processed_file_available: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Difference between foot and shoe along each axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionalFit {
    pub length_difference: f64,
    pub width_difference: f64,
    pub height_difference: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressurePoint {
    pub location: String,
    pub pressure: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitAnalysis {
    pub dimensional_fit: DimensionalFit,
    pub pressure_distribution: Vec<PressurePoint>,
    pub comfort_score: f64,
    pub stability_score: f64,
}

/// Outcome of a foot/shoe match (`POST /match`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    #[serde(default)]
    pub success: bool,
    /// Overall fit in [0, 1].
    pub match_score: f64,
    #[serde(default)]
    pub fit_analysis: FitAnalysis,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub foot_filename: Option<String>,
    #[serde(default)]
    pub shoe_filename: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
