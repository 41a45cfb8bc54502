//! Client side of the foot-scan processing service.
//!
//! A raw scan is uploaded as a single `multipart/form-data` part; the service
//! answers with the processed point cloud as the response body and carries the
//! derived measurements out-of-band in response headers. The same service
//! also answers measurement-only requests and foot/shoe matches with JSON.

pub mod client;
pub mod error;
pub mod headers;
pub mod multipart;
pub mod result;

pub use self::client::{TransferClient, TransferConfig};
pub use self::error::TransferError;
pub use self::headers::MetadataHeaders;
pub use self::multipart::{FilePart, MultipartBody};
pub use self::result::{
    DimensionalFit, FitAnalysis, HealthStatus, MatchResult, Measurements, PressurePoint,
    ProcessSummary, UploadResult,
};
