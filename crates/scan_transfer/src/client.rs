use crate::{
    error::TransferError,
    headers::{self, MetadataHeaders, DEFAULT_DOWNLOAD_NAME},
    multipart::{FilePart, MultipartBody},
    result::{HealthStatus, MatchResult, ProcessSummary, UploadResult},
};
use serde::de::DeserializeOwned;
use reqwest::{
    header::{ACCEPT, CONTENT_TYPE},
    StatusCode,
};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Multipart field the service reads the scan from.
pub const UPLOAD_FIELD: &str = "file";
/// Multipart fields of a foot/shoe match.
pub const MATCH_FOOT_FIELD: &str = "foot_file";
pub const MATCH_SHOE_FIELD: &str = "shoe_file";

/// Name sent for paths that have no file name component.
const DEFAULT_UPLOAD_NAME: &str = "scan.ply";

#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Whole-request timeout. Processing a scan takes minutes on the service side.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Directory the processed point cloud is written into.
    pub download_dir: PathBuf,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(10),
            download_dir: std::env::temp_dir(),
        }
    }
}

/// Performs upload-and-fetch round trips against the processing service.
///
/// Cheap to clone; clones share the underlying connection pool. Construct one
/// and hand it to whatever needs it.
#[derive(Debug, Clone)]
pub struct TransferClient {
    http: reqwest::Client,
    config: TransferConfig,
}

impl TransferClient {
    pub fn new(config: TransferConfig) -> Result<Self, TransferError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("scan_transfer/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Uploads `local_file` to `endpoint` and stores the processed point cloud
    /// returned in the response body.
    ///
    /// Missing or malformed metadata headers do not fail the call; see
    /// [`MetadataHeaders`] for the defaults. Nothing is retried.
    pub async fn upload_and_fetch(
        &self,
        endpoint: &str,
        local_file: &Path,
    ) -> Result<UploadResult, TransferError> {
        let data = read_scan(local_file).await?;
        let body = MultipartBody::single_file(UPLOAD_FIELD, &upload_name(local_file), &data);

        tracing::info!(
            endpoint,
            file = %local_file.display(),
            bytes = data.len(),
            boundary = body.boundary(),
            "Uploading scan"
        );

        let response = self
            .http
            .post(endpoint)
            .header(CONTENT_TYPE, body.content_type())
            .header(ACCEPT, "application/octet-stream")
            .body(body.into_bytes())
            .send()
            .await?;

        let status = response.status();
        let metadata = MetadataHeaders::from_header_map(response.headers());
        let payload = response.bytes().await?;

        if !status.is_success() {
            let err = error_for_status(status, &payload);
            tracing::warn!(status = status.as_u16(), error = %err, "Service rejected scan");
            return Err(err);
        }
        if payload.is_empty() {
            return Err(TransferError::InvalidResponse {
                status: status.as_u16(),
                reason: "empty point-cloud body".into(),
            });
        }

        let suggested_filename = metadata
            .suggested_filename()
            .unwrap_or_else(|| DEFAULT_DOWNLOAD_NAME.to_owned());
        let saved_file_path = self.config.download_dir.join(&suggested_filename);
        store(&saved_file_path, &payload).await?;

        let result = UploadResult {
            measurements: metadata.measurements(),
            point_count: metadata.count_or_zero(headers::POINT_COUNT),
            overview_text: metadata.base64_text(headers::OVERVIEW_B64),
            analysis_source: metadata.text(headers::ANALYSIS_SOURCE),
            processing_succeeded: metadata.flag(headers::PROCESSING_SUCCESS),
            saved_file_path,
            suggested_filename,
        };

        tracing::info!(
            path = %result.saved_file_path.display(),
            bytes = payload.len(),
            points = result.point_count,
            foot_length = result.measurements.foot_length,
            foot_width = result.measurements.foot_width,
            "Processed scan received"
        );

        Ok(result)
    }

    /// Uploads `local_file` to the measurement-only endpoint, which answers
    /// with JSON instead of a processed cloud.
    pub async fn process_summary(
        &self,
        endpoint: &str,
        local_file: &Path,
    ) -> Result<ProcessSummary, TransferError> {
        let data = read_scan(local_file).await?;
        let body = MultipartBody::single_file(UPLOAD_FIELD, &upload_name(local_file), &data);
        tracing::info!(endpoint, file = %local_file.display(), bytes = data.len(), "Requesting measurements");
        self.post_form(endpoint, body).await
    }

    /// Sends a foot scan and a shoe scan to the match endpoint.
    pub async fn match_scans(
        &self,
        endpoint: &str,
        foot_file: &Path,
        shoe_file: &Path,
    ) -> Result<MatchResult, TransferError> {
        let foot = read_scan(foot_file).await?;
        let shoe = read_scan(shoe_file).await?;
        let (foot_name, shoe_name) = (upload_name(foot_file), upload_name(shoe_file));
        let body = MultipartBody::files(&[
            FilePart {
                field: MATCH_FOOT_FIELD,
                filename: &foot_name,
                data: &foot,
            },
            FilePart {
                field: MATCH_SHOE_FIELD,
                filename: &shoe_name,
                data: &shoe,
            },
        ]);
        tracing::info!(
            endpoint,
            foot = %foot_file.display(),
            shoe = %shoe_file.display(),
            bytes = body.len(),
            "Requesting foot/shoe match"
        );

        let result: MatchResult = self.post_form(endpoint, body).await?;
        tracing::info!(
            score = result.match_score,
            recommendations = result.recommendations.len(),
            "Match received"
        );
        Ok(result)
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: MultipartBody,
    ) -> Result<T, TransferError> {
        let response = self
            .http
            .post(endpoint)
            .header(CONTENT_TYPE, body.content_type())
            .header(ACCEPT, "application/json")
            .body(body.into_bytes())
            .send()
            .await?;

        let status = response.status();
        let payload = response.bytes().await?;
        if !status.is_success() {
            let err = error_for_status(status, &payload);
            tracing::warn!(status = status.as_u16(), error = %err, "Service rejected request");
            return Err(err);
        }
        parse_json(status, &payload)
    }

    /// `GET <base_url>/health`.
    pub async fn health(&self, base_url: &str) -> Result<HealthStatus, TransferError> {
        let url = format!("{}/health", base_url.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        let payload = response.bytes().await?;
        if !status.is_success() {
            return Err(error_for_status(status, &payload));
        }

        parse_json(status, &payload)
    }
}

async fn read_scan(path: &Path) -> Result<Vec<u8>, TransferError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| TransferError::FileReadFailed {
            path: path.to_path_buf(),
            source,
        })
}

fn upload_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_UPLOAD_NAME.to_owned())
}

fn parse_json<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<T, TransferError> {
    serde_json::from_slice(body).map_err(|e| TransferError::InvalidResponse {
        status: status.as_u16(),
        reason: format!("unparsable JSON body: {e}"),
    })
}

/// Maps an error response following the `{"detail": "..."}` convention. The body
/// is not assumed to be JSON at all.
fn error_for_status(status: StatusCode, body: &[u8]) -> TransferError {
    let detail = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail")?.as_str().map(str::to_owned));

    match detail {
        Some(detail) => TransferError::ServerMessage {
            status: status.as_u16(),
            detail,
        },
        None => TransferError::InvalidResponse {
            status: status.as_u16(),
            reason: format!("HTTP {status} without a detail message"),
        },
    }
}

async fn store(path: &Path, payload: &[u8]) -> Result<(), TransferError> {
    let write = async {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(path, payload).await
    };
    write.await.map_err(|source| TransferError::StorageWriteFailed {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_message_is_surfaced_verbatim() {
        let err = error_for_status(
            StatusCode::BAD_REQUEST,
            br#"{"detail":"unsupported format"}"#,
        );
        match err {
            TransferError::ServerMessage { status, detail } => {
                assert_eq!(status, 400);
                assert_eq!(detail, "unsupported format");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_json_or_non_string_detail_is_invalid_response() {
        for body in [
            &b"<html>502 Bad Gateway</html>"[..],
            br#"{"detail":[{"loc":["body","file"],"msg":"field required"}]}"#,
            br#"["detail"]"#,
            b"",
        ] {
            let err = error_for_status(StatusCode::BAD_GATEWAY, body);
            assert!(
                matches!(err, TransferError::InvalidResponse { status: 502, .. }),
                "{err:?}"
            );
        }
    }

    #[test]
    fn default_config_waits_minutes() {
        let config = TransferConfig::default();
        assert!(config.timeout >= Duration::from_secs(60));
    }
}
