//! Typed access to the metadata the service returns in response headers.
//!
//! | Header                    | Type             | Default if absent/unparsable |
//! |---------------------------|------------------|------------------------------|
//! | `Content-Disposition`     | filename         | `processed.ply`              |
//! | `X-Foot-Length` ... `X-AHI` | f64            | NaN                          |
//! | `X-Point-Count`           | integer          | 0                            |
//! | `X-Analysis-Overview-B64` | base64 UTF-8     | absent                       |
//! | `X-Analysis-Source`       | string           | absent                       |
//! | `X-Processing-Success`    | bool             | absent                       |
//!
//! Names are matched case-insensitively; proxies are free to re-case them.

use crate::result::Measurements;
use base64::Engine as _;
use reqwest::header::HeaderMap;
use std::collections::HashMap;

pub const CONTENT_DISPOSITION: &str = "Content-Disposition";
pub const FOOT_LENGTH: &str = "X-Foot-Length";
pub const FOOT_WIDTH: &str = "X-Foot-Width";
pub const CIRCUMFERENCE: &str = "X-Circumference";
pub const DORSUM_HEIGHT_50: &str = "X-Dorsum-Height-50";
pub const AHI: &str = "X-AHI";
pub const POINT_COUNT: &str = "X-Point-Count";
pub const OVERVIEW_B64: &str = "X-Analysis-Overview-B64";
pub const ANALYSIS_SOURCE: &str = "X-Analysis-Source";
pub const PROCESSING_SUCCESS: &str = "X-Processing-Success";

/// Filename used when the response does not suggest one.
pub const DEFAULT_DOWNLOAD_NAME: &str = "processed.ply";

/// Case-insensitive header map. The first value wins for repeated names.
#[derive(Debug, Clone, Default)]
pub struct MetadataHeaders {
    entries: HashMap<String, String>,
}

impl MetadataHeaders {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut entries = HashMap::new();
        for (k, v) in pairs {
            entries
                .entry(k.as_ref().to_ascii_lowercase())
                .or_insert_with(|| v.into());
        }
        Self { entries }
    }

    /// Values that are not visible ASCII are dropped; none of ours may carry raw
    /// non-ASCII, which is why the overview travels base64-encoded.
    pub fn from_header_map(map: &HeaderMap) -> Self {
        Self::from_pairs(
            map.iter()
                .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str(), v.to_owned()))),
        )
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|v| v.trim())
    }

    /// f64 value, or NaN when the header is absent or not a number.
    pub fn f64_or_nan(&self, name: &str) -> f64 {
        match self.get(name) {
            None => f64::NAN,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(header = name, value = raw, "Malformed numeric header");
                f64::NAN
            }),
        }
    }

    /// Non-negative integer value, or 0 when absent or not an integer.
    pub fn count_or_zero(&self, name: &str) -> u64 {
        match self.get(name) {
            None => 0,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(header = name, value = raw, "Malformed count header");
                0
            }),
        }
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name).filter(|v| !v.is_empty()).map(str::to_owned)
    }

    /// Standard-alphabet base64 carrying UTF-8 text. Any decode failure yields `None`.
    pub fn base64_text(&self, name: &str) -> Option<String> {
        let raw = self.get(name)?;
        let bytes = match base64::engine::general_purpose::STANDARD.decode(raw) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(header = name, error = %e, "Dropping undecodable base64 header");
                return None;
            }
        };
        match String::from_utf8(bytes) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(header = name, error = %e, "Dropping non-UTF-8 text header");
                None
            }
        }
    }

    /// `true`/`false` in any case; anything else is treated as absent.
    pub fn flag(&self, name: &str) -> Option<bool> {
        let raw = self.get(name)?;
        if raw.eq_ignore_ascii_case("true") {
            Some(true)
        } else if raw.eq_ignore_ascii_case("false") {
            Some(false)
        } else {
            None
        }
    }

    /// Filename suggested by `Content-Disposition`, reduced to a bare file name.
    pub fn suggested_filename(&self) -> Option<String> {
        filename_from_content_disposition(self.get(CONTENT_DISPOSITION)?)
    }

    pub fn measurements(&self) -> Measurements {
        Measurements {
            foot_length: self.f64_or_nan(FOOT_LENGTH),
            foot_width: self.f64_or_nan(FOOT_WIDTH),
            circumference: self.f64_or_nan(CIRCUMFERENCE),
            dorsum_height_50: self.f64_or_nan(DORSUM_HEIGHT_50),
            ahi: self.f64_or_nan(AHI),
        }
    }
}

/// Extracts `filename="..."` (or an unquoted `filename=token`) from a
/// `Content-Disposition` value. Directory parts are stripped so the name can be
/// joined onto a download directory safely.
pub fn filename_from_content_disposition(value: &str) -> Option<String> {
    let raw = value.split(';').map(str::trim).find_map(|param| {
        let (key, val) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let val = val.trim();
        Some(match val.strip_prefix('"') {
            Some(quoted) => quoted.split('"').next().unwrap_or_default(),
            None => val,
        })
    })?;

    let name = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    match name {
        "" | "." | ".." => None,
        name => Some(name.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    fn headers(pairs: &[(&str, &str)]) -> MetadataHeaders {
        MetadataHeaders::from_pairs(pairs.iter().map(|(k, v)| (*k, v.to_string())))
    }

    #[test]
    fn lookup_ignores_header_case() {
        let lower = headers(&[("x-foot-length", "245.0"), ("x-point-count", "15420")]);
        let upper = headers(&[("X-FOOT-LENGTH", "245.0"), ("X-POINT-COUNT", "15420")]);

        assert_eq!(lower.f64_or_nan(FOOT_LENGTH), 245.0);
        assert_eq!(upper.f64_or_nan(FOOT_LENGTH), 245.0);
        assert_eq!(lower.count_or_zero(POINT_COUNT), upper.count_or_zero(POINT_COUNT));
        assert_eq!(lower.measurements().foot_length, upper.measurements().foot_length);
    }

    #[test]
    fn point_count_defaults_to_zero() {
        assert_eq!(headers(&[(POINT_COUNT, "15420")]).count_or_zero(POINT_COUNT), 15420);
        assert_eq!(headers(&[(POINT_COUNT, " 7 ")]).count_or_zero(POINT_COUNT), 7);
        assert_eq!(headers(&[]).count_or_zero(POINT_COUNT), 0);
        assert_eq!(headers(&[(POINT_COUNT, "lots")]).count_or_zero(POINT_COUNT), 0);
        assert_eq!(headers(&[(POINT_COUNT, "-3")]).count_or_zero(POINT_COUNT), 0);
    }

    #[test]
    fn missing_or_garbled_measurements_are_nan() {
        let m = headers(&[(FOOT_WIDTH, "98.0"), (AHI, "abc")]).measurements();
        assert_eq!(m.foot_width, 98.0);
        assert!(m.foot_length.is_nan());
        assert!(m.circumference.is_nan());
        assert!(m.dorsum_height_50.is_nan());
        assert!(m.ahi.is_nan());
    }

    #[test]
    fn overview_is_base64_utf8() {
        let text = "足長24.5cm、足幅9.8cm...";
        let encoded = base64::engine::general_purpose::STANDARD.encode(text.as_bytes());
        let h = headers(&[("x-analysis-overview-b64", encoded.as_str())]);
        assert_eq!(h.base64_text(OVERVIEW_B64).as_deref(), Some(text));

        assert_eq!(headers(&[(OVERVIEW_B64, "!!not base64!!")]).base64_text(OVERVIEW_B64), None);
        // Valid base64 of invalid UTF-8.
        assert_eq!(headers(&[(OVERVIEW_B64, "//79")]).base64_text(OVERVIEW_B64), None);
        assert_eq!(headers(&[]).base64_text(OVERVIEW_B64), None);
    }

    #[test]
    fn source_and_success_flag() {
        let h = headers(&[(ANALYSIS_SOURCE, "dummy"), (PROCESSING_SUCCESS, "True")]);
        assert_eq!(h.text(ANALYSIS_SOURCE).as_deref(), Some("dummy"));
        assert_eq!(h.flag(PROCESSING_SUCCESS), Some(true));
        assert_eq!(headers(&[(PROCESSING_SUCCESS, "yes")]).flag(PROCESSING_SUCCESS), None);
        assert_eq!(headers(&[(ANALYSIS_SOURCE, "")]).text(ANALYSIS_SOURCE), None);
    }

    #[test]
    fn first_value_wins_for_repeated_names() {
        let h = headers(&[("X-Foot-Length", "1.0"), ("x-foot-length", "2.0")]);
        assert_eq!(h.f64_or_nan(FOOT_LENGTH), 1.0);
    }

    #[test]
    fn content_disposition_filenames() {
        let f = filename_from_content_disposition;
        assert_eq!(
            f("attachment; filename=\"processed_20240101_120000.ply\"").as_deref(),
            Some("processed_20240101_120000.ply")
        );
        assert_eq!(f("attachment; FILENAME=out.ply").as_deref(), Some("out.ply"));
        assert_eq!(f("attachment; filename=\"../../etc/passwd\"").as_deref(), Some("passwd"));
        assert_eq!(f("attachment; filename=\"C:\\tmp\\x.ply\"").as_deref(), Some("x.ply"));
        assert_eq!(f("attachment; filename=\"..\""), None);
        assert_eq!(f("inline"), None);

        assert_eq!(headers(&[]).suggested_filename(), None);
        assert_eq!(
            headers(&[("content-disposition", "attachment; filename=\"a.ply\"")])
                .suggested_filename()
                .as_deref(),
            Some("a.ply")
        );
    }
}
