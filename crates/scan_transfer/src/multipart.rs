//! `multipart/form-data` encoding for scan uploads.
//!
//! Body layout (CRLF line endings), one block per file part:
//!
//! ```text
//! --<boundary>
//! Content-Disposition: form-data; name="<field>"; filename="<name>"
//! Content-Type: application/octet-stream
//!
//! <raw file bytes>
//! --<boundary>
//! ...
//! --<boundary>--
//! ```

use uuid::Uuid;

pub const PART_CONTENT_TYPE: &str = "application/octet-stream";

/// One file attachment of a form.
#[derive(Debug, Clone, Copy)]
pub struct FilePart<'a> {
    pub field: &'a str,
    pub filename: &'a str,
    pub data: &'a [u8],
}

#[derive(Debug, Clone)]
pub struct MultipartBody {
    boundary: String,
    bytes: Vec<u8>,
}

impl MultipartBody {
    /// Encodes `data` as the only part of a new body, named `field`.
    pub fn single_file(field: &str, filename: &str, data: &[u8]) -> Self {
        Self::files(&[FilePart {
            field,
            filename,
            data,
        }])
    }

    /// Encodes every part, in order, into one body.
    ///
    /// The boundary is derived from a fresh v4 UUID and re-drawn if it happens to
    /// occur inside any payload, so it delimits the parts and nothing else.
    pub fn files(parts: &[FilePart<'_>]) -> Self {
        let filenames: Vec<String> = parts.iter().map(|p| sanitize_filename(p.filename)).collect();
        let boundary = loop {
            let candidate = format!("Boundary-{}", Uuid::new_v4());
            let clashes = parts.iter().any(|p| contains(p.data, candidate.as_bytes()))
                || filenames.iter().any(|f| f.contains(&candidate));
            if !clashes {
                break candidate;
            }
        };

        let payload: usize = parts.iter().map(|p| p.data.len() + 160).sum();
        let mut bytes = Vec::with_capacity(payload + boundary.len() + 8);
        for (i, (part, filename)) in parts.iter().zip(&filenames).enumerate() {
            // Every delimiter after the first starts on its own line.
            let lead = if i == 0 { "" } else { "\r\n" };
            let head = format!(
                "{lead}--{boundary}\r\n\
                 Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
                 Content-Type: {PART_CONTENT_TYPE}\r\n\r\n",
                field = part.field,
            );
            bytes.extend_from_slice(head.as_bytes());
            bytes.extend_from_slice(part.data);
        }
        bytes.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Self { boundary, bytes }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the request's `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Keeps the filename from terminating the quoted header parameter or the line.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' => '\'',
            '\r' | '\n' => '_',
            c => c,
        })
        .collect()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
