// COS Transfer Library for S3-compatible Object Storage
// Copyright 2025 cos-transfer contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error definitions for transfer operations
//!
//! Every terminal result of the engine is a [`Result<T, Error>`]. Part-level
//! failures that the retry policy absorbs never surface here; whatever does
//! surface carries a message, the HTTP status when one was received, and the
//! service request-id when the service produced one.

use crate::cos::error_response::ServiceError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Checksum families verified by the transfer engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Crc64,
    Md5,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumAlgorithm::Crc64 => f.write_str("CRC64"),
            ChecksumAlgorithm::Md5 => f.write_str("MD5"),
        }
    }
}

/// Coarse classification of [`Error`], handy for matching without
/// destructuring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    HttpStatus,
    Canceled,
    LocalIo,
    ChecksumMismatch,
    Configuration,
    InvalidResponse,
}

#[derive(Clone, Debug, Error)]
pub enum Error {
    /// Connection failure, reset or per-attempt timeout.
    #[error("transport error: {message}")]
    Transport { message: String, timeout: bool },

    /// Non-2xx response from the service.
    #[error("request failed; {0}")]
    HttpStatus(Box<ServiceError>),

    #[error("transfer canceled")]
    Canceled,

    #[error("local I/O error on {}: {source}", .path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("{algorithm} mismatch; expected: {expected}, got: {actual}")]
    ChecksumMismatch {
        algorithm: ChecksumAlgorithm,
        expected: String,
        actual: String,
        request_id: Option<String>,
    },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// 2xx response whose headers or body do not carry what the operation needs.
    #[error("invalid response; status: {status}, {message}")]
    InvalidResponse {
        status: u16,
        message: String,
        request_id: Option<String>,
    },
}

impl Error {
    pub fn local_io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Error::LocalIo {
            path: path.as_ref().to_path_buf(),
            source: Arc::new(source),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport {
            message: message.into(),
            timeout: false,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport { .. } => ErrorKind::Transport,
            Error::HttpStatus(_) => ErrorKind::HttpStatus,
            Error::Canceled => ErrorKind::Canceled,
            Error::LocalIo { .. } => ErrorKind::LocalIo,
            Error::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::InvalidResponse { .. } => ErrorKind::InvalidResponse,
        }
    }

    /// HTTP status of the failed response, if one was received.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Error::HttpStatus(e) => Some(e.status()),
            Error::InvalidResponse { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Request-id assigned by the service, when the failing response had one.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Error::HttpStatus(e) if e.has_request_id() => Some(e.request_id()),
            Error::ChecksumMismatch { request_id, .. }
            | Error::InvalidResponse { request_id, .. } => request_id.as_deref(),
            _ => None,
        }
    }

    pub fn service_error(&self) -> Option<&ServiceError> {
        match self {
            Error::HttpStatus(e) => Some(e),
            _ => None,
        }
    }

    /// Whether the same transfer may succeed if run again unchanged.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transport { .. } | Error::Canceled => true,
            Error::HttpStatus(e) => e.status() >= 500 || e.status() == 408 || e.status() == 429,
            _ => false,
        }
    }

    /// Whether a resumable transfer that failed this way must discard its
    /// checkpoint. Service and transport failures leave the recorded parts
    /// valid; a local file that can no longer be read or written, or data
    /// that failed verification, does not.
    pub fn invalidates_checkpoint(&self) -> bool {
        matches!(self, Error::LocalIo { .. } | Error::ChecksumMismatch { .. })
    }
}

impl From<ServiceError> for Error {
    fn from(err: ServiceError) -> Self {
        Error::HttpStatus(Box::new(err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport {
            timeout: err.is_timeout(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, HeaderValue};

    fn service_error(status: u16, request_id: Option<&'static str>) -> Error {
        let mut headers = HeaderMap::new();
        if let Some(id) = request_id {
            headers.insert("x-cos-request-id", HeaderValue::from_static(id));
        }
        ServiceError::new(status, headers).into()
    }

    #[test]
    fn test_accessors() {
        let e = service_error(404, Some("req-1"));
        assert_eq!(e.kind(), ErrorKind::HttpStatus);
        assert_eq!(e.http_status(), Some(404));
        assert_eq!(e.request_id(), Some("req-1"));
        assert!(!e.is_transient());

        let e = service_error(503, None);
        assert_eq!(e.request_id(), None);
        assert!(e.is_transient());
    }

    #[test]
    fn test_local_io_is_fatal() {
        let e = Error::local_io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(e.kind(), ErrorKind::LocalIo);
        assert!(!e.is_transient());
        assert!(e.to_string().contains("/tmp/x"));
    }

    #[test]
    fn test_invalidates_checkpoint() {
        assert!(!service_error(403, Some("req-1")).invalidates_checkpoint());
        assert!(!service_error(503, None).invalidates_checkpoint());
        assert!(!Error::transport("reset").invalidates_checkpoint());
        assert!(!Error::Canceled.invalidates_checkpoint());
        let io = Error::local_io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short"),
        );
        assert!(io.invalidates_checkpoint());
        let mismatch = Error::ChecksumMismatch {
            algorithm: ChecksumAlgorithm::Crc64,
            expected: "1".into(),
            actual: "2".into(),
            request_id: None,
        };
        assert!(mismatch.invalidates_checkpoint());
    }

    #[test]
    fn test_canceled_is_transient() {
        assert!(Error::Canceled.is_transient());
        assert_eq!(Error::Canceled.http_status(), None);
    }
}
