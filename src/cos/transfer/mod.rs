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

//! Resilient concurrent transfers between local files and objects
//!
//! A [`TransferManager`] runs uploads and downloads as whole units of work.
//! Each transfer is planned into parts ([`planner`]), whose requests run
//! concurrently up to the transfer's concurrency, each under the client's
//! retry and failover policy. Resumable transfers persist their progress in
//! a [`checkpoint`] so a later run with the same local file only moves the
//! bytes still missing.

pub mod checkpoint;
pub mod handle;
pub mod manager;
pub mod planner;
pub mod progress;

mod download;
mod pool;
mod stream;
mod upload;

pub use checkpoint::{ByteRanges, Checkpoint, CheckpointStore, Fingerprint, TransferKind};
pub use handle::AsyncHandle;
pub use manager::TransferManager;
pub use planner::{PartDescriptor, PartPlan, Planner};
pub use progress::Progress;

use crate::cos::config::CosConfig;
use crate::cos::error::{ChecksumAlgorithm, Error};
use crate::cos::header_constants::X_COS_TRAFFIC_LIMIT;
use crate::cos::multimap_ext::{Multimap, MultimapExt};
use progress::ProgressReporter;
use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use typed_builder::TypedBuilder;

/// Opaque caller data handed back, unmodified, to the callbacks.
pub type UserData = Arc<dyn Any + Send + Sync>;

/// Called with the cumulative bytes transferred and the total.
pub type ProgressCallback = Arc<dyn Fn(u64, u64, Option<&UserData>) + Send + Sync>;

/// Called exactly once with the terminal result of a transfer.
pub type CompletionCallback =
    Arc<dyn Fn(&Result<TransferOutput, Error>, Option<&UserData>) + Send + Sync>;

/// Lifecycle of a transfer as seen through an [`AsyncHandle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferStatus {
    /// Waiting for a slot in the async pool.
    NotStarted,
    InProgress,
    Completed,
    /// Failed before any part was scheduled.
    Failed,
    Canceled,
    /// Failed after the transfer session started; remote and local state
    /// were cleaned up or retained for resumption.
    Aborted,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferStatus::NotStarted | TransferStatus::InProgress)
    }
}

/// What to move, where, and how.
///
/// # Examples
///
/// ```
/// use cos_transfer::cos::transfer::TransferRequest;
///
/// let request = TransferRequest::builder()
///     .bucket("examplebucket-1250000000")
///     .key("backups/db.tar")
///     .local_path("/var/backups/db.tar")
///     .part_size(16 * 1024 * 1024)
///     .concurrency(4)
///     .resumable(true)
///     .build();
/// ```
#[derive(Clone, TypedBuilder)]
pub struct TransferRequest {
    #[builder(setter(into))]
    pub bucket: String,

    #[builder(setter(into))]
    pub key: String,

    /// Unused by stream transfers.
    #[builder(default, setter(into))]
    pub local_path: PathBuf,

    /// Defaults to `UploadPartSize` for uploads and `down_slice_size` for
    /// downloads.
    #[builder(default, setter(strip_option))]
    pub part_size: Option<u64>,

    /// Parts in flight at once. Defaults to the configured pool size.
    #[builder(default, setter(strip_option))]
    pub concurrency: Option<usize>,

    /// Uploads up to this size use a single PUT. Defaults to the part size.
    #[builder(default, setter(strip_option))]
    pub single_shot_threshold: Option<u64>,

    /// Bandwidth cap in bytes per second, overriding `TrafficLimit`.
    #[builder(default, setter(strip_option))]
    pub traffic_limit: Option<u64>,

    #[builder(default = false)]
    pub resumable: bool,

    /// Extra headers for the object, e.g. `Content-Type` or `x-cos-meta-*`;
    /// sent with PutObject or InitiateMultipartUpload.
    #[builder(default)]
    pub headers: Multimap,

    #[builder(default, setter(strip_option))]
    pub progress: Option<ProgressCallback>,

    #[builder(default, setter(strip_option))]
    pub on_complete: Option<CompletionCallback>,

    #[builder(default, setter(strip_option))]
    pub user_data: Option<UserData>,
}

impl fmt::Debug for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferRequest")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("local_path", &self.local_path)
            .field("part_size", &self.part_size)
            .field("concurrency", &self.concurrency)
            .field("single_shot_threshold", &self.single_shot_threshold)
            .field("traffic_limit", &self.traffic_limit)
            .field("resumable", &self.resumable)
            .field("headers", &self.headers)
            .field("progress", &self.progress.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

impl TransferRequest {
    /// `x-cos-traffic-limit` for data-carrying requests, in bits per second.
    pub(crate) fn traffic_headers(&self, config: &CosConfig) -> Multimap {
        let mut headers = Multimap::new();
        if let Some(limit) = self.traffic_limit.or(config.traffic_limit) {
            headers.add(X_COS_TRAFFIC_LIMIT, limit.saturating_mul(8).to_string());
        }
        headers
    }
}

/// Result of a finished transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferOutput {
    pub kind: TransferKind,
    pub bucket: String,
    pub key: String,
    pub local_path: PathBuf,
    pub size: u64,
    pub etag: String,
    /// CRC-64/ECMA-182 of the object content.
    pub crc64: Option<u64>,
    /// Upload-id of a multipart upload.
    pub upload_id: Option<String>,
    pub parts: u32,
    /// Parts restored from a checkpoint instead of being transferred.
    pub resumed_parts: u32,
    pub request_id: Option<String>,
}

/// Cooperative cancellation flag, checked before each part is scheduled.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-transfer state shared between the orchestrator and its observers.
pub(crate) struct JobContext {
    pub(crate) cancel: CancelFlag,
    pub(crate) status: watch::Sender<TransferStatus>,
    pub(crate) progress: ProgressReporter,
}

impl JobContext {
    pub(crate) fn new() -> Self {
        let (status, _) = watch::channel(TransferStatus::NotStarted);
        let (progress, _) = ProgressReporter::new();
        Self {
            cancel: CancelFlag::default(),
            status,
            progress,
        }
    }

    pub(crate) fn set_status(&self, status: TransferStatus) {
        self.status.send_replace(status);
    }

    pub(crate) fn status(&self) -> TransferStatus {
        *self.status.borrow()
    }

    pub(crate) fn check_canceled(&self) -> Result<(), Error> {
        if self.cancel.is_canceled() {
            return Err(Error::Canceled);
        }
        Ok(())
    }
}

/// Compares the CRC64 computed locally with the one the service reported.
pub(crate) fn verify_crc64(
    local: Option<u64>,
    remote: Option<u64>,
    request_id: Option<&str>,
) -> Result<(), Error> {
    match (local, remote) {
        (Some(local), Some(remote)) if local != remote => Err(Error::ChecksumMismatch {
            algorithm: ChecksumAlgorithm::Crc64,
            expected: remote.to_string(),
            actual: local.to_string(),
            request_id: request_id.map(String::from),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traffic_headers() {
        let config = CosConfig::new("ak", "sk", "ap-guangzhou").traffic_limit(Some(100 * 1024));
        let request = TransferRequest::builder()
            .bucket("b")
            .key("k")
            .local_path("/tmp/k")
            .build();
        let headers = request.traffic_headers(&config);
        assert_eq!(headers.get(X_COS_TRAFFIC_LIMIT).map(String::as_str), Some("819200"));

        let request = TransferRequest::builder()
            .bucket("b")
            .key("k")
            .local_path("/tmp/k")
            .traffic_limit(1000)
            .build();
        let headers = request.traffic_headers(&CosConfig::default());
        assert_eq!(headers.get(X_COS_TRAFFIC_LIMIT).map(String::as_str), Some("8000"));

        let request = TransferRequest::builder()
            .bucket("b")
            .key("k")
            .local_path("/tmp/k")
            .build();
        assert!(request.traffic_headers(&CosConfig::default()).is_empty());
    }

    #[test]
    fn test_verify_crc64() {
        assert!(verify_crc64(Some(1), Some(1), None).is_ok());
        assert!(verify_crc64(Some(1), None, None).is_ok());
        assert!(verify_crc64(None, Some(1), None).is_ok());
        let err = verify_crc64(Some(1), Some(2), Some("req")).unwrap_err();
        assert_eq!(err.request_id(), Some("req"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_status_terminal() {
        assert!(!TransferStatus::NotStarted.is_terminal());
        assert!(!TransferStatus::InProgress.is_terminal());
        assert!(TransferStatus::Canceled.is_terminal());
        assert!(TransferStatus::Aborted.is_terminal());
    }
}
