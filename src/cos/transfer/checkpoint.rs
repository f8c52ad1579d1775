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

//! Resumable transfer state
//!
//! A [`Checkpoint`] records what a transfer has durably achieved: the
//! fingerprint of the object it applies to, the upload-id of a multipart
//! upload, the ETag of every finished part, or the byte ranges of a download
//! already written to disk. The [`CheckpointStore`] persists one JSON
//! artifact per (bucket, key, local path) and keeps track of the artifacts
//! held by running transfers.

use crate::cos::error::Error;
use crate::cos::transfer::planner::PartDescriptor;
use crate::cos::utils::md5_hex;
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tokio::io::AsyncWriteExt;

pub const CHECKPOINT_VERSION: u32 = 1;

const CHECKPOINT_EXTENSION: &str = "cpt";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Upload,
    Download,
}

impl TransferKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferKind::Upload => "upload",
            TransferKind::Download => "download",
        }
    }
}

/// Identity of the data a checkpoint applies to: the local file of an
/// upload, the remote object of a download.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl Fingerprint {
    /// Fingerprint of a local file: its size and modification time.
    pub fn of_file(metadata: &fs::Metadata) -> Self {
        let last_modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos().to_string());
        Self {
            size: metadata.len(),
            etag: None,
            last_modified,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartState {
    Pending,
    Done,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartRecord {
    pub number: u32,
    pub offset: u64,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crc64: Option<u64>,
    pub state: PartState,
}

impl PartRecord {
    pub fn is_done(&self) -> bool {
        self.state == PartState::Done && self.etag.is_some()
    }

    pub fn descriptor(&self) -> PartDescriptor {
        PartDescriptor {
            number: self.number,
            offset: self.offset,
            size: self.size,
        }
    }

    fn reset(&mut self) {
        self.state = PartState::Pending;
        self.etag = None;
        self.crc64 = None;
    }
}

impl From<&PartDescriptor> for PartRecord {
    fn from(part: &PartDescriptor) -> Self {
        Self {
            number: part.number,
            offset: part.offset,
            size: part.size,
            etag: None,
            crc64: None,
            state: PartState::Pending,
        }
    }
}

/// Sorted, disjoint, non-adjacent half-open byte ranges `[start, end)`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ByteRanges(Vec<(u64, u64)>);

impl ByteRanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `[start, end)`, merging it with overlapping or adjacent ranges.
    pub fn insert(&mut self, start: u64, end: u64) {
        if start >= end {
            return;
        }
        // first range that ends at or after `start`
        let lo = self.0.partition_point(|&(_, e)| e < start);
        // first range that starts after `end`
        let hi = self.0.partition_point(|&(s, _)| s <= end);
        if lo == hi {
            self.0.insert(lo, (start, end));
            return;
        }
        let merged = (start.min(self.0[lo].0), end.max(self.0[hi - 1].1));
        self.0.splice(lo..hi, [merged]);
    }

    /// Whether `[start, end)` is entirely covered.
    pub fn contains(&self, start: u64, end: u64) -> bool {
        if start >= end {
            return true;
        }
        let idx = self.0.partition_point(|&(_, e)| e <= start);
        self.0
            .get(idx)
            .is_some_and(|&(s, e)| s <= start && end <= e)
    }

    /// Number of bytes covered.
    pub fn covered(&self) -> u64 {
        self.0.iter().map(|(s, e)| e - s).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(u64, u64)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Durable record of a transfer's progress.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub kind: TransferKind,
    pub bucket: String,
    pub key: String,
    pub local_path: PathBuf,
    pub fingerprint: Fingerprint,
    pub part_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
    /// Parts of an upload.
    #[serde(default)]
    pub parts: Vec<PartRecord>,
    /// Byte ranges of a download already on disk.
    #[serde(default)]
    pub completed: ByteRanges,
}

impl Checkpoint {
    pub fn new_upload(
        bucket: &str,
        key: &str,
        local_path: &Path,
        fingerprint: Fingerprint,
        part_size: u64,
        upload_id: &str,
        parts: &[PartDescriptor],
    ) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            kind: TransferKind::Upload,
            bucket: bucket.to_string(),
            key: key.to_string(),
            local_path: local_path.to_path_buf(),
            fingerprint,
            part_size,
            upload_id: Some(upload_id.to_string()),
            parts: parts.iter().map(PartRecord::from).collect(),
            completed: ByteRanges::new(),
        }
    }

    pub fn new_download(
        bucket: &str,
        key: &str,
        local_path: &Path,
        fingerprint: Fingerprint,
        part_size: u64,
    ) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            kind: TransferKind::Download,
            bucket: bucket.to_string(),
            key: key.to_string(),
            local_path: local_path.to_path_buf(),
            fingerprint,
            part_size,
            upload_id: None,
            parts: Vec::new(),
            completed: ByteRanges::new(),
        }
    }

    /// Whether this checkpoint can resume the described transfer.
    #[allow(clippy::too_many_arguments)]
    pub fn matches(
        &self,
        kind: TransferKind,
        bucket: &str,
        key: &str,
        local_path: &Path,
        fingerprint: &Fingerprint,
        part_size: u64,
        parts: &[PartDescriptor],
    ) -> bool {
        if self.version != CHECKPOINT_VERSION
            || self.kind != kind
            || self.bucket != bucket
            || self.key != key
            || self.local_path != local_path
            || &self.fingerprint != fingerprint
            || self.part_size != part_size
        {
            return false;
        }
        match kind {
            TransferKind::Upload => {
                self.upload_id.as_deref().is_some_and(|id| !id.is_empty())
                    && self.parts.len() == parts.len()
                    && self
                        .parts
                        .iter()
                        .zip(parts)
                        .all(|(r, p)| r.descriptor() == *p)
            }
            TransferKind::Download => true,
        }
    }

    pub fn mark_part_done(&mut self, number: u32, etag: &str, crc64: Option<u64>) {
        if let Some(part) = self.parts.iter_mut().find(|p| p.number == number) {
            part.state = PartState::Done;
            part.etag = Some(etag.to_string());
            part.crc64 = crc64;
        }
    }

    /// Resets to pending every finished part whose ETag the service does not
    /// report for the upload. `listed` holds (part number, ETag) pairs.
    pub fn retain_listed_parts(&mut self, listed: &[(u32, String)]) {
        for part in self.parts.iter_mut().filter(|p| p.is_done()) {
            let confirmed = listed.iter().any(|(number, etag)| {
                *number == part.number
                    && part
                        .etag
                        .as_deref()
                        .is_some_and(|e| e.eq_ignore_ascii_case(etag))
            });
            if !confirmed {
                part.reset();
            }
        }
    }

    pub fn done_parts(&self) -> impl Iterator<Item = &PartRecord> {
        self.parts.iter().filter(|p| p.is_done())
    }

    pub fn pending_parts(&self) -> Vec<PartDescriptor> {
        self.parts
            .iter()
            .filter(|p| !p.is_done())
            .map(PartRecord::descriptor)
            .collect()
    }

    /// Bytes already transferred.
    pub fn transferred(&self) -> u64 {
        match self.kind {
            TransferKind::Upload => self.done_parts().map(|p| p.size).sum(),
            TransferKind::Download => self.completed.covered(),
        }
    }
}

/// Removes its checkpoint path from the active set when dropped.
#[derive(Debug)]
pub struct CheckpointGuard {
    path: PathBuf,
    active: Arc<DashSet<PathBuf>>,
}

impl CheckpointGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CheckpointGuard {
    fn drop(&mut self) {
        self.active.remove(&self.path);
    }
}

/// Loads and saves checkpoints; one artifact per (bucket, key, local path).
#[derive(Clone, Debug, Default)]
pub struct CheckpointStore {
    dir: Option<PathBuf>,
    active: Arc<DashSet<PathBuf>>,
}

impl CheckpointStore {
    /// Checkpoints go to `dir` when given, else next to the local file.
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            active: Arc::new(DashSet::new()),
        }
    }

    /// Returns `.{file name}.{kind}-{hash}.cpt`, where the hash covers the
    /// bucket, the key and the local path.
    pub fn path_for(&self, kind: TransferKind, bucket: &str, key: &str, local_path: &Path) -> PathBuf {
        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let digest = md5_hex(format!("{bucket}/{key}\n{}", local_path.display()).as_bytes());
        let name = format!(
            ".{file_name}.{}-{}.{CHECKPOINT_EXTENSION}",
            kind.as_str(),
            &digest[..16]
        );
        match &self.dir {
            Some(dir) => dir.join(name),
            None => local_path
                .parent()
                .map_or_else(|| PathBuf::from(&name), |p| p.join(&name)),
        }
    }

    /// Claims `path` for the calling transfer. Returns `None` when another
    /// running transfer holds it.
    pub fn acquire(&self, path: &Path) -> Option<CheckpointGuard> {
        if !self.active.insert(path.to_path_buf()) {
            return None;
        }
        Some(CheckpointGuard {
            path: path.to_path_buf(),
            active: self.active.clone(),
        })
    }

    pub fn is_active(&self, path: &Path) -> bool {
        self.active.contains(path)
    }

    /// Reads a checkpoint. A missing artifact is `Ok(None)`; an unreadable or
    /// corrupt one is discarded and also yields `Ok(None)`.
    pub async fn load(&self, path: &Path) -> Result<Option<Checkpoint>, Error> {
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::local_io(path, e)),
        };
        match serde_json::from_slice::<Checkpoint>(&data) {
            Ok(cp) => Ok(Some(cp)),
            Err(e) => {
                log::warn!("discarding corrupt checkpoint {}; {e}", path.display());
                self.remove(path).await?;
                Ok(None)
            }
        }
    }

    /// Writes `checkpoint` to a temporary file and renames it over `path`.
    ///
    /// File system calls run on tokio's blocking pool, so a transfer saving
    /// after every part does not stall the worker driving other transfers.
    pub async fn save(&self, path: &Path, checkpoint: &Checkpoint) -> Result<(), Error> {
        let data = serde_json::to_vec(checkpoint).map_err(|e| {
            Error::local_io(path, io::Error::new(io::ErrorKind::InvalidData, e))
        })?;

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if self.dir.is_some() {
            tokio::fs::create_dir_all(&parent)
                .await
                .map_err(|e| Error::local_io(&parent, e))?;
        }
        let tmp_path = parent.join(format!(".tmp.{}.{CHECKPOINT_EXTENSION}", uuid::Uuid::new_v4()));

        if let Err(e) = write_synced(&tmp_path, &data).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(Error::local_io(&tmp_path, e));
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(Error::local_io(path, e));
        }
        Ok(())
    }

    /// Deletes a checkpoint; a missing artifact is not an error.
    pub async fn remove(&self, path: &Path) -> Result<(), Error> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::local_io(path, e)),
        }
    }
}

async fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await
}
