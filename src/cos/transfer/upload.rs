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

//! Upload orchestration
//!
//! Small files go up with one PutObject. Larger ones follow the multipart
//! session state machine
//!
//! ```text
//! Idle -> Initiated -> Uploading -> Completing -> Completed
//!            |             |            |
//!            +-------------+------------+------> Aborted
//! ```
//!
//! A resumable session reuses the upload-id of a matching checkpoint after
//! confirming it with ListParts, and only uploads the parts the service does
//! not already hold.

use super::checkpoint::{Checkpoint, CheckpointGuard, CheckpointStore, Fingerprint, TransferKind};
use super::planner::{PartDescriptor, PartPlan, Planner};
use super::pool::run_parts;
use super::{JobContext, TransferOutput, TransferRequest, TransferStatus, verify_crc64};
use crate::cos::client::CosClient;
use crate::cos::error::Error;
use crate::cos::error_response::CosErrorCode;
use crate::cos::multimap_ext::{Multimap, MultimapExt};
use crate::cos::types::Part;
use crate::cos::utils::{check_bucket_name, check_object_key, crc64, crc64_combine};
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UploadState {
    Idle,
    Initiated,
    Uploading,
    Completing,
    Completed,
    Aborted,
}

/// A finished part as reported by its worker.
#[derive(Debug)]
struct UploadedPart {
    number: u32,
    size: u64,
    etag: String,
    crc64: u64,
}

pub(crate) async fn upload(
    client: &CosClient,
    store: &CheckpointStore,
    request: &TransferRequest,
    ctx: &JobContext,
) -> Result<TransferOutput, Error> {
    ctx.check_canceled()?;
    check_bucket_name(&request.bucket)?;
    check_object_key(&request.key)?;

    let path = &request.local_path;
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| Error::local_io(path, e))?;
    if !metadata.is_file() {
        return Err(Error::local_io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }

    let config = client.config();
    let size = metadata.len();
    let part_size = request.part_size.unwrap_or(config.upload_part_size);
    let threshold = request.single_shot_threshold.unwrap_or(part_size);
    let plan = Planner::for_upload(threshold).plan(size, part_size);

    ctx.set_status(TransferStatus::InProgress);
    if plan.single_shot {
        return put_single(client, request, ctx).await;
    }

    let session = MultipartUpload {
        client,
        store,
        request,
        ctx,
        concurrency: request
            .concurrency
            .unwrap_or(config.upload_pool_size)
            .max(1),
        state: UploadState::Idle,
    };
    session.run(plan, Fingerprint::of_file(&metadata)).await
}

async fn put_single(
    client: &CosClient,
    request: &TransferRequest,
    ctx: &JobContext,
) -> Result<TransferOutput, Error> {
    let path = &request.local_path;
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| Error::local_io(path, e))?;
    put_bytes(client, request, ctx, Bytes::from(data)).await
}

/// Sends `data` to `request.key` in one PUT and verifies the CRC64 the
/// service reports.
pub(crate) async fn put_bytes(
    client: &CosClient,
    request: &TransferRequest,
    ctx: &JobContext,
    data: Bytes,
) -> Result<TransferOutput, Error> {
    let size = data.len() as u64;
    ctx.progress.start(size, 0);
    let local_crc = crc64(&data);

    ctx.check_canceled()?;
    let mut headers = request.headers.clone();
    headers.add_multimap(request.traffic_headers(client.config()));
    let resp = client
        .put_object(&request.bucket, &request.key, data, Some(headers))
        .await?;
    ctx.progress.advance(size);
    verify_crc64(Some(local_crc), resp.crc64, resp.request_id.as_deref())?;

    log::info!(
        "uploaded {size} bytes to {}/{} in a single request",
        request.bucket,
        request.key
    );
    Ok(TransferOutput {
        kind: TransferKind::Upload,
        bucket: request.bucket.clone(),
        key: request.key.clone(),
        local_path: request.local_path.clone(),
        size,
        etag: resp.etag,
        crc64: Some(local_crc),
        upload_id: None,
        parts: 1,
        resumed_parts: 0,
        request_id: resp.request_id,
    })
}

fn is_missing_upload(err: &Error) -> bool {
    err.service_error().is_some_and(|e| {
        e.status() == 404 || matches!(e.code(), CosErrorCode::NoSuchUpload)
    })
}

async fn read_part(path: &Path, part: PartDescriptor) -> Result<Bytes, Error> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| Error::local_io(path, e))?;
    file.seek(SeekFrom::Start(part.offset))
        .await
        .map_err(|e| Error::local_io(path, e))?;
    let mut buf = vec![0u8; part.size as usize];
    file.read_exact(&mut buf)
        .await
        .map_err(|e| Error::local_io(path, e))?;
    Ok(Bytes::from(buf))
}

async fn upload_one(
    client: CosClient,
    bucket: String,
    key: String,
    upload_id: String,
    path: PathBuf,
    headers: Multimap,
    part: PartDescriptor,
) -> Result<UploadedPart, Error> {
    let data = read_part(&path, part).await?;
    let crc64 = crc64(&data);
    let resp = client
        .upload_part(&bucket, &key, &upload_id, part.number, data, Some(headers))
        .await?;
    Ok(UploadedPart {
        number: part.number,
        size: part.size,
        etag: resp.etag,
        crc64,
    })
}

struct MultipartUpload<'a> {
    client: &'a CosClient,
    store: &'a CheckpointStore,
    request: &'a TransferRequest,
    ctx: &'a JobContext,
    concurrency: usize,
    state: UploadState,
}

impl MultipartUpload<'_> {
    fn transition(&mut self, state: UploadState) {
        log::debug!(
            "upload {}/{}: {:?} -> {:?}",
            self.request.bucket,
            self.request.key,
            self.state,
            state
        );
        self.state = state;
    }

    async fn run(mut self, plan: PartPlan, fingerprint: Fingerprint) -> Result<TransferOutput, Error> {
        let request = self.request;
        let guard = if request.resumable {
            let path = self.store.path_for(
                TransferKind::Upload,
                &request.bucket,
                &request.key,
                &request.local_path,
            );
            let guard = self.store.acquire(&path);
            if guard.is_none() {
                log::warn!(
                    "checkpoint {} is held by another transfer; uploading {} without resume",
                    path.display(),
                    request.local_path.display()
                );
            }
            guard
        } else {
            None
        };

        let restored = match &guard {
            Some(g) => self.restore(g.path(), &fingerprint, &plan).await?,
            None => None,
        };
        let resumed = restored.is_some();
        let checkpoint = match restored {
            Some(cp) => cp,
            None => self.initiate(&fingerprint, &plan, guard.as_ref()).await?,
        };
        self.transition(UploadState::Initiated);

        let upload_id = checkpoint.upload_id.clone().unwrap_or_default();
        let resumed_parts = checkpoint.done_parts().count() as u32;
        if resumed {
            log::info!(
                "resuming upload {upload_id} of {}: {resumed_parts} of {} parts already uploaded",
                request.local_path.display(),
                plan.parts.len()
            );
        }
        let checkpoint = Arc::new(Mutex::new(checkpoint));

        let mut result = self
            .upload_parts(&upload_id, &checkpoint, guard.as_ref(), fingerprint.size)
            .await;
        if result.is_ok() {
            result = self.ctx.check_canceled();
        }
        let completed = match result {
            Ok(()) => self.complete(&upload_id, &checkpoint).await,
            Err(e) => Err(e),
        };

        match completed {
            Ok((resp_crc, local_crc, etag, request_id)) => {
                self.transition(UploadState::Completed);
                if let Some(g) = &guard {
                    self.store.remove(g.path()).await?;
                }
                verify_crc64(local_crc, resp_crc, request_id.as_deref())?;
                log::info!(
                    "uploaded {} to {}/{} in {} parts",
                    request.local_path.display(),
                    request.bucket,
                    request.key,
                    plan.parts.len()
                );
                Ok(TransferOutput {
                    kind: TransferKind::Upload,
                    bucket: request.bucket.clone(),
                    key: request.key.clone(),
                    local_path: request.local_path.clone(),
                    size: fingerprint.size,
                    etag,
                    crc64: local_crc,
                    upload_id: Some(upload_id),
                    parts: plan.parts.len() as u32,
                    resumed_parts,
                    request_id,
                })
            }
            Err(e) => {
                self.abort(&e, &upload_id, guard.as_ref()).await;
                Err(e)
            }
        }
    }

    /// Loads a checkpoint matching this upload and confirms its upload-id
    /// with the service.
    async fn restore(
        &self,
        path: &Path,
        fingerprint: &Fingerprint,
        plan: &PartPlan,
    ) -> Result<Option<Checkpoint>, Error> {
        let request = self.request;
        let Some(mut cp) = self.store.load(path).await? else {
            return Ok(None);
        };

        if !cp.matches(
            TransferKind::Upload,
            &request.bucket,
            &request.key,
            &request.local_path,
            fingerprint,
            plan.part_size,
            &plan.parts,
        ) {
            log::warn!(
                "checkpoint {} does not match {}; starting over",
                path.display(),
                request.local_path.display()
            );
            self.store.remove(path).await?;
            if cp.bucket == request.bucket
                && cp.key == request.key
                && let Some(stale) = cp.upload_id.as_deref()
                && let Err(e) = self
                    .client
                    .abort_multipart_upload(&request.bucket, &request.key, stale)
                    .await
            {
                log::warn!("unable to abort stale upload {stale}; {e}");
            }
            return Ok(None);
        }

        self.ctx.check_canceled()?;
        let upload_id = cp.upload_id.clone().unwrap_or_default();
        match self
            .client
            .list_parts(&request.bucket, &request.key, &upload_id)
            .await
        {
            Ok(listed) => {
                let listed: Vec<(u32, String)> =
                    listed.into_iter().map(|p| (p.number, p.etag)).collect();
                cp.retain_listed_parts(&listed);
                Ok(Some(cp))
            }
            Err(e) if is_missing_upload(&e) => {
                log::warn!("upload {upload_id} no longer exists; starting over");
                self.store.remove(path).await?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn initiate(
        &self,
        fingerprint: &Fingerprint,
        plan: &PartPlan,
        guard: Option<&CheckpointGuard>,
    ) -> Result<Checkpoint, Error> {
        let request = self.request;
        self.ctx.check_canceled()?;
        let resp = self
            .client
            .initiate_multipart_upload(&request.bucket, &request.key, Some(request.headers.clone()))
            .await?;
        log::info!(
            "initiated upload {} for {}/{}",
            resp.upload_id,
            request.bucket,
            request.key
        );

        let cp = Checkpoint::new_upload(
            &request.bucket,
            &request.key,
            &request.local_path,
            fingerprint.clone(),
            plan.part_size,
            &resp.upload_id,
            &plan.parts,
        );
        if let Some(g) = guard
            && let Err(e) = self.store.save(g.path(), &cp).await
        {
            if let Err(abort_err) = self
                .client
                .abort_multipart_upload(&request.bucket, &request.key, &resp.upload_id)
                .await
            {
                log::warn!("unable to abort upload {}; {abort_err}", resp.upload_id);
            }
            return Err(e);
        }
        Ok(cp)
    }

    async fn upload_parts(
        &mut self,
        upload_id: &str,
        checkpoint: &Arc<Mutex<Checkpoint>>,
        guard: Option<&CheckpointGuard>,
        size: u64,
    ) -> Result<(), Error> {
        self.transition(UploadState::Uploading);
        let (pending, done_bytes) = {
            let cp = checkpoint.lock().unwrap_or_else(PoisonError::into_inner);
            (cp.pending_parts(), cp.transferred())
        };
        self.ctx.progress.start(size, done_bytes);

        let request = self.request;
        let headers = request.traffic_headers(self.client.config());
        let store = self.store;
        let progress = &self.ctx.progress;

        run_parts(
            self.ctx,
            pending,
            self.concurrency,
            |part| {
                upload_one(
                    self.client.clone(),
                    request.bucket.clone(),
                    request.key.clone(),
                    upload_id.to_string(),
                    request.local_path.clone(),
                    headers.clone(),
                    part,
                )
            },
            |uploaded: UploadedPart| {
                log::debug!(
                    "uploaded part {} of {upload_id} ({} bytes)",
                    uploaded.number,
                    uploaded.size
                );
                let snapshot = {
                    let mut cp = checkpoint.lock().unwrap_or_else(PoisonError::into_inner);
                    cp.mark_part_done(uploaded.number, &uploaded.etag, Some(uploaded.crc64));
                    guard.map(|_| cp.clone())
                };
                async move {
                    if let (Some(g), Some(cp)) = (guard, snapshot) {
                        store.save(g.path(), &cp).await?;
                    }
                    progress.advance(uploaded.size);
                    Ok(())
                }
            },
        )
        .await
    }

    /// Submits the part list; returns the service CRC64, the local CRC64,
    /// the object ETag and the request-id.
    async fn complete(
        &mut self,
        upload_id: &str,
        checkpoint: &Arc<Mutex<Checkpoint>>,
    ) -> Result<(Option<u64>, Option<u64>, String, Option<String>), Error> {
        self.transition(UploadState::Completing);
        let (parts, local_crc) = {
            let cp = checkpoint.lock().unwrap_or_else(PoisonError::into_inner);
            let mut records: Vec<_> = cp.parts.iter().collect();
            records.sort_by_key(|p| p.number);

            let mut parts = Vec::with_capacity(records.len());
            let mut crc: Option<u64> = None;
            let mut crc_known = true;
            for record in records {
                let Some(etag) = record.etag.clone().filter(|_| record.is_done()) else {
                    return Err(Error::InvalidResponse {
                        status: 0,
                        message: format!("part {} has no ETag", record.number),
                        request_id: None,
                    });
                };
                parts.push(Part {
                    number: record.number,
                    etag,
                });
                match (crc, record.crc64) {
                    (_, None) => crc_known = false,
                    (None, Some(c)) => crc = Some(c),
                    (Some(acc), Some(c)) => crc = Some(crc64_combine(acc, c, record.size)),
                }
            }
            (parts, crc.filter(|_| crc_known))
        };

        let resp = self
            .client
            .complete_multipart_upload(
                &self.request.bucket,
                &self.request.key,
                upload_id,
                &parts,
            )
            .await?;
        Ok((resp.crc64, local_crc, resp.etag, resp.request_id))
    }

    /// Single cleanup path for every failure after initiation.
    async fn abort(&mut self, err: &Error, upload_id: &str, guard: Option<&CheckpointGuard>) {
        self.transition(UploadState::Aborted);
        self.ctx.set_status(TransferStatus::Aborted);
        let request = self.request;

        if let Some(g) = guard
            && !err.invalidates_checkpoint()
        {
            log::info!(
                "upload {upload_id} interrupted; checkpoint {} kept for resume; {err}",
                g.path().display()
            );
            return;
        }

        if let Some(g) = guard
            && let Err(e) = self.store.remove(g.path()).await
        {
            log::warn!("unable to remove checkpoint {}; {e}", g.path().display());
        }
        match self
            .client
            .abort_multipart_upload(&request.bucket, &request.key, upload_id)
            .await
        {
            Ok(()) => log::info!("aborted upload {upload_id}; {err}"),
            Err(e) => log::warn!("unable to abort upload {upload_id}; {e}"),
        }
    }
}
