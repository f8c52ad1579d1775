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

//! Download orchestration
//!
//! The object is split into slices fetched with ranged GETs and written in
//! place into a pre-sized local file. A resumable download records the byte
//! ranges already on disk and only fetches what is missing.

use super::checkpoint::{Checkpoint, CheckpointGuard, CheckpointStore, Fingerprint, TransferKind};
use super::planner::{PartDescriptor, Planner};
use super::pool::run_parts;
use super::{JobContext, TransferOutput, TransferRequest, TransferStatus, verify_crc64};
use crate::cos::client::CosClient;
use crate::cos::error::Error;
use crate::cos::multimap_ext::Multimap;
use crate::cos::response::HeadObjectResponse;
use crate::cos::utils::{check_bucket_name, check_object_key, crc64, crc64_combine};
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

const CRC_CHUNK_SIZE: usize = 4 * 1024 * 1024;

pub(crate) async fn download(
    client: &CosClient,
    store: &CheckpointStore,
    request: &TransferRequest,
    ctx: &JobContext,
) -> Result<TransferOutput, Error> {
    ctx.check_canceled()?;
    check_bucket_name(&request.bucket)?;
    check_object_key(&request.key)?;

    let head = client.head_object(&request.bucket, &request.key).await?;
    ctx.set_status(TransferStatus::InProgress);
    let fingerprint = Fingerprint {
        size: head.size,
        etag: Some(head.etag.clone()).filter(|e| !e.is_empty()),
        last_modified: head.last_modified.clone(),
    };

    if head.size == 0 {
        return download_empty(request, ctx, head).await;
    }

    let config = client.config();
    let part_size = request.part_size.unwrap_or(config.download_slice_size);
    let plan = Planner::for_download().plan(head.size, part_size);

    let guard = if request.resumable {
        let path = store.path_for(
            TransferKind::Download,
            &request.bucket,
            &request.key,
            &request.local_path,
        );
        let guard = store.acquire(&path);
        if guard.is_none() {
            log::warn!(
                "checkpoint {} is held by another transfer; downloading to {} without resume",
                path.display(),
                request.local_path.display()
            );
        }
        guard
    } else {
        None
    };

    let restored = match &guard {
        Some(g) => restore(store, g.path(), request, &fingerprint, plan.part_size).await?,
        None => None,
    };
    let resumed = restored.is_some();
    let checkpoint = match restored {
        Some(cp) => cp,
        None => {
            let cp = Checkpoint::new_download(
                &request.bucket,
                &request.key,
                &request.local_path,
                fingerprint.clone(),
                plan.part_size,
            );
            prepare_file(&request.local_path, head.size).await?;
            if let Some(g) = &guard {
                store.save(g.path(), &cp).await?;
            }
            cp
        }
    };

    let pending: Vec<PartDescriptor> = plan
        .parts
        .iter()
        .filter(|p| !checkpoint.completed.contains(p.offset, p.end()))
        .copied()
        .collect();
    let resumed_parts = (plan.parts.len() - pending.len()) as u32;
    if resumed {
        log::info!(
            "resuming download of {}/{}: {} of {} bytes already on disk",
            request.bucket,
            request.key,
            checkpoint.completed.covered(),
            head.size
        );
    }
    ctx.progress.start(head.size, checkpoint.completed.covered());
    let checkpoint = Arc::new(Mutex::new(checkpoint));

    let concurrency = request
        .concurrency
        .unwrap_or(config.download_pool_size)
        .max(1);
    let headers = request.traffic_headers(config);
    let mut result = run_parts(
        ctx,
        pending,
        concurrency,
        |part| {
            fetch_one(
                client.clone(),
                request.bucket.clone(),
                request.key.clone(),
                request.local_path.clone(),
                headers.clone(),
                part,
            )
        },
        |part: PartDescriptor| {
            log::debug!(
                "fetched bytes {}-{} of {}/{}",
                part.offset,
                part.end() - 1,
                request.bucket,
                request.key
            );
            let snapshot = {
                let mut cp = checkpoint.lock().unwrap_or_else(PoisonError::into_inner);
                cp.completed.insert(part.offset, part.end());
                guard.as_ref().map(|_| cp.clone())
            };
            let path = guard.as_ref().map(|g| g.path());
            async move {
                if let (Some(path), Some(cp)) = (path, snapshot) {
                    store.save(path, &cp).await?;
                }
                ctx.progress.advance(part.size);
                Ok(())
            }
        },
    )
    .await;
    if result.is_ok() {
        result = ctx.check_canceled();
    }
    if let Err(e) = result {
        abort(store, request, ctx, &e, guard.as_ref()).await;
        return Err(e);
    }

    let local_crc = match head.crc64 {
        Some(_) => Some(file_crc64(&request.local_path).await?),
        None => None,
    };
    if let Some(g) = &guard {
        store.remove(g.path()).await?;
    }
    if let Err(e) = verify_crc64(local_crc, head.crc64, head.request_id.as_deref()) {
        remove_partial_file(&request.local_path).await;
        return Err(e);
    }

    log::info!(
        "downloaded {}/{} to {} in {} slices",
        request.bucket,
        request.key,
        request.local_path.display(),
        plan.parts.len()
    );
    Ok(TransferOutput {
        kind: TransferKind::Download,
        bucket: request.bucket.clone(),
        key: request.key.clone(),
        local_path: request.local_path.clone(),
        size: head.size,
        etag: head.etag,
        crc64: local_crc.or(head.crc64),
        upload_id: None,
        parts: plan.parts.len() as u32,
        resumed_parts,
        request_id: head.request_id,
    })
}

/// A zero-length object needs no GET; the local file is just truncated.
async fn download_empty(
    request: &TransferRequest,
    ctx: &JobContext,
    head: HeadObjectResponse,
) -> Result<TransferOutput, Error> {
    prepare_file(&request.local_path, 0).await?;
    ctx.progress.start(0, 0);
    Ok(TransferOutput {
        kind: TransferKind::Download,
        bucket: request.bucket.clone(),
        key: request.key.clone(),
        local_path: request.local_path.clone(),
        size: 0,
        etag: head.etag,
        crc64: head.crc64,
        upload_id: None,
        parts: 0,
        resumed_parts: 0,
        request_id: head.request_id,
    })
}

async fn restore(
    store: &CheckpointStore,
    path: &Path,
    request: &TransferRequest,
    fingerprint: &Fingerprint,
    part_size: u64,
) -> Result<Option<Checkpoint>, Error> {
    let Some(cp) = store.load(path).await? else {
        return Ok(None);
    };
    let file_len = tokio::fs::metadata(&request.local_path)
        .await
        .map(|m| m.len())
        .ok();

    let valid = cp.matches(
        TransferKind::Download,
        &request.bucket,
        &request.key,
        &request.local_path,
        fingerprint,
        part_size,
        &[],
    ) && file_len == Some(fingerprint.size);
    if !valid {
        log::warn!(
            "checkpoint {} does not match {}/{}; starting over",
            path.display(),
            request.bucket,
            request.key
        );
        store.remove(path).await?;
        return Ok(None);
    }
    Ok(Some(cp))
}

/// Creates or truncates the local file and sizes it for positioned writes.
async fn prepare_file(path: &Path, size: u64) -> Result<(), Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::local_io(parent, e))?;
    }
    let file = tokio::fs::File::create(path)
        .await
        .map_err(|e| Error::local_io(path, e))?;
    file.set_len(size)
        .await
        .map_err(|e| Error::local_io(path, e))?;
    Ok(())
}

async fn fetch_one(
    client: CosClient,
    bucket: String,
    key: String,
    path: PathBuf,
    headers: Multimap,
    part: PartDescriptor,
) -> Result<PartDescriptor, Error> {
    let resp = client
        .get_object_range(&bucket, &key, part.offset, part.size, Some(headers))
        .await?;

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .await
        .map_err(|e| Error::local_io(&path, e))?;
    file.seek(SeekFrom::Start(part.offset))
        .await
        .map_err(|e| Error::local_io(&path, e))?;
    file.write_all(&resp.data)
        .await
        .map_err(|e| Error::local_io(&path, e))?;
    file.sync_data()
        .await
        .map_err(|e| Error::local_io(&path, e))?;
    Ok(part)
}

/// CRC64 of a whole file, folded from fixed-size chunks.
async fn file_crc64(path: &Path) -> Result<u64, Error> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| Error::local_io(path, e))?;
    let mut buf = vec![0u8; CRC_CHUNK_SIZE];
    let mut crc: Option<u64> = None;
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| Error::local_io(path, e))?;
        if n == 0 {
            break;
        }
        let chunk = crc64(&buf[..n]);
        crc = Some(match crc {
            Some(acc) => crc64_combine(acc, chunk, n as u64),
            None => chunk,
        });
    }
    Ok(crc.unwrap_or_else(|| crc64(&[])))
}

async fn remove_partial_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => log::warn!("unable to remove {}; {e}", path.display()),
    }
}

/// Single cleanup path for every failure once the local file exists.
async fn abort(
    store: &CheckpointStore,
    request: &TransferRequest,
    ctx: &JobContext,
    err: &Error,
    guard: Option<&CheckpointGuard>,
) {
    ctx.set_status(TransferStatus::Aborted);
    if let Some(g) = guard {
        if !err.invalidates_checkpoint() {
            log::info!(
                "download of {}/{} interrupted; checkpoint {} kept for resume; {err}",
                request.bucket,
                request.key,
                g.path().display()
            );
            return;
        }
        if let Err(e) = store.remove(g.path()).await {
            log::warn!("unable to remove checkpoint {}; {e}", g.path().display());
        }
    }
    remove_partial_file(&request.local_path).await;
    log::info!(
        "download of {}/{} aborted; {err}",
        request.bucket,
        request.key
    );
}
