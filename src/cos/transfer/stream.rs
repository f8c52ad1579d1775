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

//! Transfers between objects and in-process byte streams
//!
//! A stream has no stable identity on disk, so these transfers never
//! checkpoint. An upload buffers the whole stream and sends it in one PUT;
//! a download fetches slices one after another and writes them in order.

use super::checkpoint::TransferKind;
use super::planner::Planner;
use super::{JobContext, TransferOutput, TransferRequest, TransferStatus, upload, verify_crc64};
use crate::cos::client::CosClient;
use crate::cos::error::Error;
use crate::cos::utils::{check_bucket_name, check_object_key, crc64, crc64_combine};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Stands in for a file path in errors about the caller's stream.
const STREAM: &str = "<stream>";

pub(crate) async fn upload_reader(
    client: &CosClient,
    request: &TransferRequest,
    ctx: &JobContext,
    reader: &mut (dyn AsyncRead + Send + Unpin),
) -> Result<TransferOutput, Error> {
    ctx.check_canceled()?;
    check_bucket_name(&request.bucket)?;
    check_object_key(&request.key)?;
    ctx.set_status(TransferStatus::InProgress);

    let mut data = Vec::new();
    reader
        .read_to_end(&mut data)
        .await
        .map_err(|e| Error::local_io(STREAM, e))?;
    log::debug!(
        "read {} bytes from stream for {}/{}",
        data.len(),
        request.bucket,
        request.key
    );
    upload::put_bytes(client, request, ctx, Bytes::from(data)).await
}

pub(crate) async fn download_writer(
    client: &CosClient,
    request: &TransferRequest,
    ctx: &JobContext,
    writer: &mut (dyn AsyncWrite + Send + Unpin),
) -> Result<TransferOutput, Error> {
    ctx.check_canceled()?;
    check_bucket_name(&request.bucket)?;
    check_object_key(&request.key)?;

    let head = client.head_object(&request.bucket, &request.key).await?;
    ctx.set_status(TransferStatus::InProgress);

    let config = client.config();
    let part_size = request.part_size.unwrap_or(config.download_slice_size);
    let plan = Planner::for_download().plan(head.size, part_size);
    // an empty object has nothing to fetch
    let parts: Vec<_> = plan.parts.into_iter().filter(|p| p.size > 0).collect();
    ctx.progress.start(head.size, 0);

    let headers = request.traffic_headers(config);
    let mut crc: Option<u64> = None;
    for part in &parts {
        ctx.check_canceled()?;
        let resp = client
            .get_object_range(
                &request.bucket,
                &request.key,
                part.offset,
                part.size,
                Some(headers.clone()),
            )
            .await?;
        writer
            .write_all(&resp.data)
            .await
            .map_err(|e| Error::local_io(STREAM, e))?;
        let len = resp.data.len() as u64;
        let chunk = crc64(&resp.data);
        crc = Some(match crc {
            Some(acc) => crc64_combine(acc, chunk, len),
            None => chunk,
        });
        ctx.progress.advance(len);
    }
    writer
        .flush()
        .await
        .map_err(|e| Error::local_io(STREAM, e))?;

    let local_crc = crc.unwrap_or_else(|| crc64(&[]));
    verify_crc64(Some(local_crc), head.crc64, head.request_id.as_deref())?;

    log::info!(
        "downloaded {}/{} into a stream in {} slices",
        request.bucket,
        request.key,
        parts.len()
    );
    Ok(TransferOutput {
        kind: TransferKind::Download,
        bucket: request.bucket.clone(),
        key: request.key.clone(),
        local_path: request.local_path.clone(),
        size: head.size,
        etag: head.etag,
        crc64: Some(local_crc),
        upload_id: None,
        parts: parts.len() as u32,
        resumed_parts: 0,
        request_id: head.request_id,
    })
}
