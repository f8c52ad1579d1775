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

use cos_transfer::cos::config::MIB;
use cos_transfer::cos::transfer::{ProgressCallback, TransferStatus};
use cos_transfer_common::mock_service::{Fault, Operation};
use cos_transfer_common::test_context::{BUCKET, TestContext};
use cos_transfer_common::utils::file_md5;
use std::sync::{Arc, Mutex};

fn uploaded_parts(ctx: &TestContext) -> Vec<u32> {
    let mut parts: Vec<u32> = ctx
        .service
        .requests()
        .into_iter()
        .filter(|r| r.operation == Operation::UploadPart)
        .filter_map(|r| r.part_number)
        .collect();
    parts.sort();
    parts
}

#[tokio::test(flavor = "multi_thread", worker_threads = 10)]
async fn resume_interrupted_upload() {
    let ctx = TestContext::new();
    let manager = ctx.manager(ctx.config());
    let (path, data) = ctx.write_random_file("resume.bin", 5 * MIB as usize);
    // exhausts the retry budget of part 3
    ctx.service.inject(Fault::status(503).part(3).times(4));

    let mut request = ctx.request("resume.bin", path);
    request.resumable = true;
    request.concurrency = Some(1);

    let handle = manager.submit_upload(request.clone());
    let err = handle.wait().await.unwrap_err();
    assert_eq!(err.http_status(), Some(503));
    assert_eq!(handle.status(), TransferStatus::Aborted);
    assert_eq!(ctx.checkpoints().len(), 1);
    let pending = ctx.service.pending_uploads();
    assert_eq!(pending.len(), 1);
    assert_eq!(ctx.service.uploaded_parts(&pending[0]), vec![1, 2]);
    assert_eq!(ctx.service.count(Operation::AbortMultipartUpload), 0);

    ctx.service.clear_requests();
    let progress = Arc::new(Mutex::new(Vec::new()));
    let sink = progress.clone();
    let callback: ProgressCallback = Arc::new(move |done, total, _| {
        sink.lock().unwrap().push((done, total));
    });
    request.progress = Some(callback);
    let output = manager.upload(request).await.unwrap();

    assert_eq!(output.upload_id.as_deref(), Some(pending[0].as_str()));
    assert_eq!(output.parts, 5);
    assert_eq!(output.resumed_parts, 2);
    assert_eq!(ctx.service.count(Operation::InitiateMultipartUpload), 0);
    assert_eq!(ctx.service.count(Operation::ListParts), 1);
    assert_eq!(uploaded_parts(&ctx), vec![3, 4, 5]);
    assert_eq!(ctx.service.object(BUCKET, "resume.bin").unwrap().data, data);
    assert!(ctx.checkpoints().is_empty());

    let progress = progress.lock().unwrap();
    assert!(progress[0].0 >= 2 * MIB);
    assert_eq!(*progress.last().unwrap(), (5 * MIB, 5 * MIB));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 10)]
async fn changed_file_discards_checkpoint() {
    let ctx = TestContext::new();
    let manager = ctx.manager(ctx.config());
    let (path, _) = ctx.write_random_file("changed.bin", 4 * MIB as usize);
    ctx.service.inject(Fault::status(503).part(2).times(4));

    let mut request = ctx.request("changed.bin", path);
    request.resumable = true;
    request.concurrency = Some(1);
    assert!(manager.upload(request.clone()).await.is_err());
    assert_eq!(ctx.checkpoints().len(), 1);
    let stale = ctx.service.pending_uploads();

    let (_, data) = ctx.write_random_file("changed.bin", 6 * MIB as usize);
    ctx.service.clear_requests();
    let output = manager.upload(request).await.unwrap();

    assert_eq!(output.resumed_parts, 0);
    assert_ne!(output.upload_id, stale.first().cloned());
    assert_eq!(ctx.service.count(Operation::AbortMultipartUpload), 1);
    assert_eq!(ctx.service.count(Operation::ListParts), 0);
    assert_eq!(uploaded_parts(&ctx), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(ctx.service.object(BUCKET, "changed.bin").unwrap().data, data);
    assert!(ctx.service.pending_uploads().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 10)]
async fn vanished_upload_starts_over() {
    let ctx = TestContext::new();
    let manager = ctx.manager(ctx.config());
    let (path, data) = ctx.write_random_file("vanished.bin", 3 * MIB as usize);
    ctx.service.inject(Fault::status(503).part(3).times(4));

    let mut request = ctx.request("vanished.bin", path);
    request.resumable = true;
    request.concurrency = Some(1);
    assert!(manager.upload(request.clone()).await.is_err());

    let pending = ctx.service.pending_uploads();
    ctx.client(ctx.config())
        .abort_multipart_upload(BUCKET, "vanished.bin", &pending[0])
        .await
        .unwrap();
    ctx.service.clear_requests();

    let output = manager.upload(request).await.unwrap();
    assert_eq!(output.resumed_parts, 0);
    assert_eq!(ctx.service.count(Operation::ListParts), 1);
    assert_eq!(ctx.service.count(Operation::InitiateMultipartUpload), 1);
    assert_eq!(uploaded_parts(&ctx), vec![1, 2, 3]);
    assert_eq!(ctx.service.object(BUCKET, "vanished.bin").unwrap().data, data);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 10)]
async fn resume_interrupted_download() {
    let ctx = TestContext::new();
    let manager = ctx.manager(ctx.config().download_slice_size(MIB));
    let (source, data) = ctx.write_random_file("source.bin", 5 * MIB as usize);
    ctx.service.put(BUCKET, "remote.bin", data.clone());
    ctx.service
        .inject(Fault::status(503).on(Operation::GetObject).after(2).times(4));

    let target = ctx.path("target.bin");
    let mut request = ctx.request("remote.bin", target.clone());
    request.resumable = true;
    request.concurrency = Some(1);

    let handle = manager.submit_download(request.clone());
    assert!(handle.wait().await.is_err());
    assert_eq!(handle.status(), TransferStatus::Aborted);
    assert_eq!(ctx.checkpoints().len(), 1);
    assert_eq!(std::fs::metadata(&target).unwrap().len(), 5 * MIB);

    ctx.service.clear_requests();
    let output = manager.download(request).await.unwrap();
    assert_eq!(output.resumed_parts, 2);
    assert_eq!(ctx.service.count(Operation::GetObject), 3);
    assert_eq!(file_md5(&target), file_md5(&source));
    assert!(ctx.checkpoints().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 10)]
async fn changed_object_restarts_download() {
    let ctx = TestContext::new();
    let manager = ctx.manager(ctx.config().download_slice_size(MIB));
    let (_, data) = ctx.write_random_file("v1.bin", 4 * MIB as usize);
    ctx.service.put(BUCKET, "object.bin", data);
    ctx.service
        .inject(Fault::status(503).on(Operation::GetObject).after(1).times(4));

    let target = ctx.path("object.bin");
    let mut request = ctx.request("object.bin", target.clone());
    request.resumable = true;
    request.concurrency = Some(1);
    assert!(manager.download(request.clone()).await.is_err());

    let (source, data) = ctx.write_random_file("v2.bin", 4 * MIB as usize);
    ctx.service.put(BUCKET, "object.bin", data);
    ctx.service.clear_requests();

    let output = manager.download(request).await.unwrap();
    assert_eq!(output.resumed_parts, 0);
    assert_eq!(ctx.service.count(Operation::GetObject), 4);
    assert_eq!(file_md5(&target), file_md5(&source));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 10)]
async fn checkpoint_is_exclusive() {
    let ctx = TestContext::new();
    let manager = ctx.manager(ctx.config());
    let (path, data) = ctx.write_random_file("shared.bin", 3 * MIB as usize);

    let mut request = ctx.request("shared.bin", path.clone());
    request.resumable = true;
    let store = manager.checkpoint_store();
    let checkpoint = store.path_for(
        cos_transfer::cos::transfer::TransferKind::Upload,
        BUCKET,
        "shared.bin",
        &path,
    );
    let guard = store.acquire(&checkpoint).unwrap();

    // runs without a checkpoint instead of sharing one
    let output = manager.upload(request).await.unwrap();
    assert_eq!(output.parts, 3);
    assert!(!checkpoint.exists());
    assert_eq!(ctx.service.object(BUCKET, "shared.bin").unwrap().data, data);
    drop(guard);
    assert!(!store.is_active(&checkpoint));
}
