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
use cos_transfer::cos::error::{ChecksumAlgorithm, Error};
use cos_transfer::cos::multimap_ext::{Multimap, MultimapExt};
use cos_transfer::cos::transfer::{TransferKind, TransferStatus};
use cos_transfer::cos::utils::crc64;
use cos_transfer_common::mock_service::{Fault, Operation};
use cos_transfer_common::test_context::{BUCKET, TestContext};
use cos_transfer_common::utils::rand_object_name;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 10)]
async fn upload_multipart_object() {
    let ctx = TestContext::new();
    let manager = ctx.manager(ctx.config().upload_part_size(10 * MIB));
    let key = rand_object_name();
    let (path, data) = ctx.write_random_file("big.bin", 25 * MIB as usize);

    let mut request = ctx.request(&key, path);
    request.resumable = true;
    request.concurrency = Some(2);
    let output = manager.upload(request).await.unwrap();

    assert_eq!(output.kind, TransferKind::Upload);
    assert_eq!(output.size, 25 * MIB);
    assert_eq!(output.parts, 3);
    assert_eq!(output.resumed_parts, 0);
    assert_eq!(output.crc64, Some(crc64(&data)));
    assert!(output.upload_id.is_some());

    let service = &ctx.service;
    assert_eq!(service.count(Operation::InitiateMultipartUpload), 1);
    assert_eq!(service.count(Operation::CompleteMultipartUpload), 1);
    let mut sizes: Vec<(u32, usize)> = service
        .requests()
        .into_iter()
        .filter(|r| r.operation == Operation::UploadPart)
        .map(|r| (r.part_number.unwrap(), r.body_len))
        .collect();
    sizes.sort();
    let (m10, m5) = (10 * MIB as usize, 5 * MIB as usize);
    assert_eq!(sizes, vec![(1, m10), (2, m10), (3, m5)]);

    let stored = service.object(BUCKET, &key).unwrap();
    assert_eq!(stored.data, data);
    assert_eq!(output.etag, stored.etag);
    assert!(service.pending_uploads().is_empty());
    assert!(ctx.checkpoints().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 10)]
async fn upload_small_object_in_one_request() {
    let ctx = TestContext::new();
    let manager = ctx.manager(ctx.config().traffic_limit(Some(MIB)));
    let key = rand_object_name();
    let (path, data) = ctx.write_random_file("small.bin", 100 * 1024);

    let mut headers = Multimap::new();
    headers.add("Content-Type", "text/plain");
    let mut request = ctx.request(&key, path);
    request.headers = headers;
    let output = manager.upload(request).await.unwrap();

    assert_eq!(output.parts, 1);
    assert_eq!(output.upload_id, None);
    assert_eq!(output.crc64, Some(crc64(&data)));

    let requests = ctx.service.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].operation, Operation::PutObject);
    assert_eq!(
        requests[0].headers.get_ignore_case("x-cos-traffic-limit"),
        Some("8388608")
    );
    assert_eq!(
        requests[0].headers.get_ignore_case("Content-Type"),
        Some("text/plain")
    );
    assert_eq!(ctx.service.object(BUCKET, &key).unwrap().data, data);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 10)]
async fn upload_empty_file() {
    let ctx = TestContext::new();
    let manager = ctx.manager(ctx.config());
    let (path, _) = ctx.write_random_file("empty.bin", 0);

    let output = manager.upload(ctx.request("empty", path)).await.unwrap();
    assert_eq!(output.size, 0);
    assert_eq!(ctx.service.count(Operation::PutObject), 1);
    assert!(ctx.service.object(BUCKET, "empty").unwrap().data.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 10)]
async fn upload_routes_headers() {
    let ctx = TestContext::new();
    let manager = ctx.manager(ctx.config());
    let key = rand_object_name();
    let (path, _) = ctx.write_random_file("routed.bin", 3 * MIB as usize);

    let mut headers = Multimap::new();
    headers.add("x-cos-meta-owner", "backup-job");
    let mut request = ctx.request(&key, path);
    request.headers = headers;
    request.traffic_limit = Some(MIB);
    manager.upload(request).await.unwrap();

    for req in ctx.service.requests() {
        let meta = req.headers.get_ignore_case("x-cos-meta-owner");
        let limit = req.headers.get_ignore_case("x-cos-traffic-limit");
        match req.operation {
            Operation::InitiateMultipartUpload => {
                assert_eq!(meta, Some("backup-job"));
                assert_eq!(limit, None);
            }
            Operation::UploadPart => {
                assert_eq!(meta, None);
                assert_eq!(limit, Some("8388608"));
            }
            _ => assert_eq!(limit, None),
        }
    }
    assert_eq!(ctx.service.count(Operation::UploadPart), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 10)]
async fn upload_detects_crc64_mismatch() {
    let ctx = TestContext::new();
    let manager = ctx.manager(ctx.config());
    let (path, _) = ctx.write_random_file("crc.bin", 3 * MIB as usize);
    ctx.service.corrupt_crc64(true);

    let mut request = ctx.request("crc.bin", path);
    request.resumable = true;
    let handle = manager.submit_upload(request);
    let err = handle.wait().await.unwrap_err();

    match err {
        Error::ChecksumMismatch {
            algorithm,
            request_id,
            ..
        } => {
            assert_eq!(algorithm, ChecksumAlgorithm::Crc64);
            assert!(request_id.is_some());
        }
        e => panic!("unexpected error: {e:?}"),
    }
    assert_eq!(handle.status(), TransferStatus::Failed);
    assert_eq!(ctx.service.count(Operation::AbortMultipartUpload), 0);
    assert!(ctx.checkpoints().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 10)]
async fn upload_aborts_on_fatal_part_failure() {
    let ctx = TestContext::new();
    let manager = ctx.manager(ctx.config());
    let (path, _) = ctx.write_random_file("fatal.bin", 4 * MIB as usize);
    ctx.service.inject(Fault::status(403).part(2));

    let mut request = ctx.request("fatal.bin", path);
    request.concurrency = Some(1);
    let handle = manager.submit_upload(request);
    let err = handle.wait().await.unwrap_err();

    assert_eq!(err.http_status(), Some(403));
    assert_eq!(handle.status(), TransferStatus::Aborted);
    // a 4xx is never retried and no part after the failure is scheduled
    assert_eq!(ctx.service.count(Operation::UploadPart), 2);
    assert_eq!(ctx.service.count(Operation::CompleteMultipartUpload), 0);
    assert_eq!(ctx.service.count(Operation::AbortMultipartUpload), 1);
    assert!(ctx.service.pending_uploads().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 10)]
async fn resumable_upload_keeps_upload_after_service_failure() {
    let ctx = TestContext::new();
    let manager = ctx.manager(ctx.config());
    let (path, data) = ctx.write_random_file("denied-part.bin", 4 * MIB as usize);
    ctx.service.inject(Fault::status(403).part(2));

    let mut request = ctx.request("denied-part.bin", path.clone());
    request.resumable = true;
    request.concurrency = Some(1);
    let handle = manager.submit_upload(request);
    let err = handle.wait().await.unwrap_err();

    assert_eq!(err.http_status(), Some(403));
    assert_eq!(handle.status(), TransferStatus::Aborted);
    assert_eq!(ctx.service.count(Operation::UploadPart), 2);
    assert_eq!(ctx.service.count(Operation::AbortMultipartUpload), 0);
    assert_eq!(ctx.service.pending_uploads().len(), 1);
    assert_eq!(ctx.checkpoints().len(), 1);

    // the next run picks up where the failed one stopped
    let mut request = ctx.request("denied-part.bin", path);
    request.resumable = true;
    request.concurrency = Some(1);
    let output = manager.upload(request).await.unwrap();

    assert_eq!(output.resumed_parts, 1);
    assert_eq!(output.crc64, Some(crc64(&data)));
    assert_eq!(ctx.service.count(Operation::ListParts), 1);
    assert_eq!(ctx.service.count(Operation::InitiateMultipartUpload), 1);
    assert_eq!(ctx.service.count(Operation::UploadPart), 5);
    assert_eq!(ctx.service.count(Operation::CompleteMultipartUpload), 1);
    assert!(ctx.service.pending_uploads().is_empty());
    assert!(ctx.checkpoints().is_empty());
    assert_eq!(
        ctx.service.object(BUCKET, "denied-part.bin").unwrap().data,
        data
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 10)]
async fn resumable_upload_discards_checkpoint_on_local_failure() {
    let ctx = TestContext::new();
    let manager = ctx.manager(ctx.config());
    let (path, _) = ctx.write_random_file("shrinking.bin", 4 * MIB as usize);
    ctx.service
        .delay(Operation::UploadPart, Duration::from_millis(100));

    let mut request = ctx.request("shrinking.bin", path.clone());
    request.resumable = true;
    request.concurrency = Some(1);
    let handle = manager.submit_upload(request);
    while ctx.service.arrived(Operation::UploadPart) == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    // part 2 can no longer be read once part 1 is in flight
    std::fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(MIB)
        .unwrap();
    let err = handle.wait().await.unwrap_err();

    assert!(matches!(err, Error::LocalIo { .. }));
    assert_eq!(handle.status(), TransferStatus::Aborted);
    assert_eq!(ctx.service.count(Operation::UploadPart), 1);
    assert_eq!(ctx.service.count(Operation::AbortMultipartUpload), 1);
    assert!(ctx.service.pending_uploads().is_empty());
    assert!(ctx.checkpoints().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 10)]
async fn upload_same_file_twice_yields_same_checksum() {
    let ctx = TestContext::new();
    let manager = ctx.manager(ctx.config());
    let (path, data) = ctx.write_random_file("twice.bin", 3 * MIB as usize);

    let mut first = ctx.request("twice.bin", path.clone());
    first.concurrency = Some(3);
    let first = manager.upload(first).await.unwrap();
    let mut second = ctx.request("twice.bin", path);
    second.concurrency = Some(1);
    let second = manager.upload(second).await.unwrap();

    assert_eq!(first.crc64, Some(crc64(&data)));
    assert_eq!(first.crc64, second.crc64);
    assert_eq!(first.etag, second.etag);
    assert_ne!(first.upload_id, second.upload_id);
    assert_eq!(ctx.service.count(Operation::CompleteMultipartUpload), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 10)]
async fn upload_missing_file_fails_without_requests() {
    let ctx = TestContext::new();
    let manager = ctx.manager(ctx.config());

    let handle = manager.submit_upload(ctx.request("missing", ctx.path("missing.bin")));
    let err = handle.wait().await.unwrap_err();
    assert!(matches!(err, Error::LocalIo { .. }));
    assert_eq!(handle.status(), TransferStatus::Failed);
    assert!(ctx.service.requests().is_empty());
}
