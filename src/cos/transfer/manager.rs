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

//! Entry point for running transfers

use super::checkpoint::{CheckpointStore, TransferKind};
use super::handle::AsyncHandle;
use super::progress::forward_progress;
use super::{
    CompletionCallback, JobContext, TransferOutput, TransferRequest, TransferStatus, UserData,
    download, stream, upload,
};
use crate::cos::client::CosClient;
use crate::cos::error::Error;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::Semaphore;

/// What a transfer moves data between.
enum Job<'a> {
    Upload,
    Download,
    UploadFrom(&'a mut (dyn AsyncRead + Send + Unpin)),
    DownloadInto(&'a mut (dyn AsyncWrite + Send + Unpin)),
}

impl Job<'_> {
    fn kind(&self) -> TransferKind {
        match self {
            Job::Upload | Job::UploadFrom(_) => TransferKind::Upload,
            Job::Download | Job::DownloadInto(_) => TransferKind::Download,
        }
    }
}

/// A submitted transfer as the manager tracks it until it settles.
#[derive(Clone)]
struct Submission {
    handle: AsyncHandle,
    on_complete: Option<CompletionCallback>,
    user_data: Option<UserData>,
}

impl fmt::Debug for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl Submission {
    /// Fires the completion callback and releases the handle. Only the first
    /// call for a submission has any effect; returns whether it was this one.
    fn settle(&self, result: &Result<TransferOutput, Error>, status: TransferStatus) -> bool {
        if !self.handle.claim() {
            return false;
        }
        if let Some(on_complete) = &self.on_complete {
            on_complete(result, self.user_data.as_ref());
        }
        self.handle.finish(result.clone(), status);
        true
    }
}

/// What a transfer needs to run, detached from the manager that owns it.
#[derive(Clone, Debug)]
struct Engine {
    client: CosClient,
    store: CheckpointStore,
}

impl Engine {
    async fn run(
        &self,
        job: Job<'_>,
        request: &TransferRequest,
        ctx: &JobContext,
    ) -> Result<TransferOutput, Error> {
        match job {
            Job::Upload => upload::upload(&self.client, &self.store, request, ctx).await,
            Job::Download => download::download(&self.client, &self.store, request, ctx).await,
            Job::UploadFrom(reader) => {
                stream::upload_reader(&self.client, request, ctx, reader).await
            }
            Job::DownloadInto(writer) => {
                stream::download_writer(&self.client, request, ctx, writer).await
            }
        }
    }

    /// Runs one transfer to its end: waits for a pool slot, forwards
    /// progress, settles the final status and fires the completion callback
    /// exactly once.
    async fn drive(
        self,
        job: Job<'_>,
        request: TransferRequest,
        ctx: JobContext,
        pool: Option<Arc<Semaphore>>,
        submission: Option<Submission>,
    ) -> Result<TransferOutput, Error> {
        let kind = job.kind();
        let permit = match pool {
            Some(pool) => match pool.acquire_owned().await {
                Ok(permit) => Ok(Some(permit)),
                // closed by shutdown
                Err(_) => Err(Error::Canceled),
            },
            None => Ok(None),
        };

        let forwarder = request.progress.clone().map(|callback| {
            tokio::spawn(forward_progress(
                ctx.progress.subscribe(),
                callback,
                request.user_data.clone(),
            ))
        });

        let result = match &permit {
            Ok(_) => self.run(job, &request, &ctx).await,
            Err(e) => Err(e.clone()),
        };

        let JobContext {
            status, progress, ..
        } = ctx;
        drop(progress);
        if let Some(forwarder) = forwarder
            && let Err(e) = forwarder.await
        {
            log::warn!("progress callback for {}/{} failed; {e}", request.bucket, request.key);
        }

        let final_status = match &result {
            Ok(_) => TransferStatus::Completed,
            Err(Error::Canceled) => TransferStatus::Canceled,
            Err(_) if *status.borrow() == TransferStatus::Aborted => TransferStatus::Aborted,
            Err(_) => TransferStatus::Failed,
        };
        status.send_replace(final_status);
        drop(permit);
        match &result {
            Ok(_) => log::debug!(
                "{} of {}/{} completed",
                kind.as_str(),
                request.bucket,
                request.key
            ),
            Err(e) => log::warn!(
                "{} of {}/{} ended {final_status:?}; {e}",
                kind.as_str(),
                request.bucket,
                request.key
            ),
        }

        match submission {
            Some(submission) => {
                if !submission.settle(&result, final_status) {
                    log::debug!(
                        "{} of {}/{} was settled by manager shutdown",
                        kind.as_str(),
                        request.bucket,
                        request.key
                    );
                }
            }
            None => {
                if let Some(on_complete) = &request.on_complete {
                    on_complete(&result, request.user_data.as_ref());
                }
            }
        }
        result
    }
}

/// Runs uploads and downloads against one [`CosClient`].
///
/// Transfers can be awaited directly, run to completion on the calling
/// thread, or submitted to the background pool, which runs at most
/// `async_pool_size` transfers at once and hands back an [`AsyncHandle`].
///
/// # Examples
///
/// ```no_run
/// use cos_transfer::cos::client::CosClient;
/// use cos_transfer::cos::config::CosConfig;
/// use cos_transfer::cos::transfer::{TransferManager, TransferRequest};
///
/// let config = CosConfig::new("AKID...", "secret", "ap-guangzhou");
/// let manager = TransferManager::new(CosClient::new(config)?)?;
///
/// let handle = manager.submit_upload(
///     TransferRequest::builder()
///         .bucket("examplebucket-1250000000")
///         .key("backups/db.tar")
///         .local_path("/var/backups/db.tar")
///         .resumable(true)
///         .build(),
/// );
/// let output = handle.wait_until_finish()?;
/// println!("uploaded {} bytes, etag {}", output.size, output.etag);
/// # Ok::<(), cos_transfer::cos::error::Error>(())
/// ```
#[derive(Debug)]
pub struct TransferManager {
    engine: Engine,
    pool: Arc<Semaphore>,
    runtime: Option<Runtime>,
    rt_handle: Handle,
    live: Arc<DashMap<u64, Submission>>,
    next_id: AtomicU64,
}

impl TransferManager {
    /// Creates a manager with its own multi-threaded runtime for background
    /// transfers.
    pub fn new(client: CosClient) -> Result<Self, Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("cos-transfer")
            .build()
            .map_err(|e| Error::Configuration(format!("unable to start transfer runtime; {e}")))?;
        let rt_handle = runtime.handle().clone();
        Ok(Self::with_parts(client, Some(runtime), rt_handle))
    }

    /// Creates a manager that spawns background transfers on an existing
    /// runtime.
    pub fn with_runtime_handle(client: CosClient, handle: Handle) -> Self {
        Self::with_parts(client, None, handle)
    }

    fn with_parts(client: CosClient, runtime: Option<Runtime>, rt_handle: Handle) -> Self {
        let config = client.config();
        let store = CheckpointStore::new(config.checkpoint_dir.clone());
        let pool = Arc::new(Semaphore::new(config.async_pool_size.max(1)));
        Self {
            engine: Engine { client, store },
            pool,
            runtime,
            rt_handle,
            live: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn client(&self) -> &CosClient {
        &self.engine.client
    }

    pub fn checkpoint_store(&self) -> &CheckpointStore {
        &self.engine.store
    }

    /// Number of submitted transfers that have not finished yet.
    pub fn active_transfers(&self) -> usize {
        self.live.len()
    }

    /// Uploads `request.local_path` to `request.key`.
    pub async fn upload(&self, request: TransferRequest) -> Result<TransferOutput, Error> {
        self.engine
            .clone()
            .drive(Job::Upload, request, JobContext::new(), None, None)
            .await
    }

    /// Downloads `request.key` into `request.local_path`.
    pub async fn download(&self, request: TransferRequest) -> Result<TransferOutput, Error> {
        self.engine
            .clone()
            .drive(Job::Download, request, JobContext::new(), None, None)
            .await
    }

    /// Uploads everything `reader` yields to `request.key` in one PUT.
    ///
    /// `request.local_path` and `request.resumable` are ignored; the stream is
    /// buffered in memory before it is sent.
    pub async fn upload_from_reader<R>(
        &self,
        request: TransferRequest,
        reader: &mut R,
    ) -> Result<TransferOutput, Error>
    where
        R: AsyncRead + Send + Unpin,
    {
        self.engine
            .clone()
            .drive(Job::UploadFrom(reader), request, JobContext::new(), None, None)
            .await
    }

    /// Writes `request.key` into `writer`, slice by slice in object order.
    ///
    /// `request.local_path` and `request.resumable` are ignored. On failure
    /// `writer` may hold a prefix of the object.
    pub async fn download_to_writer<W>(
        &self,
        request: TransferRequest,
        writer: &mut W,
    ) -> Result<TransferOutput, Error>
    where
        W: AsyncWrite + Send + Unpin,
    {
        self.engine
            .clone()
            .drive(Job::DownloadInto(writer), request, JobContext::new(), None, None)
            .await
    }

    /// Runs an upload to completion on the calling thread.
    ///
    /// # Panics
    ///
    /// Panics when called from within an async context.
    pub fn upload_blocking(&self, request: TransferRequest) -> Result<TransferOutput, Error> {
        self.rt_handle.block_on(self.upload(request))
    }

    /// Runs a download to completion on the calling thread.
    ///
    /// # Panics
    ///
    /// Panics when called from within an async context.
    pub fn download_blocking(&self, request: TransferRequest) -> Result<TransferOutput, Error> {
        self.rt_handle.block_on(self.download(request))
    }

    pub fn submit_upload(&self, request: TransferRequest) -> AsyncHandle {
        self.submit(Job::Upload, request)
    }

    pub fn submit_download(&self, request: TransferRequest) -> AsyncHandle {
        self.submit(Job::Download, request)
    }

    fn submit(&self, job: Job<'static>, request: TransferRequest) -> AsyncHandle {
        let kind = job.kind();
        let ctx = JobContext::new();
        let handle = AsyncHandle::new(
            kind,
            &request.bucket,
            &request.key,
            ctx.cancel.clone(),
            ctx.status.subscribe(),
            ctx.progress.subscribe(),
        );

        let submission = Submission {
            handle: handle.clone(),
            on_complete: request.on_complete.clone(),
            user_data: request.user_data.clone(),
        };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.live.insert(id, submission.clone());
        log::debug!(
            "submitted {} #{id} of {}/{}",
            kind.as_str(),
            request.bucket,
            request.key
        );

        let engine = self.engine.clone();
        let pool = self.pool.clone();
        let live = self.live.clone();
        self.rt_handle.spawn(async move {
            let _ = engine
                .drive(job, request, ctx, Some(pool), Some(submission))
                .await;
            live.remove(&id);
        });
        handle
    }

    /// Stops accepting work, cancels every submitted transfer and waits for
    /// them to settle. Blocks the calling thread.
    ///
    /// Resumable transfers interrupted this way keep their checkpoints.
    pub fn shutdown(self) {
        self.pool.close();
        let pending: Vec<AsyncHandle> = self
            .live
            .iter()
            .map(|e| e.value().handle.clone())
            .collect();
        if !pending.is_empty() {
            log::info!("canceling {} pending transfers", pending.len());
        }
        for handle in &pending {
            handle.cancel();
        }
        for handle in pending {
            let _ = handle.wait_until_finish();
        }
    }
}

impl Drop for TransferManager {
    /// A manager that owns its runtime stops it without waiting. Transfers
    /// still running are canceled and settled first, so every handle
    /// finishes and every completion callback fires once.
    fn drop(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        self.pool.close();
        let pending: Vec<Submission> = self.live.iter().map(|e| e.value().clone()).collect();
        let mut settled = 0;
        for submission in &pending {
            submission.handle.cancel();
            if submission.settle(&Err(Error::Canceled), TransferStatus::Canceled) {
                settled += 1;
            }
        }
        if settled > 0 {
            log::info!("dropped transfer manager canceled {settled} pending transfers");
        }
        self.live.clear();
        runtime.shutdown_background();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cos::config::CosConfig;
    use crate::cos::transport::{HttpRequest, HttpResponse, HttpTransport};
    use async_trait::async_trait;
    use http::HeaderMap;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Rejects every request with 403 after an optional delay.
    #[derive(Debug, Default)]
    struct DenyTransport {
        delay: Duration,
        requests: AtomicUsize,
    }

    #[async_trait]
    impl HttpTransport for DenyTransport {
        async fn execute(&self, _req: HttpRequest) -> Result<HttpResponse, Error> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let mut headers = HeaderMap::new();
            headers.insert("x-cos-request-id", "req-1".parse().unwrap());
            Ok(HttpResponse {
                status: 403,
                headers,
                body: bytes::Bytes::from_static(
                    b"<Error><Code>AccessDenied</Code><Message>denied</Message></Error>",
                ),
            })
        }
    }

    fn manager(transport: Arc<DenyTransport>, pool_size: usize) -> TransferManager {
        let config = CosConfig::new("ak", "sk", "ap-guangzhou").async_pool_size(pool_size);
        let client = CosClient::builder(config)
            .transport(transport)
            .build()
            .unwrap();
        TransferManager::new(client).unwrap()
    }

    fn request(dir: &tempfile::TempDir) -> TransferRequest {
        let path = dir.path().join("object.bin");
        std::fs::write(&path, b"hello").unwrap();
        TransferRequest::builder()
            .bucket("examplebucket-1250000000")
            .key("object.bin")
            .local_path(path)
            .build()
    }

    #[test]
    fn test_failure_fires_completion_once() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(DenyTransport::default());
        let manager = manager(transport.clone(), 2);

        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let mut req = request(&dir);
        req.on_complete = Some(Arc::new(move |result, _| {
            sink.lock().unwrap().push(result.is_ok());
        }));

        let handle = manager.submit_upload(req);
        let result = handle.wait_until_finish();
        let err = result.unwrap_err();
        assert_eq!(err.http_status(), Some(403));
        assert_eq!(handle.status(), TransferStatus::Failed);
        assert_eq!(transport.requests.load(Ordering::SeqCst), 1);

        // the callback runs before the handle is released
        assert_eq!(*calls.lock().unwrap(), vec![false]);
        manager.shutdown();
    }

    #[test]
    fn test_cancel_while_queued() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(DenyTransport {
            delay: Duration::from_millis(200),
            ..Default::default()
        });
        let manager = manager(transport.clone(), 1);

        let first = manager.submit_upload(request(&dir));
        let second = manager.submit_upload(request(&dir));
        second.cancel();

        assert!(matches!(second.wait_until_finish(), Err(Error::Canceled)));
        assert_eq!(second.status(), TransferStatus::Canceled);
        assert!(first.wait_until_finish().is_err());
        assert_eq!(transport.requests.load(Ordering::SeqCst), 1);
        manager.shutdown();
    }

    #[test]
    fn test_blocking_upload_of_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(DenyTransport::default());
        let manager = manager(transport.clone(), 1);

        let req = TransferRequest::builder()
            .bucket("examplebucket-1250000000")
            .key("missing")
            .local_path(dir.path().join("missing"))
            .build();
        let err = manager.upload_blocking(req).unwrap_err();
        assert!(matches!(err, Error::LocalIo { .. }));
        assert_eq!(transport.requests.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_shutdown_cancels_queued_transfers() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(DenyTransport {
            delay: Duration::from_millis(100),
            ..Default::default()
        });
        let manager = manager(transport, 1);
        let handles: Vec<_> = (0..4).map(|_| manager.submit_upload(request(&dir))).collect();

        manager.shutdown();
        for handle in &handles {
            assert!(handle.is_finished());
            assert!(handle.status().is_terminal());
        }
        // at most one transfer held the pool slot when shutdown began
        let canceled = handles
            .iter()
            .filter(|h| matches!(h.result(), Some(Err(Error::Canceled))))
            .count();
        assert!(canceled >= 3);
    }

    #[test]
    fn test_drop_settles_every_submission() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(DenyTransport {
            delay: Duration::from_millis(200),
            ..Default::default()
        });
        let manager = manager(transport, 1);

        let calls = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let calls = calls.clone();
                let mut req = request(&dir);
                req.on_complete = Some(Arc::new(move |_, _| {
                    calls.fetch_add(1, Ordering::SeqCst);
                }));
                manager.submit_upload(req)
            })
            .collect();
        drop(manager);

        for handle in &handles {
            assert!(matches!(handle.wait_until_finish(), Err(Error::Canceled)));
            assert_eq!(handle.status(), TransferStatus::Canceled);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
