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

//! Caller-side view of a submitted transfer

use super::checkpoint::TransferKind;
use super::progress::Progress;
use super::{CancelFlag, TransferOutput, TransferStatus};
use crate::cos::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError};
use tokio::sync::watch;

#[derive(Debug)]
struct HandleState {
    kind: TransferKind,
    bucket: String,
    key: String,
    cancel: CancelFlag,
    status: watch::Receiver<TransferStatus>,
    settled: OnceLock<TransferStatus>,
    progress: watch::Receiver<Progress>,
    claimed: AtomicBool,
    result: Mutex<Option<Result<TransferOutput, Error>>>,
    finished: Condvar,
    done_tx: watch::Sender<bool>,
}

/// Handle to a transfer running in the background.
///
/// Handles are cheap to clone; every clone observes the same transfer.
/// Cancellation is cooperative: parts already in flight finish, no new part
/// is scheduled, and the transfer ends with [`Error::Canceled`].
#[derive(Clone, Debug)]
pub struct AsyncHandle {
    state: Arc<HandleState>,
}

impl AsyncHandle {
    pub(crate) fn new(
        kind: TransferKind,
        bucket: &str,
        key: &str,
        cancel: CancelFlag,
        status: watch::Receiver<TransferStatus>,
        progress: watch::Receiver<Progress>,
    ) -> Self {
        let (done_tx, _) = watch::channel(false);
        Self {
            state: Arc::new(HandleState {
                kind,
                bucket: bucket.to_string(),
                key: key.to_string(),
                cancel,
                status,
                settled: OnceLock::new(),
                progress,
                claimed: AtomicBool::new(false),
                result: Mutex::new(None),
                finished: Condvar::new(),
                done_tx,
            }),
        }
    }

    pub fn kind(&self) -> TransferKind {
        self.state.kind
    }

    pub fn bucket(&self) -> &str {
        &self.state.bucket
    }

    pub fn key(&self) -> &str {
        &self.state.key
    }

    /// Requests cancellation. Has no effect on a finished transfer.
    pub fn cancel(&self) {
        self.state.cancel.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.state.cancel.is_canceled()
    }

    pub fn status(&self) -> TransferStatus {
        match self.state.settled.get() {
            Some(status) => *status,
            None => *self.state.status.borrow(),
        }
    }

    pub fn transferred_bytes(&self) -> u64 {
        self.state.progress.borrow().transferred
    }

    /// Zero until the transfer has sized the object.
    pub fn total_bytes(&self) -> u64 {
        self.state.progress.borrow().total
    }

    pub fn is_finished(&self) -> bool {
        *self.state.done_tx.borrow()
    }

    /// Blocks the calling thread until the transfer ends.
    ///
    /// Must not be called from within an async context; use [`wait`](Self::wait)
    /// there instead.
    pub fn wait_until_finish(&self) -> Result<TransferOutput, Error> {
        let mut result = self
            .state
            .result
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(r) = result.as_ref() {
                return r.clone();
            }
            result = self
                .state
                .finished
                .wait(result)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Waits asynchronously until the transfer ends.
    pub async fn wait(&self) -> Result<TransferOutput, Error> {
        let mut done = self.state.done_tx.subscribe();
        // the sender lives in `self`, so this only fails if it is dropped
        let _ = done.wait_for(|finished| *finished).await;
        self.result().unwrap_or(Err(Error::Canceled))
    }

    /// The terminal result, or `None` while the transfer is running.
    pub fn result(&self) -> Option<Result<TransferOutput, Error>> {
        self.state
            .result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns true for exactly one caller: the one allowed to fire the
    /// completion callback and finish the handle.
    pub(crate) fn claim(&self) -> bool {
        !self.state.claimed.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn finish(&self, result: Result<TransferOutput, Error>, status: TransferStatus) {
        {
            let mut slot = self
                .state
                .result
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                return;
            }
            *slot = Some(result);
            let _ = self.state.settled.set(status);
        }
        self.state.finished.notify_all();
        self.state.done_tx.send_replace(true);
    }
}
