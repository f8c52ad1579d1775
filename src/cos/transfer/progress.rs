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

//! Progress reporting
//!
//! Workers publish cumulative progress into a `watch` channel. A single
//! consumer task forwards it to the user's callback, so the callback never
//! runs concurrently with itself, and bursts of updates are coalesced into
//! the latest value.

use super::{ProgressCallback, UserData};
use tokio::sync::watch;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    pub transferred: u64,
    pub total: u64,
}

/// Producer side, shared by the workers of one transfer.
#[derive(Debug)]
pub struct ProgressReporter {
    tx: watch::Sender<Progress>,
}

impl ProgressReporter {
    pub fn new() -> (Self, watch::Receiver<Progress>) {
        let (tx, rx) = watch::channel(Progress::default());
        (Self { tx }, rx)
    }

    /// Sets the total and the bytes already transferred (e.g. restored from a
    /// checkpoint).
    pub fn start(&self, total: u64, transferred: u64) {
        self.tx.send_modify(|p| {
            p.total = total;
            p.transferred = transferred.min(total);
        });
    }

    /// Records `bytes` more transferred. Progress never exceeds the total.
    pub fn advance(&self, bytes: u64) {
        self.tx.send_modify(|p| {
            p.transferred = p.transferred.saturating_add(bytes).min(p.total);
        });
    }

    pub fn current(&self) -> Progress {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.tx.subscribe()
    }
}

/// Forwards progress to `callback` until the reporter is dropped. The last
/// published value is always delivered.
pub(crate) async fn forward_progress(
    mut rx: watch::Receiver<Progress>,
    callback: ProgressCallback,
    user_data: Option<UserData>,
) {
    let mut last: Option<Progress> = None;
    loop {
        let changed = rx.changed().await;
        let current = *rx.borrow_and_update();
        if current.total > 0 && last != Some(current) {
            callback(current.transferred, current.total, user_data.as_ref());
            last = Some(current);
        }
        if changed.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_progress_is_capped() {
        let (reporter, rx) = ProgressReporter::new();
        reporter.start(100, 30);
        reporter.advance(50);
        assert_eq!(*rx.borrow(), Progress { transferred: 80, total: 100 });
        reporter.advance(50);
        assert_eq!(reporter.current().transferred, 100);
    }

    #[tokio::test]
    async fn test_forward_is_monotonic_and_ends_with_final_value() {
        let (reporter, rx) = ProgressReporter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Arc::new(move |done, total, _| {
            sink.lock().unwrap().push((done, total));
        });
        let consumer = tokio::spawn(forward_progress(rx, callback, None));

        reporter.start(1000, 0);
        for _ in 0..100 {
            reporter.advance(10);
            tokio::task::yield_now().await;
        }
        drop(reporter);
        consumer.await.unwrap();

        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert_eq!(*seen.last().unwrap(), (1000, 1000));
        assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
    }
}
