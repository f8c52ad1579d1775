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

//! Bounded per-transfer part scheduling

use super::JobContext;
use super::planner::PartDescriptor;
use crate::cos::error::Error;
use std::future::Future;
use tokio::task::{JoinError, JoinSet};

/// Runs `start(part)` for every part with at most `concurrency` in flight,
/// handing each finished part to `on_done`.
///
/// Before a part is scheduled the cancel flag and the first recorded failure
/// are checked; once either is set no new part starts, but parts already in
/// flight run to completion and are still reported. `on_done` runs for one
/// part at a time. Returns the first failure, `Error::Canceled` if
/// cancellation came first.
pub(crate) async fn run_parts<T, F, Fut, D, DFut>(
    ctx: &JobContext,
    parts: Vec<PartDescriptor>,
    concurrency: usize,
    mut start: F,
    mut on_done: D,
) -> Result<(), Error>
where
    T: Send + 'static,
    F: FnMut(PartDescriptor) -> Fut,
    Fut: Future<Output = Result<T, Error>> + Send + 'static,
    D: FnMut(T) -> DFut,
    DFut: Future<Output = Result<(), Error>>,
{
    let concurrency = concurrency.max(1);
    let mut tasks: JoinSet<Result<T, Error>> = JoinSet::new();
    let mut failure: Option<Error> = None;

    for part in parts {
        while tasks.len() >= concurrency {
            if let Some(joined) = tasks.join_next().await {
                collect(joined, &mut on_done, &mut failure).await;
            }
        }
        if failure.is_some() {
            break;
        }
        if ctx.cancel.is_canceled() {
            failure = Some(Error::Canceled);
            break;
        }
        log::debug!(
            "scheduling part {} (bytes {}..{})",
            part.number,
            part.offset,
            part.end()
        );
        tasks.spawn(start(part));
    }

    while let Some(joined) = tasks.join_next().await {
        collect(joined, &mut on_done, &mut failure).await;
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn collect<T, D, DFut>(
    joined: Result<Result<T, Error>, JoinError>,
    on_done: &mut D,
    failure: &mut Option<Error>,
) where
    D: FnMut(T) -> DFut,
    DFut: Future<Output = Result<(), Error>>,
{
    let result = match joined {
        Ok(Ok(value)) => on_done(value).await,
        Ok(Err(e)) => Err(e),
        Err(e) => Err(Error::transport(format!("part worker terminated; {e}"))),
    };
    if let Err(e) = result {
        log::debug!("part failed; {e}");
        failure.get_or_insert(e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn parts(n: u32) -> Vec<PartDescriptor> {
        (0..n)
            .map(|i| PartDescriptor {
                number: i + 1,
                offset: u64::from(i) * 10,
                size: 10,
            })
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let ctx = JobContext::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut done = Vec::new();

        let result = run_parts(
            &ctx,
            parts(10),
            3,
            |part| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(part.number)
                }
            },
            |n| {
                done.push(n);
                async { Ok(()) }
            },
        )
        .await;

        assert!(result.is_ok());
        assert!(peak.load(Ordering::SeqCst) <= 3);
        done.sort();
        assert_eq!(done, (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_failure_stops_scheduling() {
        let ctx = JobContext::new();
        let started = Arc::new(AtomicUsize::new(0));
        let result = run_parts(
            &ctx,
            parts(10),
            1,
            |part| {
                let started = started.clone();
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    if part.number == 3 {
                        return Err(Error::Configuration("boom".into()));
                    }
                    Ok(())
                }
            },
            |_| async { Ok(()) },
        )
        .await;

        assert!(matches!(result, Err(Error::Configuration(_))));
        assert_eq!(started.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_on_done_runs_one_part_at_a_time() {
        let ctx = JobContext::new();
        let reporting = Arc::new(AtomicUsize::new(0));
        let reported = Arc::new(AtomicUsize::new(0));
        let result = run_parts(
            &ctx,
            parts(6),
            3,
            |part| async move { Ok(part.number) },
            |_: u32| {
                let reporting = reporting.clone();
                let reported = reported.clone();
                async move {
                    assert_eq!(reporting.fetch_add(1, Ordering::SeqCst), 0);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    reporting.fetch_sub(1, Ordering::SeqCst);
                    if reported.fetch_add(1, Ordering::SeqCst) == 0 {
                        return Err(Error::Configuration("save failed".into()));
                    }
                    Ok(())
                }
            },
        )
        .await;

        assert!(matches!(result, Err(Error::Configuration(_))));
        // the first report fails before part 4 is scheduled; the two parts
        // still in flight are reported, nothing new starts
        assert_eq!(reported.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let ctx = JobContext::new();
        ctx.cancel.cancel();
        let started = Arc::new(AtomicUsize::new(0));
        let result = run_parts(
            &ctx,
            parts(4),
            2,
            |_| {
                let started = started.clone();
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
            |_| async { Ok(()) },
        )
        .await;

        assert!(matches!(result, Err(Error::Canceled)));
        assert_eq!(started.load(Ordering::SeqCst), 0);
    }
}
