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

//! Retry and failover policy
//!
//! Every logical operation (one part upload, one ranged GET, one Complete
//! call, ...) owns a [`RetryContext`]. After each HTTP attempt the context
//! classifies the [`AttemptOutcome`] into a [`RetryDecision`]:
//!
//! | outcome | decision |
//! |---|---|
//! | 2xx | `Succeed` |
//! | 3xx | `RetryableSwitchHost` when failover is allowed, else `Fatal` |
//! | 4xx | `Fatal` |
//! | 5xx, timeout, connection failure | `RetryableSameHost` while attempts remain, then `RetryableSwitchHost` when failover is allowed, else `Fatal` |
//!
//! Failover is allowed when the `RetryChangeDomain` flag is set, requests go
//! to the default domain, the response carried no `x-cos-request-id` and the
//! operation has not switched hosts already. A switch gives the backup host a
//! fresh attempt budget.

use crate::cos::config::CosConfig;
use std::time::Duration;

/// What one HTTP attempt produced, reduced to what the policy looks at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// A response was received.
    Response { status: u16, has_request_id: bool },
    /// No response: connect failure, reset or timeout.
    Transport { timeout: bool },
    /// A 2xx response whose payload failed an integrity check; retried like a
    /// server error.
    Corrupted { has_request_id: bool },
}

impl AttemptOutcome {
    fn has_request_id(&self) -> bool {
        match self {
            AttemptOutcome::Response { has_request_id, .. }
            | AttemptOutcome::Corrupted { has_request_id } => *has_request_id,
            AttemptOutcome::Transport { .. } => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    Succeed,
    RetryableSameHost,
    RetryableSwitchHost,
    Fatal,
}

/// Retry settings shared by all operations of a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt, per host.
    pub max_retries: u32,
    pub base_interval: Duration,
    /// `RetryChangeDomain`
    pub failover_enabled: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: crate::cos::config::DEFAULT_MAX_RETRIES,
            base_interval: Duration::from_millis(crate::cos::config::DEFAULT_RETRY_INTERVAL_MS),
            failover_enabled: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_interval: Duration, failover_enabled: bool) -> Self {
        Self {
            max_retries,
            base_interval,
            failover_enabled,
        }
    }

    pub fn from_config(config: &CosConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.retry_interval_ms),
            config.retry_change_domain,
        )
    }

    /// Delay before the retry following attempt `attempt` (0-based): linear,
    /// `base_interval * (attempt + 1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_interval.saturating_mul(attempt.saturating_add(1))
    }

    /// Attempts allowed on one host.
    pub fn attempts_per_host(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Classifies one attempt.
///
/// `attempt` is the 0-based index of the attempt on the current host and
/// `failover_allowed` is whether this operation may still switch hosts (the
/// flag is on, the default domain is in use and no switch happened yet).
pub fn classify(
    policy: &RetryPolicy,
    outcome: AttemptOutcome,
    attempt: u32,
    failover_allowed: bool,
) -> RetryDecision {
    let can_switch = policy.failover_enabled && failover_allowed && !outcome.has_request_id();
    let attempts_left = attempt + 1 < policy.attempts_per_host();

    let server_side = match outcome {
        AttemptOutcome::Response { status, .. } => match status {
            200..=299 => return RetryDecision::Succeed,
            300..=399 => {
                return if can_switch {
                    RetryDecision::RetryableSwitchHost
                } else {
                    RetryDecision::Fatal
                };
            }
            400..=499 => return RetryDecision::Fatal,
            _ => true,
        },
        AttemptOutcome::Transport { .. } | AttemptOutcome::Corrupted { .. } => true,
    };

    match (server_side, attempts_left, can_switch) {
        (true, true, _) => RetryDecision::RetryableSameHost,
        (true, false, true) => RetryDecision::RetryableSwitchHost,
        _ => RetryDecision::Fatal,
    }
}

/// Attempt bookkeeping for one logical operation.
#[derive(Clone, Debug)]
pub struct RetryContext {
    policy: RetryPolicy,
    attempt: u32,
    total_attempts: u32,
    default_domain: bool,
    switched: bool,
}

impl RetryContext {
    /// `default_domain` tells whether the operation starts on the bucket's
    /// default domain, the only host kind eligible for failover.
    pub fn new(policy: RetryPolicy, default_domain: bool) -> Self {
        Self {
            policy,
            attempt: 0,
            total_attempts: 0,
            default_domain,
            switched: false,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 0-based index of the current attempt on the current host.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Attempts made so far, across hosts.
    pub fn total_attempts(&self) -> u32 {
        self.total_attempts
    }

    pub fn switched(&self) -> bool {
        self.switched
    }

    /// Classifies the outcome of the current attempt and advances the
    /// context for the next one. Returns the decision together with the
    /// delay to sleep before the next attempt, if any.
    pub fn on_attempt(&mut self, outcome: AttemptOutcome) -> (RetryDecision, Option<Duration>) {
        self.total_attempts += 1;
        let decision = classify(
            &self.policy,
            outcome,
            self.attempt,
            self.default_domain && !self.switched,
        );
        let delay = match decision {
            RetryDecision::RetryableSameHost => {
                let delay = self.policy.backoff(self.attempt);
                self.attempt += 1;
                Some(delay)
            }
            RetryDecision::RetryableSwitchHost => {
                self.switched = true;
                self.attempt = 0;
                None
            }
            RetryDecision::Succeed | RetryDecision::Fatal => None,
        };
        (decision, delay)
    }
}
