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

//! COS client: request signing and execution with retry and failover
//!
//! Every operation is one logical request run through a [`RetryContext`]:
//! server errors and transport failures are retried on the same host with a
//! linear backoff, and, when `RetryChangeDomain` is enabled and the bucket's
//! default domain is in use, the operation fails over once to the backup
//! domain.

mod multipart;
mod object;

use crate::cos::config::CosConfig;
use crate::cos::creds::{Provider, StaticProvider};
use crate::cos::dns_cache::{HostResolutionCache, Resolver, SystemResolver};
use crate::cos::error::{ChecksumAlgorithm, Error};
use crate::cos::error_response::ServiceError;
use crate::cos::header_constants::*;
use crate::cos::http::{Endpoint, Host, HostKind};
use crate::cos::multimap_ext::MultimapExt;
use crate::cos::retry::{AttemptOutcome, RetryContext, RetryDecision, RetryPolicy};
use crate::cos::signer::{CosSigner, SignWindow, Signer};
use crate::cos::transport::{
    ConnectionPoolConfig, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport,
};
use crate::cos::types::CosRequest;
use crate::cos::utils::{check_bucket_name, trim_etag};
use http::Method;
use std::sync::Arc;

/// Client Builder manufactures a [`CosClient`] from a [`CosConfig`].
#[derive(Debug)]
pub struct CosClientBuilder {
    config: CosConfig,
    provider: Option<Arc<dyn Provider>>,
    signer: Option<Arc<dyn Signer>>,
    transport: Option<Arc<dyn HttpTransport>>,
    resolver: Option<Arc<dyn Resolver>>,
    connection_pool_config: ConnectionPoolConfig,
}

impl CosClientBuilder {
    pub fn new(config: CosConfig) -> Self {
        Self {
            config,
            provider: None,
            signer: None,
            transport: None,
            resolver: None,
            connection_pool_config: ConnectionPoolConfig::default(),
        }
    }

    /// Set the credential provider. Defaults to the keys of the configuration.
    pub fn provider<P: Provider + 'static>(mut self, provider: Option<P>) -> Self {
        self.provider = provider.map(|p| Arc::new(p) as Arc<dyn Provider>);
        self
    }

    /// Replace the request signer.
    pub fn signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Replace the HTTP transport, e.g. with an in-memory service in tests.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Resolver backing the DNS cache when `UseDnsCache` is enabled.
    pub fn resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn connection_pool_config(mut self, config: ConnectionPoolConfig) -> Self {
        self.connection_pool_config = config;
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<CosClient, Error> {
        let config = self.config.normalized();
        config.validate()?;

        let host_cache = config.use_dns_cache.then(|| {
            Arc::new(HostResolutionCache::with_resolver(
                config.dns_cache_size,
                config.dns_cache_ttl(),
                self.resolver
                    .unwrap_or_else(|| Arc::new(SystemResolver) as Arc<dyn Resolver>),
            ))
        });

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(t) => t,
            None => Arc::new(ReqwestTransport::new(
                &config,
                &self.connection_pool_config,
                host_cache.clone(),
            )?),
        };

        let provider = self
            .provider
            .unwrap_or_else(|| Arc::new(StaticProvider::from(&config)) as Arc<dyn Provider>);

        Ok(CosClient {
            shared: Arc::new(SharedClientItems {
                endpoint: Endpoint::from_config(&config),
                retry_policy: RetryPolicy::from_config(&config),
                signer: self.signer.unwrap_or_else(|| Arc::new(CosSigner)),
                provider,
                transport,
                host_cache,
                config,
            }),
        })
    }
}

#[derive(Debug)]
pub(crate) struct SharedClientItems {
    pub(crate) config: CosConfig,
    pub(crate) endpoint: Endpoint,
    pub(crate) retry_policy: RetryPolicy,
    provider: Arc<dyn Provider>,
    signer: Arc<dyn Signer>,
    transport: Arc<dyn HttpTransport>,
    host_cache: Option<Arc<HostResolutionCache>>,
}

/// Client for the object and multipart operations the transfer engine uses.
///
/// Cloning is cheap; clones share configuration, transport and DNS cache.
#[derive(Clone, Debug)]
pub struct CosClient {
    pub(crate) shared: Arc<SharedClientItems>,
}

impl CosClient {
    /// Returns a client using the default signer and a `reqwest` transport.
    ///
    /// # Examples
    ///
    /// ```
    /// use cos_transfer::cos::client::CosClient;
    /// use cos_transfer::cos::config::CosConfig;
    ///
    /// let config = CosConfig::new("AKIDEXAMPLE", "secret", "ap-guangzhou").app_id(1250000000);
    /// let client = CosClient::new(config).unwrap();
    /// ```
    pub fn new(config: CosConfig) -> Result<Self, Error> {
        CosClientBuilder::new(config).build()
    }

    pub fn builder(config: CosConfig) -> CosClientBuilder {
        CosClientBuilder::new(config)
    }

    pub fn config(&self) -> &CosConfig {
        &self.shared.config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.shared.retry_policy
    }

    /// The DNS cache, when `UseDnsCache` is enabled.
    pub fn host_cache(&self) -> Option<&Arc<HostResolutionCache>> {
        self.shared.host_cache.as_ref()
    }

    /// Host the requests for `bucket` are sent to first.
    pub fn host_for(&self, bucket: &str) -> Host {
        self.shared.endpoint.select_host(bucket)
    }

    /// Builds the signed HTTP request for one attempt against `host`.
    fn prepare(&self, req: &CosRequest, host: &Host) -> Result<HttpRequest, Error> {
        let url = host.url(req.object.as_deref(), req.query_params.clone());
        let mut headers = req.headers.clone();
        headers.add(HOST, url.host_header_value());

        if matches!(req.method, Method::PUT | Method::POST) {
            let len = req.body.as_ref().map_or(0, |b| b.len());
            headers.add(CONTENT_LENGTH, len.to_string());
            if !headers.contains_key_ignore_case(CONTENT_TYPE) {
                headers.add(CONTENT_TYPE, "application/octet-stream");
            }
        }

        let creds = self.shared.provider.fetch();
        if let Some(token) = &creds.session_token {
            headers.add(X_COS_SECURITY_TOKEN, token.clone());
        }

        let authorization = self
            .shared
            .signer
            .sign(
                &creds,
                &req.method,
                &req.sign_path(),
                &headers,
                &req.query_params,
                SignWindow::from_now(self.shared.config.sign_expire_secs),
            )
            .ok_or_else(|| {
                Error::Configuration(
                    "unable to sign request; access key or secret key is empty".into(),
                )
            })?;
        headers.add(AUTHORIZATION, authorization);

        Ok(HttpRequest {
            method: req.method.clone(),
            url,
            headers,
            body: req.body.clone(),
        })
    }

    /// Checks a 2xx response against what the request expects.
    fn verify(req: &CosRequest, resp: &HttpResponse) -> Result<(), Error> {
        if let Some(expected) = &req.expected_etag {
            let actual = resp.header(ETAG).map(trim_etag).unwrap_or_default();
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(Error::ChecksumMismatch {
                    algorithm: ChecksumAlgorithm::Md5,
                    expected: expected.clone(),
                    actual: actual.to_string(),
                    request_id: resp.request_id().map(String::from),
                });
            }
        }
        if let Some(expected) = req.expected_length
            && resp.body.len() as u64 != expected
        {
            return Err(Error::InvalidResponse {
                status: resp.status,
                message: format!(
                    "short body; expected {expected} bytes, got {}",
                    resp.body.len()
                ),
                request_id: resp.request_id().map(String::from),
            });
        }
        Ok(())
    }

    /// Executes one logical request, retrying and failing over as the
    /// [`RetryPolicy`] decides. Returns the first successful response or the
    /// error of the last attempt.
    pub(crate) async fn execute(&self, req: CosRequest) -> Result<HttpResponse, Error> {
        check_bucket_name(&req.bucket)?;

        let mut host = self.host_for(&req.bucket);
        let mut ctx = RetryContext::new(self.shared.retry_policy, host.kind == HostKind::Default);

        loop {
            let request = self.prepare(&req, &host)?;
            log::debug!(
                "{} {} (attempt {})",
                request.method,
                request.url,
                ctx.total_attempts() + 1
            );

            let (outcome, err) = match self.shared.transport.execute(request).await {
                Ok(resp) if resp.is_success() => match Self::verify(&req, &resp) {
                    Ok(()) => return Ok(resp),
                    Err(e) => (
                        AttemptOutcome::Corrupted {
                            has_request_id: resp.request_id().is_some(),
                        },
                        e,
                    ),
                },
                Ok(resp) => (
                    AttemptOutcome::Response {
                        status: resp.status,
                        has_request_id: resp.request_id().is_some(),
                    },
                    ServiceError::from_response(resp.status, resp.headers, resp.body).into(),
                ),
                Err(e) => {
                    let timeout = matches!(e, Error::Transport { timeout: true, .. });
                    (AttemptOutcome::Transport { timeout }, e)
                }
            };

            match ctx.on_attempt(outcome) {
                (RetryDecision::RetryableSameHost, delay) => {
                    log::warn!(
                        "{} {} failed, retrying on {}; {err}",
                        req.method,
                        req.sign_path(),
                        host.name
                    );
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                }
                (RetryDecision::RetryableSwitchHost, _) => match host.backup() {
                    Some(backup) => {
                        log::warn!(
                            "{} {} failed on {}, switching to {}; {err}",
                            req.method,
                            req.sign_path(),
                            host.name,
                            backup.name
                        );
                        host = backup;
                    }
                    None => return Err(err),
                },
                (RetryDecision::Succeed | RetryDecision::Fatal, _) => return Err(err),
            }
        }
    }
}
