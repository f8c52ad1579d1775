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

//! HTTP transport
//!
//! The client hands fully signed requests to an [`HttpTransport`], which
//! returns the whole response (status, headers and body) or a transport
//! error when no response was received. [`ReqwestTransport`] is the default
//! implementation; tests substitute an in-memory service.

use crate::cos::config::CosConfig;
use crate::cos::dns_cache::HostResolutionCache;
use crate::cos::error::Error;
use crate::cos::header_constants::X_COS_REQUEST_ID;
use crate::cos::http::Url;
use crate::cos::multimap_ext::Multimap;
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method};
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use std::fmt;
use std::mem;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// A signed request ready to be sent.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Multimap,
    pub body: Option<Bytes>,
}

/// A received response with its body read in full.
#[derive(Clone, Debug, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// `x-cos-request-id`; present only when the request reached the service.
    pub fn request_id(&self) -> Option<&str> {
        self.header(X_COS_REQUEST_ID).filter(|v| !v.is_empty())
    }
}

#[async_trait]
pub trait HttpTransport: fmt::Debug + Send + Sync {
    /// Sends one attempt of a request.
    ///
    /// Non-2xx statuses are returned as responses; `Err` means no response
    /// was received and is always an [`Error::Transport`].
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, Error>;
}

/// Configuration for the HTTP connection pool.
///
/// # Example
///
/// ```
/// use cos_transfer::cos::transport::ConnectionPoolConfig;
/// use std::time::Duration;
///
/// let config = ConnectionPoolConfig::default()
///     .max_idle_per_host(64)
///     .idle_timeout(Duration::from_secs(120));
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionPoolConfig {
    /// Maximum number of idle connections per host. Default: 32
    pub max_idle_per_host: usize,
    /// How long idle connections are kept in the pool. Default: 90 seconds
    pub idle_timeout: Duration,
    /// TCP keepalive interval. Default: 60 seconds
    pub tcp_keepalive: Duration,
    /// Enable TCP_NODELAY. Default: true
    pub tcp_nodelay: bool,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 32,
            idle_timeout: Duration::from_secs(90),
            tcp_keepalive: Duration::from_secs(60),
            tcp_nodelay: true,
        }
    }
}

impl ConnectionPoolConfig {
    pub fn max_idle_per_host(mut self, max: usize) -> Self {
        self.max_idle_per_host = max;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn tcp_keepalive(mut self, interval: Duration) -> Self {
        self.tcp_keepalive = interval;
        self
    }

    pub fn tcp_nodelay(mut self, enable: bool) -> Self {
        self.tcp_nodelay = enable;
        self
    }
}

/// Plugs the [`HostResolutionCache`] into reqwest's connector. Hosts the
/// cache cannot resolve are looked up by name.
#[derive(Clone, Debug)]
struct CachedResolver {
    cache: Arc<HostResolutionCache>,
}

impl Resolve for CachedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let cache = self.cache.clone();
        Box::pin(async move {
            let host = name.as_str().to_string();
            if let Some(ip) = cache.resolve(&host).await {
                let addrs: Addrs = Box::new(std::iter::once(SocketAddr::new(ip, 0)));
                return Ok(addrs);
            }
            match tokio::net::lookup_host((host.as_str(), 0)).await {
                Ok(resolved) => {
                    let addrs: Addrs = Box::new(resolved.collect::<Vec<_>>().into_iter());
                    Ok(addrs)
                }
                Err(e) => Err(Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
            }
        })
    }
}

/// [`HttpTransport`] over a pooled `reqwest` client.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds a transport honouring the connect/receive timeouts of `config`.
    /// When `dns_cache` is given, host names are resolved through it.
    pub fn new(
        config: &CosConfig,
        pool_config: &ConnectionPoolConfig,
        dns_cache: Option<Arc<HostResolutionCache>>,
    ) -> Result<Self, Error> {
        let mut builder = reqwest::Client::builder()
            .no_gzip()
            .tcp_nodelay(pool_config.tcp_nodelay)
            .tcp_keepalive(pool_config.tcp_keepalive)
            .pool_max_idle_per_host(pool_config.max_idle_per_host)
            .pool_idle_timeout(pool_config.idle_timeout)
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.recv_timeout())
            .redirect(reqwest::redirect::Policy::none());

        // HTTP/2 adaptive window improves throughput when server supports HTTP/2.
        #[cfg(feature = "http2")]
        {
            builder = builder.http2_adaptive_window(true);
        }

        let user_agent = String::from("cos-transfer (")
            + std::env::consts::OS
            + "; "
            + std::env::consts::ARCH
            + ") cos-transfer-rs/"
            + env!("CARGO_PKG_VERSION");
        builder = builder.user_agent(user_agent);

        if let Some(cache) = dns_cache {
            builder = builder.dns_resolver(Arc::new(CachedResolver { cache }));
        }

        Ok(Self {
            http_client: builder.build()?,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        let mut req = self
            .http_client
            .request(request.method, request.url.to_string());
        for (key, values) in request.headers.iter_all() {
            for value in values {
                req = req.header(key, value);
            }
        }
        if let Some(body) = request.body {
            req = req.body(body);
        }

        let mut resp = req.send().await?;
        let status = resp.status().as_u16();
        let headers: HeaderMap = mem::take(resp.headers_mut());
        let body: Bytes = resp.bytes().await?;
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_response_request_id() {
        let mut resp = HttpResponse {
            status: 200,
            ..Default::default()
        };
        assert!(resp.is_success());
        assert_eq!(resp.request_id(), None);

        resp.headers
            .insert(X_COS_REQUEST_ID, HeaderValue::from_static(""));
        assert_eq!(resp.request_id(), None);

        resp.headers
            .insert(X_COS_REQUEST_ID, HeaderValue::from_static("NjY2"));
        assert_eq!(resp.request_id(), Some("NjY2"));
    }

    #[test]
    fn test_build_transport() {
        let config = CosConfig::new("ak", "sk", "ap-guangzhou");
        let cache = Arc::new(HostResolutionCache::from_config(&config));
        assert!(ReqwestTransport::new(&config, &ConnectionPoolConfig::default(), Some(cache)).is_ok());
    }
}
