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

//! Client and transfer configuration
//!
//! A [`CosConfig`] is either assembled in code with chained setters or loaded
//! from the JSON configuration file format used by the service's SDKs:
//!
//! ```
//! use cos_transfer::cos::config::CosConfig;
//!
//! let config = CosConfig::from_json_str(r#"{
//!     "AppID": 1250000000,
//!     "AccessKey": "AKIDEXAMPLE",
//!     "SecretKey": "secret",
//!     "Region": "ap-guangzhou",
//!     "UploadPartSize": 10485760,
//!     "UploadThreadPoolSize": 5
//! }"#).unwrap();
//! assert_eq!(config.region, "ap-guangzhou");
//! ```
//!
//! Out-of-range pool and slice sizes are clamped rather than rejected; see
//! [`CosConfig::normalized`].

use crate::cos::error::Error;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;

/// Default size of one upload part.
pub const DEFAULT_UPLOAD_PART_SIZE: u64 = 10 * MIB;
/// Smallest part the service accepts for any part except the last one.
pub const MIN_UPLOAD_PART_SIZE: u64 = MIB;
/// Largest single part the service accepts.
pub const MAX_UPLOAD_PART_SIZE: u64 = 5 * 1024 * MIB;

pub const DEFAULT_UPLOAD_POOL_SIZE: usize = 5;
pub const MIN_UPLOAD_POOL_SIZE: usize = 1;
pub const MAX_UPLOAD_POOL_SIZE: usize = 10;
pub const DEFAULT_ASYNC_POOL_SIZE: usize = 2;

pub const DEFAULT_DOWNLOAD_POOL_SIZE: usize = 10;
pub const MAX_DOWNLOAD_POOL_SIZE: usize = 10;
pub const DEFAULT_DOWNLOAD_SLICE_SIZE: u64 = 4 * MIB;
pub const MIN_DOWNLOAD_SLICE_SIZE: u64 = 4 * KIB;
pub const MAX_DOWNLOAD_SLICE_SIZE: u64 = 20 * MIB;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 100;
pub const DEFAULT_DNS_CACHE_SIZE: usize = 1000;
pub const DEFAULT_DNS_CACHE_EXPIRE_SECS: u64 = 600;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CosConfig {
    #[serde(rename = "AppID")]
    pub app_id: u64,
    #[serde(rename = "AccessKey")]
    pub access_key: String,
    #[serde(rename = "SecretKey")]
    pub secret_key: String,
    /// Session token of temporary credentials.
    #[serde(rename = "TmpToken")]
    pub session_token: Option<String>,
    #[serde(rename = "Region")]
    pub region: String,

    /// Validity window of a request signature.
    #[serde(rename = "SignExpiredTime")]
    pub sign_expire_secs: u64,
    #[serde(rename = "ConnectTimeoutInms")]
    pub connect_timeout_ms: u64,
    /// Per-attempt limit on receiving the response.
    #[serde(rename = "ReceiveTimeoutInms")]
    pub recv_timeout_ms: u64,

    #[serde(rename = "UploadPartSize")]
    pub upload_part_size: u64,
    /// Parts of one upload in flight at once.
    #[serde(rename = "UploadThreadPoolSize")]
    pub upload_pool_size: usize,
    /// Whole transfers submitted through the async API running at once.
    #[serde(rename = "AsynThreadPoolSize")]
    pub async_pool_size: usize,
    /// Parts of one download in flight at once.
    #[serde(rename = "down_thread_pool_max_size")]
    pub download_pool_size: usize,
    #[serde(rename = "down_slice_size")]
    pub download_slice_size: u64,

    #[serde(rename = "MaxRetryTimes")]
    pub max_retries: u32,
    /// Base of the linear backoff between attempts.
    #[serde(rename = "RetryIntervalMs")]
    pub retry_interval_ms: u64,
    /// Failover to the backup domain after repeated failures on the default one.
    #[serde(rename = "RetryChangeDomain")]
    pub retry_change_domain: bool,

    #[serde(rename = "UseDnsCache")]
    pub use_dns_cache: bool,
    #[serde(rename = "DnsCacheSize")]
    pub dns_cache_size: usize,
    #[serde(rename = "DnsCacheExpireSeconds")]
    pub dns_cache_expire_secs: u64,

    /// Private network address used instead of any domain.
    #[serde(rename = "IntranetAddr")]
    pub intranet_addr: Option<String>,
    /// Custom domain used instead of the default one.
    #[serde(rename = "DestDomain")]
    pub dest_domain: Option<String>,
    #[serde(rename = "IsUseHttps")]
    pub use_https: bool,

    /// Compare each part's ETag with the MD5 of the bytes sent.
    #[serde(rename = "CheckMd5")]
    pub check_part_md5: bool,
    /// Bandwidth cap for data-carrying requests, in bytes per second.
    #[serde(rename = "TrafficLimit")]
    pub traffic_limit: Option<u64>,
    #[serde(rename = "LogLevel")]
    pub log_level: u8,
    /// Directory for checkpoint files; next to the local file when unset.
    #[serde(rename = "CheckpointDir")]
    pub checkpoint_dir: Option<PathBuf>,
}

impl Default for CosConfig {
    fn default() -> Self {
        Self {
            app_id: 0,
            access_key: String::new(),
            secret_key: String::new(),
            session_token: None,
            region: String::new(),
            sign_expire_secs: 60,
            connect_timeout_ms: 5_000,
            recv_timeout_ms: 5_000,
            upload_part_size: DEFAULT_UPLOAD_PART_SIZE,
            upload_pool_size: DEFAULT_UPLOAD_POOL_SIZE,
            async_pool_size: DEFAULT_ASYNC_POOL_SIZE,
            download_pool_size: DEFAULT_DOWNLOAD_POOL_SIZE,
            download_slice_size: DEFAULT_DOWNLOAD_SLICE_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            retry_change_domain: false,
            use_dns_cache: false,
            dns_cache_size: DEFAULT_DNS_CACHE_SIZE,
            dns_cache_expire_secs: DEFAULT_DNS_CACHE_EXPIRE_SECS,
            intranet_addr: None,
            dest_domain: None,
            use_https: false,
            check_part_md5: true,
            traffic_limit: None,
            log_level: 3,
            checkpoint_dir: None,
        }
    }
}

impl CosConfig {
    /// Returns a configuration with default settings for the given credentials and region.
    pub fn new(access_key: &str, secret_key: &str, region: &str) -> Self {
        Self {
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            region: region.to_string(),
            ..Default::default()
        }
    }

    /// Parses a JSON configuration document. Unknown keys are ignored.
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let config: CosConfig = serde_json::from_str(json)?;
        Ok(config.normalized())
    }

    /// Loads a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| Error::local_io(path, e))?;
        Self::from_json_str(&json)
    }

    /// Applies the clamps the service SDKs apply to out-of-range settings.
    pub fn normalized(mut self) -> Self {
        self.upload_part_size = self
            .upload_part_size
            .clamp(MIN_UPLOAD_PART_SIZE, MAX_UPLOAD_PART_SIZE);
        self.upload_pool_size = self
            .upload_pool_size
            .clamp(MIN_UPLOAD_POOL_SIZE, MAX_UPLOAD_POOL_SIZE);
        self.async_pool_size = self.async_pool_size.max(1);
        self.download_pool_size = self.download_pool_size.clamp(1, MAX_DOWNLOAD_POOL_SIZE);
        self.download_slice_size = self
            .download_slice_size
            .clamp(MIN_DOWNLOAD_SLICE_SIZE, MAX_DOWNLOAD_SLICE_SIZE);
        self.dns_cache_size = self.dns_cache_size.max(1);
        self.intranet_addr = self.intranet_addr.filter(|v| !v.is_empty());
        self.dest_domain = self.dest_domain.filter(|v| !v.is_empty());
        self.session_token = self.session_token.filter(|v| !v.is_empty());
        self
    }

    /// Checks settings that cannot be defaulted.
    pub fn validate(&self) -> Result<(), Error> {
        if self.region.trim().is_empty()
            && self.intranet_addr.is_none()
            && self.dest_domain.is_none()
        {
            return Err(Error::Configuration(
                "region must be set unless an intranet address or destination domain is".into(),
            ));
        }
        if self.sign_expire_secs == 0 {
            return Err(Error::Configuration(
                "signature validity (SignExpiredTime) must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    pub fn dns_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.dns_cache_expire_secs)
    }

    /// Maps the numeric `LogLevel` (1 = error … 4 = debug, 5 = trace) to a filter.
    pub fn level_filter(&self) -> log::LevelFilter {
        match self.log_level {
            0 => log::LevelFilter::Off,
            1 => log::LevelFilter::Error,
            2 => log::LevelFilter::Warn,
            3 => log::LevelFilter::Info,
            4 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }

    pub fn app_id(mut self, app_id: u64) -> Self {
        self.app_id = app_id;
        self
    }

    pub fn session_token(mut self, token: Option<String>) -> Self {
        self.session_token = token;
        self
    }

    pub fn upload_part_size(mut self, size: u64) -> Self {
        self.upload_part_size = size;
        self
    }

    pub fn upload_pool_size(mut self, size: usize) -> Self {
        self.upload_pool_size = size;
        self
    }

    pub fn async_pool_size(mut self, size: usize) -> Self {
        self.async_pool_size = size;
        self
    }

    pub fn download_pool_size(mut self, size: usize) -> Self {
        self.download_pool_size = size;
        self
    }

    pub fn download_slice_size(mut self, size: u64) -> Self {
        self.download_slice_size = size;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn retry_interval_ms(mut self, interval: u64) -> Self {
        self.retry_interval_ms = interval;
        self
    }

    pub fn retry_change_domain(mut self, enable: bool) -> Self {
        self.retry_change_domain = enable;
        self
    }

    /// Enables the DNS cache with the given capacity and entry lifetime.
    pub fn dns_cache(mut self, size: usize, expire_secs: u64) -> Self {
        self.use_dns_cache = true;
        self.dns_cache_size = size;
        self.dns_cache_expire_secs = expire_secs;
        self
    }

    pub fn intranet_addr(mut self, addr: Option<String>) -> Self {
        self.intranet_addr = addr;
        self
    }

    pub fn dest_domain(mut self, domain: Option<String>) -> Self {
        self.dest_domain = domain;
        self
    }

    pub fn use_https(mut self, enable: bool) -> Self {
        self.use_https = enable;
        self
    }

    pub fn check_part_md5(mut self, enable: bool) -> Self {
        self.check_part_md5 = enable;
        self
    }

    pub fn traffic_limit(mut self, bytes_per_sec: Option<u64>) -> Self {
        self.traffic_limit = bytes_per_sec;
        self
    }

    pub fn checkpoint_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.checkpoint_dir = dir;
        self
    }

    pub fn timeouts(mut self, connect_ms: u64, recv_ms: u64) -> Self {
        self.connect_timeout_ms = connect_ms;
        self.recv_timeout_ms = recv_ms;
        self
    }
}
