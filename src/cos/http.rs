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

//! Endpoint selection and request URLs
//!
//! A request targets, in order of priority, the configured intranet address,
//! the configured destination domain, or the bucket's default domain
//! `{bucket}-{appid}.cos.{region}.myqcloud.com`. Only the default domain is
//! eligible for failover, which rewrites it to the backup domain suffix.

use crate::cos::config::CosConfig;
use crate::cos::multimap_ext::{Multimap, MultimapExt};
use crate::cos::utils::urlencode_object_key;
use std::fmt;

pub const DEFAULT_DOMAIN_SUFFIX: &str = ".myqcloud.com";
pub const BACKUP_DOMAIN_SUFFIX: &str = ".tencentcos.cn";
pub const ACCELERATE_REGION: &str = "accelerate";

/// Regions whose domain does not carry the `cos.` prefix.
const LEGACY_REGIONS: &[&str] = &[
    "cn-east",
    "cn-north",
    "cn-south",
    "cn-southwest",
    "cn-south-2",
    "sg",
];

#[derive(Clone, Debug)]
/// Represents HTTP URL
pub struct Url {
    pub https: bool,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub query: Multimap,
}

impl Url {
    pub fn host_header_value(&self) -> String {
        if self.port > 0 {
            return format!("{}:{}", self.host, self.port);
        }
        self.host.clone()
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.host.is_empty() {
            return Err(fmt::Error);
        }

        f.write_str(if self.https { "https://" } else { "http://" })?;
        f.write_str(&self.host_header_value())?;
        if !self.path.starts_with('/') {
            f.write_str("/")?;
        }
        f.write_str(&self.path)?;

        if !self.query.is_empty() {
            f.write_str("?")?;
            f.write_str(&self.query.to_query_string())?;
        }
        Ok(())
    }
}

/// Where a request is sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostKind {
    Intranet,
    DestDomain,
    /// `*.myqcloud.com`
    Default,
    /// `*.tencentcos.cn`, reached by failover from [`HostKind::Default`]
    Backup,
}

/// A concrete request target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Host {
    pub kind: HostKind,
    pub https: bool,
    pub name: String,
    pub port: u16,
}

impl Host {
    /// The failover target for this host, if it has one.
    pub fn backup(&self) -> Option<Host> {
        if self.kind != HostKind::Default {
            return None;
        }
        let name = change_host_suffix(&self.name);
        if name == self.name {
            return None;
        }
        Some(Host {
            kind: HostKind::Backup,
            name,
            ..self.clone()
        })
    }

    pub fn url(&self, object: Option<&str>, query: Multimap) -> Url {
        let path = match object {
            Some(key) => format!("/{}", urlencode_object_key(key.trim_start_matches('/'))),
            None => "/".to_string(),
        };
        Url {
            https: self.https,
            host: self.name.clone(),
            port: self.port,
            path,
            query,
        }
    }
}

/// Rewrites the default domain suffix to the backup one; other hosts are returned unchanged.
pub fn change_host_suffix(host: &str) -> String {
    match host.rfind(DEFAULT_DOMAIN_SUFFIX) {
        Some(pos) => format!("{}{}", &host[..pos], BACKUP_DOMAIN_SUFFIX),
        None => host.to_string(),
    }
}

/// Splits `[scheme://]host[:port]`.
fn parse_address(address: &str, https: bool) -> (bool, String, u16) {
    let (https, rest) = if let Some(rest) = address.strip_prefix("https://") {
        (true, rest)
    } else if let Some(rest) = address.strip_prefix("http://") {
        (false, rest)
    } else {
        (https, address)
    };
    let rest = rest.trim_end_matches('/');
    match rest.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse::<u16>() {
            Ok(port) => (https, host.to_string(), port),
            Err(_) => (https, rest.to_string(), 0),
        },
        _ => (https, rest.to_string(), 0),
    }
}

/// Endpoint settings extracted from a [`CosConfig`].
#[derive(Clone, Debug, Default)]
pub struct Endpoint {
    pub https: bool,
    pub app_id: u64,
    pub region: String,
    pub intranet_addr: Option<String>,
    pub dest_domain: Option<String>,
}

impl Endpoint {
    pub fn from_config(config: &CosConfig) -> Self {
        Self {
            https: config.use_https,
            app_id: config.app_id,
            region: config.region.clone(),
            intranet_addr: config.intranet_addr.clone(),
            dest_domain: config.dest_domain.clone(),
        }
    }

    /// Returns the default domain of a bucket.
    pub fn default_host_name(&self, bucket: &str) -> String {
        let region = if LEGACY_REGIONS.contains(&self.region.as_str())
            || self.region.starts_with("cos.")
        {
            self.region.clone()
        } else {
            format!("cos.{}", self.region)
        };

        let app_id_suffix = format!("-{}", self.app_id);
        if self.app_id == 0 || bucket.ends_with(&app_id_suffix) {
            format!("{bucket}.{region}{DEFAULT_DOMAIN_SUFFIX}")
        } else {
            format!("{bucket}{app_id_suffix}.{region}{DEFAULT_DOMAIN_SUFFIX}")
        }
    }

    /// Whether requests go to the default domain (no intranet address, no
    /// destination domain, not the global acceleration region).
    pub fn uses_default_domain(&self) -> bool {
        self.intranet_addr.is_none()
            && self.dest_domain.is_none()
            && self.region != ACCELERATE_REGION
    }

    /// Picks the host a bucket's requests are sent to.
    pub fn select_host(&self, bucket: &str) -> Host {
        if let Some(addr) = &self.intranet_addr {
            let (https, name, port) = parse_address(addr, self.https);
            return Host {
                kind: HostKind::Intranet,
                https,
                name,
                port,
            };
        }
        if let Some(domain) = &self.dest_domain {
            let (https, name, port) = parse_address(domain, self.https);
            return Host {
                kind: HostKind::DestDomain,
                https,
                name,
                port,
            };
        }

        let name = self.default_host_name(bucket);
        Host {
            // acceleration domains are not failover candidates
            kind: if self.uses_default_domain() {
                HostKind::Default
            } else {
                HostKind::DestDomain
            },
            https: self.https,
            name,
            port: 0,
        }
    }
}
