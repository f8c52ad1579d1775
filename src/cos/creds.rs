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

//! Credential providers

use crate::cos::config::CosConfig;

#[derive(Clone, Debug, Default)]
/// Credentials contain secret id, secret key and a session token optionally
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    /// Whether both keys are set; requests are only signed when they are.
    pub fn is_complete(&self) -> bool {
        !self.access_key.is_empty() && !self.secret_key.is_empty()
    }
}

/// Provider trait to fetch credentials
pub trait Provider: std::fmt::Debug + Send + Sync {
    fn fetch(&self) -> Credentials;
}

#[derive(Clone, Debug)]
/// Static credential provider
pub struct StaticProvider {
    creds: Credentials,
}

impl StaticProvider {
    /// Returns a static provider with given secret id, secret key and optional
    /// session token of temporary credentials
    ///
    /// # Examples
    ///
    /// ```
    /// use cos_transfer::cos::creds::StaticProvider;
    /// let provider = StaticProvider::new("AKIDEXAMPLE", "secret", None);
    /// ```
    pub fn new(access_key: &str, secret_key: &str, session_token: Option<&str>) -> StaticProvider {
        StaticProvider {
            creds: Credentials {
                access_key: access_key.to_string(),
                secret_key: secret_key.to_string(),
                session_token: session_token.map(|v| v.to_string()),
            },
        }
    }
}

impl From<&CosConfig> for StaticProvider {
    /// Long-lived keys from the configuration, plus `TmpToken` when present.
    fn from(config: &CosConfig) -> Self {
        StaticProvider::new(
            &config.access_key,
            &config.secret_key,
            config.session_token.as_deref(),
        )
    }
}

impl Provider for StaticProvider {
    fn fetch(&self) -> Credentials {
        self.creds.clone()
    }
}
