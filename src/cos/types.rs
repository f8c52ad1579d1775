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

//! Request and part types shared by the client and the transfer engine

use crate::cos::multimap_ext::Multimap;
use bytes::Bytes;
use http::Method;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// One logical request against a bucket. The client turns it into one or
/// more signed HTTP attempts.
#[derive(Clone, Debug, TypedBuilder)]
pub struct CosRequest {
    pub(crate) method: Method,

    #[builder(setter(into))]
    pub(crate) bucket: String,

    #[builder(default, setter(strip_option, into))]
    pub(crate) object: Option<String>,

    #[builder(default)]
    pub(crate) query_params: Multimap,

    #[builder(default)]
    pub(crate) headers: Multimap,

    #[builder(default, setter(strip_option))]
    pub(crate) body: Option<Bytes>,

    /// Hex MD5 the response `ETag` must equal; a mismatch is retried.
    #[builder(default)]
    pub(crate) expected_etag: Option<String>,

    /// Body length a 2xx response must carry; a short read is retried.
    #[builder(default, setter(strip_option))]
    pub(crate) expected_length: Option<u64>,
}

impl CosRequest {
    /// Path used for signing: the object key, not percent-encoded.
    pub(crate) fn sign_path(&self) -> String {
        match &self.object {
            Some(key) => format!("/{}", key.trim_start_matches('/')),
            None => "/".to_string(),
        }
    }
}

/// A part reference submitted with CompleteMultipartUpload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub number: u32,
    pub etag: String,
}

/// A part as listed by ListParts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListedPart {
    pub number: u32,
    pub etag: String,
    pub size: u64,
    pub last_modified: Option<String>,
}
