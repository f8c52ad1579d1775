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

//! Request signature for the COS API
//!
//! The authorization string is an HMAC-SHA1 over a canonical "format string"
//! built from the method, path, the sorted query parameters and a filtered,
//! sorted subset of the headers:
//!
//! ```text
//! FormatString = lower(method) + '\n' + uri + '\n' + params + '\n' + headers + '\n'
//! StringToSign = "sha1\n" + KeyTime + '\n' + hex(SHA1(FormatString)) + '\n'
//! SignKey      = hex(HMAC-SHA1(SecretKey, KeyTime))
//! Signature    = hex(HMAC-SHA1(SignKey, StringToSign))
//! ```

use crate::cos::creds::Credentials;
use crate::cos::multimap_ext::Multimap;
use crate::cos::utils::{hmac_sha1_hex, sha1_hex, url_encode, utc_now};
use http::Method;
use std::collections::BTreeMap;

/// Validity window of a signature, in seconds since the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignWindow {
    pub start: i64,
    pub end: i64,
}

impl SignWindow {
    pub fn new(start: i64, expire_secs: u64) -> Self {
        Self {
            start,
            end: start + expire_secs as i64,
        }
    }

    /// A window starting now and lasting `expire_secs`.
    pub fn from_now(expire_secs: u64) -> Self {
        Self::new(utc_now().timestamp(), expire_secs)
    }

    /// `start;end`, used as both `q-sign-time` and `q-key-time`
    pub fn key_time(&self) -> String {
        format!("{};{}", self.start, self.end)
    }
}

/// Produces the `Authorization` header value for a request.
///
/// Returns `None` when no signature can be produced, which the client reports
/// as a configuration error.
pub trait Signer: std::fmt::Debug + Send + Sync {
    fn sign(
        &self,
        creds: &Credentials,
        method: &Method,
        uri: &str,
        headers: &Multimap,
        query_params: &Multimap,
        window: SignWindow,
    ) -> Option<String>;
}

/// HMAC-SHA1 signer for the COS XML API.
#[derive(Clone, Copy, Debug, Default)]
pub struct CosSigner;

impl Signer for CosSigner {
    fn sign(
        &self,
        creds: &Credentials,
        method: &Method,
        uri: &str,
        headers: &Multimap,
        query_params: &Multimap,
        window: SignWindow,
    ) -> Option<String> {
        sign_v5(
            &creds.access_key,
            &creds.secret_key,
            method,
            uri,
            headers,
            query_params,
            window,
        )
    }
}

/// Returns whether a header takes part in the signature
fn is_signed_header(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    matches!(
        name.as_str(),
        "host"
            | "content-type"
            | "content-md5"
            | "content-disposition"
            | "content-encoding"
            | "content-length"
            | "transfer-encoding"
            | "range"
    ) || name.starts_with("x-cos")
}

/// Lower-cases and encodes keys (optionally) and values, sorted by key.
fn canonical_entries<'a>(
    entries: impl Iterator<Item = (&'a String, &'a String)>,
    encode_key: bool,
) -> BTreeMap<String, String> {
    entries
        .map(|(k, v)| {
            let key = if encode_key { url_encode(k) } else { k.clone() };
            (key.to_lowercase(), url_encode(v))
        })
        .collect()
}

/// Returns the `;`-joined key list and the `&`-joined `key=value` list
pub fn get_key_and_value_lists(entries: &BTreeMap<String, String>) -> (String, String) {
    let keys: Vec<&str> = entries.keys().map(String::as_str).collect();
    let pairs: Vec<String> = entries.iter().map(|(k, v)| format!("{k}={v}")).collect();
    (keys.join(";"), pairs.join("&"))
}

/// Returns the format string of the signature
pub fn get_format_string(
    method: &Method,
    uri: &str,
    param_value_list: &str,
    header_value_list: &str,
) -> String {
    let uri = if uri.is_empty() { "/" } else { uri };
    format!(
        "{}\n{}\n{}\n{}\n",
        method.as_str().to_lowercase(),
        uri,
        param_value_list,
        header_value_list
    )
}

/// Returns the string-to-sign for given key time and format string
pub fn get_string_to_sign(key_time: &str, format_string: &str) -> String {
    format!("sha1\n{}\n{}\n", key_time, sha1_hex(format_string.as_bytes()))
}

/// Signs a request, returning the full authorization value
pub fn sign_v5(
    access_key: &str,
    secret_key: &str,
    method: &Method,
    uri: &str,
    headers: &Multimap,
    query_params: &Multimap,
    window: SignWindow,
) -> Option<String> {
    if access_key.is_empty() || secret_key.is_empty() {
        return None;
    }

    let key_time = window.key_time();
    let signed_headers = canonical_entries(
        headers.iter().filter(|(k, _)| is_signed_header(k)),
        false,
    );
    let params = canonical_entries(query_params.iter(), true);
    let (header_list, header_value_list) = get_key_and_value_lists(&signed_headers);
    let (param_list, param_value_list) = get_key_and_value_lists(&params);

    let format_string = get_format_string(method, uri, &param_value_list, &header_value_list);
    let string_to_sign = get_string_to_sign(&key_time, &format_string);
    let sign_key = hmac_sha1_hex(secret_key.as_bytes(), key_time.as_bytes());
    let signature = hmac_sha1_hex(sign_key.as_bytes(), string_to_sign.as_bytes());

    Some(format!(
        "q-sign-algorithm=sha1&q-ak={access_key}&q-sign-time={key_time}&q-key-time={key_time}\
         &q-header-list={header_list}&q-url-param-list={param_list}&q-signature={signature}"
    ))
}
