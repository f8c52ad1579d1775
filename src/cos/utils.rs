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

//! Various utility and helper functions

use crate::cos::error::Error;
use base64::engine::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use crc_fast::{CrcAlgorithm, Digest as CrcFastDigest};
use hmac::{Hmac, Mac};
use lazy_static::lazy_static;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;
use sha1::{Digest, Sha1};
use xmltree::Element;

pub use urlencoding::encode as urlencode;

/// Date and time with UTC timezone
pub type UtcTime = DateTime<Utc>;

/// CRC-64/ECMA-182 as reported by the service in `x-cos-hash-crc64ecma`
/// (reflected, all-ones init and xorout; the XZ parameterisation).
pub const CRC64_ALGORITHM: CrcAlgorithm = CrcAlgorithm::Crc64Xz;

/// Encodes data using base64 algorithm
pub fn b64encode<T: AsRef<[u8]>>(input: T) -> String {
    BASE64.encode(input)
}

/// Gets base64 encoded MD5 hash of given data, as sent in `Content-MD5`
pub fn md5sum_hash(data: &[u8]) -> String {
    b64encode(md5::compute(data).as_slice())
}

/// Gets lower-case hex encoded MD5 hash of given data, as returned in part ETags
pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Gets lower-case hex encoded SHA1 hash of given data
pub fn sha1_hex(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}

/// Returns lower-case hex encoded HMAC-SHA1 of `data` keyed with `key`
pub fn hmac_sha1_hex(key: &[u8], data: &[u8]) -> String {
    let mut hasher =
        Hmac::<Sha1>::new_from_slice(key).expect("HMAC can take key of any size");
    hasher.update(data);
    hex::encode(hasher.finalize().into_bytes())
}

/// Computes the CRC64 of given data
pub fn crc64(data: &[u8]) -> u64 {
    let mut digest = CrcFastDigest::new(CRC64_ALGORITHM);
    digest.update(data);
    digest.finalize()
}

/// Combines `crc1` (of some prefix) with `crc2` (of the `len2` bytes that
/// follow it) into the CRC64 of the concatenation.
pub fn crc64_combine(crc1: u64, crc2: u64, len2: u64) -> u64 {
    crc_fast::checksum_combine(CRC64_ALGORITHM, crc1, crc2, len2)
}

/// Gets current UTC time
pub fn utc_now() -> UtcTime {
    Utc::now()
}

/// URL-encodes everything except unreserved characters (`A-Za-z0-9-_.~`),
/// with upper-case hex digits
pub fn url_encode(s: &str) -> String {
    urlencode(s).into_owned()
}

const OBJECT_KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Encodes an object key for use as a request path, keeping `/` separators
pub fn urlencode_object_key(key: &str) -> String {
    utf8_percent_encode(key, OBJECT_KEY_ENCODE_SET).collect()
}

/// Strips the surrounding quotes the service puts around ETags
pub fn trim_etag(etag: &str) -> &str {
    etag.trim().trim_matches('"')
}

/// Validates given bucket name
///
/// Bucket names are lower-case letters, digits and `-`, may carry the
/// `-{appid}` suffix, and neither start nor end with `-`.
pub fn check_bucket_name(bucket_name: &str) -> Result<(), Error> {
    lazy_static! {
        static ref VALID_BUCKET_NAME_REGEX: Regex =
            Regex::new("^[a-z0-9][a-z0-9-]{0,61}[a-z0-9]$|^[a-z0-9]$").unwrap();
    }

    if bucket_name.trim().is_empty() {
        return Err(Error::Configuration("bucket name cannot be empty".into()));
    }
    if !VALID_BUCKET_NAME_REGEX.is_match(bucket_name) {
        return Err(Error::Configuration(format!(
            "bucket name '{bucket_name}' must be lower-case letters, digits and '-'"
        )));
    }
    Ok(())
}

/// Validates given object key
pub fn check_object_key(key: &str) -> Result<(), Error> {
    if key.is_empty() {
        return Err(Error::Configuration("object key cannot be empty".into()));
    }
    if key.len() > 850 {
        return Err(Error::Configuration(format!(
            "object key is {} bytes long; maximum allowed 850",
            key.len()
        )));
    }
    Ok(())
}

/// Gets text value of given XML element for given tag.
pub fn get_text(element: &Element, tag: &str) -> Option<String> {
    element
        .get_child(tag)
        .and_then(|v| v.get_text())
        .map(|v| v.to_string())
}

/// Gets optional text value of given XML element for given tag.
pub fn get_text_option(element: &Element, tag: &str) -> Option<String> {
    element
        .get_child(tag)
        .map(|v| v.get_text().unwrap_or_default().to_string())
}

/// Gets default text value of given XML element for given tag.
pub fn get_text_default(element: &Element, tag: &str) -> String {
    element.get_child(tag).map_or(String::new(), |v| {
        v.get_text().unwrap_or_default().to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5sum_hash(b""), "1B2M2Y8AsgTpgAmY7PhCfg==");
    }

    #[test]
    fn test_sha1_and_hmac() {
        assert_eq!(sha1_hex(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
        // RFC 2202 test case 2
        assert_eq!(
            hmac_sha1_hex(b"Jefe", b"what do ya want for nothing?"),
            "effcdf6ae5eb2fa2d27416d5f184df9c259a7c79"
        );
    }

    #[test]
    fn test_crc64_check_value() {
        // CRC-64/XZ check value for "123456789"
        assert_eq!(crc64(b"123456789"), 0x995d_c9bb_df19_39fa);
        assert_eq!(crc64(b""), 0);
    }

    #[test]
    fn test_crc64_combine_matches_whole() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i * 31 % 251) as u8).collect();
        let (a, b) = data.split_at(3_333);
        let combined = crc64_combine(crc64(a), crc64(b), b.len() as u64);
        assert_eq!(combined, crc64(&data));
    }

    #[test]
    fn test_url_encode() {
        assert_eq!(url_encode("a b/c~d"), "a%20b%2Fc~d");
        assert_eq!(urlencode_object_key("dir/a b.txt"), "dir/a%20b.txt");
    }

    #[test]
    fn test_trim_etag() {
        assert_eq!(trim_etag("\"abc\""), "abc");
        assert_eq!(trim_etag("abc"), "abc");
    }

    #[test]
    fn test_check_bucket_name() {
        assert!(check_bucket_name("examplebucket-1250000000").is_ok());
        assert!(check_bucket_name("").is_err());
        assert!(check_bucket_name("Upper").is_err());
        assert!(check_bucket_name("-lead").is_err());
        assert!(check_bucket_name("trail-").is_err());
    }
}
