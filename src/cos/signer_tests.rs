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

//! Tests for the COS request signature
//!
//! The signature is security critical; these tests pin the canonical form
//! (header filtering, lower-casing, encoding, ordering) and check the final
//! HMAC chain against an independent recomputation.

use super::creds::Credentials;
use super::header_constants::{CONTENT_LENGTH, CONTENT_MD5, CONTENT_TYPE, HOST};
use super::multimap_ext::{Multimap, MultimapExt};
use super::signer::{CosSigner, SignWindow, Signer, get_format_string, sign_v5};
use super::utils::{hmac_sha1_hex, sha1_hex};
use http::Method;

const ACCESS_KEY: &str = "AKIDQjz3ltompVjBni5LitkWHFlFpwkn9U5q";
const SECRET_KEY: &str = "BQYIM75p8x0iWVFSIgqEKwFprpRSVHlz";

fn window() -> SignWindow {
    SignWindow::new(1557989151, 7200)
}

fn upload_headers() -> Multimap {
    let mut headers = Multimap::new();
    headers.add(HOST, "examplebucket-1250000000.cos.ap-beijing.myqcloud.com");
    headers.add(CONTENT_TYPE, "text/plain");
    headers.add(CONTENT_LENGTH, "13");
    headers.add(CONTENT_MD5, "mQ/fVh815F3k6TAUm8m0eg==");
    headers.add("Date", "Thu, 16 May 2019 06:45:51 GMT");
    headers.add("x-cos-acl", "private");
    headers
}

fn field<'a>(auth: &'a str, name: &str) -> &'a str {
    auth.split('&')
        .find_map(|kv| kv.strip_prefix(&format!("{name}=")))
        .unwrap_or_else(|| panic!("{name} missing from {auth}"))
}

#[test]
fn test_sign_window_key_time() {
    assert_eq!(window().key_time(), "1557989151;1557996351");
}

#[test]
fn test_authorization_layout() {
    let auth = sign_v5(
        ACCESS_KEY,
        SECRET_KEY,
        &Method::PUT,
        "/exampleobject",
        &upload_headers(),
        &Multimap::new(),
        window(),
    )
    .unwrap();

    assert!(auth.starts_with("q-sign-algorithm=sha1&"));
    assert_eq!(field(&auth, "q-ak"), ACCESS_KEY);
    assert_eq!(field(&auth, "q-sign-time"), "1557989151;1557996351");
    assert_eq!(field(&auth, "q-key-time"), "1557989151;1557996351");
    // Date is not a signed header; the rest are lower-cased and sorted
    assert_eq!(
        field(&auth, "q-header-list"),
        "content-length;content-md5;content-type;host;x-cos-acl"
    );
    assert_eq!(field(&auth, "q-url-param-list"), "");
    assert_eq!(field(&auth, "q-signature").len(), 40);
}

#[test]
fn test_signature_matches_recomputation() {
    let auth = sign_v5(
        ACCESS_KEY,
        SECRET_KEY,
        &Method::PUT,
        "/exampleobject",
        &upload_headers(),
        &Multimap::new(),
        window(),
    )
    .unwrap();

    let format_string = "put\n/exampleobject\n\n\
        content-length=13&content-md5=mQ%2FfVh815F3k6TAUm8m0eg%3D%3D&content-type=text%2Fplain\
        &host=examplebucket-1250000000.cos.ap-beijing.myqcloud.com&x-cos-acl=private\n";
    let key_time = "1557989151;1557996351";
    let string_to_sign = format!("sha1\n{key_time}\n{}\n", sha1_hex(format_string.as_bytes()));
    let sign_key = hmac_sha1_hex(SECRET_KEY.as_bytes(), key_time.as_bytes());
    let expected = hmac_sha1_hex(sign_key.as_bytes(), string_to_sign.as_bytes());

    assert_eq!(field(&auth, "q-signature"), expected);
}

#[test]
fn test_query_params_are_encoded_and_lowercased() {
    let mut params = Multimap::new();
    params.add("uploadId", "1585130821cbb7df1d11846c073ad648e8f33b087cec2381df437acdc833cf654b9ecc6361");
    params.add("partNumber", "1");
    params.add("prefix", "a b");

    let auth = sign_v5(
        ACCESS_KEY,
        SECRET_KEY,
        &Method::PUT,
        "/exampleobject",
        &Multimap::new(),
        &params,
        window(),
    )
    .unwrap();
    assert_eq!(field(&auth, "q-url-param-list"), "partnumber;prefix;uploadid");
    assert_eq!(field(&auth, "q-header-list"), "");
}

#[test]
fn test_format_string() {
    assert_eq!(
        get_format_string(&Method::GET, "", "a=1", "host=h"),
        "get\n/\na=1\nhost=h\n"
    );
}

#[test]
fn test_deterministic() {
    let sign = || {
        sign_v5(
            ACCESS_KEY,
            SECRET_KEY,
            &Method::GET,
            "/k",
            &upload_headers(),
            &Multimap::new(),
            window(),
        )
    };
    assert_eq!(sign(), sign());
}

#[test]
fn test_different_window_changes_signature() {
    let headers = upload_headers();
    let a = sign_v5(ACCESS_KEY, SECRET_KEY, &Method::GET, "/k", &headers, &Multimap::new(), window())
        .unwrap();
    let b = sign_v5(
        ACCESS_KEY,
        SECRET_KEY,
        &Method::GET,
        "/k",
        &headers,
        &Multimap::new(),
        SignWindow::new(1557989152, 7200),
    )
    .unwrap();
    assert_ne!(field(&a, "q-signature"), field(&b, "q-signature"));
}

#[test]
fn test_empty_keys_produce_no_signature() {
    let headers = upload_headers();
    let params = Multimap::new();
    assert!(sign_v5("", SECRET_KEY, &Method::GET, "/", &headers, &params, window()).is_none());
    assert!(sign_v5(ACCESS_KEY, "", &Method::GET, "/", &headers, &params, window()).is_none());

    let creds = Credentials::default();
    assert!(
        CosSigner
            .sign(&creds, &Method::GET, "/", &headers, &params, window())
            .is_none()
    );
}
