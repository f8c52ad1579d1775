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

//! Responses of the object and multipart operations

use crate::cos::error::Error;
use crate::cos::error_response::ServiceError;
use crate::cos::header_constants::{ETAG, LAST_MODIFIED, X_COS_HASH_CRC64ECMA};
use crate::cos::transport::HttpResponse;
use crate::cos::types::ListedPart;
use crate::cos::utils::{get_text, get_text_default, get_text_option, trim_etag};
use bytes::{Buf, Bytes};
use http::HeaderMap;
use xmltree::Element;

fn invalid(resp: &HttpResponse, message: impl Into<String>) -> Error {
    Error::InvalidResponse {
        status: resp.status,
        message: message.into(),
        request_id: resp.request_id().map(String::from),
    }
}

/// Parses an XML body; a 2xx `<Error>` document becomes a service error.
fn parse_xml(resp: &HttpResponse) -> Result<Element, Error> {
    let root = Element::parse(resp.body.clone().reader())
        .map_err(|e| invalid(resp, format!("malformed XML body; {e}")))?;
    if root.name == "Error" {
        return Err(ServiceError::from_response(
            resp.status,
            resp.headers.clone(),
            resp.body.clone(),
        )
        .into());
    }
    Ok(root)
}

fn etag_header(resp: &HttpResponse) -> Option<String> {
    resp.header(ETAG).map(|v| trim_etag(v).to_string())
}

/// Parses `x-cos-hash-crc64ecma`, a decimal CRC-64/ECMA-182 value.
fn crc64_header(resp: &HttpResponse) -> Option<u64> {
    resp.header(X_COS_HASH_CRC64ECMA)
        .and_then(|v| v.trim().parse::<u64>().ok())
}

#[derive(Clone, Debug)]
pub struct PutObjectResponse {
    pub headers: HeaderMap,
    pub etag: String,
    pub crc64: Option<u64>,
    pub request_id: Option<String>,
}

impl PutObjectResponse {
    pub(crate) fn from_response(resp: HttpResponse) -> Result<Self, Error> {
        let etag = etag_header(&resp).ok_or_else(|| invalid(&resp, "missing ETag header"))?;
        Ok(Self {
            etag,
            crc64: crc64_header(&resp),
            request_id: resp.request_id().map(String::from),
            headers: resp.headers,
        })
    }
}

/// Object metadata as returned by HEAD.
#[derive(Clone, Debug)]
pub struct HeadObjectResponse {
    pub headers: HeaderMap,
    pub size: u64,
    pub etag: String,
    pub last_modified: Option<String>,
    pub crc64: Option<u64>,
    pub request_id: Option<String>,
}

impl HeadObjectResponse {
    pub(crate) fn from_response(resp: HttpResponse) -> Result<Self, Error> {
        let size = resp
            .header(http::header::CONTENT_LENGTH.as_str())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| invalid(&resp, "missing or invalid Content-Length header"))?;
        Ok(Self {
            size,
            etag: etag_header(&resp).unwrap_or_default(),
            last_modified: resp.header(LAST_MODIFIED).map(String::from),
            crc64: crc64_header(&resp),
            request_id: resp.request_id().map(String::from),
            headers: resp.headers,
        })
    }
}

/// One ranged GET.
#[derive(Clone, Debug)]
pub struct GetObjectRangeResponse {
    pub offset: u64,
    pub data: Bytes,
    pub request_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct InitiateMultipartUploadResponse {
    pub upload_id: String,
    pub request_id: Option<String>,
}

impl InitiateMultipartUploadResponse {
    pub(crate) fn from_response(resp: HttpResponse) -> Result<Self, Error> {
        let root = parse_xml(&resp)?;
        let upload_id = get_text(&root, "UploadId")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| invalid(&resp, "missing UploadId"))?;
        Ok(Self {
            upload_id,
            request_id: resp.request_id().map(String::from),
        })
    }
}

#[derive(Clone, Debug)]
pub struct UploadPartResponse {
    pub part_number: u32,
    pub etag: String,
    pub request_id: Option<String>,
}

impl UploadPartResponse {
    pub(crate) fn from_response(part_number: u32, resp: HttpResponse) -> Result<Self, Error> {
        let etag = etag_header(&resp).ok_or_else(|| invalid(&resp, "missing ETag header"))?;
        Ok(Self {
            part_number,
            etag,
            request_id: resp.request_id().map(String::from),
        })
    }
}

/// One page of ListParts.
#[derive(Clone, Debug, Default)]
pub struct ListPartsResponse {
    pub upload_id: String,
    pub parts: Vec<ListedPart>,
    pub is_truncated: bool,
    pub next_part_number_marker: Option<u32>,
}

impl ListPartsResponse {
    pub(crate) fn from_response(resp: HttpResponse) -> Result<Self, Error> {
        let root = parse_xml(&resp)?;
        let mut parts = Vec::new();
        for node in root.children.iter() {
            let Some(elem) = node.as_element() else {
                continue;
            };
            if elem.name != "Part" {
                continue;
            }
            let number = get_text_default(elem, "PartNumber")
                .parse::<u32>()
                .map_err(|e| invalid(&resp, format!("invalid PartNumber; {e}")))?;
            parts.push(ListedPart {
                number,
                etag: trim_etag(&get_text_default(elem, "ETag")).to_string(),
                size: get_text_default(elem, "Size").parse().unwrap_or(0),
                last_modified: get_text_option(elem, "LastModified"),
            });
        }

        Ok(Self {
            upload_id: get_text_default(&root, "UploadId"),
            parts,
            is_truncated: get_text_default(&root, "IsTruncated").eq_ignore_ascii_case("true"),
            next_part_number_marker: get_text(&root, "NextPartNumberMarker")
                .and_then(|v| v.parse().ok()),
        })
    }
}

#[derive(Clone, Debug)]
pub struct CompleteMultipartUploadResponse {
    pub headers: HeaderMap,
    pub location: String,
    pub etag: String,
    pub crc64: Option<u64>,
    pub request_id: Option<String>,
}

impl CompleteMultipartUploadResponse {
    pub(crate) fn from_response(resp: HttpResponse) -> Result<Self, Error> {
        let root = parse_xml(&resp)?;
        let etag = trim_etag(&get_text_default(&root, "ETag")).to_string();
        Ok(Self {
            location: get_text_default(&root, "Location"),
            etag,
            crc64: crc64_header(&resp),
            request_id: resp.request_id().map(String::from),
            headers: resp.headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn response(status: u16, body: &'static str) -> HttpResponse {
        let mut headers = HeaderMap::new();
        headers.insert("x-cos-request-id", HeaderValue::from_static("req-1"));
        HttpResponse {
            status,
            headers,
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn test_initiate() {
        let resp = response(
            200,
            "<InitiateMultipartUploadResult><Bucket>b</Bucket><Key>k</Key>\
             <UploadId>1585130821cbb7df1d</UploadId></InitiateMultipartUploadResult>",
        );
        let r = InitiateMultipartUploadResponse::from_response(resp).unwrap();
        assert_eq!(r.upload_id, "1585130821cbb7df1d");
        assert_eq!(r.request_id.as_deref(), Some("req-1"));
    }

    #[test]
    fn test_initiate_missing_upload_id() {
        let resp = response(200, "<InitiateMultipartUploadResult/>");
        let err = InitiateMultipartUploadResponse::from_response(resp).unwrap_err();
        assert!(matches!(err, Error::InvalidResponse { status: 200, .. }));
    }

    #[test]
    fn test_list_parts() {
        let resp = response(
            200,
            "<ListPartsResult><UploadId>u1</UploadId><IsTruncated>true</IsTruncated>\
             <NextPartNumberMarker>2</NextPartNumberMarker>\
             <Part><PartNumber>1</PartNumber><ETag>\"aa\"</ETag><Size>10</Size></Part>\
             <Part><PartNumber>2</PartNumber><ETag>&quot;bb&quot;</ETag><Size>5</Size></Part>\
             </ListPartsResult>",
        );
        let r = ListPartsResponse::from_response(resp).unwrap();
        assert_eq!(r.upload_id, "u1");
        assert!(r.is_truncated);
        assert_eq!(r.next_part_number_marker, Some(2));
        assert_eq!(r.parts.len(), 2);
        assert_eq!(r.parts[0].etag, "aa");
        assert_eq!(r.parts[1].etag, "bb");
        assert_eq!(r.parts[1].size, 5);
    }

    #[test]
    fn test_complete_with_error_body() {
        let resp = response(
            200,
            "<Error><Code>InternalError</Code><Message>retry</Message></Error>",
        );
        let err = CompleteMultipartUploadResponse::from_response(resp).unwrap_err();
        assert!(err.service_error().is_some());
    }

    #[test]
    fn test_put_object_crc64() {
        let mut resp = response(200, "");
        resp.headers.insert("etag", HeaderValue::from_static("\"abc\""));
        resp.headers.insert(
            "x-cos-hash-crc64ecma",
            HeaderValue::from_static("11051210869376104954"),
        );
        let r = PutObjectResponse::from_response(resp).unwrap();
        assert_eq!(r.etag, "abc");
        assert_eq!(r.crc64, Some(0x995dc9bbdf1939fa));
    }
}
