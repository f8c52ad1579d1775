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

//! Service error responses

use crate::cos::header_constants::X_COS_REQUEST_ID;
use crate::cos::utils::{get_text_default, get_text_option};
use bytes::{Buf, Bytes};
use http::HeaderMap;
use std::fmt;
use std::str::FromStr;
use xmltree::Element;

/// Error codes returned by the service in the `<Code>` element.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CosErrorCode {
    #[default]
    NoError,
    /// The specified bucket does not exist
    NoSuchBucket,
    /// The specified key does not exist
    NoSuchKey,
    /// The multipart upload does not exist; it may have been aborted or completed
    NoSuchUpload,
    /// One or more of the specified parts could not be found
    InvalidPart,
    InvalidPartOrder,
    AccessDenied,
    SignatureDoesNotMatch,
    RequestTimeTooSkewed,
    EntityTooSmall,
    InvalidDigest,
    BadDigest,
    RequestTimeout,
    InternalError,
    ServiceUnavailable,
    SlowDown,
    PermanentRedirect,

    OtherError(String), // catch-all for codes not listed above
}

impl FromStr for CosErrorCode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "" | "noerror" => CosErrorCode::NoError,
            "nosuchbucket" => CosErrorCode::NoSuchBucket,
            "nosuchkey" => CosErrorCode::NoSuchKey,
            "nosuchupload" => CosErrorCode::NoSuchUpload,
            "invalidpart" => CosErrorCode::InvalidPart,
            "invalidpartorder" => CosErrorCode::InvalidPartOrder,
            "accessdenied" => CosErrorCode::AccessDenied,
            "signaturedoesnotmatch" => CosErrorCode::SignatureDoesNotMatch,
            "requesttimetooskewed" => CosErrorCode::RequestTimeTooSkewed,
            "entitytoosmall" => CosErrorCode::EntityTooSmall,
            "invaliddigest" => CosErrorCode::InvalidDigest,
            "baddigest" => CosErrorCode::BadDigest,
            "requesttimeout" => CosErrorCode::RequestTimeout,
            "internalerror" => CosErrorCode::InternalError,
            "serviceunavailable" => CosErrorCode::ServiceUnavailable,
            "slowdown" => CosErrorCode::SlowDown,
            "permanentredirect" => CosErrorCode::PermanentRedirect,
            _ => CosErrorCode::OtherError(s.to_owned()),
        })
    }
}

impl fmt::Display for CosErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CosErrorCode::NoError => "NoError",
            CosErrorCode::NoSuchBucket => "NoSuchBucket",
            CosErrorCode::NoSuchKey => "NoSuchKey",
            CosErrorCode::NoSuchUpload => "NoSuchUpload",
            CosErrorCode::InvalidPart => "InvalidPart",
            CosErrorCode::InvalidPartOrder => "InvalidPartOrder",
            CosErrorCode::AccessDenied => "AccessDenied",
            CosErrorCode::SignatureDoesNotMatch => "SignatureDoesNotMatch",
            CosErrorCode::RequestTimeTooSkewed => "RequestTimeTooSkewed",
            CosErrorCode::EntityTooSmall => "EntityTooSmall",
            CosErrorCode::InvalidDigest => "InvalidDigest",
            CosErrorCode::BadDigest => "BadDigest",
            CosErrorCode::RequestTimeout => "RequestTimeout",
            CosErrorCode::InternalError => "InternalError",
            CosErrorCode::ServiceUnavailable => "ServiceUnavailable",
            CosErrorCode::SlowDown => "SlowDown",
            CosErrorCode::PermanentRedirect => "PermanentRedirect",
            CosErrorCode::OtherError(msg) => msg,
        };
        f.write_str(s)
    }
}

/// ServiceError is the typed error for every non-2xx response.
///
/// The body is parsed when it is a well formed `<Error>` document; otherwise
/// only the status, headers and request-id are kept. An empty request-id means
/// the response did not come from the service (a proxy, a load balancer or a
/// DNS hijack answered instead).
#[derive(Clone, Debug)]
pub struct ServiceError {
    status: u16,
    code: CosErrorCode,
    message: Option<String>,
    resource: String,
    request_id: String,
    trace_id: String,
    headers: HeaderMap,
}

impl ServiceError {
    pub fn new(status: u16, headers: HeaderMap) -> Self {
        let request_id = headers
            .get(X_COS_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Self {
            status,
            code: CosErrorCode::NoError,
            message: None,
            resource: String::new(),
            request_id,
            trace_id: String::new(),
            headers,
        }
    }

    /// Builds the error from a response, parsing the XML body when possible.
    pub fn from_response(status: u16, headers: HeaderMap, body: Bytes) -> Self {
        let mut err = Self::new(status, headers);
        if body.is_empty() {
            return err;
        }

        match Element::parse(body.clone().reader()) {
            Ok(root) => {
                err.code = get_text_default(&root, "Code")
                    .parse()
                    .unwrap_or(CosErrorCode::NoError);
                err.message = get_text_option(&root, "Message");
                err.resource = get_text_default(&root, "Resource");
                err.trace_id = get_text_default(&root, "TraceId");
                if err.request_id.is_empty() {
                    err.request_id = get_text_default(&root, "RequestId");
                }
            }
            Err(e) => {
                log::debug!("non-XML error body for status {status}: {e}");
                err.message = Some(String::from_utf8_lossy(&body).into_owned());
            }
        }
        err
    }

    pub fn status(&self) -> u16 {
        self.status
    }
    pub fn code(&self) -> &CosErrorCode {
        &self.code
    }
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
    pub fn resource(&self) -> &str {
        &self.resource
    }
    pub fn request_id(&self) -> &str {
        &self.request_id
    }
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
    pub fn has_request_id(&self) -> bool {
        !self.request_id.is_empty()
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "status: {}, code: {}, message: {}, resource: {}, request_id: {}, trace_id: {}",
            self.status,
            self.code,
            self.message.as_deref().unwrap_or_default(),
            self.resource,
            if self.request_id.is_empty() {
                "<none>"
            } else {
                self.request_id.as_str()
            },
            self.trace_id,
        )
    }
}

impl std::error::Error for ServiceError {}
