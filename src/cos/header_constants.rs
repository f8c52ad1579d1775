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

pub const AUTHORIZATION: &str = "Authorization";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_MD5: &str = "Content-MD5";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const ETAG: &str = "ETag";
pub const HOST: &str = "Host";
pub const LAST_MODIFIED: &str = "Last-Modified";
pub const RANGE: &str = "Range";

pub const X_COS_REQUEST_ID: &str = "x-cos-request-id";
pub const X_COS_SECURITY_TOKEN: &str = "x-cos-security-token";
pub const X_COS_TRAFFIC_LIMIT: &str = "x-cos-traffic-limit";
pub const X_COS_HASH_CRC64ECMA: &str = "x-cos-hash-crc64ecma";
pub const X_COS_META_PREFIX: &str = "x-cos-meta-";

pub const UPLOAD_ID: &str = "uploadId";
pub const PART_NUMBER: &str = "partNumber";
pub const UPLOADS: &str = "uploads";
pub const MAX_PARTS: &str = "max-parts";
pub const PART_NUMBER_MARKER: &str = "part-number-marker";
