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

//! Single-request object operations

use super::CosClient;
use crate::cos::error::Error;
use crate::cos::header_constants::{CONTENT_MD5, RANGE};
use crate::cos::multimap_ext::{Multimap, MultimapExt};
use crate::cos::response::{GetObjectRangeResponse, HeadObjectResponse, PutObjectResponse};
use crate::cos::types::CosRequest;
use crate::cos::utils::{check_object_key, md5sum_hash};
use bytes::Bytes;
use http::Method;

impl CosClient {
    /// Uploads `data` as one object with a single PUT carrying `Content-MD5`.
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        extra_headers: Option<Multimap>,
    ) -> Result<PutObjectResponse, Error> {
        check_object_key(key)?;

        let mut headers = extra_headers.unwrap_or_default();
        headers.add(CONTENT_MD5, md5sum_hash(&data));

        let req = CosRequest::builder()
            .method(Method::PUT)
            .bucket(bucket)
            .object(key)
            .headers(headers)
            .body(data)
            .build();
        PutObjectResponse::from_response(self.execute(req).await?)
    }

    /// Fetches size, ETag, last-modified time and CRC64 of an object.
    pub async fn head_object(&self, bucket: &str, key: &str) -> Result<HeadObjectResponse, Error> {
        check_object_key(key)?;

        let req = CosRequest::builder()
            .method(Method::HEAD)
            .bucket(bucket)
            .object(key)
            .build();
        HeadObjectResponse::from_response(self.execute(req).await?)
    }

    /// Downloads `length` bytes starting at `offset`. A response carrying
    /// fewer bytes than requested is retried.
    pub async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
        length: u64,
        extra_headers: Option<Multimap>,
    ) -> Result<GetObjectRangeResponse, Error> {
        check_object_key(key)?;
        if length == 0 {
            return Err(Error::Configuration("range length must be positive".into()));
        }

        let mut headers = extra_headers.unwrap_or_default();
        headers.add(RANGE, format!("bytes={}-{}", offset, offset + length - 1));

        let req = CosRequest::builder()
            .method(Method::GET)
            .bucket(bucket)
            .object(key)
            .headers(headers)
            .expected_length(length)
            .build();
        let resp = self.execute(req).await?;
        Ok(GetObjectRangeResponse {
            offset,
            request_id: resp.request_id().map(String::from),
            data: resp.body,
        })
    }
}
