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

//! Multipart upload operations

use super::CosClient;
use crate::cos::error::Error;
use crate::cos::header_constants::{
    CONTENT_MD5, CONTENT_TYPE, MAX_PARTS, PART_NUMBER, PART_NUMBER_MARKER, UPLOAD_ID, UPLOADS,
};
use crate::cos::multimap_ext::{Multimap, MultimapExt};
use crate::cos::response::{
    CompleteMultipartUploadResponse, InitiateMultipartUploadResponse, ListPartsResponse,
    UploadPartResponse,
};
use crate::cos::types::{CosRequest, ListedPart, Part};
use crate::cos::utils::{check_object_key, md5_hex, md5sum_hash};
use bytes::{Bytes, BytesMut};
use http::Method;

const LIST_PARTS_PAGE_SIZE: u32 = 1000;

fn upload_id_query(upload_id: &str) -> Result<Multimap, Error> {
    if upload_id.is_empty() {
        return Err(Error::Configuration("upload id cannot be empty".into()));
    }
    let mut query_params = Multimap::new();
    query_params.add(UPLOAD_ID, upload_id);
    Ok(query_params)
}

impl CosClient {
    /// Starts a multipart upload and returns its upload-id.
    pub async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        extra_headers: Option<Multimap>,
    ) -> Result<InitiateMultipartUploadResponse, Error> {
        check_object_key(key)?;

        let mut query_params = Multimap::new();
        query_params.add(UPLOADS, "");

        let req = CosRequest::builder()
            .method(Method::POST)
            .bucket(bucket)
            .object(key)
            .query_params(query_params)
            .headers(extra_headers.unwrap_or_default())
            .build();
        InitiateMultipartUploadResponse::from_response(self.execute(req).await?)
    }

    /// Uploads one part. When `CheckMd5` is on, the returned ETag must equal
    /// the hex MD5 of `data`.
    pub async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
        extra_headers: Option<Multimap>,
    ) -> Result<UploadPartResponse, Error> {
        check_object_key(key)?;

        let mut query_params = upload_id_query(upload_id)?;
        query_params.add(PART_NUMBER, part_number.to_string());

        let req = CosRequest::builder()
            .method(Method::PUT)
            .bucket(bucket)
            .object(key)
            .query_params(query_params)
            .headers(extra_headers.unwrap_or_default())
            .expected_etag(self.shared.config.check_part_md5.then(|| md5_hex(&data)))
            .body(data)
            .build();
        UploadPartResponse::from_response(part_number, self.execute(req).await?)
    }

    /// Lists every part uploaded so far, following pagination.
    pub async fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<Vec<ListedPart>, Error> {
        check_object_key(key)?;

        let mut parts = Vec::new();
        let mut marker: Option<u32> = None;
        loop {
            let mut query_params = upload_id_query(upload_id)?;
            query_params.add(MAX_PARTS, LIST_PARTS_PAGE_SIZE.to_string());
            if let Some(m) = marker {
                query_params.add(PART_NUMBER_MARKER, m.to_string());
            }

            let req = CosRequest::builder()
                .method(Method::GET)
                .bucket(bucket)
                .object(key)
                .query_params(query_params)
                .build();
            let page = ListPartsResponse::from_response(self.execute(req).await?)?;
            parts.extend(page.parts);

            match (page.is_truncated, page.next_part_number_marker) {
                (true, Some(next)) if Some(next) != marker => marker = Some(next),
                _ => break,
            }
        }
        Ok(parts)
    }

    /// Completes a multipart upload with `parts`, which must be sorted by
    /// part number.
    pub async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[Part],
    ) -> Result<CompleteMultipartUploadResponse, Error> {
        check_object_key(key)?;
        if parts.is_empty() {
            return Err(Error::Configuration("parts cannot be empty".into()));
        }

        // Set capacity of the byte-buffer based on the part count
        let mut data = BytesMut::with_capacity(100 * parts.len() + 100);
        data.extend_from_slice(b"<CompleteMultipartUpload>");
        for part in parts {
            data.extend_from_slice(b"<Part><PartNumber>");
            data.extend_from_slice(part.number.to_string().as_bytes());
            data.extend_from_slice(b"</PartNumber><ETag>\"");
            data.extend_from_slice(part.etag.as_bytes());
            data.extend_from_slice(b"\"</ETag></Part>");
        }
        data.extend_from_slice(b"</CompleteMultipartUpload>");
        let data = data.freeze();

        let mut headers = Multimap::new();
        headers.add(CONTENT_TYPE, "application/xml");
        headers.add(CONTENT_MD5, md5sum_hash(&data));

        let req = CosRequest::builder()
            .method(Method::POST)
            .bucket(bucket)
            .object(key)
            .query_params(upload_id_query(upload_id)?)
            .headers(headers)
            .body(data)
            .build();
        CompleteMultipartUploadResponse::from_response(self.execute(req).await?)
    }

    /// Releases a multipart upload and the parts stored for it.
    pub async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), Error> {
        check_object_key(key)?;

        let req = CosRequest::builder()
            .method(Method::DELETE)
            .bucket(bucket)
            .object(key)
            .query_params(upload_id_query(upload_id)?)
            .build();
        self.execute(req).await?;
        Ok(())
    }
}
