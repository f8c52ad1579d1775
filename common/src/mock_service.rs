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

//! In-memory stand-in for the COS object API, with fault injection

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use cos_transfer::cos::error::Error;
use cos_transfer::cos::multimap_ext::{Multimap, MultimapExt};
use cos_transfer::cos::transport::{HttpRequest, HttpResponse, HttpTransport};
use cos_transfer::cos::utils::{crc64, md5_hex};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use xmltree::Element;

const LAST_MODIFIED: &str = "Wed, 15 Oct 2025 08:00:00 GMT";

/// Which object API a request targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    HeadObject,
    GetObject,
    PutObject,
    InitiateMultipartUpload,
    UploadPart,
    ListParts,
    CompleteMultipartUpload,
    AbortMultipartUpload,
    Unknown,
}

impl Operation {
    fn of(req: &HttpRequest) -> Self {
        let query = &req.url.query;
        let has = |k: &str| query.contains_key(k);
        match req.method {
            Method::HEAD => Operation::HeadObject,
            Method::GET if has("uploadId") => Operation::ListParts,
            Method::GET => Operation::GetObject,
            Method::PUT if has("uploadId") => Operation::UploadPart,
            Method::PUT => Operation::PutObject,
            Method::POST if has("uploads") => Operation::InitiateMultipartUpload,
            Method::POST if has("uploadId") => Operation::CompleteMultipartUpload,
            Method::DELETE if has("uploadId") => Operation::AbortMultipartUpload,
            _ => Operation::Unknown,
        }
    }
}

/// A scripted failure. Matches requests by operation, part number and host
/// suffix, lets the first `skip` matches through, then fires `times` times.
#[derive(Clone, Debug)]
pub struct Fault {
    /// `None` fails the attempt at the transport level.
    pub status: Option<u16>,
    pub request_id: bool,
    pub times: usize,
    pub skip: usize,
    pub operation: Option<Operation>,
    pub part_number: Option<u32>,
    pub host_suffix: Option<String>,
}

impl Fault {
    pub fn status(status: u16) -> Self {
        Self {
            status: Some(status),
            request_id: true,
            times: 1,
            skip: 0,
            operation: None,
            part_number: None,
            host_suffix: None,
        }
    }

    pub fn transport() -> Self {
        Self {
            status: None,
            request_id: false,
            ..Self::status(0)
        }
    }

    pub fn times(mut self, times: usize) -> Self {
        self.times = times;
        self
    }

    pub fn after(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn without_request_id(mut self) -> Self {
        self.request_id = false;
        self
    }

    pub fn on(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn part(mut self, number: u32) -> Self {
        self.operation = Some(Operation::UploadPart);
        self.part_number = Some(number);
        self
    }

    pub fn on_host_suffix(mut self, suffix: &str) -> Self {
        self.host_suffix = Some(suffix.to_string());
        self
    }

    fn matches(&self, req: &RecordedRequest) -> bool {
        self.times > 0
            && self.operation.is_none_or(|op| op == req.operation)
            && self.part_number.is_none_or(|n| Some(n) == req.part_number)
            && self
                .host_suffix
                .as_deref()
                .is_none_or(|s| req.host.ends_with(s))
    }
}

/// One request as seen by the service.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub operation: Operation,
    pub method: Method,
    pub host: String,
    pub key: String,
    pub part_number: Option<u32>,
    pub headers: Multimap,
    pub body_len: usize,
}

#[derive(Clone, Debug)]
pub struct StoredObject {
    pub data: Bytes,
    pub etag: String,
    pub headers: Multimap,
}

#[derive(Debug, Default)]
struct PendingUpload {
    bucket: String,
    key: String,
    headers: Multimap,
    parts: BTreeMap<u32, (String, Bytes)>,
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<(String, String), StoredObject>,
    uploads: HashMap<String, PendingUpload>,
    faults: Vec<Fault>,
    log: Vec<RecordedRequest>,
}

#[derive(Debug, Default)]
pub struct MockCosService {
    state: Mutex<State>,
    delay: Mutex<Option<(Operation, Duration)>>,
    arrivals: Mutex<Vec<Operation>>,
    corrupt_crc64: AtomicBool,
    short_reads: AtomicU64,
    next_request_id: AtomicU64,
}

impl MockCosService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&self, fault: Fault) {
        self.state.lock().unwrap().faults.push(fault);
    }

    /// Delays every request of `operation` before it is served.
    pub fn delay(&self, operation: Operation, delay: Duration) {
        *self.delay.lock().unwrap() = Some((operation, delay));
    }

    /// Reports a wrong CRC64 for every object from now on.
    pub fn corrupt_crc64(&self, enable: bool) {
        self.corrupt_crc64.store(enable, Ordering::SeqCst);
    }

    /// Truncates the body of the next `count` ranged GETs.
    pub fn short_reads(&self, count: u64) {
        self.short_reads.store(count, Ordering::SeqCst);
    }

    pub fn put(&self, bucket: &str, key: &str, data: Bytes) {
        let object = StoredObject {
            etag: md5_hex(&data),
            data,
            headers: Multimap::new(),
        };
        self.state
            .lock()
            .unwrap()
            .objects
            .insert((bucket.to_string(), key.to_string()), object);
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Upload-ids of multipart uploads neither completed nor aborted.
    pub fn pending_uploads(&self) -> Vec<String> {
        self.state.lock().unwrap().uploads.keys().cloned().collect()
    }

    pub fn uploaded_parts(&self, upload_id: &str) -> Vec<u32> {
        self.state
            .lock()
            .unwrap()
            .uploads
            .get(upload_id)
            .map(|u| u.parts.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.state
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|r| r.operation == operation)
            .count()
    }

    /// Requests of `operation` received so far, including those still being
    /// delayed. `count` only sees requests once they have been served.
    pub fn arrived(&self, operation: Operation) -> usize {
        self.arrivals
            .lock()
            .unwrap()
            .iter()
            .filter(|op| **op == operation)
            .count()
    }

    pub fn clear_requests(&self) {
        self.state.lock().unwrap().log.clear();
        self.arrivals.lock().unwrap().clear();
    }

    fn respond(&self, status: u16, body: impl Into<Bytes>) -> HttpResponse {
        let mut headers = HeaderMap::new();
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        set_header(&mut headers, "x-cos-request-id", &format!("mock-{id:08}"));
        HttpResponse {
            status,
            headers,
            body: body.into(),
        }
    }

    fn error(&self, status: u16, code: &str, message: &str) -> HttpResponse {
        let body = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <Error><Code>{code}</Code><Message>{message}</Message></Error>"
        );
        self.respond(status, body)
    }

    fn reported_crc(&self, data: &[u8]) -> String {
        let crc = crc64(data);
        if self.corrupt_crc64.load(Ordering::SeqCst) {
            (crc ^ 0xdead_beef).to_string()
        } else {
            crc.to_string()
        }
    }

    fn serve(&self, req: HttpRequest, bucket: String, key: String) -> HttpResponse {
        let operation = Operation::of(&req);
        let query = &req.url.query;
        let upload_id = query.get("uploadId").cloned().unwrap_or_default();
        let mut state = self.state.lock().unwrap();

        match operation {
            Operation::HeadObject => match state.objects.get(&(bucket, key)) {
                Some(obj) => {
                    let mut resp = self.respond(200, Bytes::new());
                    set_header(&mut resp.headers, "Content-Length", &obj.data.len().to_string());
                    set_header(&mut resp.headers, "ETag", &format!("\"{}\"", obj.etag));
                    set_header(&mut resp.headers, "Last-Modified", LAST_MODIFIED);
                    set_header(
                        &mut resp.headers,
                        "x-cos-hash-crc64ecma",
                        &self.reported_crc(&obj.data),
                    );
                    resp
                }
                None => self.respond(404, Bytes::new()),
            },
            Operation::GetObject => {
                let Some(obj) = state.objects.get(&(bucket, key)) else {
                    return self.error(404, "NoSuchKey", "The specified key does not exist.");
                };
                let len = obj.data.len() as u64;
                let (start, end) = req
                    .headers
                    .get_ignore_case("Range")
                    .and_then(parse_range)
                    .map(|(s, e)| (s, e.min(len.saturating_sub(1))))
                    .unwrap_or((0, len.saturating_sub(1)));
                if start >= len {
                    return self.error(416, "InvalidRange", "The requested range is not satisfiable");
                }
                let mut data = obj.data.slice(start as usize..=end as usize);
                if self
                    .short_reads
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
                {
                    data = data.slice(..data.len() / 2);
                }
                let mut resp = self.respond(206, data);
                set_header(&mut resp.headers, "ETag", &format!("\"{}\"", obj.etag));
                resp
            }
            Operation::PutObject => {
                let data = req.body.unwrap_or_default();
                let etag = md5_hex(&data);
                let crc = self.reported_crc(&data);
                state.objects.insert(
                    (bucket, key),
                    StoredObject {
                        data,
                        etag: etag.clone(),
                        headers: req.headers,
                    },
                );
                let mut resp = self.respond(200, Bytes::new());
                set_header(&mut resp.headers, "ETag", &format!("\"{etag}\""));
                set_header(&mut resp.headers, "x-cos-hash-crc64ecma", &crc);
                resp
            }
            Operation::InitiateMultipartUpload => {
                let id = uuid::Uuid::new_v4().simple().to_string();
                let body = format!(
                    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
                     <InitiateMultipartUploadResult><Bucket>{bucket}</Bucket>\
                     <Key>{key}</Key><UploadId>{id}</UploadId>\
                     </InitiateMultipartUploadResult>"
                );
                state.uploads.insert(
                    id,
                    PendingUpload {
                        bucket,
                        key,
                        headers: req.headers,
                        parts: BTreeMap::new(),
                    },
                );
                self.respond(200, body)
            }
            Operation::UploadPart => {
                let number: u32 = query
                    .get("partNumber")
                    .and_then(|n| n.parse().ok())
                    .unwrap_or(0);
                let Some(upload) = state.uploads.get_mut(&upload_id) else {
                    return self.error(404, "NoSuchUpload", "The specified upload does not exist.");
                };
                let data = req.body.unwrap_or_default();
                let etag = md5_hex(&data);
                upload.parts.insert(number, (etag.clone(), data));
                let mut resp = self.respond(200, Bytes::new());
                set_header(&mut resp.headers, "ETag", &format!("\"{etag}\""));
                resp
            }
            Operation::ListParts => {
                let Some(upload) = state.uploads.get(&upload_id) else {
                    return self.error(404, "NoSuchUpload", "The specified upload does not exist.");
                };
                let marker: u32 = query
                    .get("part-number-marker")
                    .and_then(|n| n.parse().ok())
                    .unwrap_or(0);
                let max: usize = query
                    .get("max-parts")
                    .and_then(|n| n.parse().ok())
                    .unwrap_or(1000);
                let listed: Vec<_> = upload
                    .parts
                    .range(marker + 1..)
                    .take(max + 1)
                    .collect();
                let truncated = listed.len() > max;
                let mut body = format!(
                    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
                     <ListPartsResult><Bucket>{}</Bucket><Key>{}</Key>\
                     <UploadId>{upload_id}</UploadId><IsTruncated>{truncated}</IsTruncated>",
                    upload.bucket, upload.key
                );
                let mut last = 0;
                for (number, (etag, data)) in listed.into_iter().take(max) {
                    body.push_str(&format!(
                        "<Part><PartNumber>{number}</PartNumber><ETag>\"{etag}\"</ETag>\
                         <Size>{}</Size><LastModified>2025-10-15T08:00:00.000Z</LastModified></Part>",
                        data.len()
                    ));
                    last = *number;
                }
                if truncated {
                    body.push_str(&format!("<NextPartNumberMarker>{last}</NextPartNumberMarker>"));
                }
                body.push_str("</ListPartsResult>");
                self.respond(200, body)
            }
            Operation::CompleteMultipartUpload => {
                let Some(upload) = state.uploads.get(&upload_id) else {
                    return self.error(404, "NoSuchUpload", "The specified upload does not exist.");
                };
                let body = req.body.unwrap_or_default();
                let Ok(root) = Element::parse(body.as_ref()) else {
                    return self.error(400, "MalformedXML", "The XML you provided was not well-formed");
                };
                let mut data = BytesMut::new();
                let mut last = 0;
                for node in &root.children {
                    let Some(part) = node.as_element() else { continue };
                    let number: u32 = child_text(part, "PartNumber").parse().unwrap_or(0);
                    let etag = child_text(part, "ETag").trim_matches('"').to_string();
                    if number <= last {
                        return self.error(400, "InvalidPartOrder", "parts must be ascending");
                    }
                    last = number;
                    match upload.parts.get(&number) {
                        Some((stored, bytes)) if *stored == etag => data.extend_from_slice(bytes),
                        _ => {
                            return self.error(400, "InvalidPart", "one or more parts not found");
                        }
                    }
                }
                let Some(upload) = state.uploads.remove(&upload_id) else {
                    return self.error(404, "NoSuchUpload", "The specified upload does not exist.");
                };
                let data = data.freeze();
                let etag = format!("{}-{}", md5_hex(&data), upload.parts.len());
                let crc = self.reported_crc(&data);
                let body = format!(
                    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
                     <CompleteMultipartUploadResult><Location>{}/{}</Location>\
                     <Bucket>{}</Bucket><Key>{}</Key><ETag>\"{etag}\"</ETag>\
                     </CompleteMultipartUploadResult>",
                    upload.bucket, upload.key, upload.bucket, upload.key
                );
                state.objects.insert(
                    (upload.bucket, upload.key),
                    StoredObject {
                        data,
                        etag,
                        headers: upload.headers,
                    },
                );
                let mut resp = self.respond(200, body);
                set_header(&mut resp.headers, "x-cos-hash-crc64ecma", &crc);
                resp
            }
            Operation::AbortMultipartUpload => match state.uploads.remove(&upload_id) {
                Some(_) => self.respond(204, Bytes::new()),
                None => self.error(404, "NoSuchUpload", "The specified upload does not exist."),
            },
            Operation::Unknown => self.error(405, "MethodNotAllowed", "not supported"),
        }
    }
}

#[async_trait]
impl HttpTransport for MockCosService {
    async fn execute(&self, req: HttpRequest) -> Result<HttpResponse, Error> {
        let operation = Operation::of(&req);
        let host = req.url.host.clone();
        let bucket = host.split('.').next().unwrap_or_default().to_string();
        let key = urlencoding::decode(req.url.path.trim_start_matches('/'))
            .map(|k| k.into_owned())
            .unwrap_or_default();
        let recorded = RecordedRequest {
            operation,
            method: req.method.clone(),
            host,
            key: key.clone(),
            part_number: req.url.query.get("partNumber").and_then(|n| n.parse().ok()),
            headers: req.headers.clone(),
            body_len: req.body.as_ref().map_or(0, |b| b.len()),
        };

        self.arrivals.lock().unwrap().push(operation);
        let delay = *self.delay.lock().unwrap();
        if let Some((op, delay)) = delay
            && op == operation
        {
            tokio::time::sleep(delay).await;
        }

        let fault = {
            let mut state = self.state.lock().unwrap();
            let fault = state
                .faults
                .iter_mut()
                .find(|f| f.matches(&recorded))
                .and_then(|f| {
                    if f.skip > 0 {
                        f.skip -= 1;
                        return None;
                    }
                    f.times -= 1;
                    Some(f.clone())
                });
            state.log.push(recorded);
            fault
        };
        if let Some(fault) = fault {
            let Some(status) = fault.status else {
                return Err(Error::transport("connection reset by peer"));
            };
            let mut resp = self.error(status, "InjectedFault", "injected by test");
            if !fault.request_id {
                resp.headers.remove("x-cos-request-id");
            }
            return Ok(resp);
        }

        Ok(self.serve(req, bucket, key))
    }
}

fn set_header(headers: &mut HeaderMap, name: &str, value: &str) {
    headers.insert(
        HeaderName::from_bytes(name.as_bytes()).unwrap(),
        HeaderValue::from_str(value).unwrap(),
    );
}

fn child_text(element: &Element, name: &str) -> String {
    element
        .get_child(name)
        .and_then(|e| e.get_text())
        .map(|t| t.into_owned())
        .unwrap_or_default()
}

/// Parses `bytes=start-end`.
fn parse_range(value: &str) -> Option<(u64, u64)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}
