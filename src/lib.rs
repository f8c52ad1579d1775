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

//! # cos-transfer
//!
//! Resilient, concurrent transfers between local files and objects in COS or
//! another S3-compatible object store.
//!
//! Files are split into parts that move concurrently under a bounded pool.
//! Every request runs under a retry policy that can fail over from the
//! default domain to its backup domain. Resumable transfers keep a checkpoint
//! next to the local file, so an interrupted upload or download only moves
//! the bytes still missing when it is run again.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use cos_transfer::cos::{CosClient, TransferManager, TransferRequest};
//! use cos_transfer::cos::config::CosConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), cos_transfer::cos::error::Error> {
//!     let config = CosConfig::new("AKID...", "secret", "ap-guangzhou")
//!         .upload_part_size(16 * 1024 * 1024)
//!         .max_retries(3);
//!     let manager = TransferManager::with_runtime_handle(
//!         CosClient::new(config)?,
//!         tokio::runtime::Handle::current(),
//!     );
//!
//!     let output = manager
//!         .upload(
//!             TransferRequest::builder()
//!                 .bucket("examplebucket-1250000000")
//!                 .key("backups/db.tar")
//!                 .local_path("/var/backups/db.tar")
//!                 .resumable(true)
//!                 .build(),
//!         )
//!         .await?;
//!     println!("uploaded {} parts, etag {}", output.parts, output.etag);
//!     Ok(())
//! }
//! ```
//!
//! ## Design
//! - [`cos::client::CosClient`] signs and sends single requests, retrying
//!   each under [`cos::retry::RetryPolicy`]
//! - [`cos::transfer::TransferManager`] plans, schedules and resumes whole
//!   transfers on top of the client
//! - [`cos::transport::HttpTransport`] is the seam between the client and the
//!   network, backed by `reqwest`

#![allow(clippy::result_large_err)]
#![allow(clippy::too_many_arguments)]
pub mod cos;

#[cfg(test)]
#[macro_use]
extern crate quickcheck;
