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

//! Client and transfer engine for COS object storage

pub mod client;
pub mod config;
pub mod creds;
pub mod dns_cache;
pub mod error;
pub mod error_response;
pub mod header_constants;
pub mod http;
pub mod lru_cache;
pub mod multimap_ext;
pub mod response;
pub mod retry;
pub mod signer;
pub mod transfer;
pub mod transport;
pub mod types;
pub mod utils;

#[cfg(test)]
mod http_tests;
#[cfg(test)]
mod signer_tests;

pub use client::{CosClient, CosClientBuilder};
pub use transfer::{AsyncHandle, TransferManager, TransferRequest};
