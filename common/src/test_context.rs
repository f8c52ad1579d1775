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

use crate::mock_service::MockCosService;
use crate::utils::rand_data;
use bytes::Bytes;
use cos_transfer::cos::client::CosClient;
use cos_transfer::cos::config::CosConfig;
use cos_transfer::cos::transfer::{TransferManager, TransferRequest};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub const BUCKET: &str = "examplebucket-1250000000";
pub const REGION: &str = "ap-guangzhou";

/// A mock service plus a scratch directory for local files and checkpoints.
pub struct TestContext {
    pub service: Arc<MockCosService>,
    pub dir: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        crate::utils::init_logger();
        Self {
            service: Arc::new(MockCosService::new()),
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Configuration with fast retries.
    pub fn config(&self) -> CosConfig {
        CosConfig::new("AKIDtest", "secret", REGION)
            .retry_interval_ms(1)
            .upload_part_size(1024 * 1024)
    }

    pub fn client(&self, config: CosConfig) -> CosClient {
        CosClient::builder(config)
            .transport(self.service.clone())
            .build()
            .unwrap()
    }

    /// A manager spawning on the current runtime.
    pub fn manager(&self, config: CosConfig) -> TransferManager {
        TransferManager::with_runtime_handle(
            self.client(config),
            tokio::runtime::Handle::current(),
        )
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Writes `size` random bytes to `name` in the scratch directory.
    pub fn write_random_file(&self, name: &str, size: usize) -> (PathBuf, Bytes) {
        let path = self.path(name);
        let data = rand_data(size);
        std::fs::write(&path, &data).unwrap();
        (path, data)
    }

    pub fn request(&self, key: &str, path: PathBuf) -> TransferRequest {
        TransferRequest::builder()
            .bucket(BUCKET)
            .key(key)
            .local_path(path)
            .build()
    }

    /// Checkpoint files left in the scratch directory.
    pub fn checkpoints(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.dir.path())
            .unwrap()
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "cpt"))
            .collect()
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
