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

use bytes::Bytes;
use cos_transfer::cos::utils::md5_hex;
use rand::distr::{Alphanumeric, SampleString};
use rand::prelude::SmallRng;
use rand::{RngCore, SeedableRng};
use std::path::Path;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn rand_object_name() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 8)
}

pub fn rand_data(size: usize) -> Bytes {
    let mut rng = SmallRng::from_os_rng();
    let mut buf = vec![0u8; size];
    rng.fill_bytes(&mut buf);
    Bytes::from(buf)
}

pub fn file_md5(path: &Path) -> String {
    md5_hex(&std::fs::read(path).unwrap())
}
