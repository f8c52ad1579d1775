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

//! Part planning
//!
//! Splits an object of known size into contiguous, 1-based parts. Objects up
//! to the single-shot threshold are sent as one request; larger ones are split
//! into `part_size` pieces, with the part size scaled up (in multiples of the
//! minimum part size) whenever the count would exceed the part limit.

use crate::cos::config::{MIN_DOWNLOAD_SLICE_SIZE, MIN_UPLOAD_PART_SIZE};
use serde::{Deserialize, Serialize};

/// Maximum number of parts allowed in a multipart upload.
pub const MAX_MULTIPART_COUNT: u32 = 10_000;

/// One contiguous byte range `[offset, offset + size)` of an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartDescriptor {
    /// 1-based part number
    pub number: u32,
    pub offset: u64,
    pub size: u64,
}

impl PartDescriptor {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartPlan {
    /// Part size actually used, after scaling.
    pub part_size: u64,
    pub parts: Vec<PartDescriptor>,
    /// The object fits in one request; no multipart session is needed.
    pub single_shot: bool,
}

impl PartPlan {
    pub fn total_size(&self) -> u64 {
        self.parts.last().map_or(0, PartDescriptor::end)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Planner {
    pub single_shot_threshold: u64,
    pub min_part_size: u64,
    pub max_parts: u32,
}

impl Planner {
    /// Planner for uploads: objects up to `single_shot_threshold` bytes use a
    /// plain PUT.
    pub fn for_upload(single_shot_threshold: u64) -> Self {
        Self {
            single_shot_threshold,
            min_part_size: MIN_UPLOAD_PART_SIZE,
            max_parts: MAX_MULTIPART_COUNT,
        }
    }

    /// Planner for ranged downloads, which are always split.
    pub fn for_download() -> Self {
        Self {
            single_shot_threshold: 0,
            min_part_size: MIN_DOWNLOAD_SLICE_SIZE,
            max_parts: MAX_MULTIPART_COUNT,
        }
    }

    /// Returns the part size used for an object of `size` bytes when
    /// `part_size` is requested.
    pub fn effective_part_size(&self, size: u64, part_size: u64) -> u64 {
        let min = self.min_part_size.max(1);
        let mut part_size = part_size.max(min);
        let max_parts = u64::from(self.max_parts.max(1));
        if size.div_ceil(part_size) > max_parts {
            part_size = size.div_ceil(max_parts).div_ceil(min) * min;
        }
        part_size
    }

    pub fn plan(&self, size: u64, part_size: u64) -> PartPlan {
        if size <= self.single_shot_threshold || size == 0 {
            return PartPlan {
                part_size: size,
                parts: vec![PartDescriptor {
                    number: 1,
                    offset: 0,
                    size,
                }],
                single_shot: true,
            };
        }

        let part_size = self.effective_part_size(size, part_size);
        let mut parts = Vec::with_capacity(size.div_ceil(part_size) as usize);
        let mut offset = 0;
        while offset < size {
            let len = part_size.min(size - offset);
            parts.push(PartDescriptor {
                number: parts.len() as u32 + 1,
                offset,
                size: len,
            });
            offset += len;
        }

        PartPlan {
            part_size,
            parts,
            single_shot: false,
        }
    }
}
