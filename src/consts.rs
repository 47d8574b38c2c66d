// Copyright 2025 CloudWeGo Authors
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

/// Ascending capacities managed by the buffer pool.
pub const DEFAULT_BUFFER_SIZE_CLASSES: [usize; 14] = [
    32,
    64,
    128,
    256,
    512,
    1024,
    2048,
    4 * 1024,
    8 * 1024,
    16 * 1024,
    32 * 1024,
    64 * 1024,
    128 * 1024,
    256 * 1024,
];

/// Number of buffers a size class may hold, a new bucket is pre-warmed with one less.
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 100;

pub const DEFAULT_HANDOFF_CAPACITY: usize = 1024;

pub const DEFAULT_DECODER_CHUNK_SIZE: usize = 512;

pub const DEFAULT_MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Big-endian i32 length prefix of the length-prefixed wire format.
pub const SIZE_OF_LENGTH: usize = 4;

pub const DEFAULT_DELIMITER: &[u8] = b"\r\n";

pub const WORKER_THREAD_NAME: &str = "aiosock-worker";
