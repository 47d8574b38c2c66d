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

use anyhow::anyhow;

use crate::consts::{
    DEFAULT_BUFFER_POOL_SIZE, DEFAULT_BUFFER_SIZE_CLASSES, DEFAULT_DECODER_CHUNK_SIZE,
    DEFAULT_HANDOFF_CAPACITY, DEFAULT_MAX_FRAME_LENGTH,
};

/// When a pooled buffer gets cleared.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ClearPolicy {
    /// Clear right before handing the buffer out, for buffers that will be written into next.
    #[default]
    OnAcquire,
    /// Clear when the buffer comes back, hand out purely by capacity for read reuse.
    OnRelease,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
/// Config is used to tune the buffer pool, the handoff buffer and the decoders
pub struct Config {
    /// ascending capacities the buffer pool manages, requests above the last one are rejected
    pub buffer_size_classes: Vec<usize>,

    /// max number of idle buffers per size class, a new class is pre-warmed with one less
    pub buffer_pool_size: usize,

    pub clear_policy: ClearPolicy,

    /// slot count of the handoff buffer between I/O threads and workers
    pub handoff_capacity: usize,

    /// chunk size of the delimiter decoder's storage
    pub decoder_chunk_size: usize,

    /// largest payload accepted by the length-prefixed protocol
    pub max_frame_length: usize,

    pub worker_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            buffer_size_classes: DEFAULT_BUFFER_SIZE_CLASSES.to_vec(),
            buffer_pool_size: DEFAULT_BUFFER_POOL_SIZE,
            clear_policy: ClearPolicy::default(),
            handoff_capacity: DEFAULT_HANDOFF_CAPACITY,
            decoder_chunk_size: DEFAULT_DECODER_CHUNK_SIZE,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }

    pub fn verify(&self) -> Result<(), anyhow::Error> {
        verify_size_classes(&self.buffer_size_classes)?;
        if self.buffer_pool_size == 0 {
            return Err(anyhow!("buffer_pool_size could not be 0"));
        }
        if self.handoff_capacity == 0 {
            return Err(anyhow!("handoff_capacity could not be 0"));
        }
        if self.decoder_chunk_size == 0 {
            return Err(anyhow!("decoder_chunk_size could not be 0"));
        }
        if self.max_frame_length == 0 || self.max_frame_length > i32::MAX as usize {
            return Err(anyhow!(
                "max_frame_length:{} must be in (0, {}]",
                self.max_frame_length,
                i32::MAX
            ));
        }
        if self.worker_threads == 0 {
            return Err(anyhow!("worker_threads could not be 0"));
        }
        Ok(())
    }
}

pub(crate) fn verify_size_classes(classes: &[usize]) -> Result<(), anyhow::Error> {
    if classes.is_empty() {
        return Err(anyhow!("buffer_size_classes could not be empty"));
    }
    if classes[0] == 0 {
        return Err(anyhow!("buffer_size_classes could not contain 0"));
    }
    for pair in classes.windows(2) {
        if pair[0] >= pair[1] {
            return Err(anyhow!(
                "buffer_size_classes must be strictly ascending, but {} is followed by {}",
                pair[0],
                pair[1]
            ));
        }
    }
    Ok(())
}
