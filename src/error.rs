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

use crate::queue::SlotStatus;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// UnsupportedSize means the requested size is larger than the largest configured size class.
    ///
    /// Callers must take another allocation path, the pool never hands out an oversized buffer.
    #[error("unsupported buffer size: {size}, the largest size class is {max}")]
    UnsupportedSize { size: usize, max: usize },

    /// DecoderFinished is returned when feeding a decoder that has already assembled its frame.
    #[error("decoder has finished reading the frame")]
    DecoderFinished,

    /// FrameIncomplete is returned when asking a decoder for its frame before it is complete.
    #[error("frame is not complete yet")]
    FrameIncomplete,

    #[error("invalid frame length: {0}")]
    InvalidFrameLength(i64),

    #[error("delimiter could not be empty")]
    InvalidDelimiter,

    /// InvalidSlotState means a slot transition was requested from the wrong state.
    #[error("invalid slot state, slot: {slot}, expected: {expected:?}, actual: {actual:?}")]
    InvalidSlotState {
        slot: usize,
        expected: SlotStatus,
        actual: SlotStatus,
    },

    /// Interrupted means a blocking wait on the handoff buffer was interrupted.
    ///
    /// The operation had no effect, the caller decides whether to retry.
    #[error("blocking wait interrupted")]
    Interrupted,

    /// Shutdown is returned by blocking operations once the handoff buffer is shut down.
    #[error("handoff buffer shutdown")]
    Shutdown,

    #[error("handoff buffer capacity could not be 0")]
    ZeroCapacity,

    /// DecodeFailed means a protocol found malformed data, the owning connection should be closed.
    #[error("decode failed: {0}")]
    DecodeFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Others(#[from] anyhow::Error),
}
