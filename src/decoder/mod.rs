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

pub mod delimiter;
pub mod fixed;

use bytes::{Buf, Bytes};

use crate::error::Error;

/// Incremental frame reassembly for half packets.
///
/// A decoder is fed whatever a read produced, as many times as needed, and reports completion
/// exactly once. A decoder is owned by one connection and touched by one thread at a time.
pub trait FrameDecoder {
    /// Feed a single byte, returns whether the frame is now complete.
    fn put_byte(&mut self, byte: u8) -> Result<bool, Error>;

    /// Feed bytes from `src`, returns whether the frame is now complete.
    ///
    /// Bytes are consumed up to the end of the frame only, anything after it stays in `src` and
    /// belongs to the next frame.
    ///
    /// Both `put_byte()` and `decode()` fail with `Error::DecoderFinished` once the frame is
    /// complete, until `reset()` is called.
    fn decode<B: Buf>(&mut self, src: &mut B) -> Result<bool, Error>;

    fn is_complete(&self) -> bool;

    /// The assembled frame, `Error::FrameIncomplete` before completion.
    fn frame(&self) -> Result<Bytes, Error>;

    /// Forget the current frame and get ready for the next one.
    fn reset(&mut self);
}
