#![cfg_attr(not(doctest), doc = include_str!("../README.md"))]

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

mod buffer;
pub use buffer::{PooledBuffer, SizedBufferPool};
pub mod config;
pub use config::{ClearPolicy, Config};
pub mod consts;
pub mod decoder;
pub use decoder::{
    FrameDecoder, delimiter::DelimiterFrameDecoder, fixed::FixedLengthFrameDecoder,
};
mod error;
pub use error::Error;
pub mod protocol;
pub use protocol::{DelimiterProtocol, LengthPrefixedProtocol, Protocol};
mod queue;
pub use queue::{ReadSlot, SlotHandoffBuffer, SlotId, SlotStatus};
pub mod stats;
mod worker;
pub use worker::{Processor, WorkerGroup};
