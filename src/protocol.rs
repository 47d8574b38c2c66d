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

use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes};

use crate::{
    buffer::SizedBufferPool,
    config::Config,
    consts::{DEFAULT_DECODER_CHUNK_SIZE, DEFAULT_DELIMITER, DEFAULT_MAX_FRAME_LENGTH, SIZE_OF_LENGTH},
    decoder::{FrameDecoder, delimiter::DelimiterFrameDecoder, fixed::FixedLengthFrameDecoder},
    error::Error,
};

/// Turns the bytes of one connection into frames.
///
/// `decode()` is called with whatever the last read produced plus the connection's own decode
/// state. `Ok(None)` means more data is needed and is never an error. `Err` means the input is
/// malformed and the connection must be closed, a protocol never resynchronizes.
pub trait Protocol {
    type Frame;
    /// Per connection state kept between reads, for half packets.
    type State: Default;

    fn decode<B: Buf>(
        &self,
        src: &mut B,
        state: &mut Self::State,
    ) -> Result<Option<Self::Frame>, Error>;
}

/// Frames terminated by a delimiter, `\r\n` by default. Frames keep their delimiter.
///
/// A connection that buffers more than `max_frame_length` bytes without completing a frame
/// fails with `Error::DecodeFailed`.
#[derive(Debug, Clone)]
pub struct DelimiterProtocol {
    delimiter: Bytes,
    chunk_size: usize,
    max_frame_length: usize,
    pool: Option<Arc<SizedBufferPool>>,
}

#[derive(Debug, Default)]
pub struct DelimiterState {
    decoder: Option<DelimiterFrameDecoder>,
}

impl DelimiterState {
    /// Bytes of a partial frame held for the connection.
    pub fn buffered(&self) -> usize {
        self.decoder.as_ref().map(|d| d.len()).unwrap_or(0)
    }
}

impl Default for DelimiterProtocol {
    fn default() -> Self {
        Self {
            delimiter: Bytes::from_static(DEFAULT_DELIMITER),
            chunk_size: DEFAULT_DECODER_CHUNK_SIZE,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            pool: None,
        }
    }
}

impl DelimiterProtocol {
    pub fn new(delimiter: impl Into<Bytes>, chunk_size: usize) -> Result<Self, Error> {
        let delimiter = delimiter.into();
        if delimiter.is_empty() {
            return Err(Error::InvalidDelimiter);
        }
        if chunk_size == 0 {
            return Err(Error::InvalidFrameLength(0));
        }
        Ok(Self {
            delimiter,
            chunk_size,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            pool: None,
        })
    }

    pub fn from_config(delimiter: impl Into<Bytes>, config: &Config) -> Result<Self, Error> {
        Ok(Self::new(delimiter, config.decoder_chunk_size)?
            .with_max_frame_length(config.max_frame_length))
    }

    /// Largest frame accepted, delimiter included.
    pub fn with_max_frame_length(mut self, max_frame_length: usize) -> Self {
        self.max_frame_length = max_frame_length;
        self
    }

    pub fn max_frame_length(&self) -> usize {
        self.max_frame_length
    }

    /// Draw decoder chunks from `pool`.
    pub fn with_pool(mut self, pool: Arc<SizedBufferPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    fn new_decoder(&self) -> Result<DelimiterFrameDecoder, Error> {
        match &self.pool {
            Some(pool) => DelimiterFrameDecoder::with_pool(
                self.delimiter.as_ref(),
                self.chunk_size,
                pool.clone(),
            ),
            None => DelimiterFrameDecoder::new(self.delimiter.as_ref(), self.chunk_size),
        }
    }
}

impl Protocol for DelimiterProtocol {
    type Frame = Bytes;
    type State = DelimiterState;

    fn decode<B: Buf>(
        &self,
        src: &mut B,
        state: &mut DelimiterState,
    ) -> Result<Option<Bytes>, Error> {
        let decoder = match &mut state.decoder {
            Some(decoder) => decoder,
            None => state.decoder.insert(self.new_decoder()?),
        };
        let complete = decoder.decode(src)?;
        if decoder.len() > self.max_frame_length {
            tracing::warn!(
                "delimiter frame too long, buffered:{} max_frame_length:{}",
                decoder.len(),
                self.max_frame_length
            );
            return Err(Error::DecodeFailed(format!(
                "frame exceeds {} bytes without delimiter",
                self.max_frame_length
            )));
        }
        if !complete {
            return Ok(None);
        }
        let frame = decoder.frame()?;
        decoder.reset();
        Ok(Some(frame))
    }
}

/// 4 byte big-endian length followed by that many payload bytes.
#[derive(Debug, Clone, Copy)]
pub struct LengthPrefixedProtocol {
    max_frame_length: usize,
}

#[derive(Debug)]
pub enum LengthPrefixedState {
    Header {
        prefix: [u8; SIZE_OF_LENGTH],
        filled: usize,
    },
    Body(FixedLengthFrameDecoder),
}

impl Default for LengthPrefixedState {
    fn default() -> Self {
        Self::Header {
            prefix: [0; SIZE_OF_LENGTH],
            filled: 0,
        }
    }
}

impl Default for LengthPrefixedProtocol {
    fn default() -> Self {
        Self {
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

impl LengthPrefixedProtocol {
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            max_frame_length: max_frame_length.min(i32::MAX as usize),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_frame_length)
    }

    pub fn max_frame_length(&self) -> usize {
        self.max_frame_length
    }

    pub fn encode<B: BufMut>(&self, payload: &[u8], dst: &mut B) -> Result<(), Error> {
        if payload.len() > self.max_frame_length {
            return Err(Error::InvalidFrameLength(payload.len() as i64));
        }
        dst.put_i32(payload.len() as i32);
        dst.put_slice(payload);
        Ok(())
    }
}

impl Protocol for LengthPrefixedProtocol {
    type Frame = Bytes;
    type State = LengthPrefixedState;

    fn decode<B: Buf>(
        &self,
        src: &mut B,
        state: &mut LengthPrefixedState,
    ) -> Result<Option<Bytes>, Error> {
        if let LengthPrefixedState::Header { prefix, filled } = state {
            // the prefix itself may be split across reads
            while *filled < SIZE_OF_LENGTH && src.has_remaining() {
                prefix[*filled] = src.get_u8();
                *filled += 1;
            }
            if *filled < SIZE_OF_LENGTH {
                return Ok(None);
            }
            let length = i32::from_be_bytes(*prefix);
            if length < 0 || length as usize > self.max_frame_length {
                tracing::warn!(
                    "invalid frame length:{}, max_frame_length:{}",
                    length,
                    self.max_frame_length
                );
                return Err(Error::DecodeFailed(format!(
                    "invalid frame length: {}",
                    length
                )));
            }
            if length == 0 {
                *state = LengthPrefixedState::default();
                return Ok(Some(Bytes::new()));
            }
            *state = LengthPrefixedState::Body(FixedLengthFrameDecoder::new(length as usize)?);
        }

        let LengthPrefixedState::Body(decoder) = state else {
            return Ok(None);
        };
        if !decoder.decode(src)? {
            return Ok(None);
        }
        match std::mem::take(state) {
            LengthPrefixedState::Body(decoder) => decoder.into_frame().map(Some),
            LengthPrefixedState::Header { .. } => Ok(None),
        }
    }
}
