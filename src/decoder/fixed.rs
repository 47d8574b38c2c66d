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

use std::cmp::min;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::FrameDecoder;
use crate::error::Error;

/// Frames of a length known in advance, typically read from a length prefix by the caller.
#[derive(Debug)]
pub struct FixedLengthFrameDecoder {
    buf: BytesMut,
    expected: usize,
}

impl FixedLengthFrameDecoder {
    pub fn new(expected_length: usize) -> Result<Self, Error> {
        if expected_length == 0 {
            return Err(Error::InvalidFrameLength(0));
        }
        Ok(Self {
            buf: BytesMut::with_capacity(expected_length),
            expected: expected_length,
        })
    }

    pub fn expected_length(&self) -> usize {
        self.expected
    }

    /// Bytes still missing.
    pub fn remaining(&self) -> usize {
        self.expected - self.buf.len()
    }

    /// Take the frame without copying.
    pub fn into_frame(self) -> Result<Bytes, Error> {
        if !self.is_complete() {
            return Err(Error::FrameIncomplete);
        }
        Ok(self.buf.freeze())
    }
}

impl FrameDecoder for FixedLengthFrameDecoder {
    fn put_byte(&mut self, byte: u8) -> Result<bool, Error> {
        if self.is_complete() {
            return Err(Error::DecoderFinished);
        }
        self.buf.put_u8(byte);
        Ok(self.is_complete())
    }

    fn decode<B: Buf>(&mut self, src: &mut B) -> Result<bool, Error> {
        if self.is_complete() {
            return Err(Error::DecoderFinished);
        }
        while self.remaining() > 0 && src.has_remaining() {
            let chunk = src.chunk();
            let n = min(chunk.len(), self.remaining());
            self.buf.extend_from_slice(&chunk[..n]);
            src.advance(n);
        }
        Ok(self.is_complete())
    }

    #[inline]
    fn is_complete(&self) -> bool {
        self.buf.len() == self.expected
    }

    fn frame(&self) -> Result<Bytes, Error> {
        if !self.is_complete() {
            return Err(Error::FrameIncomplete);
        }
        Ok(Bytes::copy_from_slice(&self.buf))
    }

    fn reset(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::FixedLengthFrameDecoder;
    use crate::{decoder::FrameDecoder, error::Error};

    #[test]
    fn test_zero_length() {
        assert!(matches!(
            FixedLengthFrameDecoder::new(0),
            Err(Error::InvalidFrameLength(0))
        ));
    }

    #[test]
    fn test_chunks_of_two_then_three() {
        let mut decoder = FixedLengthFrameDecoder::new(5).unwrap();
        let mut first = &b"he"[..];
        assert!(!decoder.decode(&mut first).unwrap());
        assert_eq!(3, decoder.remaining());
        assert!(matches!(decoder.frame(), Err(Error::FrameIncomplete)));

        let mut second = &b"llo"[..];
        assert!(decoder.decode(&mut second).unwrap());
        assert!(second.is_empty());
        assert_eq!(&b"hello"[..], &decoder.frame().unwrap()[..]);

        assert!(matches!(decoder.put_byte(b'!'), Err(Error::DecoderFinished)));
        let mut third = &b"!"[..];
        assert!(matches!(
            decoder.decode(&mut third),
            Err(Error::DecoderFinished)
        ));
        assert_eq!(b"!", third);
    }

    #[test]
    fn test_leaves_next_frame_in_source() {
        let mut decoder = FixedLengthFrameDecoder::new(3).unwrap();
        let mut src = &b"abcdef"[..];
        assert!(decoder.decode(&mut src).unwrap());
        assert_eq!(b"def", src);
        assert_eq!(&b"abc"[..], &decoder.into_frame().unwrap()[..]);
    }

    #[test]
    fn test_byte_by_byte_and_reset() {
        let mut decoder = FixedLengthFrameDecoder::new(4).unwrap();
        let results: Vec<bool> = b"abcd"
            .iter()
            .map(|&b| decoder.put_byte(b).unwrap())
            .collect();
        assert_eq!(vec![false, false, false, true], results);
        assert_eq!(&b"abcd"[..], &decoder.frame().unwrap()[..]);

        decoder.reset();
        assert!(!decoder.is_complete());
        assert_eq!(4, decoder.remaining());
        let mut src = &b"wxyz"[..];
        assert!(decoder.decode(&mut src).unwrap());
        assert_eq!(&b"wxyz"[..], &decoder.frame().unwrap()[..]);
    }

    #[test]
    fn test_empty_source() {
        let mut decoder = FixedLengthFrameDecoder::new(2).unwrap();
        let mut src = &b""[..];
        assert!(!decoder.decode(&mut src).unwrap());
        assert!(matches!(
            FixedLengthFrameDecoder::new(2).unwrap().into_frame(),
            Err(Error::FrameIncomplete)
        ));
    }
}
