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

use std::{cmp::min, sync::Arc};

use bytes::{Buf, Bytes, BytesMut};

use super::FrameDecoder;
use crate::{buffer::SizedBufferPool, error::Error};

/// Frames that end with a delimiter, the delimiter is part of the frame.
///
/// The frame length is unknown in advance, so bytes are kept in a chain of `chunk_size` buffers
/// and only joined in `frame()`. With [`DelimiterFrameDecoder::with_pool`] the chunks come from
/// a [`SizedBufferPool`] and go back to it on `reset()` or drop.
///
/// The delimiter is matched with a prefix table, so the frame always ends at the first
/// occurrence of the delimiter even when the delimiter overlaps itself (`aab` in `aaab`).
#[derive(Debug)]
pub struct DelimiterFrameDecoder {
    delimiter: Box<[u8]>,
    /// failure[i] is the length of the longest proper prefix of delimiter[..=i] that is also
    /// a suffix of it
    failure: Box<[usize]>,
    matched: usize,
    chunk_size: usize,
    /// every chunk but the last one is full
    chunks: Vec<BytesMut>,
    len: usize,
    complete: bool,
    pool: Option<Arc<SizedBufferPool>>,
}

impl DelimiterFrameDecoder {
    pub fn new(delimiter: impl Into<Vec<u8>>, chunk_size: usize) -> Result<Self, Error> {
        if chunk_size == 0 {
            return Err(Error::InvalidFrameLength(0));
        }
        let delimiter = checked_delimiter(delimiter.into())?;
        Ok(Self {
            failure: failure_table(&delimiter),
            delimiter,
            matched: 0,
            chunk_size,
            chunks: vec![BytesMut::with_capacity(chunk_size)],
            len: 0,
            complete: false,
            pool: None,
        })
    }

    /// Like `new()`, with chunks drawn from `pool`.
    ///
    /// The chunk size is rounded up to the pool's size class, `Error::UnsupportedSize` if it is
    /// larger than every class.
    pub fn with_pool(
        delimiter: impl Into<Vec<u8>>,
        chunk_size: usize,
        pool: Arc<SizedBufferPool>,
    ) -> Result<Self, Error> {
        if chunk_size == 0 {
            return Err(Error::InvalidFrameLength(0));
        }
        let delimiter = checked_delimiter(delimiter.into())?;
        let first = pool.acquire(chunk_size)?;
        Ok(Self {
            failure: failure_table(&delimiter),
            delimiter,
            matched: 0,
            chunk_size: first.capacity(),
            chunks: vec![first.into_inner()],
            len: 0,
            complete: false,
            pool: Some(pool),
        })
    }

    pub fn delimiter(&self) -> &[u8] {
        &self.delimiter
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Bytes accumulated so far, delimiter included once complete.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Reset and switch to another delimiter.
    pub fn reset_with(&mut self, delimiter: impl Into<Vec<u8>>) -> Result<(), Error> {
        let delimiter = checked_delimiter(delimiter.into())?;
        self.failure = failure_table(&delimiter);
        self.delimiter = delimiter;
        self.reset();
        Ok(())
    }

    /// Advance the match by one byte, true once the whole delimiter is matched.
    #[inline]
    fn step(&mut self, byte: u8) -> bool {
        while self.matched > 0 && self.delimiter[self.matched] != byte {
            self.matched = self.failure[self.matched - 1];
        }
        if self.delimiter[self.matched] == byte {
            self.matched += 1;
        }
        self.matched == self.delimiter.len()
    }

    fn append(&mut self, mut data: &[u8]) {
        self.len += data.len();
        while !data.is_empty() {
            let full = self
                .chunks
                .last()
                .map(|c| c.len() >= self.chunk_size)
                .unwrap_or(true);
            if full {
                let chunk = self.new_chunk();
                self.chunks.push(chunk);
            }
            if let Some(chunk) = self.chunks.last_mut() {
                let n = min(self.chunk_size - chunk.len(), data.len());
                chunk.extend_from_slice(&data[..n]);
                data = &data[n..];
            }
        }
    }

    fn new_chunk(&self) -> BytesMut {
        match &self.pool {
            Some(pool) => match pool.acquire(self.chunk_size) {
                Ok(buf) => buf.into_inner(),
                Err(err) => {
                    tracing::warn!("delimiter decoder acquire chunk failed, err={}", err);
                    BytesMut::with_capacity(self.chunk_size)
                }
            },
            None => BytesMut::with_capacity(self.chunk_size),
        }
    }

    fn recycle(&mut self, keep_first: bool) {
        let skip = usize::from(keep_first).min(self.chunks.len());
        match &self.pool {
            Some(pool) => {
                for chunk in self.chunks.drain(skip..) {
                    pool.release_bytes(chunk);
                }
            }
            None => self.chunks.truncate(skip),
        }
        if let Some(first) = self.chunks.first_mut() {
            first.clear();
        }
    }
}

impl FrameDecoder for DelimiterFrameDecoder {
    fn put_byte(&mut self, byte: u8) -> Result<bool, Error> {
        if self.complete {
            return Err(Error::DecoderFinished);
        }
        self.append(&[byte]);
        self.complete = self.step(byte);
        Ok(self.complete)
    }

    fn decode<B: Buf>(&mut self, src: &mut B) -> Result<bool, Error> {
        if self.complete {
            return Err(Error::DecoderFinished);
        }
        while src.has_remaining() {
            let chunk = src.chunk();
            let mut consumed = chunk.len();
            for (i, &byte) in chunk.iter().enumerate() {
                if self.step(byte) {
                    consumed = i + 1;
                    self.complete = true;
                    break;
                }
            }
            self.append(&chunk[..consumed]);
            src.advance(consumed);
            if self.complete {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn frame(&self) -> Result<Bytes, Error> {
        if !self.complete {
            return Err(Error::FrameIncomplete);
        }
        let mut frame = BytesMut::with_capacity(self.len);
        for chunk in self.chunks.iter() {
            frame.extend_from_slice(chunk);
        }
        Ok(frame.freeze())
    }

    fn reset(&mut self) {
        self.recycle(true);
        self.matched = 0;
        self.len = 0;
        self.complete = false;
    }
}

impl Drop for DelimiterFrameDecoder {
    fn drop(&mut self) {
        if self.pool.is_some() {
            self.recycle(false);
        }
    }
}

fn checked_delimiter(delimiter: Vec<u8>) -> Result<Box<[u8]>, Error> {
    if delimiter.is_empty() {
        return Err(Error::InvalidDelimiter);
    }
    Ok(delimiter.into_boxed_slice())
}

fn failure_table(delimiter: &[u8]) -> Box<[usize]> {
    let mut failure = vec![0usize; delimiter.len()];
    let mut k = 0;
    for i in 1..delimiter.len() {
        while k > 0 && delimiter[i] != delimiter[k] {
            k = failure[k - 1];
        }
        if delimiter[i] == delimiter[k] {
            k += 1;
        }
        failure[i] = k;
    }
    failure.into_boxed_slice()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Buf;

    use super::{DelimiterFrameDecoder, failure_table};
    use crate::{
        buffer::SizedBufferPool, config::ClearPolicy, decoder::FrameDecoder, error::Error,
    };

    fn check(data: &str, delimiter: &str, expect: &str) {
        let mut decoder = DelimiterFrameDecoder::new(delimiter, 512).unwrap();
        let mut src = data.as_bytes();
        assert!(decoder.decode(&mut src).unwrap());
        let frame = decoder.frame().unwrap();
        assert_eq!(expect.as_bytes(), &frame[..]);
        assert_eq!(data.find(delimiter).unwrap() + delimiter.len(), frame.len());
        // the rest stays in the source
        assert_eq!(&data.as_bytes()[frame.len()..], src);
    }

    #[test]
    fn test_decoder1() {
        check("abcd", "c", "abc");
    }

    #[test]
    fn test_decoder2() {
        check("aaabcd", "aab", "aaab");
    }

    #[test]
    fn test_decoder3() {
        check("abaaababa", "aab", "abaaab");
    }

    #[test]
    fn test_decoder4() {
        check("abaaababa", "abab", "abaaabab");
    }

    #[test]
    fn test_decoder5() {
        check("aaabaabb", "aabb", "aaabaabb");
    }

    #[test]
    fn test_failure_table() {
        assert_eq!(&[0, 1, 0][..], &*failure_table(b"aab"));
        assert_eq!(&[0, 0, 1, 2][..], &*failure_table(b"abab"));
        assert_eq!(&[0, 0][..], &*failure_table(b"\r\n"));
    }

    #[test]
    fn test_byte_by_byte_across_chunks() {
        let data = b"hello world, this spans several chunks\r\nnext";
        let mut decoder = DelimiterFrameDecoder::new(&b"\r\n"[..], 4).unwrap();
        let mut done_at = None;
        for (i, &b) in data.iter().enumerate() {
            if decoder.put_byte(b).unwrap() {
                done_at = Some(i);
                break;
            }
        }
        let end = data.len() - 4;
        assert_eq!(Some(end - 1), done_at);
        assert_eq!(end, decoder.len());
        assert_eq!(end.div_ceil(4), decoder.chunk_count());
        assert_eq!(&data[..end], &decoder.frame().unwrap()[..]);
    }

    #[test]
    fn test_half_packets() {
        let mut decoder = DelimiterFrameDecoder::new(&b"\r\n"[..], 8).unwrap();
        let mut part1 = &b"GET / HTTP/1.1\r"[..];
        assert!(!decoder.decode(&mut part1).unwrap());
        assert!(part1.is_empty());
        assert!(matches!(decoder.frame(), Err(Error::FrameIncomplete)));

        let mut part2 = &b"\nHost"[..];
        assert!(decoder.decode(&mut part2).unwrap());
        assert_eq!(b"Host", part2);
        assert_eq!(&b"GET / HTTP/1.1\r\n"[..], &decoder.frame().unwrap()[..]);
    }

    #[test]
    fn test_chained_source() {
        let mut decoder = DelimiterFrameDecoder::new(&b"|"[..], 3).unwrap();
        let mut src = (&b"ab"[..]).chain(&b"c|de"[..]);
        assert!(decoder.decode(&mut src).unwrap());
        assert_eq!(&b"abc|"[..], &decoder.frame().unwrap()[..]);
        assert_eq!(2, src.remaining());
    }

    #[test]
    fn test_put_after_finish() {
        let mut decoder = DelimiterFrameDecoder::new("c", 16).unwrap();
        let mut src = &b"abcd"[..];
        assert!(decoder.decode(&mut src).unwrap());
        assert!(decoder.is_complete());
        assert!(matches!(decoder.put_byte(b'd'), Err(Error::DecoderFinished)));
        assert!(matches!(decoder.decode(&mut src), Err(Error::DecoderFinished)));
        assert_eq!(b"d", src);
    }

    #[test]
    fn test_reset() {
        let mut decoder = DelimiterFrameDecoder::new(";", 2).unwrap();
        let mut src = &b"first;second;"[..];
        assert!(decoder.decode(&mut src).unwrap());
        assert_eq!(&b"first;"[..], &decoder.frame().unwrap()[..]);

        decoder.reset();
        assert!(decoder.is_empty());
        assert_eq!(1, decoder.chunk_count());
        assert!(decoder.decode(&mut src).unwrap());
        assert_eq!(&b"second;"[..], &decoder.frame().unwrap()[..]);

        decoder.reset_with("--").unwrap();
        let mut src = &b"a-b--"[..];
        assert!(decoder.decode(&mut src).unwrap());
        assert_eq!(&b"a-b--"[..], &decoder.frame().unwrap()[..]);

        assert!(matches!(decoder.reset_with(""), Err(Error::InvalidDelimiter)));
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(matches!(
            DelimiterFrameDecoder::new("", 16),
            Err(Error::InvalidDelimiter)
        ));
        assert!(matches!(
            DelimiterFrameDecoder::new("\n", 0),
            Err(Error::InvalidFrameLength(0))
        ));
    }

    #[test]
    fn test_pool_backed_chunks() {
        let pool = Arc::new(SizedBufferPool::new(vec![8, 16], 4, ClearPolicy::OnAcquire).unwrap());
        {
            let mut decoder = DelimiterFrameDecoder::with_pool("\n", 5, pool.clone()).unwrap();
            assert_eq!(8, decoder.chunk_size());
            let mut src = &b"0123456789abcdefghij\n"[..];
            assert!(decoder.decode(&mut src).unwrap());
            assert_eq!(3, decoder.chunk_count());
            assert_eq!(&b"0123456789abcdefghij\n"[..], &decoder.frame().unwrap()[..]);
            // first bucket: 3 pre-warmed, the first chunk was fresh, two more came from the bucket
            assert_eq!(1, pool.available(8));

            decoder.reset();
            assert_eq!(3, pool.available(8));
        }
        assert_eq!(4, pool.available(8));

        assert!(matches!(
            DelimiterFrameDecoder::with_pool("\n", 17, pool),
            Err(Error::UnsupportedSize { size: 17, max: 16 })
        ));
    }
}
