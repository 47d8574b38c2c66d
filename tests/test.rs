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

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use aiosock::{
    ClearPolicy, Config, DelimiterFrameDecoder, DelimiterProtocol, Error, FixedLengthFrameDecoder,
    FrameDecoder, LengthPrefixedProtocol, Protocol, SizedBufferPool, SlotHandoffBuffer,
    SlotStatus, WorkerGroup,
    protocol::{DelimiterState, LengthPrefixedState},
};
use bytes::{Bytes, BytesMut};
use rand::Rng;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn payload(conn: usize, seq: usize, len: usize) -> Vec<u8> {
    (0..len).map(|i| (conn * 31 + seq * 7 + i) as u8).collect()
}

/// Cut `wire` into reads of random size, each copied into a pooled read buffer.
fn random_reads(pool: &SizedBufferPool, wire: &[u8], max_read: usize) -> Vec<Vec<u8>> {
    let mut rng = rand::rng();
    let mut reads = Vec::new();
    let mut offset = 0;
    while offset < wire.len() {
        let n = rng.random_range(1..=max_read).min(wire.len() - offset);
        let mut buf = pool.acquire(n).unwrap();
        buf.extend_from_slice(&wire[offset..offset + n]);
        reads.push(buf.to_vec());
        pool.release(buf);
        offset += n;
    }
    reads
}

#[test]
fn test_length_prefixed_pipeline() {
    init_tracing();
    let config = Config::default();
    config.verify().unwrap();

    let pool = SizedBufferPool::from_config(&config).unwrap();
    let buffer = Arc::new(SlotHandoffBuffer::<(usize, Bytes)>::from_config(&config).unwrap());
    let received = Arc::new(Mutex::new(Vec::new()));
    let workers = WorkerGroup::spawn("test-length", 1, buffer.clone(), {
        let received = received.clone();
        move |(conn, frame): &(usize, Bytes), size: usize| -> Result<(), Error> {
            assert_eq!(frame.len(), size);
            received.lock().unwrap().push((*conn, frame.clone()));
            Ok(())
        }
    })
    .unwrap();

    let protocol = LengthPrefixedProtocol::from_config(&config);
    let mut rng = rand::rng();
    let conns = 3;
    let frames = 50;
    let mut expected = vec![Vec::new(); conns];
    let mut reads = Vec::new();
    for (conn, expected) in expected.iter_mut().enumerate() {
        let mut wire = BytesMut::new();
        for seq in 0..frames {
            let data = payload(conn, seq, rng.random_range(0..300));
            protocol.encode(&data, &mut wire).unwrap();
            expected.push(data);
        }
        reads.push(random_reads(&pool, &wire, 64));
    }

    // interleave the connections like an I/O thread serving completions would
    let mut states: Vec<LengthPrefixedState> = (0..conns).map(|_| Default::default()).collect();
    let mut cursors = vec![0; conns];
    while (0..conns).any(|c| cursors[c] < reads[c].len()) {
        for conn in 0..conns {
            let Some(read) = reads[conn].get(cursors[conn]) else {
                continue;
            };
            cursors[conn] += 1;
            let mut src = &read[..];
            while let Some(frame) = protocol.decode(&mut src, &mut states[conn]).unwrap() {
                let size = frame.len();
                buffer.put((conn, frame), size).unwrap();
            }
            assert!(src.is_empty());
        }
    }
    workers.shutdown();

    let received = received.lock().unwrap();
    assert_eq!(conns * frames, received.len());
    for (conn, expected) in expected.iter().enumerate() {
        let got: Vec<&[u8]> = received
            .iter()
            .filter(|(c, _)| *c == conn)
            .map(|(_, f)| &f[..])
            .collect();
        let want: Vec<&[u8]> = expected.iter().map(|d| &d[..]).collect();
        assert_eq!(want, got);
    }

    let stats = pool.stats().snapshot();
    assert!(stats.pool_hit_count > 0);
    assert_eq!(0, stats.pool_reject_count);
}

#[test]
fn test_delimiter_pipeline_with_pooled_decoders() {
    init_tracing();
    let pool = Arc::new(SizedBufferPool::new(vec![16, 32, 64], 8, ClearPolicy::OnAcquire).unwrap());
    let protocol = DelimiterProtocol::new(&b"\r\n"[..], 16)
        .unwrap()
        .with_pool(pool.clone());
    let buffer = Arc::new(SlotHandoffBuffer::<Bytes>::new(4).unwrap());
    let received = Arc::new(Mutex::new(HashSet::new()));
    let workers = WorkerGroup::spawn("test-delimiter", 4, buffer.clone(), {
        let received = received.clone();
        move |frame: &Bytes, _size: usize| -> Result<(), Error> {
            assert!(frame.ends_with(b"\r\n"));
            assert!(received.lock().unwrap().insert(frame.clone()));
            Ok(())
        }
    })
    .unwrap();

    let mut wire = Vec::new();
    let mut expected = HashSet::new();
    for i in 0..300 {
        // some lines span several decoder chunks
        let line = format!("line-{}-{}\r\n", i, "x".repeat(i % 40));
        wire.extend_from_slice(line.as_bytes());
        expected.insert(Bytes::from(line));
    }

    let mut state = DelimiterState::default();
    let mut rng = rand::rng();
    let mut offset = 0;
    while offset < wire.len() {
        let n = rng.random_range(1..=24).min(wire.len() - offset);
        let mut src = &wire[offset..offset + n];
        while let Some(frame) = protocol.decode(&mut src, &mut state).unwrap() {
            let size = frame.len();
            buffer.put(frame, size).unwrap();
        }
        offset += n;
    }
    drop(state);
    workers.shutdown();

    assert_eq!(expected, *received.lock().unwrap());
    assert!(pool.available(16) <= pool.pool_size());
}

#[test]
fn test_delimiter_reference_cases() {
    let cases: [(&[u8], &[u8], &[u8]); 5] = [
        (b"abcd", b"c", b"abc"),
        (b"aaabcd", b"aab", b"aaab"),
        (b"abaaababa", b"aab", b"abaaab"),
        (b"abaaababa", b"abab", b"abaaabab"),
        (b"aaabaabb", b"aabb", b"aaabaabb"),
    ];
    for (input, delimiter, frame) in cases {
        let mut decoder = DelimiterFrameDecoder::new(delimiter, 2).unwrap();
        let mut src = input;
        assert!(decoder.decode(&mut src).unwrap());
        assert_eq!(frame, &decoder.frame().unwrap()[..]);
        assert_eq!(input.len() - frame.len(), src.len());
    }
}

#[test]
fn test_fixed_length_half_packets() {
    let mut decoder = FixedLengthFrameDecoder::new(5).unwrap();
    assert!(!decoder.decode(&mut &b"he"[..]).unwrap());
    assert!(decoder.decode(&mut &b"llo"[..]).unwrap());
    assert_eq!(&b"hello"[..], &decoder.frame().unwrap()[..]);
    assert!(matches!(
        decoder.decode(&mut &b"x"[..]),
        Err(Error::DecoderFinished)
    ));
}

#[test]
fn test_pool_contract() {
    let pool = SizedBufferPool::new(vec![32, 64, 128], 2, ClearPolicy::OnRelease).unwrap();
    let buf = pool.acquire(100).unwrap();
    assert_eq!(128, buf.capacity());
    assert!(buf.is_empty());
    pool.release(buf);
    assert_eq!(2, pool.available(128));

    assert!(matches!(
        pool.acquire(129),
        Err(Error::UnsupportedSize {
            size: 129,
            max: 128
        })
    ));
}

#[test]
fn test_handoff_blocks_until_release() {
    init_tracing();
    let buffer = SlotHandoffBuffer::new(2).unwrap();
    buffer.put("a", 1).unwrap();
    buffer.put("b", 2).unwrap();
    let first = buffer.take().unwrap();
    assert_eq!(SlotStatus::Reading, buffer.status(first.id()).unwrap());

    thread::scope(|s| {
        let producer = s.spawn(|| buffer.put("c", 3));
        thread::sleep(Duration::from_millis(50));
        // taken is not enough, the slot must be released
        assert!(!producer.is_finished());
        buffer.release(first.id()).unwrap();
        producer.join().unwrap().unwrap();
    });

    let order: Vec<&str> = (0..2)
        .map(|_| {
            let slot = buffer.take().unwrap();
            buffer.release(slot.id()).unwrap();
            *slot.handle()
        })
        .collect();
    assert_eq!(vec!["b", "c"], order);
    assert!(buffer.release(first.id()).is_err());
}
