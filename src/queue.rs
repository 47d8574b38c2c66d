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

use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use anyhow::anyhow;

use crate::{config::Config, error::Error, stats::Stats};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotStatus {
    /// free, the next producer reaching it may write
    Writable,
    /// written by a producer, waiting for a consumer
    Readable,
    /// handed to a consumer, waiting for `release()`
    Reading,
}

/// Position of a slot inside its handoff buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

impl SlotId {
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug)]
struct Slot<H> {
    handle: Option<H>,
    size: usize,
    status: SlotStatus,
}

/// A slot handed to a consumer by `take()` or `poll()`.
///
/// The slot stays in `Reading` state, and therefore unavailable to producers, until its id is
/// passed to [`SlotHandoffBuffer::release`].
#[derive(Debug)]
pub struct ReadSlot<H> {
    id: SlotId,
    handle: H,
    size: usize,
}

impl<H> ReadSlot<H> {
    #[inline]
    pub fn id(&self) -> SlotId {
        self.id
    }

    #[inline]
    pub fn handle(&self) -> &H {
        &self.handle
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn into_parts(self) -> (SlotId, H, usize) {
        (self.id, self.handle, self.size)
    }
}

#[derive(Debug)]
struct Ring<H> {
    slots: Box<[Slot<H>]>,
    put_index: usize,
    take_index: usize,
    readable: usize,
    reading: usize,
    waiting_producers: usize,
    waiting_consumers: usize,
    /// bumped by `interrupt()`, a waiter that sees it change gives up
    interrupt_epoch: u64,
    shutdown: bool,
}

impl<H> Ring<H> {
    #[inline]
    fn advance(&self, index: usize) -> usize {
        if index + 1 == self.slots.len() {
            0
        } else {
            index + 1
        }
    }
}

/// Bounded FIFO of `(connection handle, size)` pairs between I/O completion threads and workers.
///
/// Slots are allocated once at construction. A producer writes the slot under `put_index` once
/// it is `Writable`, a consumer reads the slot under `take_index` once it is `Readable` and must
/// `release()` it when done. All transitions happen under one mutex, so the n-th completed take
/// observes the n-th completed put.
#[derive(Debug)]
pub struct SlotHandoffBuffer<H> {
    ring: Mutex<Ring<H>>,
    not_empty: Condvar,
    not_full: Condvar,
    stats: Arc<Stats>,
}

impl<H> SlotHandoffBuffer<H> {
    pub fn new(capacity: usize) -> Result<Self, Error> {
        Self::with_stats(capacity, Arc::new(Stats::default()))
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Self::new(config.handoff_capacity)
    }

    pub fn with_stats(capacity: usize, stats: Arc<Stats>) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::ZeroCapacity);
        }
        let slots = (0..capacity)
            .map(|_| Slot {
                handle: None,
                size: 0,
                status: SlotStatus::Writable,
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Ok(Self {
            ring: Mutex::new(Ring {
                slots,
                put_index: 0,
                take_index: 0,
                readable: 0,
                reading: 0,
                waiting_producers: 0,
                waiting_consumers: 0,
                interrupt_epoch: 0,
                shutdown: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            stats,
        })
    }

    /// Hand a pair to the consumers, waiting while the slot under `put_index` is still in use.
    pub fn put(&self, handle: H, size: usize) -> Result<(), Error> {
        let mut ring = self.ring.lock().unwrap();
        let epoch = ring.interrupt_epoch;
        loop {
            if ring.shutdown {
                return Err(Error::Shutdown);
            }
            if ring.interrupt_epoch != epoch {
                return Err(Error::Interrupted);
            }
            let put_index = ring.put_index;
            if ring.slots[put_index].status == SlotStatus::Writable {
                break;
            }
            ring.waiting_producers += 1;
            ring = self.not_full.wait(ring).unwrap();
            ring.waiting_producers -= 1;
        }

        let index = ring.put_index;
        let slot = &mut ring.slots[index];
        slot.handle = Some(handle);
        slot.size = size;
        slot.status = SlotStatus::Readable;
        ring.put_index = ring.advance(index);
        ring.readable += 1;
        Stats::incr(&self.stats.handoff_put_count);

        if ring.waiting_consumers > 0 {
            self.not_empty.notify_one();
        }
        // the next slot may have been released while we were parked
        if ring.waiting_producers > 0 && ring.slots[ring.put_index].status == SlotStatus::Writable
        {
            self.not_full.notify_one();
        }
        Ok(())
    }

    /// Non-blocking take, `None` when the slot under `take_index` is not readable.
    pub fn poll(&self) -> Option<ReadSlot<H>> {
        let mut ring = self.ring.lock().unwrap();
        self.take_locked(&mut ring)
    }

    /// Wait for the next readable slot.
    ///
    /// After `shutdown()` the remaining readable slots are still handed out, then
    /// `Error::Shutdown` is returned.
    pub fn take(&self) -> Result<ReadSlot<H>, Error> {
        let mut ring = self.ring.lock().unwrap();
        let epoch = ring.interrupt_epoch;
        loop {
            if ring.interrupt_epoch != epoch {
                return Err(Error::Interrupted);
            }
            if let Some(slot) = self.take_locked(&mut ring) {
                return Ok(slot);
            }
            if ring.shutdown {
                return Err(Error::Shutdown);
            }
            ring.waiting_consumers += 1;
            ring = self.not_empty.wait(ring).unwrap();
            ring.waiting_consumers -= 1;
        }
    }

    fn take_locked(&self, ring: &mut MutexGuard<'_, Ring<H>>) -> Option<ReadSlot<H>> {
        let index = ring.take_index;
        let slot = &mut ring.slots[index];
        if slot.status != SlotStatus::Readable {
            return None;
        }
        // a readable slot always carries a handle
        let handle = slot.handle.take()?;
        slot.status = SlotStatus::Reading;
        let size = slot.size;
        ring.take_index = ring.advance(index);
        ring.readable -= 1;
        ring.reading += 1;
        Stats::incr(&self.stats.handoff_take_count);

        if ring.waiting_consumers > 0
            && ring.slots[ring.take_index].status == SlotStatus::Readable
        {
            self.not_empty.notify_one();
        }
        Some(ReadSlot {
            id: SlotId(index),
            handle,
            size,
        })
    }

    /// Give a `Reading` slot back to the producers.
    pub fn release(&self, id: SlotId) -> Result<(), Error> {
        let mut ring = self.ring.lock().unwrap();
        let capacity = ring.slots.len();
        let slot = ring.slots.get_mut(id.0).ok_or_else(|| {
            anyhow!(
                "slot index:{} out of range, capacity:{}",
                id.0,
                capacity
            )
        })?;
        if slot.status != SlotStatus::Reading {
            return Err(Error::InvalidSlotState {
                slot: id.0,
                expected: SlotStatus::Reading,
                actual: slot.status,
            });
        }
        slot.handle = None;
        slot.size = 0;
        slot.status = SlotStatus::Writable;
        ring.reading -= 1;

        // producers that are not parked will see the slot on their own
        if ring.waiting_producers > 0 {
            self.not_full.notify_one();
        }
        Ok(())
    }

    /// Abort every `put()`/`take()` currently waiting with `Error::Interrupted`.
    ///
    /// This is not scoped to one caller: every producer and consumer parked on the buffer at
    /// the time of the call is woken up with the error, including unrelated ones. Calls made
    /// afterwards block as usual.
    pub fn interrupt(&self) {
        let mut ring = self.ring.lock().unwrap();
        ring.interrupt_epoch = ring.interrupt_epoch.wrapping_add(1);
        tracing::debug!(
            "handoff buffer interrupted, waiting producers:{} waiting consumers:{}",
            ring.waiting_producers,
            ring.waiting_consumers
        );
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn shutdown(&self) {
        let mut ring = self.ring.lock().unwrap();
        if ring.shutdown {
            return;
        }
        ring.shutdown = true;
        tracing::info!(
            "handoff buffer shutdown, readable:{} reading:{}",
            ring.readable,
            ring.reading
        );
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.ring.lock().unwrap().shutdown
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().unwrap().slots.len()
    }

    /// number of slots written by producers and not taken yet
    pub fn len(&self) -> usize {
        self.ring.lock().unwrap().readable
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// number of slots taken by consumers and not released yet
    pub fn in_flight(&self) -> usize {
        self.ring.lock().unwrap().reading
    }

    pub fn status(&self, id: SlotId) -> Option<SlotStatus> {
        self.ring.lock().unwrap().slots.get(id.0).map(|s| s.status)
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }
}
