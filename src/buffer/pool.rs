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
    collections::VecDeque,
    ops::{Deref, DerefMut},
    sync::{Arc, Mutex},
};

use anyhow::anyhow;
use bytes::{Bytes, BytesMut};
use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    config::{ClearPolicy, Config, verify_size_classes},
    error::Error,
    stats::Stats,
};

/// A buffer handed out by [`SizedBufferPool`], its capacity is exactly one size class.
#[derive(Debug)]
pub struct PooledBuffer {
    class: usize,
    inner: BytesMut,
}

impl PooledBuffer {
    /// The size class this buffer belongs to.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.class
    }

    /// Detach the buffer from the pool, it will not be recycled.
    pub fn into_inner(self) -> BytesMut {
        self.inner
    }

    pub fn freeze(self) -> Bytes {
        self.inner.freeze()
    }
}

impl Deref for PooledBuffer {
    type Target = BytesMut;

    fn deref(&self) -> &BytesMut {
        &self.inner
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut BytesMut {
        &mut self.inner
    }
}

impl AsRef<[u8]> for PooledBuffer {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.inner
    }
}

#[derive(Debug)]
struct Bucket {
    size_class: usize,
    /// bounded by the pool size
    queue: Mutex<VecDeque<BytesMut>>,
}

impl Bucket {
    fn prewarm(size_class: usize, pool_size: usize) -> Self {
        let mut queue = VecDeque::with_capacity(pool_size);
        for _ in 1..pool_size {
            queue.push_back(BytesMut::with_capacity(size_class));
        }
        Self {
            size_class,
            queue: Mutex::new(queue),
        }
    }
}

/// Reusable byte buffers bucketed by capacity class.
///
/// A bucket is created the first time its class is requested and pre-warmed with
/// `pool_size - 1` buffers, the caller of that first request gets a fresh one. `acquire()` never
/// blocks: an empty bucket degrades to allocating a new buffer of the class.
#[derive(Debug)]
pub struct SizedBufferPool {
    /// Ascending
    classes: Box<[usize]>,
    pool_size: usize,
    policy: ClearPolicy,
    buckets: DashMap<usize, Arc<Bucket>>,
    stats: Arc<Stats>,
}

impl SizedBufferPool {
    pub fn new(
        classes: impl Into<Vec<usize>>,
        pool_size: usize,
        policy: ClearPolicy,
    ) -> Result<Self, Error> {
        Self::with_stats(classes, pool_size, policy, Arc::new(Stats::default()))
    }

    pub fn with_stats(
        classes: impl Into<Vec<usize>>,
        pool_size: usize,
        policy: ClearPolicy,
        stats: Arc<Stats>,
    ) -> Result<Self, Error> {
        let classes = classes.into();
        verify_size_classes(&classes)?;
        if pool_size == 0 {
            return Err(anyhow!("buffer pool size could not be 0").into());
        }
        tracing::info!(
            "create buffer pool classes:{:?} pool_size:{} policy:{:?}",
            classes,
            pool_size,
            policy
        );
        Ok(Self {
            classes: classes.into_boxed_slice(),
            pool_size,
            policy,
            buckets: DashMap::with_capacity(8),
            stats,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Self::new(
            config.buffer_size_classes.clone(),
            config.buffer_pool_size,
            config.clear_policy,
        )
    }

    /// Smallest configured class that can hold `requested_size` bytes.
    pub fn size_class_for(&self, requested_size: usize) -> Option<usize> {
        let index = self.classes.partition_point(|&class| class < requested_size);
        self.classes.get(index).copied()
    }

    #[inline]
    pub fn max_size_class(&self) -> usize {
        // never empty, checked at construction
        self.classes[self.classes.len() - 1]
    }

    pub fn acquire(&self, requested_size: usize) -> Result<PooledBuffer, Error> {
        let Some(class) = self.size_class_for(requested_size) else {
            Stats::incr(&self.stats.pool_reject_count);
            tracing::warn!("acquire buffer too big, size:{}", requested_size);
            return Err(Error::UnsupportedSize {
                size: requested_size,
                max: self.max_size_class(),
            });
        };

        let (bucket, created) = self.bucket(class);
        let pooled = if created {
            None
        } else {
            bucket.queue.lock().unwrap().pop_front()
        };
        let mut inner = match pooled {
            Some(buf) => {
                Stats::incr(&self.stats.pool_hit_count);
                buf
            }
            None => {
                if !created {
                    Stats::incr(&self.stats.pool_fallback_alloc_count);
                    tracing::debug!("buffer pool not enough, size_class:{}", class);
                }
                BytesMut::with_capacity(class)
            }
        };
        if self.policy == ClearPolicy::OnAcquire {
            inner.clear();
        }
        Ok(PooledBuffer { class, inner })
    }

    /// Give a buffer back, it is dropped instead when its bucket is full or it no longer owns a
    /// whole size class of memory.
    pub fn release(&self, buf: PooledBuffer) {
        let PooledBuffer { class, mut inner } = buf;
        let Some(bucket) = self.buckets.get(&class).map(|b| b.value().clone()) else {
            self.discard(class, "no bucket");
            return;
        };

        if self.policy == ClearPolicy::OnRelease {
            inner.clear();
        }
        // reading through `Buf::advance` shrinks the visible capacity
        if inner.capacity() < class {
            inner.clear();
            if !inner.try_reclaim(class) {
                self.discard(class, "shared or split");
                return;
            }
        }
        if inner.capacity() != class {
            self.discard(class, "resized");
            return;
        }

        let mut queue = bucket.queue.lock().unwrap();
        if queue.len() >= self.pool_size {
            drop(queue);
            self.discard(bucket.size_class, "bucket full");
            return;
        }
        queue.push_back(inner);
    }

    /// Give back a buffer that was not acquired from this pool, keyed by its exact capacity.
    pub fn release_bytes(&self, buf: BytesMut) {
        let class = buf.capacity();
        if self.classes.binary_search(&class).is_err() {
            self.discard(class, "unmanaged size");
            return;
        }
        self.release(PooledBuffer { class, inner: buf });
    }

    /// Number of idle buffers of `size_class`.
    pub fn available(&self, size_class: usize) -> usize {
        self.buckets
            .get(&size_class)
            .map(|b| b.queue.lock().unwrap().len())
            .unwrap_or(0)
    }

    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn policy(&self) -> ClearPolicy {
        self.policy
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    /// Returns the bucket of `class` and whether this call created it.
    fn bucket(&self, class: usize) -> (Arc<Bucket>, bool) {
        if let Some(bucket) = self.buckets.get(&class) {
            return (bucket.value().clone(), false);
        }
        match self.buckets.entry(class) {
            Entry::Occupied(e) => (e.get().clone(), false),
            Entry::Vacant(e) => {
                tracing::info!(
                    "create bucket size_class:{} prewarm:{}",
                    class,
                    self.pool_size - 1
                );
                let bucket = Arc::new(Bucket::prewarm(class, self.pool_size));
                e.insert(bucket.clone());
                (bucket, true)
            }
        }
    }

    fn discard(&self, class: usize, reason: &str) {
        Stats::incr(&self.stats.pool_discard_count);
        tracing::debug!("discard buffer size_class:{} reason:{}", class, reason);
    }
}
