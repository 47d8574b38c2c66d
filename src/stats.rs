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

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Stats {
    pub pool_hit_count: AtomicU64,
    /// acquire found its bucket empty and allocated a fresh buffer
    pub pool_fallback_alloc_count: AtomicU64,
    pub pool_discard_count: AtomicU64,
    pub pool_reject_count: AtomicU64,
    pub handoff_put_count: AtomicU64,
    pub handoff_take_count: AtomicU64,
    pub process_error_count: AtomicU64,
}

impl Stats {
    #[inline]
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pool_hit_count: self.pool_hit_count.load(Ordering::Relaxed),
            pool_fallback_alloc_count: self.pool_fallback_alloc_count.load(Ordering::Relaxed),
            pool_discard_count: self.pool_discard_count.load(Ordering::Relaxed),
            pool_reject_count: self.pool_reject_count.load(Ordering::Relaxed),
            handoff_put_count: self.handoff_put_count.load(Ordering::Relaxed),
            handoff_take_count: self.handoff_take_count.load(Ordering::Relaxed),
            process_error_count: self.process_error_count.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct StatsSnapshot {
    pub pool_hit_count: u64,
    pub pool_fallback_alloc_count: u64,
    pub pool_discard_count: u64,
    pub pool_reject_count: u64,
    pub handoff_put_count: u64,
    pub handoff_take_count: u64,
    pub process_error_count: u64,
}
