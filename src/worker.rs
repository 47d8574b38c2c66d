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
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::anyhow;

use crate::{
    config::Config, consts::WORKER_THREAD_NAME, error::Error, queue::SlotHandoffBuffer,
    stats::Stats,
};

/// Business logic run by the workers for every handed-off slot.
pub trait Processor<H>: Send + Sync + 'static {
    fn process(&self, handle: &H, size: usize) -> Result<(), Error>;
}

impl<H, F> Processor<H> for F
where
    F: Fn(&H, usize) -> Result<(), Error> + Send + Sync + 'static,
{
    fn process(&self, handle: &H, size: usize) -> Result<(), Error> {
        self(handle, size)
    }
}

/// A fixed set of threads draining a [`SlotHandoffBuffer`].
///
/// Each worker loops `take()`, `process()`, `release()`. A failing or panicking processor is
/// logged and counted in `Stats::process_error_count`, the slot is released and the worker keeps
/// going. `interrupt()` on the buffer only wakes the workers up, they stop once the buffer is
/// shut down and drained.
pub struct WorkerGroup<H> {
    name: String,
    buffer: Arc<SlotHandoffBuffer<H>>,
    workers: Vec<JoinHandle<()>>,
    /// set when the group stops without shutting the buffer down
    aborted: Arc<AtomicBool>,
}

impl<H: Send + 'static> WorkerGroup<H> {
    /// Spawn `threads` workers named `{name}-{i}`.
    ///
    /// If a thread fails to spawn, the workers already running are stopped and joined and the
    /// error is returned. The buffer is left open, but waiters parked on it at that moment see
    /// `Error::Interrupted`.
    pub fn spawn<P: Processor<H>>(
        name: &str,
        threads: usize,
        buffer: Arc<SlotHandoffBuffer<H>>,
        processor: P,
    ) -> Result<Self, Error> {
        if threads == 0 {
            return Err(anyhow!("worker threads could not be 0").into());
        }
        let processor = Arc::new(processor);
        let mut group = Self {
            name: name.to_owned(),
            buffer,
            workers: Vec::with_capacity(threads),
            aborted: Arc::new(AtomicBool::new(false)),
        };
        for i in 0..threads {
            let thread_name = format!("{}-{}", name, i);
            let buffer = group.buffer.clone();
            let processor = processor.clone();
            let aborted = group.aborted.clone();
            let spawned = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || run(&thread_name, &buffer, processor.as_ref(), &aborted));
            match spawned {
                Ok(worker) => group.workers.push(worker),
                Err(err) => {
                    tracing::error!("spawn worker failed, name:{} err:{}", name, err);
                    group.abort();
                    return Err(err.into());
                }
            }
        }
        tracing::info!("worker group started, name:{} threads:{}", name, threads);
        Ok(group)
    }

    pub fn from_config<P: Processor<H>>(
        config: &Config,
        buffer: Arc<SlotHandoffBuffer<H>>,
        processor: P,
    ) -> Result<Self, Error> {
        Self::spawn(WORKER_THREAD_NAME, config.worker_threads, buffer, processor)
    }
}

impl<H> WorkerGroup<H> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    pub fn buffer(&self) -> &Arc<SlotHandoffBuffer<H>> {
        &self.buffer
    }

    /// Shut the buffer down, let the workers drain what is still readable and join them.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.buffer.shutdown();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("worker panicked, group:{}", self.name);
            }
        }
        tracing::info!("worker group stopped, name:{}", self.name);
    }

    /// Stop and join the workers, leaving the buffer usable by its other owners.
    ///
    /// A worker may be about to park when the flag is set, so the buffer is interrupted until
    /// every worker has exited.
    fn abort(&mut self) {
        self.aborted.store(true, Ordering::Release);
        for worker in self.workers.drain(..) {
            while !worker.is_finished() {
                self.buffer.interrupt();
                thread::sleep(Duration::from_millis(1));
            }
            if worker.join().is_err() {
                tracing::error!("worker panicked, group:{}", self.name);
            }
        }
        tracing::info!("worker group aborted, name:{}", self.name);
    }
}

impl<H> Drop for WorkerGroup<H> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<H, P: Processor<H> + ?Sized>(
    name: &str,
    buffer: &SlotHandoffBuffer<H>,
    processor: &P,
    aborted: &AtomicBool,
) {
    tracing::debug!("worker start, name:{}", name);
    while !aborted.load(Ordering::Acquire) {
        let slot = match buffer.take() {
            Ok(slot) => slot,
            Err(Error::Interrupted) => continue,
            Err(Error::Shutdown) => break,
            Err(err) => {
                tracing::error!("worker take failed, name:{} err:{}", name, err);
                break;
            }
        };
        // the slot must be released even if the processor unwinds
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            processor.process(slot.handle(), slot.size())
        }))
        .unwrap_or_else(|_| Err(anyhow!("processor panicked").into()));
        if let Err(err) = result {
            Stats::incr(&buffer.stats().process_error_count);
            tracing::warn!(
                "worker process failed, name:{} size:{} err:{}",
                name,
                slot.size(),
                err
            );
        }
        if let Err(err) = buffer.release(slot.id()) {
            tracing::error!("worker release failed, name:{} err:{}", name, err);
        }
    }
    tracing::debug!("worker exit, name:{}", name);
}
