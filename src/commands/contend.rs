// Copyright 2025 dentsusoken
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

//! `memlock contend`: runs several workers against one lock key and checks
//! that the critical sections never overlapped.
//!
//! Each worker owns its own [`CasLock`] over a shared in-process store and
//! increments a counter stored next to the lock key with a plain
//! read-modify-write. Any lost update means two workers were inside the
//! critical section at once.

use crate::config::MemlockConfig;
use crate::error::{MemlockError, Result};
use crate::locking::{AcquireRequest, CasLock, LockWaitObserver, seconds};
use crate::store::InMemoryStore;
use comfy_table::{Cell, CellAlignment, Table};
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ContendArgs {
    pub key: String,
    pub workers: usize,
    pub iterations: usize,
    pub lock_duration: Option<f64>,
    pub wait: Option<f64>,
    pub self_expire_sync: bool,
    pub json: bool,
}

impl Default for ContendArgs {
    fn default() -> Self {
        Self {
            key: "memlock:contend".to_string(),
            workers: 2,
            iterations: 100,
            lock_duration: None,
            wait: None,
            self_expire_sync: false,
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub worker: usize,
    pub acquired: usize,
    pub timed_out: usize,
    pub lost: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContendReport {
    pub key: String,
    pub self_expire_sync: bool,
    pub lock_duration_secs: f64,
    pub wait_secs: f64,
    pub counter: u64,
    pub stale_takeovers: usize,
    pub elapsed_ms: u128,
    pub workers: Vec<WorkerReport>,
}

impl ContendReport {
    pub fn total_acquired(&self) -> usize {
        self.workers.iter().map(|w| w.acquired).sum()
    }

    pub fn is_consistent(&self) -> bool {
        self.counter == self.total_acquired() as u64
    }
}

impl WorkerReport {
    /// Tallies one completed critical section from the outcome of its release.
    /// A `false` release (lost under `catch_exceptions`) and a `LostLock`
    /// error both count as lost; other errors abort the worker.
    fn record_release(&mut self, outcome: Result<bool>) -> Result<()> {
        match outcome {
            Ok(true) => {}
            Ok(false) => {
                debug!("Worker {} lost the lock", self.worker);
                self.lost += 1;
            }
            Err(err) if err.is_lost_lock() => {
                debug!("Worker {} lost the lock: {err}", self.worker);
                self.lost += 1;
            }
            Err(err) => return Err(err),
        }
        self.acquired += 1;
        Ok(())
    }
}

/// Counts stale-holder takeovers across all workers.
#[derive(Debug, Default)]
struct TakeoverCounter {
    stale: AtomicUsize,
}

impl LockWaitObserver for TakeoverCounter {
    fn on_stale_holder(&self, key: &str, holder_expires_at_ms: u64) {
        self.stale.fetch_add(1, Ordering::Relaxed);
        debug!("Stale holder on {key} (expiry {holder_expires_at_ms})");
    }

    fn on_timeout(&self, key: &str, waited: Duration) {
        debug!("Gave up on {key} after {:.3}s", waited.as_secs_f64());
    }
}

pub struct ContendCommand<'a> {
    config: &'a MemlockConfig,
}

impl<'a> ContendCommand<'a> {
    pub fn new(config: &'a MemlockConfig) -> Result<Self> {
        Ok(Self { config })
    }

    pub fn execute(&self, args: &ContendArgs) -> Result<()> {
        let report = self.run(args)?;

        if args.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }

        if !report.is_consistent() {
            return Err(MemlockError::LostLock {
                key: report.key.clone(),
                details: format!(
                    "counter is {} but {} critical sections completed",
                    report.counter,
                    report.total_acquired()
                ),
            });
        }
        Ok(())
    }

    pub fn run(&self, args: &ContendArgs) -> Result<ContendReport> {
        if args.workers == 0 {
            return Err(MemlockError::InvalidArgument(
                "at least one worker is required".to_string(),
            ));
        }

        let options = self
            .config
            .lock
            .options()
            .with_self_expire_sync(args.self_expire_sync || self.config.lock.self_expire_sync);
        let lock_duration = match args.lock_duration {
            Some(value) => seconds(value)?,
            None => self.config.lock.lock_duration()?,
        };
        options.validate_lock_duration(lock_duration)?;
        let wait = match args.wait {
            Some(value) => seconds(value)?,
            None => self.config.lock.wait()?,
        };
        let retry_interval = self.config.lock.retry_interval();

        info!(
            "Running {} workers x {} iterations on {} (duration {:.3}s, wait {:.3}s)",
            args.workers,
            args.iterations,
            args.key,
            lock_duration.as_secs_f64(),
            wait.as_secs_f64()
        );

        let store = Arc::new(InMemoryStore::new());
        let counter_key = format!("{}:counter", args.key);
        let observer = TakeoverCounter::default();
        let started = Instant::now();

        let workers = thread::scope(|scope| -> Result<Vec<WorkerReport>> {
            let mut handles = Vec::with_capacity(args.workers);
            for worker in 0..args.workers {
                let store = store.clone();
                let counter_key = counter_key.as_str();
                let observer = &observer;
                handles.push(scope.spawn(move || -> Result<WorkerReport> {
                    let mut lock = CasLock::new(store.clone(), args.key.as_str(), options)?;
                    let request = AcquireRequest::new(lock_duration)
                        .with_wait(wait)
                        .with_retry_interval(retry_interval)
                        .with_observer(Some(observer));
                    let mut report = WorkerReport {
                        worker,
                        ..WorkerReport::default()
                    };

                    for _ in 0..args.iterations {
                        if !lock.acquire_with(&request)? {
                            report.timed_out += 1;
                            continue;
                        }

                        increment(&store, counter_key)?;

                        report.record_release(lock.release())?;
                    }
                    Ok(report)
                }));
            }

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .map_err(|_| std::io::Error::other("contention worker panicked"))?
                })
                .collect()
        })?;

        let counter = read_counter(&store, &counter_key)?;
        Ok(ContendReport {
            key: args.key.clone(),
            self_expire_sync: options.self_expire_sync,
            lock_duration_secs: lock_duration.as_secs_f64(),
            wait_secs: wait.as_secs_f64(),
            counter,
            stale_takeovers: observer.stale.load(Ordering::Relaxed),
            elapsed_ms: started.elapsed().as_millis(),
            workers,
        })
    }
}

fn read_counter(store: &InMemoryStore, counter_key: &str) -> Result<u64> {
    Ok(store
        .get(counter_key)?
        .and_then(|raw| String::from_utf8_lossy(&raw).parse().ok())
        .unwrap_or(0))
}

fn increment(store: &InMemoryStore, counter_key: &str) -> Result<()> {
    let current = read_counter(store, counter_key)?;
    // Widen the window between read and write so overlaps would show up.
    thread::yield_now();
    store.set(counter_key, (current + 1).to_string().as_bytes(), 0)?;
    Ok(())
}

fn print_report(report: &ContendReport) {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_BORDERS_ONLY);
    table.set_header(vec![
        Cell::new("Worker"),
        Cell::new("Acquired"),
        Cell::new("Timed out"),
        Cell::new("Lost"),
    ]);

    for worker in &report.workers {
        table.add_row(vec![
            Cell::new(worker.worker.to_string()),
            Cell::new(worker.acquired.to_string()).set_alignment(CellAlignment::Right),
            Cell::new(worker.timed_out.to_string()).set_alignment(CellAlignment::Right),
            Cell::new(worker.lost.to_string()).set_alignment(CellAlignment::Right),
        ]);
    }

    println!("{table}");
    println!(
        "\nKey: {} | counter: {} | acquisitions: {} | stale takeovers: {} | {} ms",
        report.key,
        report.counter,
        report.total_acquired(),
        report.stale_takeovers,
        report.elapsed_ms
    );
}
