//! Stress helpers for EntiGraph stores.
//!
//! These exercise the store under heavy load and concurrent access.

use crate::fixtures::account;
use entigraph_core::{CoreError, Store};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Writes rejected by a version check and retried.
    pub conflicts: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, conflicts: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            conflicts,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Conflicts retried: {}", self.conflicts);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Number of distinct accounts.
    pub entity_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            entity_count: 100,
        }
    }
}

#[derive(Default)]
struct Tally {
    successful: AtomicUsize,
    failed: AtomicUsize,
    conflicts: AtomicUsize,
}

impl Tally {
    fn record<T>(&self, result: Result<T, CoreError>) {
        match result {
            Ok(_) => self.successful.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.failed.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn finish(&self, start: Instant) -> StressTestResult {
        StressTestResult::new(
            self.successful.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.conflicts.load(Ordering::Relaxed),
            start.elapsed(),
        )
    }
}

fn run_threads(threads: usize, body: impl Fn(usize) + Send + Sync + 'static) {
    let body = Arc::new(body);
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let body = Arc::clone(&body);
            thread::spawn(move || body(t))
        })
        .collect();
    for handle in handles {
        handle.join().expect("Thread panicked");
    }
}

/// Saves `operations` new accounts one by one.
pub fn stress_sequential_saves(store: &Store, config: &StressConfig) -> StressTestResult {
    let tally = Tally::default();
    let start = Instant::now();
    for i in 0..config.operations {
        tally.record(store.save(&account(i as i64)));
    }
    tally.finish(start)
}

/// Saves new accounts from `threads` threads at once.
///
/// Every save must succeed and every account must get a distinct id.
pub fn stress_concurrent_saves(store: Arc<Store>, config: &StressConfig) -> StressTestResult {
    let tally = Arc::new(Tally::default());
    let per_thread = config.operations / config.threads.max(1);
    let start = Instant::now();

    {
        let store = Arc::clone(&store);
        let tally = Arc::clone(&tally);
        run_threads(config.threads, move |t| {
            for i in 0..per_thread {
                tally.record(store.save(&account((t * per_thread + i) as i64)));
            }
        });
    }

    tally.finish(start)
}

/// Increments the balance of one account from `threads` threads, retrying
/// on version conflicts until every increment lands.
pub fn stress_conflicting_updates(store: Arc<Store>, config: &StressConfig) -> StressTestResult {
    let id = store
        .save(&account(0))
        .expect("save contended account")
        .get("id")
        .clone();
    let tally = Arc::new(Tally::default());
    let per_thread = config.operations / config.threads.max(1);
    let start = Instant::now();

    {
        let store = Arc::clone(&store);
        let tally = Arc::clone(&tally);
        run_threads(config.threads, move |_| {
            for _ in 0..per_thread {
                loop {
                    let result = store.find_by_id("Account", id.clone()).and_then(|found| {
                        let mut copy = found.expect("contended account exists");
                        let balance = copy.get("balance").as_int().unwrap_or_default();
                        copy.set("balance", balance + 1);
                        store.save(&copy)
                    });
                    match result {
                        Err(err) if err.is_conflict() => {
                            tally.conflicts.fetch_add(1, Ordering::Relaxed);
                        }
                        other => {
                            tally.record(other);
                            break;
                        }
                    }
                }
            }
        });
    }

    tally.finish(start)
}

/// Interleaves saves, updates, lookups and deletes over `entity_count`
/// accounts.
pub fn stress_mixed_operations(store: &Store, config: &StressConfig) -> StressTestResult {
    let seeded: Vec<_> = (0..config.entity_count as i64).map(account).collect();
    store.save_all(&seeded).expect("seed accounts");

    let tally = Tally::default();
    let start = Instant::now();
    for i in 0..config.operations {
        let id = (i % config.entity_count.max(1)) as i64;
        match i % 4 {
            0 => tally.record(store.save(&account(i as i64))),
            1 => tally.record(store.find_by_id("Account", id).and_then(|found| match found {
                Some(mut copy) => {
                    copy.set("balance", i as i64);
                    store.save(&copy).map(|_| ())
                }
                None => Ok(()),
            })),
            2 => tally.record(store.find_by_id("Account", id)),
            _ => tally.record(store.delete_by_id("Account", id)),
        }
    }
    tally.finish(start)
}
