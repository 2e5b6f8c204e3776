//! Stress tests for shelfdb.
//!
//! These drive many transactions through one task queue, and read one
//! object store from several threads at once.

use crate::fixtures::open_with;
use shelfdb_core::{Connection, Factory, Key, ObjectStore, Request, TransactionMode, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Database the stress helpers open.
pub const STRESS_DATABASE: &str = "stress";
/// Store the stress helpers write to.
pub const STRESS_STORE: &str = "items";

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
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
            duration,
            ops_per_second,
        }
    }

    fn tally(requests: &[Request], duration: Duration) -> Self {
        let failed = requests.iter().filter(|r| r.error().is_some()).count();
        Self::new(requests.len() - failed, failed, duration)
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform.
    pub operations: usize,
    /// Number of reader threads (for concurrent tests).
    pub threads: usize,
    /// Length of each record's payload in bytes.
    pub record_size: usize,
    /// Number of distinct keys.
    pub key_count: usize,
    /// Requests per transaction.
    pub batch_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            record_size: 256,
            key_count: 1_000,
            batch_size: 100,
        }
    }
}

impl StressConfig {
    fn payload(&self) -> Value {
        Value::Bytes(vec![0xAB; self.record_size])
    }

    fn key(&self, i: usize) -> Key {
        Key::from((i % self.key_count.max(1)) as u32)
    }
}

/// Opens the stress database with a single out-of-line-keyed store.
pub fn stress_factory() -> Factory {
    let factory = Factory::in_memory();
    let _ = open_with(&factory, STRESS_DATABASE, 1, |connection, _| {
        connection
            .create_object_store(STRESS_STORE, None, false)
            .expect("Failed to create store");
    });
    factory
}

fn connect(factory: &Factory) -> Arc<Connection> {
    let request = factory
        .open(STRESS_DATABASE, None)
        .expect("Invalid version");
    factory.run_until_idle();
    request
        .result()
        .and_then(Result::ok)
        .and_then(|output| output.into_connection())
        .expect("Failed to connect")
}

fn store(factory: &Factory) -> Arc<ObjectStore> {
    factory
        .database(STRESS_DATABASE)
        .and_then(|database| database.object_store(STRESS_STORE))
        .expect("Stress store is missing")
}

/// Puts `operations` records, one transaction per put.
pub fn stress_sequential_writes(factory: &Factory, config: &StressConfig) -> StressTestResult {
    let connection = connect(factory);
    let payload = config.payload();

    let start = Instant::now();
    let mut requests = Vec::with_capacity(config.operations);
    for i in 0..config.operations {
        let txn = connection
            .transaction([STRESS_STORE], TransactionMode::ReadWrite)
            .expect("Failed to start transaction");
        let handle = txn.object_store(STRESS_STORE).expect("Store not in scope");
        requests.push(
            handle
                .put(payload.clone(), Some(config.key(i)))
                .expect("Failed to queue put"),
        );
        factory.run_until_idle();
    }
    StressTestResult::tally(&requests, start.elapsed())
}

/// Queues every transaction up front, then drains the queue once.
pub fn stress_queued_transactions(factory: &Factory, config: &StressConfig) -> StressTestResult {
    let connection = connect(factory);
    let payload = config.payload();
    let batch_size = config.batch_size.max(1);

    let start = Instant::now();
    let mut requests = Vec::with_capacity(config.operations);
    for batch in 0..config.operations / batch_size {
        let txn = connection
            .transaction([STRESS_STORE], TransactionMode::ReadWrite)
            .expect("Failed to start transaction");
        let handle = txn.object_store(STRESS_STORE).expect("Store not in scope");
        for i in 0..batch_size {
            let key = config.key(batch * batch_size + i);
            requests.push(handle.put(payload.clone(), Some(key)).expect("Failed to queue put"));
        }
    }
    factory.run_until_idle();
    StressTestResult::tally(&requests, start.elapsed())
}

/// Mixes puts, gets and deletes, one third each.
pub fn stress_mixed_operations(factory: &Factory, config: &StressConfig) -> StressTestResult {
    let connection = connect(factory);
    let payload = config.payload();
    let batch_size = config.batch_size.max(1);

    let start = Instant::now();
    let mut requests = Vec::with_capacity(config.operations);
    for chunk in (0..config.operations).collect::<Vec<_>>().chunks(batch_size) {
        let txn = connection
            .transaction([STRESS_STORE], TransactionMode::ReadWrite)
            .expect("Failed to start transaction");
        let handle = txn.object_store(STRESS_STORE).expect("Store not in scope");
        for &i in chunk {
            let key = config.key(i);
            let request = match i % 3 {
                0 => handle.put(payload.clone(), Some(key)),
                1 => handle.get(key),
                _ => handle.delete(key),
            };
            requests.push(request.expect("Failed to queue request"));
        }
    }
    factory.run_until_idle();
    StressTestResult::tally(&requests, start.elapsed())
}

/// Aborts every other transaction after its writes ran.
///
/// Counts committed transactions as successes and aborted ones as
/// failures.
pub fn stress_transaction_aborts(factory: &Factory, config: &StressConfig) -> StressTestResult {
    let connection = connect(factory);
    let payload = config.payload();

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;
    for i in 0..config.operations {
        let txn = connection
            .transaction([STRESS_STORE], TransactionMode::ReadWrite)
            .expect("Failed to start transaction");
        let handle = txn.object_store(STRESS_STORE).expect("Store not in scope");
        let put = handle
            .put(payload.clone(), Some(config.key(i)))
            .expect("Failed to queue put");
        while !put.is_done() && factory.tick() {}

        if i % 2 == 0 {
            txn.abort().expect("Transaction finished early");
            failed += 1;
        } else {
            successful += 1;
        }
        factory.run_until_idle();
    }
    StressTestResult::new(successful, failed, start.elapsed())
}

/// Reads one store from several threads.
pub fn stress_concurrent_reads(factory: &Factory, config: &StressConfig) -> StressTestResult {
    let key_count = config.key_count.max(1);
    stress_queued_transactions(
        factory,
        &StressConfig {
            operations: key_count,
            batch_size: key_count,
            ..config.clone()
        },
    );
    let store = store(factory);

    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let ops_per_thread = config.operations / config.threads.max(1);

    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let store = Arc::clone(&store);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);

            thread::spawn(move || {
                for i in 0..ops_per_thread {
                    let key = Key::from(((t * ops_per_thread + i) % key_count) as u32);
                    match store.get_value(&key.into()) {
                        Some(_) => successful.fetch_add(1, Ordering::Relaxed),
                        None => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}
