//! Stress tests for the synchronized store.
//!
//! Many threads hammer a small key space on a file-backed ledger; afterwards
//! the mirror must hold exactly the ledger's live rows.
//!
//! Marked `#[ignore]` since they are slow.
//!
//! Run with:
//! ```bash
//! cargo test --test stress_tests -- --ignored --test-threads=1
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Instant;

use kvmirror::services::ledger::{DeletePolicy, LedgerBackend, LedgerOptions};
use kvmirror::services::store::SyncedStore;
use tempfile::TempDir;

/// Configuration for stress tests.
struct StressConfig {
    threads: usize,
    ops_per_thread: usize,
    keys: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 16,
            ops_per_thread: 500,
            keys: 8,
        }
    }
}

fn run_mixed_load(policy: DeletePolicy, config: &StressConfig) {
    let tmp = TempDir::new().unwrap();
    let store = SyncedStore::open(
        tmp.path().join("stress.db"),
        LedgerOptions {
            policy,
            ..LedgerOptions::default()
        },
    )
    .unwrap();

    let barrier = Arc::new(Barrier::new(config.threads));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let store = store.clone();
            let barrier = barrier.clone();
            let ops = config.ops_per_thread;
            let keys = config.keys;
            thread::spawn(move || {
                barrier.wait();
                for i in 0..ops {
                    let key = format!("k{}", (t * 7 + i) % keys);
                    match i % 4 {
                        0 | 1 => {
                            store.set(&key, &format!("{t}-{i}")).unwrap();
                        },
                        2 => {
                            store.delete(&key).unwrap();
                        },
                        _ => {
                            if let Some(value) = store.get(&key).unwrap() {
                                assert!(value.contains('-'), "fabricated value {value}");
                            }
                        },
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let elapsed = start.elapsed();
    let total = config.threads * config.ops_per_thread;
    println!(
        "{policy}: {total} ops in {elapsed:?} ({:.0} ops/s)",
        total as f64 / elapsed.as_secs_f64()
    );

    let mirrored: HashMap<String, String> = store
        .list()
        .into_iter()
        .map(|e| (e.key, e.value))
        .collect();
    let durable: HashMap<String, String> = store
        .ledger()
        .list()
        .unwrap()
        .into_iter()
        .map(|e| (e.key, e.value))
        .collect();
    assert_eq!(mirrored, durable);
}

#[test]
#[ignore = "Resource-intensive stress test"]
fn test_mixed_load_hard_delete() {
    run_mixed_load(DeletePolicy::Hard, &StressConfig::default());
}

#[test]
#[ignore = "Resource-intensive stress test"]
fn test_mixed_load_soft_delete() {
    run_mixed_load(DeletePolicy::Soft, &StressConfig::default());
}

#[test]
#[ignore = "Resource-intensive stress test"]
fn test_single_hot_key() {
    run_mixed_load(
        DeletePolicy::Soft,
        &StressConfig {
            keys: 1,
            ..StressConfig::default()
        },
    );
}
