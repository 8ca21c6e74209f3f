//! # Concurrency Tests for Bstar
//!
//! Dictionaries are immutable values, so threads never coordinate on a
//! shared structure. These tests check the properties that make that useful:
//!
//! - A version can be read from many threads at once
//! - Threads deriving new versions from a shared one never disturb it
//! - Versions built on one thread can be handed to another
//!
//! Stress tests are marked with `#[ignore]` - run with `cargo test -- --ignored`

use bstar::{Dict, GenericDict};
use parking_lot::Mutex;
use rand::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

// ===========================================================================
// Shared Readers
// ===========================================================================

#[test]
fn concurrent_readers_of_one_version() {
	let dict: Arc<Dict<i32, i32>> = Arc::new((0..5_000).map(|k| (k, k * 2)).collect());
	let num_threads = 8;

	let handles: Vec<_> = (0..num_threads)
		.map(|t| {
			let dict = Arc::clone(&dict);
			thread::spawn(move || {
				let mut rng = StdRng::seed_from_u64(t);
				for _ in 0..2_000 {
					let key: i32 = rng.random_range(0..5_000);
					assert_eq!(dict.get(&key), Some(&(key * 2)));
				}
				dict.iter().count()
			})
		})
		.collect();

	for h in handles {
		assert_eq!(h.join().unwrap(), 5_000);
	}
}

#[test]
fn concurrent_bookmark_walks() {
	let dict: Dict<i32, i32> = (0..2_000).map(|k| (k, k)).collect();
	let start = dict.position_at(&1_000).unwrap();

	let handles: Vec<_> = (0..4)
		.map(|_| {
			let start = start.clone();
			thread::spawn(move || {
				let mut seen = 0;
				let mut bookmark = Some(start);
				while let Some(b) = bookmark {
					assert_eq!(*b.key(), 1_000 + seen);
					seen += 1;
					bookmark = b.next();
				}
				seen
			})
		})
		.collect();

	for h in handles {
		assert_eq!(h.join().unwrap(), 1_000);
	}
}

// ===========================================================================
// Divergent Writers
// ===========================================================================

#[test]
fn writers_diverge_from_shared_base() {
	let base: Dict<i32, i32> = (0..1_000).map(|k| (k, 0)).collect();
	let num_threads = 4;

	let handles: Vec<_> = (0..num_threads)
		.map(|t| {
			let mut dict = base.clone();
			thread::spawn(move || {
				for k in (0..1_000).filter(|k| k % num_threads == t) {
					dict = dict.add(k, t + 1);
				}
				for k in 1_000..1_100 {
					dict = dict.add(k * (t + 1), t);
				}
				dict.assert_invariants();
				dict
			})
		})
		.collect();

	let versions: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

	// The base was never disturbed
	base.assert_invariants();
	assert!(base.iter().all(|(_, v)| *v == 0));
	assert_eq!(base.len(), 1_000);

	for (t, version) in versions.iter().enumerate() {
		let t = t as i32;
		for k in 0..1_000 {
			let expected = if k % num_threads == t { t + 1 } else { 0 };
			assert_eq!(version[&k], expected, "thread {} key {}", t, k);
		}
	}
}

#[test]
fn versions_sent_between_threads() {
	let (tx, rx) = mpsc::channel::<GenericDict<i32, String, 4>>();

	let producer = thread::spawn(move || {
		let mut dict = GenericDict::new();
		for k in 0..200 {
			dict = dict.add(k, k.to_string());
			if k % 20 == 19 {
				tx.send(dict.clone()).unwrap();
			}
		}
	});

	let mut received = 0;
	for version in rx {
		received += 1;
		assert_eq!(version.len(), received * 20);
		version.assert_invariants();
		assert_eq!(version.get(&0).map(String::as_str), Some("0"));
	}
	producer.join().unwrap();
	assert_eq!(received, 10);
}

// ===========================================================================
// Published Version Pattern
// ===========================================================================

/// Writers publish new versions through a lock; readers take a snapshot and
/// release the lock before reading.
#[test]
fn readers_see_consistent_snapshots() {
	let current = Arc::new(Mutex::new(Dict::<i32, i32>::new()));
	let reads = Arc::new(AtomicUsize::new(0));

	let writer = {
		let current = Arc::clone(&current);
		thread::spawn(move || {
			for k in 0..2_000 {
				let next = current.lock().add(k, k);
				*current.lock() = next;
			}
		})
	};

	let readers: Vec<_> = (0..4)
		.map(|_| {
			let current = Arc::clone(&current);
			let reads = Arc::clone(&reads);
			thread::spawn(move || {
				for _ in 0..200 {
					let snapshot = current.lock().clone();
					// Keys are added in order, so a snapshot is always a prefix
					let n = snapshot.len() as i32;
					assert!(snapshot.iter().map(|(k, _)| *k).eq(0..n));
					reads.fetch_add(1, Ordering::Relaxed);
				}
			})
		})
		.collect();

	writer.join().unwrap();
	for r in readers {
		r.join().unwrap();
	}
	assert_eq!(reads.load(Ordering::Relaxed), 800);
	assert_eq!(current.lock().len(), 2_000);
}

#[test]
#[ignore]
fn stress_many_threads_random_versions() {
	let base: GenericDict<i32, i32, 4> = (0..10_000).map(|k| (k, k)).collect();
	let handles: Vec<_> = (0..16)
		.map(|t| {
			let mut dict = base.clone();
			thread::spawn(move || {
				let mut rng = StdRng::seed_from_u64(t);
				for _ in 0..20_000 {
					let key: i32 = rng.random_range(0..20_000);
					if rng.random_bool(0.5) {
						dict = dict.add(key, -key);
					} else {
						dict = dict.remove(&key);
					}
				}
				dict.assert_invariants();
			})
		})
		.collect();

	for h in handles {
		h.join().unwrap();
	}
	assert_eq!(base.len(), 10_000);
	base.assert_invariants();
}
