//! # Invariant Testing for Bstar
//!
//! Tests designed to validate structural invariants after every kind of
//! update. They focus on:
//!
//! - Boundary conditions for eager splits and level rebuilds
//! - Exhaustive single removals from every small tree shape
//! - Randomized operations with invariant validation
//!
//! Small capacities (`GenericDict<_, _, 4>` and `<_, _, 6>`) are used
//! throughout so that deep trees and rebuild cascades appear with few keys.

use bstar::{Dict, GenericDict};
use rand::prelude::*;

type Tiny = GenericDict<i32, i32, 4>;
type Small = GenericDict<i32, i32, 6>;

fn build<const S: usize>(keys: impl IntoIterator<Item = i32>) -> GenericDict<i32, i32, S> {
	keys.into_iter().map(|k| (k, k)).collect()
}

// ===========================================================================
// Split Boundary Tests
// ===========================================================================

/// A full leaf root splits on the next insert, and not before.
#[test]
fn split_at_exact_leaf_capacity() {
	let full: Tiny = build(0..4);
	full.assert_invariants();
	assert_eq!(full.height(), 1);

	let split = full.add(4, 4);
	split.assert_invariants();
	assert_eq!(split.height(), 2);
	assert_eq!(full.height(), 1);
}

/// A full inner root splits on the next insert that reaches it.
#[test]
fn split_at_exact_inner_capacity() {
	let mut dict = Tiny::new();
	let mut last_height = 0;
	for i in 0..200 {
		dict = dict.add(i, i);
		dict.assert_invariants();
		assert!(dict.height() >= last_height, "height decreased on insert {}", i);
		assert!(dict.height() <= last_height + 1, "height jumped by more than one on insert {}", i);
		last_height = dict.height();
	}
	assert!(dict.height() >= 4, "Expected height >= 4, got {}", dict.height());
}

#[test]
fn cascading_splits_default_size() {
	let dict: Dict<i32, i32> = build(0..10_000);
	dict.assert_invariants();
	assert!(dict.height() >= 4, "Expected height >= 4, got {}", dict.height());
	for i in 0..10_000 {
		assert_eq!(dict.get(&i), Some(&i), "Key {} not found", i);
	}
}

#[test]
fn splits_with_reverse_order() {
	let mut dict = Small::new();
	for i in (0..1000).rev() {
		dict = dict.add(i, i);
	}
	dict.assert_invariants();

	let mut prev = -1;
	for (k, _) in &dict {
		assert!(*k > prev, "Keys not in sorted order");
		prev = *k;
	}
}

/// Inserting into every gap of every small tree keeps the invariants.
#[test]
fn insert_into_every_gap() {
	for n in 1..40 {
		let base: Tiny = (0..n).map(|k| (k * 2, k)).collect();
		for gap in -1..=(n * 2) {
			if gap % 2 == 0 && gap >= 0 {
				continue;
			}
			let next = base.add(gap, -1);
			next.assert_invariants();
			assert_eq!(next.len(), base.len() + 1);
			assert_eq!(next.get(&gap), Some(&-1));
		}
	}
}

// ===========================================================================
// Rebuild Boundary Tests
// ===========================================================================

/// Removing any single key from any tree of up to 80 keys keeps the
/// invariants, for two capacities.
#[test]
fn remove_each_key_from_every_small_tree() {
	for n in 1..80 {
		let tiny: Tiny = build(0..n);
		let small: Small = build(0..n);
		for k in 0..n {
			let t = tiny.remove(&k);
			t.assert_invariants();
			assert_eq!(t.len(), n as usize - 1);
			assert!(!t.contains(&k));

			let s = small.remove(&k);
			s.assert_invariants();
			assert_eq!(s.len(), n as usize - 1);
		}
	}
}

#[test]
fn removal_to_minimum_occupancy() {
	let mut dict: Small = build(0..200);
	for i in 0..150 {
		dict = dict.remove(&i);
		dict.assert_invariants();
	}
	assert_eq!(dict.len(), 50);
	for i in 150..200 {
		assert_eq!(dict.get(&i), Some(&i));
	}
}

#[test]
fn cascading_rebuilds_reduce_height() {
	let mut dict: Tiny = build(0..5000);
	let initial_height = dict.height();
	dict.assert_invariants();

	for i in 0..4990 {
		dict = dict.remove(&i);
	}
	dict.assert_invariants();
	assert_eq!(dict.len(), 10);
	assert!(
		dict.height() < initial_height,
		"Height should decrease after deletions, got {} (was {})",
		dict.height(),
		initial_height
	);
}

/// Removing the greatest key under a separator keeps the separator exact.
#[test]
fn removing_separator_keys() {
	let mut dict: Tiny = build(0..100);
	// Every fourth key removed from the top tends to hit leaf maxima
	for k in (0..100).rev().step_by(4) {
		dict = dict.remove(&k);
		dict.assert_invariants();
	}
	assert_eq!(dict.len(), 75);
}

#[test]
fn remove_then_reinsert_same_region() {
	let mut dict: Tiny = build(0..300);
	for i in 100..200 {
		dict = dict.remove(&i);
	}
	dict.assert_invariants();
	for i in 100..200 {
		dict = dict.add(i, -i);
	}
	dict.assert_invariants();
	assert_eq!(dict.len(), 300);
	assert_eq!(dict.get(&150), Some(&-150));
}

// ===========================================================================
// Randomized Tests
// ===========================================================================

#[test]
fn random_operations_with_invariant_checks() {
	let mut rng = StdRng::seed_from_u64(0xB57A);
	let mut dict = Tiny::new();
	let mut expected = std::collections::BTreeMap::new();

	for step in 0..5_000 {
		let key: i32 = rng.random_range(0..200);
		if rng.random_bool(0.55) {
			dict = dict.add(key, step);
			expected.insert(key, step);
		} else {
			dict = dict.remove(&key);
			expected.remove(&key);
		}
		dict.assert_invariants();
		assert_eq!(dict.len(), expected.len());
	}
	assert!(dict.iter().eq(expected.iter()));
}

#[test]
fn sequential_insert_random_delete() {
	let mut rng = rand::rng();
	let mut dict: Small = build(0..1_000);
	let mut keys: Vec<i32> = (0..1_000).collect();
	keys.shuffle(&mut rng);

	for (i, k) in keys.iter().enumerate() {
		dict = dict.remove(k);
		if i % 50 == 0 {
			dict.assert_invariants();
		}
	}
	assert!(dict.is_empty());
	dict.assert_invariants();
}

// ===========================================================================
// Edge Cases
// ===========================================================================

#[test]
fn repeated_same_key_updates() {
	let mut dict: Tiny = build(0..20);
	for v in 0..100 {
		dict = dict.add(10, v);
	}
	dict.assert_invariants();
	assert_eq!(dict.len(), 20);
	assert_eq!(dict.get(&10), Some(&99));
}

#[test]
fn boundary_key_values() {
	let dict: Tiny = [i32::MIN, -1, 0, 1, i32::MAX].into_iter().map(|k| (k, 0)).collect();
	dict.assert_invariants();
	assert_eq!(dict.first().map(|b| *b.key()), Some(i32::MIN));
	assert_eq!(dict.last().map(|b| *b.key()), Some(i32::MAX));
	assert!(dict.position_at(&i32::MAX).is_some());
}

#[test]
fn empty_dict_invariants() {
	let dict = Tiny::new();
	dict.assert_invariants();
	assert_eq!(dict.height(), 0);
	assert_eq!(dict.iter().count(), 0);
}
