//! Copy-on-write removal and level rebuilding.
//!
//! Removing a key rewrites the path from the owning leaf to the root. At each
//! inner bucket on the way back up there are two outcomes:
//!
//! - **Fast path**: the rewritten child still meets minimum fill, so it simply
//!   replaces the old child and every sibling is reused.
//! - **Rebuild path**: the child fell below minimum fill. Instead of borrowing
//!   from or merging with a neighbour, the whole bucket is rebuilt: its
//!   grandchildren (or, one level above the leaves, all of its pairs) are
//!   flattened into one ordered run and re-cut into correctly sized buckets.
//!
//! ```text
//!        [ 1 | 3 ]                       [ 1 ]
//!       /    |    \       rebuild       /     \
//!   [0 1]  [2 3]  [4 5]  ────────►   [0 1]  [3 4 5]
//!            ▲ removing 2 leaves [3] underfull (S = 4)
//! ```
//!
//! A rebuilt bucket whose run fits in a single chunk ends up with one child
//! and no slots. That makes it underfull, so its parent rebuilds in turn;
//! at the root the dictionary unwraps it, which is the only way the tree
//! loses height.

use crate::bucket::{Bucket, Child, InnerBucket, LeafBucket};
use smallvec::SmallVec;
use std::borrow::Borrow;
use std::sync::Arc;

/// How a flattened run is cut into buckets.
///
/// The run is split into `leading` chunks followed by one final chunk of
/// `last` items; the final chunk becomes the rebuilt bucket's `greater`.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ChunkPlan {
	/// Sizes of every chunk except the final one, in order.
	pub(crate) leading: Vec<usize>,
	/// Size of the final chunk.
	pub(crate) last: usize,
}

/// Plans the chunking of `len` items into buckets of at most `cap` items and,
/// whenever there is more than one chunk, at least `min` items.
///
/// Full chunks are cut first. A remainder of at least `min` becomes the final
/// chunk; a smaller remainder is pooled with the last full chunk and the pool
/// is split as `min` + `cap + remainder - min`, so no chunk is left dangling
/// under minimum fill.
///
/// Requires `len >= 1` and `cap >= 2 * min`.
pub(crate) fn plan_chunks(len: usize, cap: usize, min: usize) -> ChunkPlan {
	if len <= cap {
		return ChunkPlan {
			leading: Vec::new(),
			last: len,
		};
	}
	let full = len / cap;
	let rem = len % cap;
	if rem == 0 {
		ChunkPlan {
			leading: vec![cap; full - 1],
			last: cap,
		}
	} else if rem >= min {
		ChunkPlan {
			leading: vec![cap; full],
			last: rem,
		}
	} else {
		let mut leading = vec![cap; full - 1];
		leading.push(min);
		ChunkPlan {
			leading,
			last: cap + rem - min,
		}
	}
}

impl<K: Ord + Clone, V: Clone, const S: usize> Bucket<K, V, S> {
	/// Removes a key that is present in this subtree.
	///
	/// The result may be underfull; the caller decides whether to accept it
	/// or rebuild one level up.
	pub(crate) fn remove<Q>(&self, key: &Q) -> Self
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		match self {
			Bucket::Leaf(ref leaf) => {
				let (pos, _) = leaf.position_for(key);
				Bucket::Leaf(leaf.removed(pos))
			}
			Bucket::Inner(ref inner) => inner.remove(key),
		}
	}
}

impl<K: Ord + Clone, V: Clone, const S: usize> InnerBucket<K, V, S> {
	fn remove<Q>(&self, key: &Q) -> Bucket<K, V, S>
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		let (pos, exact) = self.position_for(key);
		let child = self.child(pos).remove(key);

		let mut next = self.clone();
		if exact {
			// The separator was the removed key: it must name the new maximum
			if let Some(max) = child.max_key() {
				next.keys[pos] = max.clone();
			}
		}
		let underfull = child.is_underfull();
		next.set_child(pos, Arc::new(child));
		next.total -= 1;

		if underfull {
			next.rebuild()
		} else {
			Bucket::Inner(next)
		}
	}

	/// Reconstructs this bucket from its flattened grandchildren.
	fn rebuild(self) -> Bucket<K, V, S> {
		tracing::trace!(slots = self.keys.len(), total = self.total, "rebuilding underfull level");
		if self.greater.is_leaf() {
			self.rebuild_from_pairs()
		} else {
			self.rebuild_from_children()
		}
	}

	/// Children are leaves: re-cut every pair into leaves of up to `S` pairs.
	fn rebuild_from_pairs(&self) -> Bucket<K, V, S> {
		let mut pairs = Vec::with_capacity(self.total);
		for child in self.children.iter().chain(std::iter::once(&self.greater)) {
			let leaf = child.as_leaf();
			pairs.extend(leaf.keys.iter().cloned().zip(leaf.values.iter().cloned()));
		}

		let plan = plan_chunks(pairs.len(), S, Bucket::<K, V, S>::MIN_FILL);
		let mut pairs = pairs.into_iter();
		let mut keys = SmallVec::new();
		let mut children = SmallVec::new();
		for size in plan.leading {
			let leaf: LeafBucket<K, V, S> = pairs.by_ref().take(size).collect();
			keys.push(leaf.keys[size - 1].clone());
			children.push(Arc::new(Bucket::Leaf(leaf)));
		}
		let greater = Arc::new(Bucket::Leaf(pairs.collect()));
		Bucket::Inner(InnerBucket::from_parts(keys, children, greater))
	}

	/// Children are inner buckets: re-cut every grandchild into inner buckets
	/// of up to `S + 1` children.
	fn rebuild_from_children(&self) -> Bucket<K, V, S> {
		let mut slots: Vec<(K, Child<K, V, S>)> = Vec::new();
		for (separator, child) in self.keys.iter().zip(&self.children) {
			let inner = child.as_inner();
			slots.extend(inner.keys.iter().cloned().zip(inner.children.iter().cloned()));
			slots.push((separator.clone(), Arc::clone(&inner.greater)));
		}
		let tail = self.greater.as_inner();
		slots.extend(tail.keys.iter().cloned().zip(tail.children.iter().cloned()));
		let last = Arc::clone(&tail.greater);

		let plan = plan_chunks(slots.len() + 1, S + 1, Bucket::<K, V, S>::MIN_FILL);
		let mut slots = slots.into_iter();
		let mut keys = SmallVec::new();
		let mut children = SmallVec::new();
		for size in plan.leading {
			let mut chunk: Vec<_> = slots.by_ref().take(size).collect();
			let (separator, greater) = chunk.remove(chunk.len() - 1);
			let (chunk_keys, chunk_children) = chunk.into_iter().unzip();
			keys.push(separator);
			children.push(Arc::new(Bucket::Inner(InnerBucket::from_parts(
				chunk_keys,
				chunk_children,
				greater,
			))));
		}
		let (tail_keys, tail_children) = slots.unzip();
		let greater = Arc::new(Bucket::Inner(InnerBucket::from_parts(tail_keys, tail_children, last)));
		Bucket::Inner(InnerBucket::from_parts(keys, children, greater))
	}
}
