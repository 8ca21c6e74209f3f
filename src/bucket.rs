//! Buckets: the immutable nodes of the B*-tree.
//!
//! A bucket is either a [`LeafBucket`] holding sorted key/value pairs, or an
//! [`InnerBucket`] holding sorted `(separator, child)` slots plus one `greater`
//! child for keys above every separator. A separator is the greatest key in
//! its child's subtree.
//!
//! Buckets are never mutated once they are reachable from a dictionary. Every
//! operation here borrows an existing bucket and returns a freshly built one;
//! children that the operation does not touch are shared through [`Arc`]
//! handles, so old and new versions of a tree overlap everywhere except along
//! the rewritten path.
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!                 │ Inner  keys: [ 4 | 8 ]       │  total = 11
//!                 │   children: [ a | b ] greater│
//!                 └─────┬──────────┬─────────┬───┘
//!                       ▼          ▼         ▼
//!                 ┌─────────┐ ┌─────────┐ ┌─────────┐
//!                 │ 1 2 3 4 │ │ 5 6 7 8 │ │ 9 10 11 │
//!                 └─────────┘ └─────────┘ └─────────┘
//! ```

use smallvec::SmallVec;
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// A shared handle to a child bucket.
pub(crate) type Child<K, V, const S: usize> = Arc<Bucket<K, V, S>>;

/// Binary search over a sorted key array.
///
/// Returns the smallest index `i` with `key <= keys[i]` (or `keys.len()` if
/// `key` exceeds every key), and whether `keys[i] == key`.
#[inline]
pub(crate) fn search<K, Q>(keys: &[K], key: &Q) -> (usize, bool)
where
	K: Borrow<Q>,
	Q: ?Sized + Ord,
{
	match keys.binary_search_by(|slot| slot.borrow().cmp(key)) {
		Ok(pos) => (pos, true),
		Err(pos) => (pos, false),
	}
}

// ===========================================================================
// Bucket
// ===========================================================================

/// A node of the tree, either a leaf (data) or an inner (routing) bucket.
pub(crate) enum Bucket<K, V, const S: usize> {
	/// Sorted key/value pairs.
	Leaf(LeafBucket<K, V, S>),
	/// Sorted separator/child slots plus the `greater` child.
	Inner(InnerBucket<K, V, S>),
}

impl<K: fmt::Debug, V: fmt::Debug, const S: usize> fmt::Debug for Bucket<K, V, S> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Bucket::Leaf(ref leaf) => f.debug_tuple("Leaf").field(leaf).finish(),
			Bucket::Inner(ref inner) => f.debug_tuple("Inner").field(inner).finish(),
		}
	}
}

impl<K, V, const S: usize> Bucket<K, V, S> {
	/// Minimum number of slots in a non-root leaf, and minimum number of
	/// children of a non-root inner bucket.
	pub(crate) const MIN_FILL: usize = S / 2;

	/// Returns `true` if this is a leaf bucket.
	#[inline]
	pub(crate) fn is_leaf(&self) -> bool {
		matches!(self, Bucket::Leaf(_))
	}

	/// Returns a reference to the inner leaf bucket.
	///
	/// # Panics
	///
	/// Panics if called on an inner bucket.
	#[inline]
	pub(crate) fn as_leaf(&self) -> &LeafBucket<K, V, S> {
		match self {
			Bucket::Leaf(ref leaf) => leaf,
			Bucket::Inner(_) => {
				unreachable!("as_leaf() called on inner bucket - this indicates a tree traversal bug")
			}
		}
	}

	/// Returns a reference to the inner routing bucket.
	///
	/// # Panics
	///
	/// Panics if called on a leaf bucket.
	#[inline]
	pub(crate) fn as_inner(&self) -> &InnerBucket<K, V, S> {
		match self {
			Bucket::Inner(ref inner) => inner,
			Bucket::Leaf(_) => {
				unreachable!("as_inner() called on leaf bucket - this indicates a tree traversal bug")
			}
		}
	}

	/// Number of slots in this bucket.
	#[inline]
	pub(crate) fn count(&self) -> usize {
		self.keys().len()
	}

	/// Number of key/value pairs in the subtree rooted here.
	#[inline]
	pub(crate) fn total(&self) -> usize {
		match self {
			Bucket::Leaf(ref leaf) => leaf.keys.len(),
			Bucket::Inner(ref inner) => inner.total,
		}
	}

	/// The sorted slot keys of this bucket.
	#[inline]
	pub(crate) fn keys(&self) -> &[K] {
		match self {
			Bucket::Leaf(ref leaf) => &leaf.keys,
			Bucket::Inner(ref inner) => &inner.keys,
		}
	}

	/// Returns `true` if the bucket has no room for another slot.
	#[inline]
	pub(crate) fn is_full(&self) -> bool {
		self.count() >= S
	}

	/// Returns `true` if the bucket is below minimum fill.
	///
	/// Leaves are measured in pairs, inner buckets in children (`count + 1`),
	/// since an eager split of a full inner bucket moves one separator up and
	/// leaves `S/2 - 1` slots behind in the lower half.
	#[inline]
	pub(crate) fn is_underfull(&self) -> bool {
		match self {
			Bucket::Leaf(ref leaf) => leaf.keys.len() < Self::MIN_FILL,
			Bucket::Inner(ref inner) => inner.keys.len() + 1 < Self::MIN_FILL,
		}
	}

	/// Returns the child at `pos` (`pos == count` is `greater`), or `None` for
	/// a leaf.
	#[inline]
	pub(crate) fn child(&self, pos: usize) -> Option<&Child<K, V, S>> {
		match self {
			Bucket::Leaf(_) => None,
			Bucket::Inner(ref inner) => Some(inner.child(pos)),
		}
	}

	/// Number of pairs covered by the slot at `pos`.
	#[inline]
	pub(crate) fn slot_total(&self, pos: usize) -> usize {
		match self {
			Bucket::Leaf(_) => 1,
			Bucket::Inner(ref inner) => inner.child(pos).total(),
		}
	}

	/// If this is an inner bucket with no slots, returns its only child.
	#[inline]
	pub(crate) fn sole_child(&self) -> Option<&Child<K, V, S>> {
		match self {
			Bucket::Inner(ref inner) if inner.keys.is_empty() => Some(&inner.greater),
			_ => None,
		}
	}

	/// The greatest key in this subtree.
	pub(crate) fn max_key(&self) -> Option<&K> {
		let mut bucket = self;
		loop {
			match bucket {
				Bucket::Leaf(ref leaf) => return leaf.keys.last(),
				Bucket::Inner(ref inner) => bucket = &*inner.greater,
			}
		}
	}

	/// Locates `key` within this bucket's slots.
	#[inline]
	pub(crate) fn position_for<Q>(&self, key: &Q) -> (usize, bool)
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		search(self.keys(), key)
	}

	/// Descends to the leaf owning `key` and returns its value.
	pub(crate) fn get<Q>(&self, key: &Q) -> Option<&V>
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		let mut bucket = self;
		loop {
			match bucket {
				Bucket::Leaf(ref leaf) => {
					let (pos, exact) = leaf.position_for(key);
					return exact.then(|| &leaf.values[pos]);
				}
				Bucket::Inner(ref inner) => {
					let (pos, _) = inner.position_for(key);
					bucket = &**inner.child(pos);
				}
			}
		}
	}

	/// Returns `true` if `key` is present in this subtree.
	#[inline]
	pub(crate) fn contains<Q>(&self, key: &Q) -> bool
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		self.get(key).is_some()
	}
}

impl<K: Ord + Clone, V: Clone, const S: usize> Bucket<K, V, S> {
	/// A leaf holding a single pair.
	pub(crate) fn singleton(key: K, value: V) -> Self {
		Bucket::Leaf(std::iter::once((key, value)).collect())
	}

	/// Splits a full bucket into a new parent with one slot (the lower half)
	/// and the upper half as `greater`. Used on the root, where it adds a level.
	pub(crate) fn split(&self) -> Self {
		let (separator, low) = self.low_half();
		let top = self.top_half();
		Bucket::Inner(InnerBucket {
			keys: smallvec::smallvec![separator],
			children: smallvec::smallvec![Arc::new(low)],
			greater: Arc::new(top),
			total: self.total(),
		})
	}

	/// The first half of a full bucket, with the separator that routes to it.
	///
	/// For an inner bucket the last slot of the first half is promoted: its
	/// key becomes the separator and its child the new bucket's `greater`.
	pub(crate) fn low_half(&self) -> (K, Self) {
		let m = S / 2;
		match self {
			Bucket::Leaf(ref leaf) => {
				let low = LeafBucket {
					keys: leaf.keys[..m].iter().cloned().collect(),
					values: leaf.values[..m].iter().cloned().collect(),
				};
				(leaf.keys[m - 1].clone(), Bucket::Leaf(low))
			}
			Bucket::Inner(ref inner) => {
				let low = InnerBucket::from_parts(
					inner.keys[..m - 1].iter().cloned().collect(),
					inner.children[..m - 1].iter().cloned().collect(),
					Arc::clone(&inner.children[m - 1]),
				);
				(inner.keys[m - 1].clone(), Bucket::Inner(low))
			}
		}
	}

	/// The second half of a full bucket.
	pub(crate) fn top_half(&self) -> Self {
		let m = S / 2;
		match self {
			Bucket::Leaf(ref leaf) => Bucket::Leaf(LeafBucket {
				keys: leaf.keys[m..].iter().cloned().collect(),
				values: leaf.values[m..].iter().cloned().collect(),
			}),
			Bucket::Inner(ref inner) => Bucket::Inner(InnerBucket::from_parts(
				inner.keys[m..].iter().cloned().collect(),
				inner.children[m..].iter().cloned().collect(),
				Arc::clone(&inner.greater),
			)),
		}
	}

	/// Inserts a key that is not yet present.
	///
	/// The caller guarantees this bucket is not full. Any full child on the
	/// descent path is split before descending into it, so every level below
	/// also has room and no second pass is needed.
	pub(crate) fn insert(&self, key: K, value: V) -> Self {
		match self {
			Bucket::Leaf(ref leaf) => {
				let (pos, exact) = leaf.position_for(&key);
				debug_assert!(!exact, "insert() called with a key already present");
				Bucket::Leaf(leaf.inserted(pos, key, value))
			}
			Bucket::Inner(ref inner) => {
				let mut next = inner.clone();
				let (mut pos, _) = next.position_for(&key);
				if next.child(pos).is_full() {
					next.split_child(pos);
					if key > next.keys[pos] {
						pos += 1;
					}
				}
				let child = next.child(pos).insert(key, value);
				next.set_child(pos, Arc::new(child));
				next.total += 1;
				Bucket::Inner(next)
			}
		}
	}

	/// Replaces the value of a key that is already present. Only the path to
	/// the owning leaf is copied.
	pub(crate) fn update<Q>(&self, key: &Q, value: V) -> Self
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		match self {
			Bucket::Leaf(ref leaf) => {
				let (pos, _) = leaf.position_for(key);
				let mut values = leaf.values.clone();
				values[pos] = value;
				Bucket::Leaf(LeafBucket {
					keys: leaf.keys.clone(),
					values,
				})
			}
			Bucket::Inner(ref inner) => {
				let (pos, _) = inner.position_for(key);
				let child = inner.child(pos).update(key, value);
				let mut next = inner.clone();
				next.set_child(pos, Arc::new(child));
				Bucket::Inner(next)
			}
		}
	}
}

// ===========================================================================
// Leaf Bucket
// ===========================================================================

/// A leaf bucket: parallel arrays of keys and values, keys strictly increasing.
#[derive(Clone)]
pub(crate) struct LeafBucket<K, V, const S: usize> {
	/// Sorted keys.
	pub(crate) keys: SmallVec<[K; S]>,
	/// Values corresponding to keys (same index).
	pub(crate) values: SmallVec<[V; S]>,
}

impl<K: fmt::Debug, V: fmt::Debug, const S: usize> fmt::Debug for LeafBucket<K, V, S> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LeafBucket").field("keys", &self.keys).field("values", &self.values).finish()
	}
}

impl<K, V, const S: usize> FromIterator<(K, V)> for LeafBucket<K, V, S> {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		let (keys, values) = iter.into_iter().unzip();
		LeafBucket {
			keys,
			values,
		}
	}
}

impl<K, V, const S: usize> LeafBucket<K, V, S> {
	#[inline]
	pub(crate) fn position_for<Q>(&self, key: &Q) -> (usize, bool)
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		search(&self.keys, key)
	}

	/// Returns references to the key and value at the given position.
	#[inline]
	pub(crate) fn kv_at(&self, pos: usize) -> (&K, &V) {
		(&self.keys[pos], &self.values[pos])
	}
}

impl<K: Clone, V: Clone, const S: usize> LeafBucket<K, V, S> {
	/// A copy of this leaf with `(key, value)` inserted at `pos`.
	pub(crate) fn inserted(&self, pos: usize, key: K, value: V) -> Self {
		let mut next = self.clone();
		next.keys.insert(pos, key);
		next.values.insert(pos, value);
		next
	}

	/// A copy of this leaf without the pair at `pos`.
	pub(crate) fn removed(&self, pos: usize) -> Self {
		let mut next = self.clone();
		next.keys.remove(pos);
		next.values.remove(pos);
		next
	}
}

// ===========================================================================
// Inner Bucket
// ===========================================================================

/// An inner bucket: `count` separator/child slots plus the `greater` child.
///
/// # Structure
///
/// ```text
/// keys:     [  k0  |  k1  | ... | k(n-1) ]
/// children: [  c0  |  c1  | ... | c(n-1) ]   greater
///              │      │             │           │
///           ≤ k0   ≤ k1  ...     ≤ k(n-1)    > k(n-1)
/// ```
///
/// `total` caches the number of pairs in the whole subtree.
#[derive(Clone)]
pub(crate) struct InnerBucket<K, V, const S: usize> {
	/// Sorted separator keys; `keys[i]` is the greatest key under `children[i]`.
	pub(crate) keys: SmallVec<[K; S]>,
	/// Child buckets, one per separator.
	pub(crate) children: SmallVec<[Child<K, V, S>; S]>,
	/// Child holding every key greater than the last separator.
	pub(crate) greater: Child<K, V, S>,
	/// Number of pairs in this subtree.
	pub(crate) total: usize,
}

impl<K: fmt::Debug, V: fmt::Debug, const S: usize> fmt::Debug for InnerBucket<K, V, S> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("InnerBucket")
			.field("keys", &self.keys)
			.field("children", &self.children)
			.field("greater", &self.greater)
			.field("total", &self.total)
			.finish()
	}
}

impl<K, V, const S: usize> InnerBucket<K, V, S> {
	/// Builds an inner bucket, summing the children's totals.
	pub(crate) fn from_parts(
		keys: SmallVec<[K; S]>,
		children: SmallVec<[Child<K, V, S>; S]>,
		greater: Child<K, V, S>,
	) -> Self {
		let total = children.iter().map(|c| c.total()).sum::<usize>() + greater.total();
		InnerBucket {
			keys,
			children,
			greater,
			total,
		}
	}

	#[inline]
	pub(crate) fn position_for<Q>(&self, key: &Q) -> (usize, bool)
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		search(&self.keys, key)
	}

	/// The child at `pos`; `pos == keys.len()` selects `greater`.
	#[inline]
	pub(crate) fn child(&self, pos: usize) -> &Child<K, V, S> {
		self.children.get(pos).unwrap_or(&self.greater)
	}

	/// Replaces the child at `pos`; `pos == keys.len()` replaces `greater`.
	#[inline]
	pub(crate) fn set_child(&mut self, pos: usize, child: Child<K, V, S>) {
		match self.children.get_mut(pos) {
			Some(slot) => *slot = child,
			None => self.greater = child,
		}
	}
}

impl<K: Ord + Clone, V: Clone, const S: usize> InnerBucket<K, V, S> {
	/// Splits the full child at `pos` in place: the lower half is spliced in
	/// as a new slot at `pos`, and the upper half takes over the old slot,
	/// which has moved to `pos + 1`.
	pub(crate) fn split_child(&mut self, pos: usize) {
		let child = Arc::clone(self.child(pos));
		let (separator, low) = child.low_half();
		let top = child.top_half();
		self.keys.insert(pos, separator);
		self.children.insert(pos, Arc::new(low));
		self.set_child(pos + 1, Arc::new(top));
	}
}
