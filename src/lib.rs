//! # Bstar: A Persistent Copy-on-Write B*-Tree Dictionary
//!
//! This crate provides an immutable ordered dictionary. Every update returns a
//! new version of the dictionary and leaves the version it started from
//! untouched, so snapshots cost nothing to keep and a reader can never observe
//! a half-applied write.
//!
//! ## Design Overview
//!
//! ### Key Concepts
//!
//! **Path Copying**: An update allocates new buckets only along the path from
//! the affected leaf to the root. Every other subtree is shared, through
//! reference-counted handles, between the old and the new version. Dropping
//! the last version that refers to a bucket frees it.
//!
//! **Eager Splitting**: On insert, any full bucket met on the way down is split
//! before the descent continues. The bucket below therefore always has room
//! and an insert never has to walk back up to finish a split.
//!
//! **Level Rebuilding**: On removal, a child that drops under minimum fill
//! makes its parent rebuild the whole level: the parent's entries are
//! flattened and cut again into well-filled buckets. No sibling borrowing or
//! pairwise merging takes place.
//!
//! **Bookmarks**: A [`Bookmark`] is an immutable cursor. Advancing it yields a
//! new bookmark, and any bookmark can be kept, forked or resumed later, even
//! after the dictionary it came from has moved on.
//!
//! ### Tree Structure
//!
//! ```text
//!     version 1                     version 2 = version 1 + (7, g)
//!   ┌───────────┐                       ┌───────────┐
//!   │ [ 3 | 5 ] │                       │ [ 3 | 5 ] │   <- new root
//!   └─┬───┬───┬─┘                       └─┬───┬───┬─┘
//!     │   │   └──────────┐      ┌─────────┘   │   └──────┐
//!     │   └───────────┐  │      │  ┌──────────┘          │
//!     ▼               ▼  ▼      ▼  ▼                     ▼
//!  ┌───────┐     ┌───────┐ ┌─────────┐             ┌───────────┐
//!  │ 1 2 3 │     │ 4 5   │ │ 6 8 9   │             │ 6 7 8 9   │ <- new leaf
//!  └───────┘     └───────┘ └─────────┘             └───────────┘
//!   shared        shared    version 1 only
//! ```
//!
//! ## Basic Usage
//!
//! ```
//! use bstar::Dict;
//!
//! let empty: Dict<&str, i32> = Dict::new();
//! let one = empty.add("a", 1);
//! let two = one.add("b", 2);
//!
//! // Earlier versions are unaffected
//! assert!(empty.is_empty());
//! assert_eq!(one.len(), 1);
//! assert_eq!(two.lookup(&"b"), Ok(&2));
//!
//! // Removing the last entry gives back the canonical empty dictionary
//! assert_eq!(one.remove(&"a"), Dict::EMPTY);
//!
//! // Ordered traversal
//! let pairs: Vec<_> = two.iter().collect();
//! assert_eq!(pairs, [(&"a", &1), (&"b", &2)]);
//! ```
//!
//! ## Thread Safety
//!
//! A dictionary is a value. It can be cloned cheaply, sent to other threads
//! and read concurrently without locks whenever `K` and `V` are `Send + Sync`.
//! Two threads deriving new versions from the same one simply end up with two
//! independent versions; reconciling them is up to the caller.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Index, Sub};
use std::sync::Arc;

use tracing::trace;

pub mod bookmark;
pub mod error;
pub mod iter;

mod bucket;
mod rebuild;

pub use bookmark::Bookmark;
pub use error::{Error, Result};
pub use iter::Iter;

use bucket::Bucket;

// ---------------------------------------------------------------------------
// Configuration Constants
// ---------------------------------------------------------------------------

/// Default bucket capacity.
///
/// Each leaf holds up to `DEFAULT_SIZE` pairs and each inner bucket up to
/// `DEFAULT_SIZE` separators (`DEFAULT_SIZE + 1` children).
pub const DEFAULT_SIZE: usize = 8;

// ---------------------------------------------------------------------------
// Public Type Aliases
// ---------------------------------------------------------------------------

/// A dictionary with the default bucket capacity.
///
/// Use [`GenericDict`] directly to pick another (even, at least 4) capacity.
pub type Dict<K, V> = GenericDict<K, V, DEFAULT_SIZE>;

// ---------------------------------------------------------------------------
// Core Dictionary Structure
// ---------------------------------------------------------------------------

/// A persistent ordered dictionary with bucket capacity `S`.
///
/// # Type Parameters
///
/// - `K`: The key type. Mutating operations require `Ord + Clone`.
/// - `V`: The value type. Mutating operations require `Clone`.
/// - `S`: Bucket capacity. Must be even and at least 4; other values are
///   rejected at compile time when a dictionary is built.
///
/// # Keys Without a Value
///
/// A dictionary that needs an "absent" key can use `Option<K>` keys.
/// `None` sorts before every `Some`, so it is always the first entry.
///
/// # Example
///
/// ```
/// use bstar::GenericDict;
///
/// let dict: GenericDict<u32, char, 4> = (0..26).map(|i| (i, (b'a' + i as u8) as char)).collect();
/// assert_eq!(dict.get(&25), Some(&'z'));
/// assert!(dict.height() > 1);
/// dict.assert_invariants();
/// ```
pub struct GenericDict<K, V, const S: usize> {
	root: Option<Arc<Bucket<K, V, S>>>,
	len: usize,
}

impl<K, V, const S: usize> GenericDict<K, V, S> {
	const VALID_SIZE: () = assert!(S >= 4 && S % 2 == 0, "bucket size must be even and at least 4");

	/// The empty dictionary. It holds no allocation.
	pub const EMPTY: Self = GenericDict {
		root: None,
		len: 0,
	};

	/// Creates an empty dictionary.
	pub const fn new() -> Self {
		let () = Self::VALID_SIZE;
		Self::EMPTY
	}

	fn from_root(root: Bucket<K, V, S>) -> Self {
		let len = root.total();
		GenericDict {
			root: Some(Arc::new(root)),
			len,
		}
	}

	/// Number of entries.
	#[inline]
	pub fn len(&self) -> usize {
		self.len
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	/// Number of levels, counting the leaves; 0 for an empty dictionary.
	pub fn height(&self) -> usize {
		let mut height = 0;
		let mut bucket = self.root.as_deref();
		while let Some(b) = bucket {
			height += 1;
			bucket = b.child(0).map(Arc::as_ref);
		}
		height
	}

	/// Returns a reference to the value for `key`, or `None` if absent.
	pub fn get<Q>(&self, key: &Q) -> Option<&V>
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		self.root.as_deref()?.get(key)
	}

	/// Returns a reference to the value for `key`.
	///
	/// # Errors
	///
	/// Returns [`Error::NotFound`] if the dictionary is empty or does not
	/// contain `key`.
	pub fn lookup<Q>(&self, key: &Q) -> Result<&V>
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		self.get(key).ok_or(Error::NotFound)
	}

	/// Returns `true` if the dictionary contains `key`.
	pub fn contains<Q>(&self, key: &Q) -> bool
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		self.root.as_deref().is_some_and(|root| root.contains(key))
	}

	/// A bookmark on the smallest key, or `None` if the dictionary is empty.
	pub fn first(&self) -> Option<Bookmark<K, V, S>> {
		self.root.as_ref().map(Bookmark::first)
	}

	/// A bookmark on the greatest key, or `None` if the dictionary is empty.
	pub fn last(&self) -> Option<Bookmark<K, V, S>> {
		self.root.as_ref().map(Bookmark::last)
	}

	/// A bookmark on the first key greater than or equal to `key`.
	///
	/// Returns `None` if the dictionary is empty or every key is smaller
	/// than `key`.
	pub fn position_at<Q>(&self, key: &Q) -> Option<Bookmark<K, V, S>>
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		self.root.as_ref().and_then(|root| Bookmark::seek(root, key))
	}

	/// Borrowed iterator over the entries in ascending key order.
	pub fn iter(&self) -> Iter<'_, K, V, S> {
		Iter::new(self.root.as_deref(), self.len)
	}

	/// Returns `true` if both dictionaries are the same version, that is they
	/// share the same root bucket (or are both empty).
	pub fn ptr_eq(&self, other: &Self) -> bool {
		match (&self.root, &other.root) {
			(Some(a), Some(b)) => Arc::ptr_eq(a, b),
			(None, None) => true,
			_ => false,
		}
	}
}

// ---------------------------------------------------------------------------
// Versioned Updates
// ---------------------------------------------------------------------------

impl<K: Ord + Clone, V: Clone, const S: usize> GenericDict<K, V, S> {
	/// Returns a new version with `key` mapped to `value`.
	///
	/// If `key` is already present only its value changes and the new version
	/// has the same shape. Otherwise the pair is inserted, splitting full
	/// buckets on the way down; a full root is split first, adding a level.
	#[must_use]
	pub fn add(&self, key: K, value: V) -> Self {
		let () = Self::VALID_SIZE;
		let Some(root) = self.root.as_deref() else {
			return Self::from_root(Bucket::singleton(key, value));
		};
		if root.contains(&key) {
			return GenericDict {
				root: Some(Arc::new(root.update(&key, value))),
				len: self.len,
			};
		}
		let root = if root.is_full() {
			trace!(height = self.height() + 1, "splitting full root");
			root.split().insert(key, value)
		} else {
			root.insert(key, value)
		};
		GenericDict {
			root: Some(Arc::new(root)),
			len: self.len + 1,
		}
	}

	/// Returns a new version without `key`.
	///
	/// Removing an absent key returns this same version. Removing the last
	/// entry returns [`EMPTY`](Self::EMPTY).
	#[must_use]
	pub fn remove<Q>(&self, key: &Q) -> Self
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		let Some(root) = self.root.as_deref() else {
			return self.clone();
		};
		if !root.contains(key) {
			return self.clone();
		}
		if self.len == 1 {
			return Self::EMPTY;
		}
		let mut root = Arc::new(root.remove(key));
		while let Some(only) = root.sole_child().cloned() {
			trace!(total = only.total(), "collapsing root");
			root = only;
		}
		GenericDict {
			root: Some(root),
			len: self.len - 1,
		}
	}

	/// Merges two dictionaries into a new one. On equal keys the value from
	/// `other` wins.
	///
	/// Both inputs are walked in order and the result is built by repeated
	/// [`add`](Self::add), so it is a freshly balanced tree sharing nothing
	/// with either input.
	#[must_use]
	pub fn merge(&self, other: &Self) -> Self {
		let mut left = self.iter().peekable();
		let mut right = other.iter().peekable();
		let mut merged = Self::new();
		loop {
			let next = match (left.peek(), right.peek()) {
				(Some((lk, _)), Some((rk, _))) => match lk.cmp(rk) {
					Ordering::Less => left.next(),
					Ordering::Greater => right.next(),
					Ordering::Equal => {
						left.next();
						right.next()
					}
				},
				(Some(_), None) => left.next(),
				(None, Some(_)) => right.next(),
				(None, None) => None,
			};
			let Some((key, value)) = next else {
				return merged;
			};
			merged = merged.add(key.clone(), value.clone());
		}
	}

	/// All entries in ascending key order.
	#[doc(alias = "to_array")]
	pub fn to_vec(&self) -> Vec<(K, V)> {
		self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
	}

	/// Builds a dictionary by adding each pair in turn. Later pairs win over
	/// earlier ones with the same key.
	pub fn from_pairs<I>(pairs: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
	{
		pairs.into_iter().fold(Self::new(), |dict, (key, value)| dict.add(key, value))
	}
}

// ---------------------------------------------------------------------------
// Trait Implementations
// ---------------------------------------------------------------------------

impl<K, V, const S: usize> Default for GenericDict<K, V, S> {
	fn default() -> Self {
		Self::new()
	}
}

impl<K, V, const S: usize> Clone for GenericDict<K, V, S> {
	fn clone(&self) -> Self {
		GenericDict {
			root: self.root.clone(),
			len: self.len,
		}
	}
}

impl<K: fmt::Debug, V: fmt::Debug, const S: usize> fmt::Debug for GenericDict<K, V, S> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_map().entries(self.iter()).finish()
	}
}

impl<K: PartialEq, V: PartialEq, const S: usize> PartialEq for GenericDict<K, V, S> {
	fn eq(&self, other: &Self) -> bool {
		self.len == other.len && (self.ptr_eq(other) || self.iter().eq(other.iter()))
	}
}

impl<K: Eq, V: Eq, const S: usize> Eq for GenericDict<K, V, S> {}

impl<K: Ord + Clone, V: Clone, const S: usize> FromIterator<(K, V)> for GenericDict<K, V, S> {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		Self::from_pairs(iter)
	}
}

impl<K, V, Q, const S: usize> Index<&Q> for GenericDict<K, V, S>
where
	K: Borrow<Q>,
	Q: ?Sized + Ord,
{
	type Output = V;

	/// # Panics
	///
	/// Panics if the key is not present.
	fn index(&self, key: &Q) -> &V {
		self.get(key).expect("no entry found for key")
	}
}

/// `&dict + (key, value)` is [`GenericDict::add`].
impl<K: Ord + Clone, V: Clone, const S: usize> Add<(K, V)> for &GenericDict<K, V, S> {
	type Output = GenericDict<K, V, S>;

	fn add(self, (key, value): (K, V)) -> Self::Output {
		GenericDict::add(self, key, value)
	}
}

/// `&a + &b` is [`GenericDict::merge`].
impl<K: Ord + Clone, V: Clone, const S: usize> Add<&GenericDict<K, V, S>> for &GenericDict<K, V, S> {
	type Output = GenericDict<K, V, S>;

	fn add(self, other: &GenericDict<K, V, S>) -> Self::Output {
		self.merge(other)
	}
}

/// `&dict - &key` is [`GenericDict::remove`].
impl<K, V, Q, const S: usize> Sub<&Q> for &GenericDict<K, V, S>
where
	K: Ord + Clone + Borrow<Q>,
	V: Clone,
	Q: ?Sized + Ord,
{
	type Output = GenericDict<K, V, S>;

	fn sub(self, key: &Q) -> Self::Output {
		self.remove(key)
	}
}

// ===========================================================================
// Validation
// ===========================================================================

impl<K: Ord + fmt::Debug, V, const S: usize> GenericDict<K, V, S> {
	/// Validates the structure of this version. Panics with diagnostic info if
	/// any invariant is violated.
	///
	/// # Invariants Checked
	///
	/// 1. Height consistency: all leaves at the same depth
	/// 2. Key ordering: keys strictly increasing within and across buckets
	/// 3. Fill: no bucket over capacity, no non-root bucket under minimum fill
	/// 4. Separators: each separator is the greatest key of its child
	/// 5. Totals: every inner total is the sum of its children's totals
	/// 6. Length: `len()` equals the number of pairs in the tree
	pub fn assert_invariants(&self) {
		let Some(root) = self.root.as_deref() else {
			assert_eq!(self.len, 0, "Empty dict reports len {}", self.len);
			return;
		};
		let height = self.height();
		let total = Self::validate_bucket(root, 0, height, None, None);
		assert_eq!(total, self.len, "Tree holds {} pairs but len is {}", total, self.len);
	}

	/// Recursively validates a bucket and returns the number of pairs under it.
	///
	/// `lower` is exclusive, `upper` inclusive; `None` means unbounded.
	fn validate_bucket(
		bucket: &Bucket<K, V, S>,
		level: usize,
		height: usize,
		lower: Option<&K>,
		upper: Option<&K>,
	) -> usize {
		let keys = bucket.keys();
		assert!(keys.len() <= S, "Bucket at level {} has {} slots (capacity {})", level, keys.len(), S);
		for pair in keys.windows(2) {
			assert!(
				pair[0] < pair[1],
				"Keys not sorted at level {}: {:?} >= {:?}",
				level,
				pair[0],
				pair[1]
			);
		}
		if let Some(lower) = lower {
			for key in keys {
				assert!(key > lower, "Key {:?} not greater than lower bound {:?}", key, lower);
			}
		}
		if let Some(upper) = upper {
			for key in keys {
				assert!(key <= upper, "Key {:?} not <= upper bound {:?}", key, upper);
			}
		}
		if level > 0 {
			assert!(!bucket.is_underfull(), "Underfull bucket at level {}: {:?}", level, keys);
		}

		match bucket {
			Bucket::Leaf(leaf) => {
				assert_eq!(level + 1, height, "Found leaf at level {} (height={})", level, height);
				assert!(!leaf.keys.is_empty(), "Empty leaf at level {}", level);
				assert_eq!(
					leaf.keys.len(),
					leaf.values.len(),
					"Leaf keys.len() {} != values.len() {}",
					leaf.keys.len(),
					leaf.values.len()
				);
				leaf.keys.len()
			}
			Bucket::Inner(inner) => {
				assert!(level + 1 < height, "Found inner bucket at leaf level {} (height={})", level, height);
				assert_eq!(
					inner.keys.len(),
					inner.children.len(),
					"Inner keys.len() {} != children.len() {}",
					inner.keys.len(),
					inner.children.len()
				);
				if level == 0 {
					assert!(!inner.keys.is_empty(), "Root inner bucket has a single child");
				}

				let mut total = 0;
				let mut child_lower = lower;
				for (key, child) in inner.keys.iter().zip(&inner.children) {
					assert_eq!(
						child.max_key(),
						Some(key),
						"Separator {:?} at level {} is not the greatest key of its child",
						key,
						level
					);
					total += Self::validate_bucket(child, level + 1, height, child_lower, Some(key));
					child_lower = Some(key);
				}
				total += Self::validate_bucket(&inner.greater, level + 1, height, child_lower, upper);

				assert_eq!(inner.total, total, "Inner total {} at level {} != {}", inner.total, level, total);
				total
			}
		}
	}
}
