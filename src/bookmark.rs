//! Bookmarks: immutable cursors over a dictionary.
//!
//! A [`Bookmark`] is a persistent stack of frames, one per level, from the
//! current leaf up to the root. Each frame records a bucket and the slot the
//! traversal is at in that bucket. Moving never mutates a bookmark: `next()`
//! and `prev()` build a new top of stack and share every unchanged frame with
//! the bookmark they started from, so a traversal can be resumed or forked
//! from any earlier position.
//!
//! ```text
//! frame (leaf)   ──► [ 5 6 7 8 ]   pos = 2   (key 7)
//!      │
//! parent (inner) ──► [ 4 | 8 ]     pos = 1
//!      │
//!    None
//! ```
//!
//! Bookmarks hold their buckets through shared handles. A bookmark stays
//! valid, and keeps describing the version it was taken from, after the
//! dictionary it came from has been updated or dropped.

use crate::bucket::{Bucket, Child};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// One level of a bookmark's stack.
struct Frame<K, V, const S: usize> {
	bucket: Child<K, V, S>,
	pos: usize,
	parent: Option<Arc<Frame<K, V, S>>>,
}

impl<K, V, const S: usize> Frame<K, V, S> {
	fn new(bucket: Child<K, V, S>, pos: usize, parent: Option<Arc<Self>>) -> Arc<Self> {
		Arc::new(Frame {
			bucket,
			pos,
			parent,
		})
	}
}

/// A position on one entry of a dictionary, in key order.
///
/// Obtained from [`GenericDict::first`](crate::GenericDict::first),
/// [`GenericDict::last`](crate::GenericDict::last) or
/// [`GenericDict::position_at`](crate::GenericDict::position_at).
///
/// # Example
///
/// ```
/// use bstar::Dict;
///
/// let dict: Dict<i32, &str> = [(1, "a"), (2, "b"), (3, "c")].into_iter().collect();
///
/// let first = dict.first().unwrap();
/// let second = first.next().unwrap();
/// assert_eq!(second.key(), &2);
/// assert_eq!(second.position(), 1);
///
/// // The first bookmark is unaffected and can be advanced again
/// assert_eq!(first.next().unwrap().value(), &"b");
/// ```
pub struct Bookmark<K, V, const S: usize> {
	frame: Arc<Frame<K, V, S>>,
}

impl<K, V, const S: usize> Clone for Bookmark<K, V, S> {
	fn clone(&self) -> Self {
		Bookmark {
			frame: Arc::clone(&self.frame),
		}
	}
}

impl<K: fmt::Debug, V: fmt::Debug, const S: usize> fmt::Debug for Bookmark<K, V, S> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Bookmark")
			.field("key", self.key())
			.field("value", self.value())
			.field("position", &self.position())
			.finish()
	}
}

impl<K, V, const S: usize> Bookmark<K, V, S> {
	/// Bookmark on the smallest key under `root`.
	pub(crate) fn first(root: &Child<K, V, S>) -> Self {
		Bookmark {
			frame: descend_first(Arc::clone(root), None),
		}
	}

	/// Bookmark on the largest key under `root`.
	pub(crate) fn last(root: &Child<K, V, S>) -> Self {
		Bookmark {
			frame: descend_last(Arc::clone(root), None),
		}
	}

	/// Bookmark on the first key `>= key`, or `None` if every key is smaller.
	pub(crate) fn seek<Q>(root: &Child<K, V, S>, key: &Q) -> Option<Self>
	where
		K: Borrow<Q>,
		Q: ?Sized + Ord,
	{
		let mut bucket = Arc::clone(root);
		let mut parent = None;
		loop {
			let (pos, _) = bucket.position_for(key);
			match bucket.child(pos).cloned() {
				Some(child) => {
					parent = Some(Frame::new(bucket, pos, parent));
					bucket = child;
				}
				None if pos < bucket.count() => {
					return Some(Bookmark {
						frame: Frame::new(bucket, pos, parent),
					});
				}
				None => {
					// Past the end of this leaf: the answer starts the next one
					let last = bucket.count().checked_sub(1)?;
					return Bookmark {
						frame: Frame::new(bucket, last, parent),
					}
					.next();
				}
			}
		}
	}

	/// The key at this position.
	#[inline]
	pub fn key(&self) -> &K {
		self.pair().0
	}

	/// The value at this position.
	#[inline]
	pub fn value(&self) -> &V {
		self.pair().1
	}

	/// The key and value at this position.
	#[inline]
	pub fn pair(&self) -> (&K, &V) {
		self.frame.bucket.as_leaf().kv_at(self.frame.pos)
	}

	/// Advances to the next key in ascending order, or `None` at the end.
	#[allow(clippy::should_implement_trait)]
	pub fn next(&self) -> Option<Self> {
		let leaf = &self.frame;
		if leaf.pos + 1 < leaf.bucket.count() {
			return Some(Bookmark {
				frame: Frame::new(Arc::clone(&leaf.bucket), leaf.pos + 1, leaf.parent.clone()),
			});
		}
		// Pop exhausted levels; an inner bucket has `count + 1` children
		let mut ancestor = leaf.parent.as_ref();
		while let Some(frame) = ancestor {
			let pos = frame.pos + 1;
			if pos <= frame.bucket.count() {
				if let Some(child) = frame.bucket.child(pos) {
					let stepped = Frame::new(Arc::clone(&frame.bucket), pos, frame.parent.clone());
					return Some(Bookmark {
						frame: descend_first(Arc::clone(child), Some(stepped)),
					});
				}
			}
			ancestor = frame.parent.as_ref();
		}
		None
	}

	/// Steps back to the previous key in ascending order, or `None` at the
	/// start.
	pub fn prev(&self) -> Option<Self> {
		let leaf = &self.frame;
		if leaf.pos > 0 {
			return Some(Bookmark {
				frame: Frame::new(Arc::clone(&leaf.bucket), leaf.pos - 1, leaf.parent.clone()),
			});
		}
		let mut ancestor = leaf.parent.as_ref();
		while let Some(frame) = ancestor {
			if frame.pos > 0 {
				let pos = frame.pos - 1;
				if let Some(child) = frame.bucket.child(pos) {
					let stepped = Frame::new(Arc::clone(&frame.bucket), pos, frame.parent.clone());
					return Some(Bookmark {
						frame: descend_last(Arc::clone(child), Some(stepped)),
					});
				}
			}
			ancestor = frame.parent.as_ref();
		}
		None
	}

	/// Zero-based ordinal of this position within the dictionary.
	///
	/// Sums, level by level, the totals of every slot before the current
	/// one. This walks the stack and is not cached.
	#[doc(alias = "ordinal_position")]
	pub fn position(&self) -> usize {
		let mut ordinal = 0;
		let mut frame = Some(&self.frame);
		while let Some(f) = frame {
			ordinal += (0..f.pos).map(|i| f.bucket.slot_total(i)).sum::<usize>();
			frame = f.parent.as_ref();
		}
		ordinal
	}
}

/// Pushes frames on slot 0 of every level from `bucket` down to a leaf.
fn descend_first<K, V, const S: usize>(
	mut bucket: Child<K, V, S>,
	mut parent: Option<Arc<Frame<K, V, S>>>,
) -> Arc<Frame<K, V, S>> {
	loop {
		let child = bucket.child(0).cloned();
		let frame = Frame::new(bucket, 0, parent);
		match child {
			Some(child) => {
				bucket = child;
				parent = Some(frame);
			}
			None => return frame,
		}
	}
}

/// Pushes frames on the last slot of every level (`greater` for inner
/// buckets) from `bucket` down to a leaf.
fn descend_last<K, V, const S: usize>(
	mut bucket: Child<K, V, S>,
	mut parent: Option<Arc<Frame<K, V, S>>>,
) -> Arc<Frame<K, V, S>> {
	loop {
		let pos = match *bucket {
			Bucket::Leaf(_) => bucket.count().saturating_sub(1),
			Bucket::Inner(_) => bucket.count(),
		};
		let child = bucket.child(pos).cloned();
		let frame = Frame::new(bucket, pos, parent);
		match child {
			Some(child) => {
				bucket = child;
				parent = Some(frame);
			}
			None => return frame,
		}
	}
}
