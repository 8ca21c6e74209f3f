//! Borrowed iteration over a dictionary version.
//!
//! [`Iter`] walks the tree depth first with an explicit stack of
//! `(bucket, slot)` pairs borrowed from the dictionary. It is the cheap
//! counterpart of [`Bookmark`](crate::Bookmark): nothing is allocated per
//! step and nothing outlives the borrow, which suits `for` loops and
//! adapters. Use a bookmark when the position has to be stored, forked or
//! sent elsewhere.

use crate::bucket::Bucket;
use crate::GenericDict;
use smallvec::SmallVec;
use std::iter::FusedIterator;

/// In-order iterator over the entries of a [`GenericDict`].
///
/// Created by [`GenericDict::iter`].
pub struct Iter<'a, K, V, const S: usize> {
	/// One entry per level: the bucket and the next slot to visit in it.
	stack: SmallVec<[(&'a Bucket<K, V, S>, usize); 8]>,
	remaining: usize,
}

impl<'a, K, V, const S: usize> Iter<'a, K, V, S> {
	pub(crate) fn new(root: Option<&'a Bucket<K, V, S>>, len: usize) -> Self {
		Iter {
			stack: root.map(|root| (root, 0)).into_iter().collect(),
			remaining: len,
		}
	}
}

impl<K, V, const S: usize> Clone for Iter<'_, K, V, S> {
	fn clone(&self) -> Self {
		Iter {
			stack: self.stack.clone(),
			remaining: self.remaining,
		}
	}
}

impl<'a, K, V, const S: usize> Iterator for Iter<'a, K, V, S> {
	type Item = (&'a K, &'a V);

	fn next(&mut self) -> Option<Self::Item> {
		loop {
			let (bucket, pos) = self.stack.last_mut()?;
			let bucket: &'a Bucket<K, V, S> = *bucket;
			match bucket {
				Bucket::Leaf(leaf) if *pos < leaf.keys.len() => {
					let item = leaf.kv_at(*pos);
					*pos += 1;
					self.remaining -= 1;
					return Some(item);
				}
				Bucket::Inner(inner) if *pos <= inner.keys.len() => {
					let child: &'a Bucket<K, V, S> = inner.child(*pos);
					*pos += 1;
					self.stack.push((child, 0));
				}
				_ => {
					self.stack.pop();
				}
			}
		}
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		(self.remaining, Some(self.remaining))
	}
}

impl<K, V, const S: usize> ExactSizeIterator for Iter<'_, K, V, S> {}

impl<K, V, const S: usize> FusedIterator for Iter<'_, K, V, S> {}

impl<'a, K, V, const S: usize> IntoIterator for &'a GenericDict<K, V, S> {
	type Item = (&'a K, &'a V);
	type IntoIter = Iter<'a, K, V, S>;

	fn into_iter(self) -> Self::IntoIter {
		self.iter()
	}
}
