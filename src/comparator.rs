use std::cmp;

use bytes::Bytes;
use memdex_skiplist::comparator::Comparator;

/// Lexicographic order over raw key bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct BytewiseComparator;

impl Comparator for BytewiseComparator {
    type Item = Bytes;

    fn compare(&self, a: &Bytes, b: &Bytes) -> cmp::Ordering {
        a[..].cmp(&b[..])
    }
}
