use std::{cmp, fmt, marker::PhantomData};

use super::Comparator;

/// Orders keys by their `Ord` implementation.
pub struct DefaultComparator<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> DefaultComparator<T> {
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Comparator for DefaultComparator<T>
where
    T: Ord,
{
    type Item = T;

    fn compare(&self, a: &Self::Item, b: &Self::Item) -> cmp::Ordering {
        a.cmp(b)
    }
}

impl<T> Default for DefaultComparator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for DefaultComparator<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for DefaultComparator<T> {}

impl<T> fmt::Debug for DefaultComparator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DefaultComparator")
    }
}
