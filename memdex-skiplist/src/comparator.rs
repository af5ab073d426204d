use std::cmp;

mod default_comparator;

pub mod prelude {
    #![allow(unused)]

    pub use super::Comparator;
    pub use super::default_comparator::DefaultComparator;
}

/// Total order over the keys of a skip list, fixed for the list's lifetime.
pub trait Comparator: Send + Sync + Clone {
    type Item;

    fn compare(&self, a: &Self::Item, b: &Self::Item) -> cmp::Ordering;
}
