mod comparator;
mod memindex;

pub mod error;
pub mod options;

#[cfg(test)]
mod test_utils;

pub use comparator::BytewiseComparator;
pub use memindex::{MemIndex, MemIndexCursor, MemIndexIter};
