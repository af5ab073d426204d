pub mod arena;
pub mod atomic_slot;
pub mod comparator;
pub mod error;
pub mod random;
pub mod skip_list;

pub use error::{Error, Result};

pub mod prelude {
    #![allow(unused)]

    pub use crate::arena::Arena;
    pub use crate::atomic_slot::AtomicSlot;
    pub use crate::comparator::prelude::*;
    pub use crate::random::RandomSource;
    pub use crate::skip_list::{BRANCHING, Cursor, Iter, MAX_HEIGHT, SkipList, Writer};
}
