use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use bytes::Bytes;
use memdex_skiplist::{
    arena::Arena,
    random::seeded_source,
    skip_list::{Cursor, Iter, SkipList, Writer},
};
use parking_lot::Mutex;

use crate::{comparator::BytewiseComparator, error::Result, options::IndexOptions};

type List = SkipList<Bytes, BytewiseComparator>;

pub type MemIndexCursor<'a> = Cursor<'a, Bytes, BytewiseComparator>;
pub type MemIndexIter<'a> = Iter<'a, Bytes, BytewiseComparator>;

/// Byte-keyed index of one memtable generation.
///
/// Lookups and cursors never lock. Inserts from any number of threads are
/// funnelled through a mutex around the list's only writer.
pub struct MemIndex {
    list: Arc<List>,
    writer: Mutex<Writer<Bytes, BytewiseComparator>>,
    options: Arc<IndexOptions>,
    flush_reported: AtomicBool,
}

impl MemIndex {
    pub fn new(options: Arc<IndexOptions>) -> Self {
        let arena = Arena::with_block_size(options.arena_block_size());
        let list = SkipList::with_rng(BytewiseComparator, arena, seeded_source(options.seed()));
        let (list, writer) = list.into_shared();

        tracing::debug!(
            "mem index created, block size {}, memory limit {}",
            options.arena_block_size(),
            options.memory_limit()
        );

        Self {
            list,
            writer: Mutex::new(writer),
            options,
            flush_reported: AtomicBool::new(false),
        }
    }

    pub fn insert(&self, key: impl Into<Bytes>) -> Result<()> {
        let key = key.into();
        let mut writer = self.writer.lock();
        if let Err(err) = writer.insert(key.clone()) {
            tracing::debug!("reject key {:?}: {}", key, err);
            return Err(err.into());
        }
        drop(writer);

        tracing::trace!("insert key {:?}", key);
        Ok(())
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.list.contains(&Bytes::copy_from_slice(key))
    }

    pub fn cursor(&self) -> MemIndexCursor<'_> {
        self.list.cursor()
    }

    pub fn iter(&self) -> MemIndexIter<'_> {
        self.list.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn memory_usage(&self) -> usize {
        self.list.memory_usage()
    }

    /// The arena has reached the configured memory limit and the generation
    /// should be rolled over.
    pub fn should_flush(&self) -> bool {
        let usage = self.memory_usage();
        if usage < self.options.memory_limit() {
            return false;
        }

        if !self.flush_reported.swap(true, Ordering::Relaxed) {
            tracing::debug!(
                "mem index reached {} bytes, limit {}",
                usage,
                self.options.memory_limit()
            );
        }
        true
    }

    pub fn options(&self) -> &Arc<IndexOptions> {
        &self.options
    }
}
