use std::sync::Arc;

use memdex_skiplist::{arena, random::DEFAULT_SEED};

use crate::{
    MemIndex,
    error::{Error, Result},
};

const MAX_BLOCK_SIZE: usize = 1 << 30;

#[derive(Debug)]
pub struct IndexOptions {
    pub(crate) arena_block_size: usize,

    pub(crate) memory_limit: usize,

    pub(crate) seed: u64,
}

impl IndexOptions {
    pub fn arena_block_size(&self) -> usize {
        self.arena_block_size
    }

    pub fn memory_limit(&self) -> usize {
        self.memory_limit
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

#[derive(Debug, Clone)]
pub struct IndexOpenOptions {
    arena_block_size: usize,

    memory_limit: usize,

    seed: u64,
}

impl Default for IndexOpenOptions {
    fn default() -> Self {
        Self {
            arena_block_size: arena::DEFAULT_BLOCK_SIZE,
            memory_limit: 4 << 20,
            seed: DEFAULT_SEED,
        }
    }
}

impl IndexOpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size of each arena block, a multiple of 8 bytes
    pub fn arena_block_size(&mut self, size: usize) -> &mut Self {
        self.arena_block_size = size;
        self
    }

    /// Arena usage at which the index asks to be flushed
    pub fn memory_limit(&mut self, size: usize) -> &mut Self {
        self.memory_limit = size;
        self
    }

    /// Seed of the node height generator
    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = seed;
        self
    }

    pub fn build(&self) -> Result<Arc<IndexOptions>> {
        if self.arena_block_size == 0
            || self.arena_block_size % arena::ALIGN != 0
            || self.arena_block_size > MAX_BLOCK_SIZE
        {
            return Err(Error::InvalidOptions(format!(
                "arena block size {} must be a multiple of {} in (0, {}]",
                self.arena_block_size,
                arena::ALIGN,
                MAX_BLOCK_SIZE
            )));
        }

        if self.memory_limit == 0 {
            return Err(Error::InvalidOptions(
                "memory limit must be positive".to_string(),
            ));
        }

        let opts = IndexOptions {
            arena_block_size: self.arena_block_size,
            memory_limit: self.memory_limit,
            seed: self.seed,
        };
        Ok(Arc::new(opts))
    }

    pub fn open(&self) -> Result<MemIndex> {
        Ok(MemIndex::new(self.build()?))
    }
}
