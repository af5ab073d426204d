#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The key compares equal to one already in the list; nothing was changed.
    #[error("key already present in the skip list")]
    DuplicateKey,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
