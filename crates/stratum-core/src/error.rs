use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type for the merging iterator and its collaborators.
///
/// Wraps [`stratum_sstable::Error`] rather than duplicating its variants,
/// since every failure this crate can surface ultimately comes from a table
/// open, a positional read, or a decoded entry somewhere beneath the merge.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Table(#[from] stratum_sstable::Error),
}

impl Error {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Table(stratum_sstable::Error::NotFound))
    }
}
