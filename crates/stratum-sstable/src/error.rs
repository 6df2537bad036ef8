use std::io::Error as IoError;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds surfaced by the table cache and the learned read paths.
///
/// Mirrors the four error kinds called out for the read path: absence
/// (`NotFound`), open/read failure (`Io`), a decoded entry violating a format
/// invariant (`Corruption`), and use of an untrained model (`Invalid`).
#[derive(Error, Debug)]
pub enum Error {
    #[error("key not found")]
    NotFound,

    #[error("I/O error opening or reading a table file: {0}")]
    Io(#[from] IoError),

    #[error("corrupted table: {0}")]
    Corruption(String),

    #[error("invalid use of an untrained learned index: {0}")]
    Invalid(String),
}

impl Error {
    #[must_use]
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    /// Reconstructs an equivalent `Error` of the same variant.
    ///
    /// `std::io::Error` isn't `Clone`, so `Error` can't `#[derive(Clone)]`
    /// outright; this is needed to recover the original variant (`Io` vs.
    /// `Corruption` vs. ...) from the `Arc<Error>` that `moka::sync::Cache::
    /// try_get_with` hands back to every waiter on a failed init, rather than
    /// collapsing every failure into one kind and losing the distinction §7
    /// draws between a retryable `Io` failure and a fatal `Corruption`.
    #[must_use]
    pub fn clone_kind(&self) -> Self {
        match self {
            Self::NotFound => Self::NotFound,
            Self::Io(err) => Self::Io(IoError::new(err.kind(), err.to_string())),
            Self::Corruption(msg) => Self::Corruption(msg.clone()),
            Self::Invalid(msg) => Self::Invalid(msg.clone()),
        }
    }
}
