//! A minimal positioned-read file abstraction.
//!
//! The learned read path (table cache, learned file reader, learned
//! compaction probe) only ever needs to read a bounded byte range at a known
//! offset; it never needs directory iteration, locking, or sequential
//! `Read`. Keeping the trait this small means a caller can plug in a real
//! file, a memory-mapped file, or (as used throughout this workspace's
//! tests) a purely in-memory byte buffer.

mod memory;
mod std_file;

pub use memory::MemoryFile;
pub use std_file::StdFile;

use std::io::{Error as IoError, ErrorKind, Result as IoResult};

/// A file that supports reading at arbitrary offsets without disturbing any shared cursor.
///
/// Implementations must be logically threadsafe: concurrent calls to
/// [`read_at`](RandomAccess::read_at) from different threads must behave as
/// if they were serialized, each reading exactly the bytes at its own
/// offset.
pub trait RandomAccess: Send + Sync {
    /// Read up to `buf.len()` bytes starting at `offset`, returning the number of bytes read.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> IoResult<usize>;

    /// Read exactly `buf.len()` bytes starting at `offset`.
    ///
    /// Retries on [`ErrorKind::Interrupted`]; returns
    /// [`ErrorKind::UnexpectedEof`] if the file ends before `buf` is filled.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> IoResult<()> {
        let mut bytes_read = 0_usize;

        while bytes_read < buf.len() {
            match self.read_at(offset + bytes_read as u64, &mut buf[bytes_read..]) {
                Ok(0) => break,
                Ok(n) => bytes_read += n,
                Err(ref err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }

        if bytes_read < buf.len() {
            Err(IoError::new(
                ErrorKind::UnexpectedEof,
                "file ended before the requested range was filled",
            ))
        } else {
            Ok(())
        }
    }

    /// The total size of the file in bytes.
    fn len(&self) -> IoResult<u64>;

    /// Whether the file is empty.
    fn is_empty(&self) -> IoResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl<T: RandomAccess + ?Sized> RandomAccess for &T {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> IoResult<usize> {
        (**self).read_at(offset, buf)
    }

    fn len(&self) -> IoResult<u64> {
        (**self).len()
    }
}
