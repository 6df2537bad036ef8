use std::io::Result as IoResult;
use std::sync::Arc;

use crate::RandomAccess;

/// An in-memory file, backed by a shared immutable byte buffer.
///
/// Used by `stratum-sstable` and `stratum-core` tests to build small
/// synthetic SSTs without touching disk.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    contents: Arc<Vec<u8>>,
}

impl MemoryFile {
    #[must_use]
    pub fn new(contents: Vec<u8>) -> Self {
        Self {
            contents: Arc::new(contents),
        }
    }
}

impl RandomAccess for MemoryFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> IoResult<usize> {
        let Ok(offset) = usize::try_from(offset) else {
            return Ok(0);
        };

        if offset >= self.contents.len() {
            return Ok(0);
        }

        let available = &self.contents[offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }

    fn len(&self) -> IoResult<u64> {
        Ok(self.contents.len() as u64)
    }
}
