use std::fs::File;
use std::io::Result as IoResult;

use crate::RandomAccess;

/// A real on-disk file, read through the platform's positioned-read syscall.
#[derive(Debug)]
pub struct StdFile(File);

impl StdFile {
    #[must_use]
    pub fn new(file: File) -> Self {
        Self(file)
    }
}

#[cfg(unix)]
impl RandomAccess for StdFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> IoResult<usize> {
        use std::os::unix::fs::FileExt;
        FileExt::read_at(&self.0, buf, offset)
    }

    fn len(&self) -> IoResult<u64> {
        Ok(self.0.metadata()?.len())
    }
}

#[cfg(windows)]
impl RandomAccess for StdFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> IoResult<usize> {
        use std::os::windows::fs::FileExt;
        FileExt::seek_read(&self.0, buf, offset)
    }

    fn len(&self) -> IoResult<u64> {
        Ok(self.0.metadata()?.len())
    }
}
