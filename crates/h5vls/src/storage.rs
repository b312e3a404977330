//! Backing bytes of an open file: an owned buffer or a read-only mapping.

use std::fs;
use std::io;
use std::path::Path;

pub(crate) enum FileData {
    Owned(Vec<u8>),
    #[cfg(feature = "mmap")]
    Mapped(memmap2::Mmap),
}

impl FileData {
    /// Map the file when the `mmap` feature is on, otherwise read it.
    pub(crate) fn open(path: &Path) -> io::Result<FileData> {
        #[cfg(feature = "mmap")]
        {
            let file = fs::File::open(path)?;
            // zero-length files cannot be mapped
            if file.metadata()?.len() == 0 {
                return Ok(FileData::Owned(Vec::new()));
            }
            // SAFETY: read-only mapping; the file must not be truncated while open.
            let map = unsafe { memmap2::Mmap::map(&file)? };
            Ok(FileData::Mapped(map))
        }
        #[cfg(not(feature = "mmap"))]
        {
            fs::read(path).map(FileData::Owned)
        }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        match self {
            FileData::Owned(v) => v,
            #[cfg(feature = "mmap")]
            FileData::Mapped(m) => m,
        }
    }

    pub(crate) fn is_mapped(&self) -> bool {
        match self {
            FileData::Owned(_) => false,
            #[cfg(feature = "mmap")]
            FileData::Mapped(_) => true,
        }
    }
}
