//! Input file abstraction.
//!
//! Module images and their symbol companions are read through a [`File`], which abstracts
//! over where the bytes come from:
//!
//! - [`crate::file::physical::Physical`] - memory-mapped file on disk
//! - [`crate::file::memory::Memory`] - owned in-memory buffer
//!
//! Decoding happens on top of the raw bytes with [`crate::file::parser::Parser`], which reads
//! little-endian primitives and ECMA-335 compressed integers, and the matching writers in
//! [`crate::file::io`].
//!
//! # Examples
//!
//! ```rust
//! use dotpatch::File;
//!
//! let file = File::from_mem(vec![0x44, 0x50, 0x4D, 0x44])?;
//! assert_eq!(file.len(), 4);
//! assert_eq!(file.data_slice(1, 2)?, &[0x50, 0x4D]);
//! # Ok::<(), dotpatch::Error>(())
//! ```

pub mod io;
pub mod parser;

mod memory;
mod physical;

use std::path::Path;

use crate::{Error::Empty, Result};
use memory::Memory;
use physical::Physical;

/// Backend trait for file data sources.
pub trait Backend: Send + Sync {
    /// Returns a slice of the data at the given offset and length.
    ///
    /// # Errors
    ///
    /// Returns an error if the requested range is out of bounds.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;
}

/// A loaded input file.
pub struct File {
    data: Box<dyn Backend>,
}

impl File {
    /// Maps a file from disk.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped, and
    /// [`crate::Error::Empty`] for a zero-length file.
    pub fn from_file(file: &Path) -> Result<File> {
        let input = Physical::new(file)?;
        File::load(Box::new(input))
    }

    /// Wraps an in-memory buffer.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] for an empty buffer.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        File::load(Box::new(Memory::new(data)))
    }

    fn load(data: Box<dyn Backend>) -> Result<File> {
        if data.len() == 0 {
            return Err(Empty);
        }
        Ok(File { data })
    }

    /// Size of the input in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the input has no bytes. Never the case for a constructed [`File`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    /// The whole input.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// A bounds-checked slice of the input.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the input.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.data.data_slice(offset, len)
    }
}

impl std::fmt::Debug for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::Error;

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(File::from_mem(Vec::new()), Err(Error::Empty)));
    }

    #[test]
    fn from_disk() {
        let mut temp = tempfile::NamedTempFile::new().unwrap();
        temp.write_all(&[1, 2, 3, 4, 5]).unwrap();
        temp.flush().unwrap();

        let file = File::from_file(temp.path()).unwrap();
        assert_eq!(file.len(), 5);
        assert_eq!(file.data()[4], 5);
        assert!(file.data_slice(3, 3).is_err());
    }

    #[test]
    fn missing_file() {
        let result = File::from_file(Path::new("/definitely/not/here.dll"));
        assert!(matches!(result, Err(Error::FileError(_))));
    }
}
