//! ELF64 image loading and serialisation.

pub mod parser;
pub mod writer;

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

pub use parser::{ElfError, ElfFile, ProgramHeader, SectionHeader};

/// Failure to bring an image into memory.
#[derive(Debug)]
pub enum LoadError {
    /// The file could not be read, or was empty.
    Io(io::Error),
    /// The bytes are not a supported ELF64 executable.
    Format(ElfError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "{e}"),
            LoadError::Format(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io(e) => Some(e),
            LoadError::Format(e) => Some(e),
        }
    }
}

impl From<io::Error> for LoadError {
    fn from(e: io::Error) -> Self {
        LoadError::Io(e)
    }
}

impl From<ElfError> for LoadError {
    fn from(e: ElfError) -> Self {
        LoadError::Format(e)
    }
}

/// Read the whole file at `path` and parse it.
pub fn load(path: impl AsRef<Path>) -> Result<ElfFile, LoadError> {
    let data = fs::read(path)?;
    if data.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "invalid file size").into());
    }
    Ok(ElfFile::parse(data)?)
}
