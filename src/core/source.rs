//! Read-only byte view over an associative-memory dump

use crate::error::{AnalysisError, Result};
use memmap2::Mmap;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};

enum Backing {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

/// Immutable, randomly addressable view of one file.
///
/// Loaded once; every later stage only borrows `bytes()`.
pub struct ByteSource {
    backing: Backing,
    path: Option<PathBuf>,
}

impl ByteSource {
    /// Wrap bytes already in memory (synthetic files, tests).
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        check_len(bytes.len() as u64)?;
        Ok(ByteSource {
            backing: Backing::Owned(bytes),
            path: None,
        })
    }

    /// Memory-map a file read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let len = file.metadata()?.len();
        check_len(len)?;

        // Empty files cannot be mapped on every platform.
        let backing = if len == 0 {
            Backing::Owned(Vec::new())
        } else {
            // SAFETY: the map is read-only and the dump is not expected to
            // change underneath us during an analysis run.
            Backing::Mapped(unsafe { Mmap::map(&file)? })
        };

        tracing::debug!("Opened {:?} ({} bytes)", path.as_ref(), len);

        Ok(ByteSource {
            backing,
            path: Some(path.as_ref().to_path_buf()),
        })
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.backing {
            Backing::Owned(v) => v,
            Backing::Mapped(m) => m,
        }
    }

    pub fn len(&self) -> u32 {
        self.bytes().len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Bytes in `range`, or `OutOfBounds` if it leaves the file.
    pub fn slice(&self, range: Range<u32>) -> Result<&[u8]> {
        let len = self.len();
        if range.start > range.end || range.end > len {
            return Err(AnalysisError::OutOfBounds {
                offset: range.start,
                needed: range.end.saturating_sub(range.start),
                len,
            });
        }
        Ok(&self.bytes()[range.start as usize..range.end as usize])
    }

    /// SHA-256 of the whole file, hex encoded. Identifies a dump in reports.
    pub fn sha256_hex(&self) -> String {
        let digest = Sha256::digest(self.bytes());
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteSource")
            .field("path", &self.path)
            .field("len", &self.len())
            .finish()
    }
}

fn check_len(len: u64) -> Result<()> {
    if len > u32::MAX as u64 {
        return Err(AnalysisError::FileTooLarge(len));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_open_maps_file_contents() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"\x00\x00\x0a\x04Dear Sir").unwrap();
        file.flush().unwrap();

        let source = ByteSource::open(file.path()).unwrap();
        assert_eq!(source.len(), 12);
        assert_eq!(&source.bytes()[4..], b"Dear Sir");
        assert_eq!(source.path(), Some(file.path()));
    }

    #[test]
    fn test_open_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let source = ByteSource::open(file.path()).unwrap();
        assert!(source.is_empty());
    }

    #[test]
    fn test_open_missing_file_is_io_error() {
        let err = ByteSource::open("/nonexistent/form.m").unwrap_err();
        assert!(matches!(err, AnalysisError::Io(_)));
    }

    #[test]
    fn test_slice_bounds() {
        let source = ByteSource::from_bytes(b"abcdef".to_vec()).unwrap();
        assert_eq!(source.slice(1..4).unwrap(), b"bcd");
        assert!(matches!(
            source.slice(4..8),
            Err(AnalysisError::OutOfBounds { offset: 4, needed: 4, len: 6 })
        ));
    }

    #[test]
    fn test_sha256_is_stable() {
        let a = ByteSource::from_bytes(b"form".to_vec()).unwrap();
        let b = ByteSource::from_bytes(b"form".to_vec()).unwrap();
        assert_eq!(a.sha256_hex(), b.sha256_hex());
        assert_eq!(a.sha256_hex().len(), 64);
    }
}
