//! Read-only filesystem access rooted at the serve directory.
//!
//! Every lookup is resolved against the canonical serve root and
//! rejected if the resolved path escapes it (`..` segments, absolute
//! selectors, or symlinks pointing outside). Nothing is cached; each
//! request reads the filesystem fresh.

use crate::protocol::{DirectoryEntry, EntryKind};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Error from a filesystem lookup
#[derive(Debug)]
pub enum LookupError {
    /// Nothing exists at the path
    NotFound(String),
    /// A listing was requested for something that is not a directory
    NotADirectory(String),
    /// A file read was requested for a directory
    IsADirectory(String),
    /// The path resolves outside the serve root
    OutsideRoot(String),
    /// The selector cannot be expressed as a path on this platform
    #[cfg(not(unix))]
    InvalidName(String),
    /// Any other I/O failure
    Io(String, io::Error),
}

impl LookupError {
    fn from_io(path: String, e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => LookupError::NotFound(path),
            _ => LookupError::Io(path, e),
        }
    }
}

impl std::fmt::Display for LookupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupError::NotFound(path) => write!(f, "'{}' not found", path),
            LookupError::NotADirectory(path) => write!(f, "'{}' is not a directory", path),
            LookupError::IsADirectory(path) => write!(f, "'{}' is a directory", path),
            LookupError::OutsideRoot(path) => write!(f, "'{}' is outside the serve root", path),
            #[cfg(not(unix))]
            LookupError::InvalidName(path) => write!(f, "'{}' is not a valid path", path),
            LookupError::Io(path, e) => write!(f, "failed to read '{}': {}", path, e),
        }
    }
}

impl std::error::Error for LookupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LookupError::Io(_, e) => Some(e),
            _ => None,
        }
    }
}

/// The directory all selectors are resolved against
#[derive(Debug, Clone)]
pub struct ServeRoot {
    /// Canonical, absolute root path
    root: PathBuf,
}

impl ServeRoot {
    /// Canonicalize `path` and check that it is a directory.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, LookupError> {
        let display = path.as_ref().display().to_string();
        let root = std::fs::canonicalize(path.as_ref())
            .map_err(|e| LookupError::from_io(display.clone(), e))?;

        if !root.is_dir() {
            return Err(LookupError::NotADirectory(display));
        }

        Ok(ServeRoot { root })
    }

    /// Canonical root path
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// List the children of the directory at `path`, in read order.
    pub async fn list(&self, path: &[u8]) -> Result<Vec<DirectoryEntry>, LookupError> {
        let resolved = self.resolve(path).await?;

        let metadata = tokio::fs::metadata(&resolved)
            .await
            .map_err(|e| LookupError::from_io(lossy(path), e))?;
        if !metadata.is_dir() {
            return Err(LookupError::NotADirectory(lossy(path)));
        }

        let mut dir = tokio::fs::read_dir(&resolved)
            .await
            .map_err(|e| LookupError::from_io(lossy(path), e))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| LookupError::from_io(lossy(path), e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| LookupError::from_io(lossy(path), e))?;

            let kind = if file_type.is_file() {
                EntryKind::File
            } else if file_type.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::Other
            };

            match name_bytes(entry.file_name()) {
                Some(name) => entries.push(DirectoryEntry::new(name, kind)),
                None => debug!(path = %lossy(path), "Skipping entry with non-UTF-8 name"),
            }
        }

        trace!(path = %lossy(path), count = entries.len(), "Listed directory");
        Ok(entries)
    }

    /// Read the full contents of the file at `path`.
    pub async fn read_all(&self, path: &[u8]) -> Result<Vec<u8>, LookupError> {
        let resolved = self.resolve(path).await?;

        let metadata = tokio::fs::metadata(&resolved)
            .await
            .map_err(|e| LookupError::from_io(lossy(path), e))?;
        if metadata.is_dir() {
            return Err(LookupError::IsADirectory(lossy(path)));
        }

        let data = tokio::fs::read(&resolved)
            .await
            .map_err(|e| LookupError::from_io(lossy(path), e))?;

        trace!(path = %lossy(path), bytes = data.len(), "Read file");
        Ok(data)
    }

    /// Join `path` onto the root and canonicalize it, rejecting anything
    /// that ends up outside the root.
    async fn resolve(&self, path: &[u8]) -> Result<PathBuf, LookupError> {
        // Leading slashes are common in client selectors; treat them as root-relative.
        let start = path.iter().position(|&b| b != b'/').unwrap_or(path.len());
        let relative: &[u8] = match &path[start..] {
            [] => b".",
            rest => rest,
        };

        let canonical = tokio::fs::canonicalize(self.root.join(to_path(relative)?))
            .await
            .map_err(|e| LookupError::from_io(lossy(path), e))?;

        if !canonical.starts_with(&self.root) {
            return Err(LookupError::OutsideRoot(lossy(path)));
        }

        Ok(canonical)
    }
}

/// Selector bytes as a path; any byte string is a valid unix path.
#[cfg(unix)]
fn to_path(bytes: &[u8]) -> Result<&Path, LookupError> {
    use std::os::unix::ffi::OsStrExt;
    Ok(Path::new(std::ffi::OsStr::from_bytes(bytes)))
}

#[cfg(not(unix))]
fn to_path(bytes: &[u8]) -> Result<&Path, LookupError> {
    std::str::from_utf8(bytes)
        .map(Path::new)
        .map_err(|_| LookupError::InvalidName(lossy(bytes)))
}

/// Raw filename bytes, so listed names round-trip as selectors.
#[cfg(unix)]
fn name_bytes(name: OsString) -> Option<Vec<u8>> {
    use std::os::unix::ffi::OsStringExt;
    Some(name.into_vec())
}

/// Names that are not UTF-8 could not be requested back, so they are skipped.
#[cfg(not(unix))]
fn name_bytes(name: OsString) -> Option<Vec<u8>> {
    name.into_string().ok().map(String::into_bytes)
}

fn lossy(path: &[u8]) -> String {
    String::from_utf8_lossy(path).into_owned()
}
