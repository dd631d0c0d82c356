//! Error taxonomy for the toolkit core.
//!
//! Every core operation returns a typed [`FatImgError`] instead of calling
//! `exit()` or panicking; the CLI layer is the only component allowed to
//! terminate the process, by mapping a returned error to an exit code.

use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Debug)]
pub enum FatImgError {
    /// Any failure of read, write, seek, or open on host or image files.
    Io { path: Option<PathBuf>, source: io::Error },
    /// Boot-sector validation failed (bad jump sig, zero required fields,
    /// invalid flavor bracket, missing FSInfo pointer, forbidden cluster
    /// count).
    BadImage(String),
    /// Unrecognized option, missing option argument, out-of-range numeric,
    /// invalid label character, duplicate output, path too long.
    BadArgument(String),
    /// 8.3 conversion failed: empty, double-dot, too long, bad character.
    NameError(String),
    /// Free-cluster scan found none, or a free directory slot could not be
    /// acquired and the directory could not be extended.
    NoSpace,
    /// mkdir target name present and not a deleted slot.
    AlreadyExists(String),
    /// copy target is a directory but source is a file, or vice versa.
    Conflict(String),
    /// Scratch-buffer (or other) allocation failed.
    OutOfMemory,
}

impl FatImgError {
    pub fn io(source: io::Error) -> Self {
        FatImgError::Io { path: None, source }
    }

    pub fn io_at(path: impl Into<PathBuf>, source: io::Error) -> Self {
        FatImgError::Io { path: Some(path.into()), source }
    }
}

impl fmt::Display for FatImgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatImgError::Io { path: Some(p), source } => {
                write!(f, "{}: {}", p.display(), source)
            }
            FatImgError::Io { path: None, source } => write!(f, "{}", source),
            FatImgError::BadImage(msg) => write!(f, "bad image: {msg}"),
            FatImgError::BadArgument(msg) => write!(f, "bad argument: {msg}"),
            FatImgError::NameError(msg) => write!(f, "bad name: {msg}"),
            FatImgError::NoSpace => write!(f, "no space left on device"),
            FatImgError::AlreadyExists(name) => write!(f, "'{name}' already exists"),
            FatImgError::Conflict(msg) => write!(f, "conflict: {msg}"),
            FatImgError::OutOfMemory => write!(f, "out of memory"),
        }
    }
}

impl std::error::Error for FatImgError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FatImgError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for FatImgError {
    fn from(source: io::Error) -> Self {
        FatImgError::io(source)
    }
}

pub type Result<T> = std::result::Result<T, FatImgError>;
