//! Frame store.
//!
//! Frames are text files in a single directory, played back in file name
//! order. They are either read once at startup (`LoadMode::Eager`) or
//! read from disk on every tick (`LoadMode::Lazy`). In both modes the
//! directory listing is taken once, when the source is built.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// How frame contents are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Read and normalize every frame once, before serving clients.
    #[default]
    Eager,
    /// Read the frame file from disk on every tick.
    Lazy,
}

/// One pre-rendered screen of the animation.
///
/// Contents are bytes rather than text so ANSI art with arbitrary escape
/// sequences passes through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Bytes);

impl Frame {
    /// Build a frame from raw file contents, converting bare `\n` to `\r\n`.
    pub fn from_raw(raw: &[u8]) -> Self {
        Frame(normalize_line_endings(raw))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Replace every `\n` not already preceded by `\r` with `\r\n`.
fn normalize_line_endings(raw: &[u8]) -> Bytes {
    let newlines = raw.iter().filter(|&&b| b == b'\n').count();
    let mut out = BytesMut::with_capacity(raw.len() + newlines);
    let mut prev = 0u8;

    for &b in raw {
        if b == b'\n' && prev != b'\r' {
            out.put_u8(b'\r');
        }
        out.put_u8(b);
        prev = b;
    }

    out.freeze()
}

/// List frame files in `dir`: regular files with extension `ext`,
/// sorted by file name.
pub fn list_frame_files(dir: &Path, ext: &str) -> Result<Vec<PathBuf>, FrameError> {
    let entries = std::fs::read_dir(dir).map_err(|e| FrameError::ReadDir(dir.to_path_buf(), e))?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| FrameError::ReadDir(dir.to_path_buf(), e))?
            .path();

        if !path.is_file() || path.extension() != Some(OsStr::new(ext)) {
            debug!(path = %path.display(), "Ignoring non-frame entry");
            continue;
        }
        paths.push(path);
    }

    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// Ordered, read-only set of frames shared by every session.
#[derive(Debug)]
pub enum FrameSource {
    Eager { frames: Vec<Frame> },
    Lazy { paths: Vec<PathBuf> },
}

impl FrameSource {
    /// Build a source in the requested mode.
    pub fn load(dir: &Path, ext: &str, mode: LoadMode) -> Result<Self, FrameError> {
        match mode {
            LoadMode::Eager => Self::eager(dir, ext),
            LoadMode::Lazy => Self::lazy(dir, ext),
        }
    }

    /// Read and normalize all frames now. Any unreadable file is an error.
    pub fn eager(dir: &Path, ext: &str) -> Result<Self, FrameError> {
        let paths = list_frame_files(dir, ext)?;

        let mut frames = Vec::with_capacity(paths.len());
        for path in &paths {
            let raw = std::fs::read(path).map_err(|e| FrameError::ReadFile(path.clone(), e))?;
            let frame = Frame::from_raw(&raw);
            if frame.is_empty() {
                debug!(path = %path.display(), "Frame file is empty");
            }
            frames.push(frame);
        }

        let total_bytes: usize = frames.iter().map(Frame::len).sum();
        info!(
            dir = %dir.display(),
            frames = frames.len(),
            total_bytes,
            "Loaded frames into memory"
        );
        Ok(FrameSource::Eager { frames })
    }

    /// Capture the ordered listing now; contents are read per access.
    pub fn lazy(dir: &Path, ext: &str) -> Result<Self, FrameError> {
        let paths = list_frame_files(dir, ext)?;
        info!(
            dir = %dir.display(),
            frames = paths.len(),
            "Indexed frames for on-demand reads"
        );
        Ok(FrameSource::Lazy { paths })
    }

    pub fn mode(&self) -> LoadMode {
        match self {
            FrameSource::Eager { .. } => LoadMode::Eager,
            FrameSource::Lazy { .. } => LoadMode::Lazy,
        }
    }

    /// Number of frames in the animation.
    pub fn len(&self) -> usize {
        match self {
            FrameSource::Eager { frames } => frames.len(),
            FrameSource::Lazy { paths } => paths.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch the frame at `index`.
    ///
    /// Never touches the filesystem in eager mode. In lazy mode every call
    /// reads the file again, so concurrent sessions never share a handle.
    pub async fn read(&self, index: usize) -> Result<Frame, FrameError> {
        let len = self.len();
        match self {
            FrameSource::Eager { frames } => frames
                .get(index)
                .cloned()
                .ok_or(FrameError::IndexOutOfRange { index, len }),
            FrameSource::Lazy { paths } => {
                let path = paths
                    .get(index)
                    .ok_or(FrameError::IndexOutOfRange { index, len })?;
                let raw = tokio::fs::read(path)
                    .await
                    .map_err(|e| FrameError::ReadFile(path.clone(), e))?;
                Ok(Frame::from_raw(&raw))
            }
        }
    }
}

/// Frame loading errors
#[derive(Debug)]
pub enum FrameError {
    ReadDir(PathBuf, std::io::Error),
    ReadFile(PathBuf, std::io::Error),
    IndexOutOfRange { index: usize, len: usize },
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::ReadDir(path, e) => {
                write!(f, "Failed to list frame directory '{}': {}", path.display(), e)
            }
            FrameError::ReadFile(path, e) => {
                write!(f, "Failed to read frame '{}': {}", path.display(), e)
            }
            FrameError::IndexOutOfRange { index, len } => {
                write!(f, "Frame index {index} out of range ({len} frames)")
            }
        }
    }
}

impl FrameError {
    /// File or directory the error refers to, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            FrameError::ReadDir(path, _) | FrameError::ReadFile(path, _) => {
                Some(path.as_path())
            }
            FrameError::IndexOutOfRange { .. } => None,
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameError::ReadDir(_, e) | FrameError::ReadFile(_, e) => Some(e),
            FrameError::IndexOutOfRange { .. } => None,
        }
    }
}

/// Temporary directory holding the given `(file name, contents)` pairs.
#[cfg(test)]
pub(crate) fn frame_dir(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, contents) in files {
        std::fs::write(dir.path().join(name), contents).unwrap();
    }
    dir
}
