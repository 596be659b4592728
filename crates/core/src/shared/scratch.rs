use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tempfile::TempDir;

/// Temporary storage scoped to one run.
///
/// Cloning shares the same directory. The directory and everything in it is
/// deleted when the last clone drops, regardless of how the run ended.
#[derive(Clone, Debug)]
pub struct ScratchSpace {
    dir: Arc<TempDir>,
    counter: Arc<AtomicU64>,
}

impl ScratchSpace {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("voiceover-").tempdir()?;
        log::debug!("Scratch space at {}", dir.path().display());
        Ok(Self {
            dir: Arc::new(dir),
            counter: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Reserves a unique file path inside the scratch directory. The file is
    /// not created; it is removed when the returned guard drops.
    pub fn file(&self, stem: &str, extension: &str) -> ScratchFile {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.path().join(format!("{stem}_{n}.{extension}"));
        ScratchFile {
            path,
            _space: self.clone(),
        }
    }
}

/// One intermediate file. Removed on drop.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    // Keeps the directory alive while the file exists.
    _space: ScratchSpace,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to remove {}: {e}", self.path.display());
            }
        }
    }
}
