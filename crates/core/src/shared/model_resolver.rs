use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use thiserror::Error;

/// whisper.cpp writes the `ggml` magic as a little-endian u32.
const GGML_MAGIC: [u8; 4] = *b"lmgg";

const DOWNLOAD_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("download of {url} ended after {received} of {expected} bytes")]
    Truncated {
        url: String,
        received: u64,
        expected: u64,
    },
    #[error("{0} is not a whisper ggml model")]
    NotAModel(PathBuf),
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Locates a Whisper ggml model, downloading it into the cache on first use.
///
/// Candidates are tried in order: the user cache directory, then an optional
/// bundled directory. A candidate that does not carry the ggml header is
/// skipped; a corrupt cached copy is removed so it gets downloaded again.
pub struct ModelResolver {
    cache_dir: PathBuf,
    bundled_dir: Option<PathBuf>,
    progress: Option<ProgressFn>,
}

impl ModelResolver {
    /// Resolver over the platform cache directory.
    pub fn new() -> Result<Self, ModelResolveError> {
        Ok(Self::with_cache_dir(model_cache_dir()?))
    }

    pub fn with_cache_dir(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            bundled_dir: None,
            progress: None,
        }
    }

    pub fn bundled_dir(mut self, dir: PathBuf) -> Self {
        self.bundled_dir = Some(dir);
        self
    }

    pub fn on_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn resolve(&self, name: &str, url: &str) -> Result<PathBuf, ModelResolveError> {
        let cached_path = self.cache_dir.join(name);
        if cached_path.exists() {
            if is_ggml_model(&cached_path) {
                return Ok(cached_path);
            }
            log::warn!(
                "Discarding corrupt cached model {}",
                cached_path.display()
            );
            fs::remove_file(&cached_path).map_err(|source| ModelResolveError::Write {
                path: cached_path.clone(),
                source,
            })?;
        }

        if let Some(bundled_path) = self.bundled_dir.as_ref().map(|d| d.join(name)) {
            if is_ggml_model(&bundled_path) {
                return Ok(bundled_path);
            }
        }

        fs::create_dir_all(&self.cache_dir).map_err(ModelResolveError::CacheDir)?;
        log::info!("Downloading {name} from {url}");
        download(url, &cached_path, self.progress.as_ref())?;
        Ok(cached_path)
    }
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/VoiceOver/models/`
/// - Linux: `$XDG_CACHE_HOME/VoiceOver/models/` or `~/.cache/VoiceOver/models/`
/// - Windows: `%LOCALAPPDATA%/VoiceOver/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    let base = dirs::data_dir();
    #[cfg(not(target_os = "macos"))]
    let base = dirs::cache_dir();

    base.map(|d| d.join("VoiceOver").join("models"))
        .ok_or(ModelResolveError::NoCacheDir)
}

/// True if `path` is a readable file starting with the ggml magic.
pub fn is_ggml_model(path: &Path) -> bool {
    let mut magic = [0u8; 4];
    fs::File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .map(|()| magic == GGML_MAGIC)
        .unwrap_or(false)
}

/// Streams `url` into `<dest>.part` and renames it into place once the
/// length and header check out. The partial file never survives a failure.
fn download(url: &str, dest: &Path, progress: Option<&ProgressFn>) -> Result<(), ModelResolveError> {
    let part_path = dest.with_extension("part");
    let result = fetch_to(url, &part_path, progress).and_then(|()| {
        if !is_ggml_model(&part_path) {
            return Err(ModelResolveError::NotAModel(url.into()));
        }
        fs::rename(&part_path, dest).map_err(|source| ModelResolveError::Write {
            path: dest.to_path_buf(),
            source,
        })
    });
    if result.is_err() {
        let _ = fs::remove_file(&part_path);
    }
    result
}

fn fetch_to(url: &str, path: &Path, progress: Option<&ProgressFn>) -> Result<(), ModelResolveError> {
    let download_err = |source| ModelResolveError::Download {
        url: url.to_string(),
        source,
    };
    let write_err = |source| ModelResolveError::Write {
        path: path.to_path_buf(),
        source,
    };

    // No overall timeout: models run to hundreds of MB.
    let client = Client::builder()
        .connect_timeout(DOWNLOAD_CONNECT_TIMEOUT)
        .build()
        .map_err(download_err)?;
    let mut response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(download_err)?;

    let expected = response.content_length().unwrap_or(0);
    let mut file = fs::File::create(path).map_err(write_err)?;
    let received = copy_with_progress(&mut response, &mut file, expected, progress)
        .map_err(write_err)?;
    file.flush().map_err(write_err)?;

    if expected > 0 && received != expected {
        return Err(ModelResolveError::Truncated {
            url: url.to_string(),
            received,
            expected,
        });
    }
    Ok(())
}

fn copy_with_progress(
    reader: &mut impl Read,
    writer: &mut impl Write,
    total: u64,
    progress: Option<&ProgressFn>,
) -> std::io::Result<u64> {
    let mut buf = vec![0u8; 1024 * 1024];
    let mut copied = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Ok(copied);
        }
        writer.write_all(&buf[..n])?;
        copied += n as u64;
        if let Some(cb) = progress {
            cb(copied, total);
        }
    }
}
