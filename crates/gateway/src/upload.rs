use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Persists uploads before they are decoded. The stored file outlives the
/// response; its path and on-disk size are reported back to the caller.
pub struct UploadStore {
    dir: PathBuf,
}

/// A persisted upload.
#[derive(Debug)]
pub struct StoredUpload {
    pub path: PathBuf,
    pub byte_size: u64,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Write `bytes` under a path derived from the sanitized filename. The
    /// same filename always maps to the same path; a later upload replaces
    /// an earlier one.
    pub fn store(&self, file_name: &str, bytes: &[u8]) -> io::Result<StoredUpload> {
        let path = self.dir.join(sanitize(file_name));
        fs::write(&path, bytes)?;
        let byte_size = fs::metadata(&path)?.len();
        Ok(StoredUpload { path, byte_size })
    }
}

/// Strip any directory components a client may smuggle into the filename.
fn sanitize(file_name: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    if base.is_empty() {
        "upload".to_string()
    } else {
        base
    }
}
