use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use super::{SESSION_RECORD_VERSION, SessionRecord};

#[derive(Error, Debug)]
pub enum SessionStoreError {
    #[error("session file `{0}`: `{1}`")]
    Io(PathBuf, io::Error),
    #[error("decoding session file `{0}`: `{1}`")]
    Decode(PathBuf, String),
    #[error("encoding session record: `{0}`")]
    Encode(String),
    #[error(
        "unsupported session record version `{0}`, expected `{expected}`",
        expected = SESSION_RECORD_VERSION
    )]
    UnsupportedVersion(u32),
}

/// Persists a [SessionRecord] as JSON in a single file.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Loads the stored record. A missing or empty file means there is no prior session.
    pub fn load(&self) -> Result<Option<SessionRecord>, SessionStoreError> {
        if !self.path.is_file() {
            debug!("no session file at {}", self.path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        if content.trim().is_empty() {
            info!("session file {} is empty; ignoring", self.path.display());
            return Ok(None);
        }

        let record: SessionRecord = serde_json::from_str(&content)
            .map_err(|e| SessionStoreError::Decode(self.path.clone(), e.to_string()))?;

        if record.version != SESSION_RECORD_VERSION {
            return Err(SessionStoreError::UnsupportedVersion(record.version));
        }

        info!("session loaded from {}", self.path.display());
        Ok(Some(record))
    }

    pub fn save(&self, record: &SessionRecord) -> Result<(), SessionStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let content = serde_json::to_vec_pretty(record)
            .map_err(|e| SessionStoreError::Encode(e.to_string()))?;

        let mut file = open_private(&self.path).map_err(|e| self.io_error(e))?;
        file.write_all(&content).map_err(|e| self.io_error(e))?;

        info!("session saved to {}", self.path.display());
        Ok(())
    }

    /// Removes the session file when it exists and holds nothing. Returns whether it was removed.
    pub fn remove_if_empty(&self) -> Result<bool, SessionStoreError> {
        if !self.path.is_file() {
            return Ok(false);
        }
        let metadata = fs::metadata(&self.path).map_err(|e| self.io_error(e))?;
        if metadata.len() != 0 {
            return Ok(false);
        }

        info!("removing empty session file {}", self.path.display());
        fs::remove_file(&self.path).map_err(|e| self.io_error(e))?;
        Ok(true)
    }

    pub fn clear(&self) -> Result<(), SessionStoreError> {
        if self.path.is_file() {
            info!("removing session file {}", self.path.display());
            fs::remove_file(&self.path).map_err(|e| self.io_error(e))?;
        }
        Ok(())
    }

    fn io_error(&self, err: io::Error) -> SessionStoreError {
        SessionStoreError::Io(self.path.clone(), err)
    }
}

/// Opens the file for writing, readable and writable by the owner only, even when it already
/// existed with wider permissions.
#[cfg(unix)]
fn open_private(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> io::Result<fs::File> {
    fs::File::create(path)
}
