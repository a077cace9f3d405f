//! Durable storage for the refresh token.
//!
//! The access token is never written to disk; only the long-lived refresh
//! token survives a restart.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::config::APP_DIR_NAME;
use crate::error::StorageError;

const CREDENTIAL_FILE_NAME: &str = "refreshToken.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
pub struct TokenStore {
    dir: PathBuf,
}

impl TokenStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `{data_dir}/mediakeys-spotify-connect`, i.e. Application Support on macOS.
    pub fn default_location() -> Result<Self, StorageError> {
        let dir = dirs::data_dir()
            .ok_or_else(|| StorageError::WriteFailed("Could not find data directory".to_string()))?
            .join(APP_DIR_NAME);
        Ok(Self::new(dir))
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(CREDENTIAL_FILE_NAME)
    }

    /// Write the credential next to the target and rename it into place, so
    /// a crash mid-write leaves the previous file untouched.
    pub fn save(&self, refresh_token: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).map_err(|e| write_failed(&self.dir, e))?;

        let creds = StoredCredential {
            refresh_token: refresh_token.to_string(),
        };
        let contents = serde_json::to_string_pretty(&creds)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;

        let path = self.path();
        let tmp = path.with_extension("json.tmp");
        if let Err(e) = write_synced(&tmp, contents.as_bytes()) {
            let _ = fs::remove_file(&tmp);
            return Err(write_failed(&tmp, e));
        }
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(write_failed(&path, e));
        }

        tracing::debug!(path = %path.display(), "Saved refresh token");
        Ok(())
    }

    pub fn load(&self) -> Result<StoredCredential, StorageError> {
        let path = self.path();
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StorageError::NotFound),
            Err(e) => return Err(StorageError::CorruptData(e.to_string())),
        };

        let creds: StoredCredential = serde_json::from_str(&contents)
            .map_err(|e| StorageError::CorruptData(e.to_string()))?;
        if creds.refresh_token.is_empty() {
            return Err(StorageError::CorruptData("empty refresh token".to_string()));
        }
        Ok(creds)
    }

    /// Remove the stored credential. Clearing an empty store is fine.
    pub fn clear(&self) -> Result<(), StorageError> {
        let path = self.path();
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Removed refresh token");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(write_failed(&path, e)),
        }
    }
}

/// Write and flush to disk so the rename never exposes a partial file.
fn write_synced(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

fn write_failed(path: &Path, e: std::io::Error) -> StorageError {
    StorageError::WriteFailed(format!("{}: {}", path.display(), e))
}
