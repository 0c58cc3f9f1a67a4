use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use shared::domain::{Gesture, MatrixConfig};
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_FILE_NAME: &str = "data.json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed data file '{path}': {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to encode data file: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Everything the relay persists: the gesture catalog and the Matrix account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageData {
    #[serde(default)]
    pub matrix: Option<MatrixConfig>,
    #[serde(default)]
    pub gestures: Option<Vec<Gesture>>,
}

#[derive(Debug, Clone)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::open(dir.join(DEFAULT_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty store, not an error.
    pub async fn load(&self) -> Result<StorageData, StorageError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "data file does not exist yet");
                return Ok(StorageData::default());
            }
            Err(source) => {
                return Err(StorageError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let data = serde_json::from_str(&raw).map_err(|source| StorageError::Malformed {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), "loaded data file");
        Ok(data)
    }

    pub async fn save(&self, data: &StorageData) -> Result<(), StorageError> {
        let encoded = serde_json::to_vec_pretty(data)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| self.write_error(source))?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, encoded)
            .await
            .map_err(|source| self.write_error(source))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|source| self.write_error(source))?;
        info!(path = %self.path.display(), "saved data file");
        Ok(())
    }

    pub async fn update_matrix_config(&self, matrix: MatrixConfig) -> Result<(), StorageError> {
        let mut data = self.load().await?;
        data.matrix = Some(matrix);
        self.save(&data).await
    }

    fn write_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
