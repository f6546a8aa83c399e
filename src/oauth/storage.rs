// ABOUTME: Storage backends for the OAuth token and its provider configuration
// ABOUTME: In-memory (mutex) and JSON file (owner-only permissions, lock-serialized)
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::fmt::Display;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::{OAuthToken, ProviderConfig};
use crate::errors::{AppError, AppResult};

/// A stored token with the configuration needed to refresh it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredToken {
    /// The token
    pub token: OAuthToken,
    /// Provider the token was issued by
    pub config: ProviderConfig,
}

/// Persistence for the single OAuth token record
#[async_trait]
pub trait TokenStorage: Send + Sync {
    /// Read the stored record, if any
    async fn load(&self) -> AppResult<Option<StoredToken>>;

    /// Replace the stored record
    async fn store(&self, record: &StoredToken) -> AppResult<()>;

    /// Remove the stored record
    async fn clear(&self) -> AppResult<()>;
}

// ============================================================================
// In-memory
// ============================================================================

/// Process-local token storage
#[derive(Debug, Default)]
pub struct InMemoryTokenStorage {
    record: Mutex<Option<StoredToken>>,
}

impl InMemoryTokenStorage {
    /// Empty storage
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStorage for InMemoryTokenStorage {
    async fn load(&self) -> AppResult<Option<StoredToken>> {
        Ok(self.record.lock().await.clone())
    }

    async fn store(&self, record: &StoredToken) -> AppResult<()> {
        *self.record.lock().await = Some(record.clone());
        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        *self.record.lock().await = None;
        Ok(())
    }
}

// ============================================================================
// File-backed
// ============================================================================

/// On-disk layout: the provider configuration is nested as a JSON string
#[derive(Debug, Serialize, Deserialize)]
struct TokenFile {
    token: OAuthToken,
    config_json: String,
}

/// Token storage in a single JSON file readable only by its owner
#[derive(Debug)]
pub struct FileTokenStorage {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileTokenStorage {
    /// Storage at `path`; the file is created on first store
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    /// Location of the token file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn storage_error(&self, action: &str, e: impl Display) -> AppError {
        AppError::storage(format!(
            "failed to {action} token file {}: {e}",
            self.path.display()
        ))
    }

    #[cfg(unix)]
    async fn write_private(&self, bytes: &[u8]) -> io::Result<()> {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&self.path)
            .await?;
        // mode() only applies on creation
        fs::set_permissions(&self.path, Permissions::from_mode(0o600)).await?;
        file.write_all(bytes).await?;
        file.flush().await
    }

    #[cfg(not(unix))]
    async fn write_private(&self, bytes: &[u8]) -> io::Result<()> {
        let mut file = fs::File::create(&self.path).await?;
        file.write_all(bytes).await?;
        file.flush().await
    }
}

#[async_trait]
impl TokenStorage for FileTokenStorage {
    async fn load(&self) -> AppResult<Option<StoredToken>> {
        let _guard = self.lock.read().await;
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.storage_error("read", e)),
        };
        let file: TokenFile =
            serde_json::from_slice(&bytes).map_err(|e| self.storage_error("parse", e))?;
        let config: ProviderConfig = serde_json::from_str(&file.config_json)
            .map_err(|e| self.storage_error("parse provider config in", e))?;
        Ok(Some(StoredToken {
            token: file.token,
            config,
        }))
    }

    async fn store(&self, record: &StoredToken) -> AppResult<()> {
        let file = TokenFile {
            token: record.token.clone(),
            config_json: serde_json::to_string(&record.config)?,
        };
        let bytes = serde_json::to_vec_pretty(&file)?;

        let _guard = self.lock.write().await;
        self.write_private(&bytes)
            .await
            .map_err(|e| self.storage_error("write", e))?;
        debug!(path = %self.path.display(), "Stored OAuth token");
        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        let _guard = self.lock.write().await;
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.storage_error("remove", e)),
        }
    }
}
