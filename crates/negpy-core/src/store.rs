//! Persistence and color-management collaborator interfaces.
//!
//! The SQLite edit store and ICC profile I/O live outside the core; the
//! engine only sees these traits. Persistence failures never block a render.

use crate::error::RenderError;
use crate::fingerprint::FileFingerprint;
use crate::models::{IccTag, WorkspaceConfig};

/// Edit/thumbnail store keyed by content hash.
///
/// Backing schema (implemented by the desktop shell):
/// `edits(hash PRIMARY KEY, config_json BLOB, updated_at INT)` and
/// `thumbnails(hash PRIMARY KEY, png BLOB)`, with hex SHA-256 keys.
pub trait EditStore {
    fn load_config(&self, key: &FileFingerprint) -> Result<Option<WorkspaceConfig>, RenderError>;
    fn save_config(
        &self,
        key: &FileFingerprint,
        config: &WorkspaceConfig,
    ) -> Result<(), RenderError>;
    fn save_thumbnail(&self, key: &FileFingerprint, png: &[u8]) -> Result<(), RenderError>;
}

/// Supplies raw ICC profile bytes for an output tag. The core attaches the
/// profile; it never converts pixel data between spaces.
pub trait IccProvider {
    fn profile_bytes(&self, tag: IccTag) -> Option<Vec<u8>>;
}

/// Provider that tags nothing; exports then carry no embedded profile.
#[derive(Debug, Default)]
pub struct NoopIccProvider;

impl IccProvider for NoopIccProvider {
    fn profile_bytes(&self, _tag: IccTag) -> Option<Vec<u8>> {
        None
    }
}

/// In-memory store used by tests and the CLI (which persists nothing).
#[derive(Debug, Default)]
pub struct MemoryEditStore {
    entries: std::sync::Mutex<std::collections::HashMap<String, WorkspaceConfig>>,
}

impl EditStore for MemoryEditStore {
    fn load_config(&self, key: &FileFingerprint) -> Result<Option<WorkspaceConfig>, RenderError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| RenderError::PersistenceFailed("store poisoned".into()))?;
        Ok(entries.get(&key.to_hex()).cloned())
    }

    fn save_config(
        &self,
        key: &FileFingerprint,
        config: &WorkspaceConfig,
    ) -> Result<(), RenderError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| RenderError::PersistenceFailed("store poisoned".into()))?;
        entries.insert(key.to_hex(), config.clone());
        Ok(())
    }

    fn save_thumbnail(&self, _key: &FileFingerprint, _png: &[u8]) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Resolve the user data directory: `NEGPY_DATA_DIR` wins, then the platform
/// data dir, then the current directory.
pub fn data_dir() -> std::path::PathBuf {
    if let Ok(dir) = std::env::var("NEGPY_DATA_DIR") {
        return std::path::PathBuf::from(dir);
    }
    dirs::data_dir()
        .map(|d| d.join("negpy"))
        .unwrap_or_else(|| std::path::PathBuf::from("."))
}
