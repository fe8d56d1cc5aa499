//! Persistence of the upstream session's auth material.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::common::Credentials;
use crate::error::{BridgeError, Result};

const CREDS_FILE: &str = "creds.json";

#[async_trait]
pub trait AuthState: Send + Sync {
    /// `Ok(None)` means no session has been paired yet.
    async fn load(&self) -> Result<Option<Credentials>>;

    async fn save(&self, credentials: &Credentials) -> Result<()>;
}

/// Keeps credentials as `creds.json` inside a directory.
pub struct FileAuthState {
    dir: PathBuf,
}

impl FileAuthState {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn creds_path(&self) -> PathBuf {
        self.dir.join(CREDS_FILE)
    }
}

#[async_trait]
impl AuthState for FileAuthState {
    async fn load(&self) -> Result<Option<Credentials>> {
        let path = self.creds_path();
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(BridgeError::AuthLoad(format!(
                    "cannot read {}: {err}",
                    path.display()
                )));
            }
        };
        let credentials = serde_json::from_str(&content).map_err(|err| {
            BridgeError::AuthLoad(format!("cannot parse {}: {err}", path.display()))
        })?;
        log::info!("Loaded persisted credentials from {}", path.display());
        Ok(Some(credentials))
    }

    async fn save(&self, credentials: &Credentials) -> Result<()> {
        let path = self.creds_path();
        let json = serde_json::to_string_pretty(credentials)?;
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|err| BridgeError::AuthSave(err.to_string()))?;
        fs::write(&path, json)
            .await
            .map_err(|err| BridgeError::AuthSave(format!("{}: {err}", path.display())))?;
        log::debug!("Saved credentials to {}", path.display());
        Ok(())
    }
}
