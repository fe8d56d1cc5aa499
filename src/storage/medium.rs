//! Physical media holding the store document.
//!
//! A medium only reads and writes the whole document; the [`Store`](super::Store)
//! owns every decision about its contents.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{BridgeError, Result};

use super::database::Database;
use super::models::StoreData;

const SQLITE_STORE_KEY: &str = "store";

pub trait BlobMedium: Send {
    /// Returns `None` when nothing has been written yet.
    fn read(&mut self) -> Result<Option<StoreData>>;

    /// Must be durable once it returns `Ok`.
    fn write(&mut self, data: &StoreData) -> Result<()>;

    fn describe(&self) -> String;
}

/// One JSON document on disk, replaced atomically on every write.
pub struct JsonFileMedium {
    path: PathBuf,
}

impl JsonFileMedium {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl BlobMedium for JsonFileMedium {
    fn read(&mut self) -> Result<Option<StoreData>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(BridgeError::StorageUnavailable(format!(
                    "cannot read {}: {err}",
                    self.path.display()
                )));
            }
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&content).map(Some).map_err(|err| {
            BridgeError::StorageUnavailable(format!(
                "cannot parse {}: {err}",
                self.path.display()
            ))
        })
    }

    fn write(&mut self, data: &StoreData) -> Result<()> {
        let unavailable = |err: std::io::Error| {
            BridgeError::StorageUnavailable(format!(
                "cannot write {}: {err}",
                self.path.display()
            ))
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(unavailable)?;
            }
        }

        let json = serde_json::to_vec_pretty(data)?;
        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = File::create(&tmp_path).map_err(unavailable)?;
        file.write_all(&json).map_err(unavailable)?;
        file.sync_all().map_err(unavailable)?;
        fs::rename(&tmp_path, &self.path).map_err(unavailable)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}

/// The JSON document kept as a single row of a SQLite database.
pub struct SqliteMedium {
    db: Database,
    label: String,
}

impl SqliteMedium {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let label = format!("sqlite:{}", path.as_ref().display());
        let db = Database::new(path)?;
        Ok(Self { db, label })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            db: Database::in_memory()?,
            label: "sqlite::memory:".to_string(),
        })
    }
}

impl BlobMedium for SqliteMedium {
    fn read(&mut self) -> Result<Option<StoreData>> {
        match self.db.get_blob(SQLITE_STORE_KEY)? {
            Some(json) => serde_json::from_str(&json).map(Some).map_err(|err| {
                BridgeError::StorageUnavailable(format!("corrupt store blob: {err}"))
            }),
            None => Ok(None),
        }
    }

    fn write(&mut self, data: &StoreData) -> Result<()> {
        let json = serde_json::to_string(data)?;
        self.db.put_blob(SQLITE_STORE_KEY, &json)?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// Volatile medium for tests and dry runs.
#[derive(Default)]
pub struct MemoryMedium {
    data: Option<StoreData>,
}

impl BlobMedium for MemoryMedium {
    fn read(&mut self) -> Result<Option<StoreData>> {
        Ok(self.data.clone())
    }

    fn write(&mut self, data: &StoreData) -> Result<()> {
        self.data = Some(data.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
