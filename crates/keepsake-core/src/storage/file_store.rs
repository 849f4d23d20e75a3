use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read as _, Write as _};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::StoreConfig;
use crate::error::CoreError;
use crate::model::EntityId;

use super::blob::BlobStore;

const RECORD_EXTENSION: &str = "json";
const LOCK_FILE: &str = ".lock";

/// Blob store laid out as `<data_dir>/<type>/<id>.json`.
///
/// Writes go to a temporary file that is renamed over the record, under an
/// exclusive advisory lock on the type directory's lock file. Reads take the
/// same lock shared.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    sync_writes: bool,
}

/// Advisory lock on a type directory, released on drop.
struct DirLock(File);

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.0);
    }
}

impl FileStore {
    /// Open the store, creating the data directory if needed.
    pub fn open(config: &StoreConfig) -> Result<Self, CoreError> {
        fs::create_dir_all(&config.data_dir)?;
        Ok(Self {
            root: config.data_dir.clone(),
            sync_writes: config.sync_writes,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every record of a type.
    pub fn type_dir(&self, entity_type: &str) -> PathBuf {
        self.root.join(entity_type)
    }

    /// Path of one record file.
    pub fn record_path(&self, entity_type: &str, id: &EntityId) -> PathBuf {
        self.type_dir(entity_type)
            .join(format!("{}.{RECORD_EXTENSION}", id.as_str()))
    }

    fn lock(&self, entity_type: &str, exclusive: bool) -> Result<DirLock, CoreError> {
        let dir = self.type_dir(entity_type);
        fs::create_dir_all(&dir)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))?;
        if exclusive {
            fs2::FileExt::lock_exclusive(&file)?;
        } else {
            fs2::FileExt::lock_shared(&file)?;
        }
        Ok(DirLock(file))
    }
}

impl BlobStore for FileStore {
    fn prepare(&self, entity_type: &str) -> Result<(), CoreError> {
        fs::create_dir_all(self.type_dir(entity_type))?;
        Ok(())
    }

    fn read(&self, entity_type: &str, id: &EntityId) -> Result<Option<Vec<u8>>, CoreError> {
        let path = self.record_path(entity_type, id);
        if !self.type_dir(entity_type).exists() {
            return Ok(None);
        }
        let _lock = self.lock(entity_type, false)?;
        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Ok(Some(bytes))
    }

    fn write(&self, entity_type: &str, id: &EntityId, bytes: &[u8]) -> Result<(), CoreError> {
        let path = self.record_path(entity_type, id);
        let tmp = self
            .type_dir(entity_type)
            .join(format!(".{}.{RECORD_EXTENSION}.tmp", id.as_str()));

        let _lock = self.lock(entity_type, true)?;
        let written =
            write_file(&tmp, bytes, self.sync_writes).and_then(|()| fs::rename(&tmp, &path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn delete(&self, entity_type: &str, id: &EntityId) -> Result<bool, CoreError> {
        let path = self.record_path(entity_type, id);
        let _lock = self.lock(entity_type, true)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, entity_type: &str) -> Result<Vec<EntityId>, CoreError> {
        let dir = self.type_dir(entity_type);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => continue,
            };
            if name.starts_with('.') {
                continue;
            }
            let Some(stem) = name.strip_suffix(&format!(".{RECORD_EXTENSION}")) else {
                tracing::warn!("Skipping non-record file {}", path.display());
                continue;
            };
            match EntityId::parse(stem) {
                Ok(id) if id.as_str() == stem => ids.push(id),
                _ => tracing::warn!("Skipping record with invalid ID: {}", path.display()),
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn saved_at(
        &self,
        entity_type: &str,
        id: &EntityId,
    ) -> Result<Option<DateTime<Utc>>, CoreError> {
        let path = self.record_path(entity_type, id);
        let metadata = match fs::metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(DateTime::<Utc>::from(metadata.modified()?)))
    }
}

fn write_file(path: &Path, bytes: &[u8], sync: bool) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(bytes)?;
    if sync {
        file.sync_all()?;
    }
    Ok(())
}
