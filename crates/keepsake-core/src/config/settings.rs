use std::path::PathBuf;

const DEFAULT_DATA_DIR: &str = "data";

/// Settings for a store's on-disk layout and write behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Root directory; each entity type gets a subdirectory.
    pub data_dir: PathBuf,
    /// Pretty-print record JSON.
    pub pretty: bool,
    /// fsync each record before it is renamed into place.
    pub sync_writes: bool,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            pretty: true,
            sync_writes: true,
        }
    }
}
