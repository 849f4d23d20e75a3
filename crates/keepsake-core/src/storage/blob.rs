use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::model::EntityId;

/// Key-value blob storage keyed by entity type and identifier.
///
/// Every write replaces the whole blob. Implementations must make a write
/// visible either completely or not at all.
pub trait BlobStore: Send + Sync {
    /// Prepare storage for a newly registered type.
    fn prepare(&self, entity_type: &str) -> Result<(), CoreError>;

    /// Read a blob, `None` if it does not exist.
    fn read(&self, entity_type: &str, id: &EntityId) -> Result<Option<Vec<u8>>, CoreError>;

    fn write(&self, entity_type: &str, id: &EntityId, bytes: &[u8]) -> Result<(), CoreError>;

    /// Remove a blob. Returns whether it existed.
    fn delete(&self, entity_type: &str, id: &EntityId) -> Result<bool, CoreError>;

    /// IDs of every stored blob of a type.
    fn list(&self, entity_type: &str) -> Result<Vec<EntityId>, CoreError>;

    /// When the blob was last written, if the backend knows.
    fn saved_at(
        &self,
        entity_type: &str,
        id: &EntityId,
    ) -> Result<Option<DateTime<Utc>>, CoreError>;
}
