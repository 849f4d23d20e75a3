use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// A unique identifier for an entity within its type.
/// Generated as UUID v4 hex (no dashes), used as the record file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().as_simple().to_string())
    }

    /// Parse and validate an ID string. Accepts simple or hyphenated UUIDs
    /// and normalizes to the simple lowercase form.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let uuid = Uuid::parse_str(s.trim())
            .map_err(|e| CoreError::InvalidId(format!("{s:?}: {e}")))?;
        Ok(Self(uuid.as_simple().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EntityId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for EntityId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.as_simple().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_entity_id_generation() {
        let id = EntityId::new();
        assert_eq!(id.as_str().len(), 32); // UUID v4 hex, no dashes
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_entity_ids_are_distinct() {
        let ids: HashSet<EntityId> = (0..1000).map(|_| EntityId::new()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_entity_id_parse_normalizes() {
        let hyphenated = "67E55044-10B1-426F-9247-BB680E5FE0C8";
        let id = EntityId::parse(hyphenated).unwrap();
        assert_eq!(id.as_str(), "67e5504410b1426f9247bb680e5fe0c8");
        assert_eq!(EntityId::parse(id.as_str()).unwrap(), id);
    }

    #[test]
    fn test_entity_id_parse_validation() {
        assert!(EntityId::parse("").is_err());
        assert!(EntityId::parse("not-a-uuid").is_err());
        assert!(EntityId::parse("abcdef").is_err());
    }

    #[test]
    fn test_entity_id_serializes_as_plain_string() {
        let id = EntityId::parse("67e5504410b1426f9247bb680e5fe0c8").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"67e5504410b1426f9247bb680e5fe0c8\"");
    }
}
