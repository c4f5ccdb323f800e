use crate::tags::EntityType;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const SELECTION_TAGS_PREFIX: &str = "selection_tags_";

/// Logical cache key for entity-type scoped tag lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheKey {
    /// `selection_tags_<entity type>`
    EntityType(EntityType),
    /// `selection_tags_*`, covering every entity type
    AllEntityTypes,
}

impl CacheKey {
    /// Key for `entity_type`, or the wildcard when the type is unknown.
    pub fn for_entity_type(entity_type: Option<EntityType>) -> Self {
        entity_type.map_or(Self::AllEntityTypes, Self::EntityType)
    }

    /// Whether invalidating `self` must drop an entry stored under `other`.
    pub fn covers(&self, other: &CacheKey) -> bool {
        match self {
            Self::AllEntityTypes => true,
            Self::EntityType(_) => self == other,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EntityType(entity_type) => write!(f, "{SELECTION_TAGS_PREFIX}{entity_type}"),
            Self::AllEntityTypes => write!(f, "{SELECTION_TAGS_PREFIX}*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_render_with_prefix() {
        assert_eq!(
            CacheKey::EntityType(EntityType::Event).to_string(),
            "selection_tags_event"
        );
        assert_eq!(CacheKey::AllEntityTypes.to_string(), "selection_tags_*");
    }

    #[test]
    fn wildcard_covers_every_type() {
        let event = CacheKey::EntityType(EntityType::Event);
        let person = CacheKey::EntityType(EntityType::Person);
        assert!(CacheKey::AllEntityTypes.covers(&event));
        assert!(event.covers(&event));
        assert!(!event.covers(&person));
        assert_eq!(CacheKey::for_entity_type(None), CacheKey::AllEntityTypes);
    }
}
