use crate::core::{RepoError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Closed classification of taggable entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    Event,
    Group,
    Post,
    Resource,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        Self::Person,
        Self::Organization,
        Self::Event,
        Self::Group,
        Self::Post,
        Self::Resource,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Event => "event",
            Self::Group => "group",
            Self::Post => "post",
            Self::Resource => "resource",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|entity_type| entity_type.as_str() == s)
            .ok_or_else(|| RepoError::InvalidEntityType(s.to_string()))
    }
}

/// The entity types a [`TagService`](super::TagService) accepts.
///
/// Passed in explicitly; there is no process-wide registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTypeSet {
    allowed: BTreeSet<EntityType>,
}

impl EntityTypeSet {
    pub fn new(allowed: impl IntoIterator<Item = EntityType>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    /// Every [`EntityType`] variant.
    pub fn all() -> Self {
        Self::new(EntityType::ALL)
    }

    pub fn contains(&self, entity_type: EntityType) -> bool {
        self.allowed.contains(&entity_type)
    }

    /// Parses `raw` and checks membership.
    pub fn validate(&self, raw: &str) -> Result<EntityType> {
        let entity_type: EntityType = raw.parse()?;
        if !self.contains(entity_type) {
            return Err(RepoError::InvalidEntityType(raw.to_string()));
        }
        Ok(entity_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = EntityType> + '_ {
        self.allowed.iter().copied()
    }
}

impl Default for EntityTypeSet {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names_only() {
        assert_eq!("event".parse::<EntityType>().unwrap(), EntityType::Event);
        assert!(matches!(
            "Event".parse::<EntityType>(),
            Err(RepoError::InvalidEntityType(_))
        ));
    }

    #[test]
    fn restricted_set_rejects_excluded_types() {
        let set = EntityTypeSet::new([EntityType::Person, EntityType::Event]);
        assert_eq!(set.validate("person").unwrap(), EntityType::Person);
        assert!(set.validate("group").is_err());
        assert!(set.validate("spaceship").is_err());
    }
}
