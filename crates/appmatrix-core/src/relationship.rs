use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    // Product -> Surface
    SuitableFor,
    IncompatibleWith,

    // Product -> Soilage
    Handles,
    UnsuitableFor,

    // Product -> Location
    UsedIn,

    // Product -> Benefit
    HasBenefit,

    // Product -> Category
    BelongsTo,
}

impl RelationshipType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuitableFor => "SUITABLE_FOR",
            Self::IncompatibleWith => "INCOMPATIBLE_WITH",
            Self::Handles => "HANDLES",
            Self::UnsuitableFor => "UNSUITABLE_FOR",
            Self::UsedIn => "USED_IN",
            Self::HasBenefit => "HAS_BENEFIT",
            Self::BelongsTo => "BELONGS_TO",
        }
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RelationshipType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUITABLE_FOR" => Ok(Self::SuitableFor),
            "INCOMPATIBLE_WITH" => Ok(Self::IncompatibleWith),
            "HANDLES" => Ok(Self::Handles),
            "UNSUITABLE_FOR" => Ok(Self::UnsuitableFor),
            "USED_IN" => Ok(Self::UsedIn),
            "HAS_BENEFIT" => Ok(Self::HasBenefit),
            "BELONGS_TO" => Ok(Self::BelongsTo),
            _ => Err(crate::Error::InvalidRelationshipType(s.to_string())),
        }
    }
}

/// A typed, directed edge between two entities already resolved in the
/// graph store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub source_entity_id: String,
    pub target_entity_id: String,
    pub relationship_type: RelationshipType,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Value>,
}

impl Relationship {
    #[must_use]
    pub fn new(
        source_entity_id: String,
        target_entity_id: String,
        relationship_type: RelationshipType,
    ) -> Self {
        Self {
            source_entity_id,
            target_entity_id,
            relationship_type,
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, key: &str, value: Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_relationship_type_round_trip() {
        for ty in [
            RelationshipType::SuitableFor,
            RelationshipType::IncompatibleWith,
            RelationshipType::Handles,
            RelationshipType::UnsuitableFor,
            RelationshipType::UsedIn,
            RelationshipType::HasBenefit,
            RelationshipType::BelongsTo,
        ] {
            assert_eq!(RelationshipType::from_str(ty.as_str()).unwrap(), ty);
        }
    }

    #[test]
    fn test_relationship_context_property() {
        let rel = Relationship::new("a".into(), "b".into(), RelationshipType::SuitableFor)
            .with_property("context", "compatible surface".into());

        assert_eq!(rel.properties["context"], "compatible surface");
    }
}
