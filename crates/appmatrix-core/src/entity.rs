use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Default source tag applied to everything this pipeline creates.
pub const MATRIX_SOURCE: &str = "application_matrix";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    Product,
    Surface,
    Soilage,
    Location,
    Benefit,
    Category,
}

impl EntityType {
    pub const ALL: [Self; 6] = [
        Self::Product,
        Self::Surface,
        Self::Soilage,
        Self::Location,
        Self::Benefit,
        Self::Category,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Product => "Product",
            Self::Surface => "Surface",
            Self::Soilage => "Soilage",
            Self::Location => "Location",
            Self::Benefit => "Benefit",
            Self::Category => "Category",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Product" => Ok(Self::Product),
            "Surface" => Ok(Self::Surface),
            "Soilage" => Ok(Self::Soilage),
            "Location" => Ok(Self::Location),
            "Benefit" => Ok(Self::Benefit),
            "Category" => Ok(Self::Category),
            _ => Err(crate::Error::InvalidEntityType(s.to_string())),
        }
    }
}

/// A typed graph node, pre-persistence.
///
/// The authoritative copy lives in the external graph store; within one
/// run, `(entity_type, normalized_name)` is the identity key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: EntityType,
    /// Display form, title-cased.
    pub name: String,
    /// Lowercased, synonym-resolved dedup key. Never shown to users.
    pub normalized_name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Value>,
    pub source: String,
}

impl Entity {
    #[must_use]
    pub fn new(entity_type: EntityType, name: String, normalized_name: String) -> Self {
        Self {
            entity_type,
            name,
            normalized_name,
            properties: BTreeMap::new(),
            source: MATRIX_SOURCE.to_string(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, key: &str, value: Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }

    #[must_use]
    pub fn is_discontinued(&self) -> bool {
        self.properties
            .get("is_discontinued")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_entity_type_round_trip() {
        for ty in EntityType::ALL {
            assert_eq!(EntityType::from_str(ty.as_str()).unwrap(), ty);
        }
    }

    #[test]
    fn test_entity_type_rejects_unknown() {
        assert!(matches!(
            EntityType::from_str("Widget"),
            Err(crate::Error::InvalidEntityType(_))
        ));
    }

    #[test]
    fn test_entity_properties() {
        let entity = Entity::new(EntityType::Product, "Aerial".into(), "aerial".into())
            .with_property("is_discontinued", Value::Bool(true));

        assert!(entity.is_discontinued());
        assert_eq!(entity.source, MATRIX_SOURCE);
    }
}
