use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::extractor::EntityExtractor;
use super::parser::MatrixRow;
use crate::entity::EntityType;
use crate::graph::GraphStore;
use crate::relationship::{Relationship, RelationshipType};

/// Outcome of writing one matrix worth of rows into the graph.
///
/// Errors are collected per row and per relationship rather than
/// aborting the run; a partially-written graph with a populated error
/// list is the expected shape when the remote store misbehaves.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildResult {
    pub entities_created: usize,
    pub entities_cached: usize,
    pub relationships_created: usize,
    pub errors: Vec<String>,
}

/// A relationship staged during row processing, created after all
/// entity resolution for the row succeeded.
struct StagedRelationship {
    source_id: String,
    target_id: String,
    relationship_type: RelationshipType,
    context: &'static str,
}

/// Resolves matrix rows into graph entities and relationships.
///
/// Entity ids are memoized by `(type, normalized_name)` so each unique
/// entity hits the store at most once per builder, regardless of how
/// many rows reference it.
pub struct RelationshipBuilder {
    store: Arc<dyn GraphStore>,
    extractor: EntityExtractor,
    cache: HashMap<(EntityType, String), String>,
    entities_created: usize,
    entities_cached: usize,
}

impl RelationshipBuilder {
    pub fn new(store: Arc<dyn GraphStore>, extractor: EntityExtractor) -> Self {
        Self {
            store,
            extractor,
            cache: HashMap::new(),
            entities_created: 0,
            entities_cached: 0,
        }
    }

    /// Processes every row, then creates the staged relationships.
    ///
    /// A row that fails entity resolution contributes an error and is
    /// skipped; a relationship that fails creation contributes an error
    /// without affecting its siblings.
    pub async fn build_from_rows(&mut self, rows: &[MatrixRow]) -> BuildResult {
        let mut staged = Vec::new();
        let mut errors = Vec::new();

        for row in rows {
            match self.stage_row(row).await {
                Ok(mut row_staged) => staged.append(&mut row_staged),
                Err(e) => {
                    let message =
                        format!("Error processing product '{}': {e}", row.product_name);
                    tracing::warn!("{message}");
                    errors.push(message);
                }
            }
        }

        let mut relationships_created = 0;
        for rel in &staged {
            let relationship = Relationship::new(
                rel.source_id.clone(),
                rel.target_id.clone(),
                rel.relationship_type,
            )
            .with_property("context", rel.context.into());

            match self.store.create_relationship(&relationship).await {
                Ok(_) => relationships_created += 1,
                Err(e) => {
                    let message = format!(
                        "Error creating {} relationship ({} -> {}): {e}",
                        rel.relationship_type, rel.source_id, rel.target_id
                    );
                    tracing::warn!("{message}");
                    errors.push(message);
                }
            }
        }

        BuildResult {
            entities_created: self.entities_created,
            entities_cached: self.entities_cached,
            relationships_created,
            errors,
        }
    }

    /// Resolves a single row's product and linked entities, returning
    /// the relationships to create for it.
    async fn stage_row(&mut self, row: &MatrixRow) -> crate::graph::GraphResult<Vec<StagedRelationship>> {
        let is_discontinued = super::extractor::is_discontinued(&row.product_name);
        let mut properties = BTreeMap::new();
        properties.insert("is_discontinued".to_string(), Value::Bool(is_discontinued));

        let product_id = self
            .get_or_create(EntityType::Product, &row.product_name, Some(&properties))
            .await?;

        let links: [(&[String], EntityType, RelationshipType, &'static str); 6] = [
            (
                &row.surfaces,
                EntityType::Surface,
                RelationshipType::SuitableFor,
                "compatible surface",
            ),
            (
                &row.incompatible_surfaces,
                EntityType::Surface,
                RelationshipType::IncompatibleWith,
                "incompatible surface",
            ),
            (
                &row.soilage_types,
                EntityType::Soilage,
                RelationshipType::Handles,
                "handles soilage",
            ),
            (
                &row.incompatible_soilage,
                EntityType::Soilage,
                RelationshipType::UnsuitableFor,
                "unsuitable for soilage",
            ),
            (
                &row.locations,
                EntityType::Location,
                RelationshipType::UsedIn,
                "used in location",
            ),
            (
                &row.benefits,
                EntityType::Benefit,
                RelationshipType::HasBenefit,
                "product benefit",
            ),
        ];

        let mut staged = Vec::new();
        for (names, entity_type, relationship_type, context) in links {
            for name in names {
                let target_id = self.get_or_create(entity_type, name, None).await?;
                staged.push(StagedRelationship {
                    source_id: product_id.clone(),
                    target_id,
                    relationship_type,
                    context,
                });
            }
        }

        Ok(staged)
    }

    /// Returns the graph id for an entity, upserting it on first sight.
    async fn get_or_create(
        &mut self,
        entity_type: EntityType,
        raw_name: &str,
        properties: Option<&BTreeMap<String, Value>>,
    ) -> crate::graph::GraphResult<String> {
        let name = self.extractor.normalize_name(raw_name);
        let key = (entity_type, name.to_lowercase());

        if let Some(id) = self.cache.get(&key) {
            self.entities_cached += 1;
            return Ok(id.clone());
        }

        let id = self
            .store
            .upsert_entity(entity_type, &name, &key.1, properties)
            .await?;
        self.entities_created += 1;
        self.cache.insert(key, id.clone());
        Ok(id)
    }

    /// Cache occupancy, keyed by entity type.
    pub fn stats(&self) -> BTreeMap<EntityType, usize> {
        let mut stats = BTreeMap::new();
        for (entity_type, _) in self.cache.keys() {
            *stats.entry(*entity_type).or_insert(0) += 1;
        }
        stats
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
        self.entities_created = 0;
        self.entities_cached = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryGraphStore;

    fn row(product: &str) -> MatrixRow {
        MatrixRow {
            product_name: product.to_string(),
            benefits: vec!["High shine".to_string()],
            surfaces: vec!["timber".to_string(), "vinyl".to_string()],
            incompatible_surfaces: vec!["marble".to_string()],
            soilage_types: vec!["grease".to_string()],
            incompatible_soilage: vec![],
            locations: vec!["hospitals".to_string()],
        }
    }

    #[tokio::test]
    async fn test_builds_entities_and_relationships() {
        let store = Arc::new(MemoryGraphStore::new());
        let mut builder =
            RelationshipBuilder::new(store.clone(), EntityExtractor::new());

        let result = builder.build_from_rows(&[row("3D GLOSS")]).await;

        assert!(result.errors.is_empty());
        // product + 2 surfaces + 1 incompatible surface + 1 soilage
        // + 1 location + 1 benefit
        assert_eq!(result.entities_created, 7);
        assert_eq!(result.relationships_created, 6);
        assert_eq!(store.entity_count().await, 7);
        assert_eq!(store.relationship_count().await, 6);
    }

    #[tokio::test]
    async fn test_shared_entities_hit_cache() {
        let store = Arc::new(MemoryGraphStore::new());
        let mut builder =
            RelationshipBuilder::new(store.clone(), EntityExtractor::new());

        let result = builder
            .build_from_rows(&[row("3D GLOSS"), row("ACID WASH")])
            .await;

        assert!(result.errors.is_empty());
        // Second row shares every non-product entity with the first.
        assert_eq!(result.entities_created, 8);
        assert_eq!(result.entities_cached, 6);
        assert_eq!(store.call_counts().await.upsert_entity, 8);
    }

    #[tokio::test]
    async fn test_synonyms_collapse_to_one_entity() {
        let store = Arc::new(MemoryGraphStore::new());
        let mut builder =
            RelationshipBuilder::new(store.clone(), EntityExtractor::new());

        let mut a = row("A");
        a.surfaces = vec!["wood".to_string()];
        let mut b = row("B");
        b.surfaces = vec!["timber".to_string()];

        let result = builder.build_from_rows(&[a, b]).await;

        assert!(result.errors.is_empty());
        let stats = builder.stats();
        // wood and timber resolve to the same Surface entity.
        assert_eq!(stats[&EntityType::Surface], 2);
    }

    #[tokio::test]
    async fn test_failed_row_does_not_abort_run() {
        let store = Arc::new(MemoryGraphStore::new().with_failing_entity("bad product"));
        let mut builder =
            RelationshipBuilder::new(store.clone(), EntityExtractor::new());

        let result = builder
            .build_from_rows(&[row("BAD PRODUCT"), row("3D GLOSS")])
            .await;

        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("BAD PRODUCT"));
        // The healthy row still produced its full set.
        assert_eq!(result.relationships_created, 6);
    }

    #[tokio::test]
    async fn test_failed_relationship_is_recorded_individually() {
        let store = Arc::new(MemoryGraphStore::new().with_failing_relationships());
        let mut builder =
            RelationshipBuilder::new(store.clone(), EntityExtractor::new());

        let result = builder.build_from_rows(&[row("3D GLOSS")]).await;

        assert_eq!(result.relationships_created, 0);
        assert_eq!(result.errors.len(), 6);
        assert_eq!(result.entities_created, 7);
    }

    #[tokio::test]
    async fn test_clear_cache_resets_counters() {
        let store = Arc::new(MemoryGraphStore::new());
        let mut builder = RelationshipBuilder::new(store, EntityExtractor::new());

        builder.build_from_rows(&[row("3D GLOSS")]).await;
        builder.clear_cache();

        assert!(builder.stats().is_empty());
        assert_eq!(builder.entities_created, 0);
    }
}
