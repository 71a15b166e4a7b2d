use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::parser::MatrixRow;
use crate::entity::{Entity, EntityType};

/// Canonical name -> accepted variants. Applied before display casing so
/// semantically equal names collapse to one graph node.
const DEFAULT_SYNONYMS: &[(&str, &[&str])] = &[
    // Surfaces
    ("timber", &["wood", "wooden", "hardwood", "softwood", "wooden floors"]),
    ("vinyl", &["vinyl flooring", "vinyl floors", "vinyl tiles"]),
    ("ceramic", &["ceramic tiles", "ceramics"]),
    ("concrete", &["cement", "cementitious", "concrete floors"]),
    ("terrazzo", &["sealed terrazzo"]),
    ("marble", &["sealed marble", "marble floors"]),
    ("porcelain", &["porcelain tiles", "non-porous porcelain tiles"]),
    ("linoleum", &["lino"]),
    ("stainless steel", &["stainless", "ss"]),
    ("glass", &["glass surfaces"]),
    // Locations
    ("hospitals", &["hospital", "medical facilities", "healthcare facilities"]),
    ("kitchens", &["kitchen", "commercial kitchens", "kitchen areas"]),
    (
        "food processing",
        &[
            "food processing areas",
            "food processing equipment",
            "food processing surfaces",
            "food-processing equipment",
            "food preparation areas",
        ],
    ),
    ("bathrooms", &["bathroom", "washrooms", "restrooms", "toilet areas"]),
    ("schools", &["school", "educational facilities"]),
    ("supermarkets", &["supermarket", "retail stores", "grocery stores"]),
    ("restaurants", &["restaurant", "dining areas", "food service"]),
    ("factories", &["factory", "manufacturing", "industrial"]),
    ("offices", &["office", "office buildings", "commercial buildings"]),
    ("nursing homes", &["nursing home", "aged care", "elderly care"]),
    // Soilage types
    ("grease", &["greasy", "oil", "oily", "fats"]),
    ("food residue", &["food waste", "food deposits", "organic matter"]),
    ("soap scum", &["soap residue", "detergent buildup"]),
    ("hard water", &["mineral deposits", "limescale", "calcium"]),
];

/// Products no longer listed by the manufacturer; tagged rather than
/// dropped so downstream consumers can filter.
const DISCONTINUED_PRODUCTS: &[&str] = &[
    "AERIAL",
    "CIP ALKALI-07",
    "CITRUS SPOTTER",
    "FB-42",
    "HOOK ACID",
    "HOOK OIL CONCENTRATE",
    "LCD-11",
    "POWERDET ECO",
    "SATIN FINISH SEALER",
    "SOAK TANK POWDER DETERGENT LF-3",
    "SPICE",
    "VAPOR-Q",
    "VIGOUR",
];

/// Result of entity extraction over a parsed matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub entities: BTreeMap<EntityType, Vec<Entity>>,
    pub entity_count: usize,
    pub duplicates_removed: usize,
}

/// Normalizes and deduplicates entity names across an entire run.
///
/// The synonym reverse-lookup is built once at construction; all
/// extraction passes share it.
#[derive(Debug, Clone)]
pub struct EntityExtractor {
    synonym_lookup: HashMap<String, String>,
}

impl EntityExtractor {
    #[must_use]
    pub fn new() -> Self {
        let mut extractor = Self {
            synonym_lookup: HashMap::new(),
        };
        for (canonical, variants) in DEFAULT_SYNONYMS {
            extractor.add_synonym(canonical, variants.iter().copied());
        }
        extractor
    }

    /// Merge custom synonym mappings over the defaults.
    #[must_use]
    pub fn with_synonyms<'a, I>(mut self, synonyms: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Vec<&'a str>)>,
    {
        for (canonical, variants) in synonyms {
            self.add_synonym(canonical, variants.into_iter());
        }
        self
    }

    fn add_synonym<'a>(&mut self, canonical: &str, variants: impl Iterator<Item = &'a str>) {
        self.synonym_lookup
            .insert(lookup_key(canonical), canonical.to_string());
        for variant in variants {
            self.synonym_lookup
                .insert(lookup_key(variant), canonical.to_string());
        }
    }

    /// Normalize an entity name for display.
    ///
    /// Trims, collapses whitespace runs, resolves synonyms to their
    /// canonical form, then title-cases while preserving short
    /// all-uppercase words (likely acronyms, e.g. "SDS").
    #[must_use]
    pub fn normalize_name(&self, name: &str) -> String {
        let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            return collapsed;
        }

        let resolved = self
            .synonym_lookup
            .get(&collapsed.to_lowercase())
            .cloned()
            .unwrap_or(collapsed);

        resolved
            .split(' ')
            .map(|word| {
                if is_acronym(word) {
                    word.to_string()
                } else {
                    title_case(word)
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Lowercase form of the normalized name; the identity key used for
    /// deduplication, never for display.
    #[must_use]
    pub fn normalized_key(&self, name: &str) -> String {
        self.normalize_name(name).to_lowercase()
    }

    /// Extract all unique entities from matrix rows, deduplicating on
    /// `(entity_type, normalized_key)` across the whole pass.
    #[must_use]
    pub fn extract_entities(&self, rows: &[MatrixRow]) -> ExtractionResult {
        let mut entities: BTreeMap<EntityType, Vec<Entity>> = [
            EntityType::Product,
            EntityType::Surface,
            EntityType::Soilage,
            EntityType::Location,
            EntityType::Benefit,
        ]
        .into_iter()
        .map(|ty| (ty, Vec::new()))
        .collect();

        let mut seen: HashMap<EntityType, HashSet<String>> = HashMap::new();
        let mut duplicates_removed = 0;

        for row in rows {
            self.collect(
                EntityType::Product,
                std::slice::from_ref(&row.product_name),
                &mut entities,
                &mut seen,
                &mut duplicates_removed,
            );
            self.collect(
                EntityType::Surface,
                &row.surfaces,
                &mut entities,
                &mut seen,
                &mut duplicates_removed,
            );
            // Incompatible values share the entity type of their
            // compatible counterpart; only the relationship differs.
            self.collect(
                EntityType::Surface,
                &row.incompatible_surfaces,
                &mut entities,
                &mut seen,
                &mut duplicates_removed,
            );
            self.collect(
                EntityType::Soilage,
                &row.soilage_types,
                &mut entities,
                &mut seen,
                &mut duplicates_removed,
            );
            self.collect(
                EntityType::Soilage,
                &row.incompatible_soilage,
                &mut entities,
                &mut seen,
                &mut duplicates_removed,
            );
            self.collect(
                EntityType::Location,
                &row.locations,
                &mut entities,
                &mut seen,
                &mut duplicates_removed,
            );
            self.collect(
                EntityType::Benefit,
                &row.benefits,
                &mut entities,
                &mut seen,
                &mut duplicates_removed,
            );
        }

        let entity_count = entities.values().map(Vec::len).sum();
        tracing::info!(
            entity_count,
            duplicates_removed,
            "extracted unique entities"
        );

        ExtractionResult {
            entities,
            entity_count,
            duplicates_removed,
        }
    }

    fn collect(
        &self,
        entity_type: EntityType,
        names: &[String],
        entities: &mut BTreeMap<EntityType, Vec<Entity>>,
        seen: &mut HashMap<EntityType, HashSet<String>>,
        duplicates_removed: &mut usize,
    ) {
        for name in names {
            let key = self.normalized_key(name);
            if !seen.entry(entity_type).or_default().insert(key.clone()) {
                *duplicates_removed += 1;
                continue;
            }

            let mut entity = Entity::new(entity_type, self.normalize_name(name), key);
            if entity_type == EntityType::Product && is_discontinued(name) {
                entity = entity.with_property("is_discontinued", true.into());
                tracing::info!(product = %entity.name, "marked product as discontinued");
            }
            entities.entry(entity_type).or_default().push(entity);
        }
    }

    /// Entity counts by type.
    #[must_use]
    pub fn entity_stats(result: &ExtractionResult) -> BTreeMap<&'static str, usize> {
        result
            .entities
            .iter()
            .map(|(ty, list)| (ty.as_str(), list.len()))
            .collect()
    }
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn lookup_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// True when a product appears on the discontinued list.
pub fn is_discontinued(product_name: &str) -> bool {
    let upper = product_name.trim().to_uppercase();
    DISCONTINUED_PRODUCTS.contains(&upper.as_str())
}

/// All-uppercase words of four characters or fewer are preserved.
fn is_acronym(word: &str) -> bool {
    word.chars().count() <= 4
        && word.chars().any(char::is_alphabetic)
        && word.chars().all(|c| !c.is_lowercase())
}

/// Title-case one word: uppercase each letter following a non-letter,
/// lowercase the rest ("3d-gloss" -> "3D-Gloss").
fn title_case(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut prev_alpha = false;
    for c in word.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}
