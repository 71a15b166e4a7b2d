use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::entity::EntityType;
use crate::relationship::Relationship;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Graph API error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("Connection error to {url}: {message}")]
    Connection { url: String, message: String },
    #[error("Invalid graph API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Invalid API credential")]
    InvalidCredential,
    #[error("Missing graph store configuration: {0}")]
    MissingConfig(&'static str),
    #[error("Store response carried no id")]
    MissingId,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// The four operations the pipeline needs from a graph store. Entity ids
/// are opaque strings minted by the store; `upsert_entity` is idempotent
/// on `(entity_type, normalized_name)`.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn create_entity(
        &self,
        entity_type: EntityType,
        name: &str,
        normalized_name: &str,
        properties: Option<&BTreeMap<String, Value>>,
    ) -> GraphResult<String>;

    async fn find_entity(
        &self,
        entity_type: EntityType,
        normalized_name: &str,
    ) -> GraphResult<Option<String>>;

    async fn upsert_entity(
        &self,
        entity_type: EntityType,
        name: &str,
        normalized_name: &str,
        properties: Option<&BTreeMap<String, Value>>,
    ) -> GraphResult<String>;

    async fn create_relationship(&self, relationship: &Relationship) -> GraphResult<String>;
}

/// Per-operation call counters, mostly interesting to tests asserting
/// cache behavior and dry-run isolation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub create_entity: usize,
    pub find_entity: usize,
    pub upsert_entity: usize,
    pub create_relationship: usize,
}

impl CallCounts {
    #[must_use]
    pub fn total(&self) -> usize {
        self.create_entity + self.find_entity + self.upsert_entity + self.create_relationship
    }
}

#[derive(Debug, Clone)]
struct StoredEntity {
    id: String,
    #[allow(dead_code)]
    name: String,
}

#[derive(Default)]
struct MemoryInner {
    entities: HashMap<(EntityType, String), StoredEntity>,
    relationships: Vec<Relationship>,
    calls: CallCounts,
}

/// In-memory `GraphStore` for tests and offline runs. Supports injected
/// failures keyed by normalized entity name, and a switch that fails
/// every relationship creation.
#[derive(Default)]
pub struct MemoryGraphStore {
    inner: Mutex<MemoryInner>,
    failing_entities: HashSet<String>,
    fail_relationships: bool,
}

impl MemoryGraphStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every upsert/create for this normalized name returns a 500.
    #[must_use]
    pub fn with_failing_entity(mut self, normalized_name: &str) -> Self {
        self.failing_entities.insert(normalized_name.to_string());
        self
    }

    /// Every relationship creation returns a 500.
    #[must_use]
    pub fn with_failing_relationships(mut self) -> Self {
        self.fail_relationships = true;
        self
    }

    pub async fn entity_count(&self) -> usize {
        self.inner.lock().await.entities.len()
    }

    pub async fn relationship_count(&self) -> usize {
        self.inner.lock().await.relationships.len()
    }

    pub async fn relationships(&self) -> Vec<Relationship> {
        self.inner.lock().await.relationships.clone()
    }

    pub async fn call_counts(&self) -> CallCounts {
        self.inner.lock().await.calls
    }

    fn check_entity(&self, normalized_name: &str) -> GraphResult<()> {
        if self.failing_entities.contains(normalized_name) {
            return Err(GraphError::Api {
                status: 500,
                message: format!("injected failure for '{normalized_name}'"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn create_entity(
        &self,
        entity_type: EntityType,
        name: &str,
        normalized_name: &str,
        _properties: Option<&BTreeMap<String, Value>>,
    ) -> GraphResult<String> {
        let mut inner = self.inner.lock().await;
        inner.calls.create_entity += 1;
        self.check_entity(normalized_name)?;

        let id = Uuid::new_v4().to_string();
        inner.entities.insert(
            (entity_type, normalized_name.to_string()),
            StoredEntity {
                id: id.clone(),
                name: name.to_string(),
            },
        );
        Ok(id)
    }

    async fn find_entity(
        &self,
        entity_type: EntityType,
        normalized_name: &str,
    ) -> GraphResult<Option<String>> {
        let mut inner = self.inner.lock().await;
        inner.calls.find_entity += 1;
        Ok(inner
            .entities
            .get(&(entity_type, normalized_name.to_string()))
            .map(|e| e.id.clone()))
    }

    async fn upsert_entity(
        &self,
        entity_type: EntityType,
        name: &str,
        normalized_name: &str,
        _properties: Option<&BTreeMap<String, Value>>,
    ) -> GraphResult<String> {
        let mut inner = self.inner.lock().await;
        inner.calls.upsert_entity += 1;
        self.check_entity(normalized_name)?;

        if let Some(existing) = inner.entities.get(&(entity_type, normalized_name.to_string())) {
            return Ok(existing.id.clone());
        }
        let id = Uuid::new_v4().to_string();
        inner.entities.insert(
            (entity_type, normalized_name.to_string()),
            StoredEntity {
                id: id.clone(),
                name: name.to_string(),
            },
        );
        Ok(id)
    }

    async fn create_relationship(&self, relationship: &Relationship) -> GraphResult<String> {
        let mut inner = self.inner.lock().await;
        inner.calls.create_relationship += 1;
        if self.fail_relationships {
            return Err(GraphError::Api {
                status: 500,
                message: "injected relationship failure".into(),
            });
        }
        inner.relationships.push(relationship.clone());
        Ok(Uuid::new_v4().to_string())
    }
}
