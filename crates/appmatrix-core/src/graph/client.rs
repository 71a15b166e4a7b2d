use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

use super::store::{GraphError, GraphResult, GraphStore};
use crate::entity::{EntityType, MATRIX_SOURCE};
use crate::relationship::Relationship;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// HTTP client for the knowledge-graph API.
///
/// Instance-scoped and bearer-authenticated. Requests are retried up to
/// [`MAX_RETRIES`] times with a linearly growing delay; request-level
/// errors (carrying a status) and connection-level errors are surfaced
/// as distinct [`GraphError`] variants once retries are exhausted.
///
/// Keeps its own `(type, normalized_name) -> id` cache so repeated
/// lookups within a run skip the network entirely.
pub struct GraphClient {
    http: reqwest::Client,
    api_url: Url,
    instance_id: String,
    cache: Mutex<HashMap<(EntityType, String), String>>,
}

impl GraphClient {
    pub fn new(api_url: &str, api_key: &str, instance_id: &str) -> GraphResult<Self> {
        let api_url = Url::parse(api_url.trim_end_matches('/'))?;

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| GraphError::InvalidCredential)?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()?;

        tracing::info!(instance = instance_id, url = %api_url, "graph client initialized");
        Ok(Self {
            http,
            api_url,
            instance_id: instance_id.to_string(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// True when the instance's health endpoint answers successfully.
    pub async fn health_check(&self) -> bool {
        let endpoint = format!("/instances/{}/health", self.instance_id);
        match self.request(Method::GET, &endpoint, None, None).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "graph health check failed");
                false
            }
        }
    }

    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        query: Option<&[(&str, &str)]>,
    ) -> GraphResult<Value> {
        let url = format!("{}{endpoint}", self.api_url.as_str().trim_end_matches('/'));

        let mut last_error = GraphError::MissingConfig("api_url");
        for attempt in 1..=MAX_RETRIES {
            let mut req = self.http.request(method.clone(), &url);
            if let Some(body) = body {
                req = req.json(body);
            }
            if let Some(query) = query {
                req = req.query(query);
            }

            match req.send().await {
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    if status.is_success() {
                        if text.is_empty() {
                            return Ok(Value::Null);
                        }
                        return Ok(serde_json::from_str(&text)?);
                    }
                    last_error = GraphError::Api {
                        status: status.as_u16(),
                        message: text,
                    };
                    tracing::warn!(%status, attempt, max = MAX_RETRIES, "graph API error");
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    last_error = GraphError::Connection {
                        url: url.clone(),
                        message: e.to_string(),
                    };
                    tracing::warn!(error = %e, attempt, max = MAX_RETRIES, "graph connection error");
                }
                Err(e) => {
                    last_error = GraphError::Http(e);
                    tracing::warn!(attempt, max = MAX_RETRIES, "graph request error");
                }
            }

            if attempt < MAX_RETRIES {
                tokio::time::sleep(RETRY_DELAY * attempt).await;
            }
        }

        Err(last_error)
    }

    fn entity_payload(
        entity_type: EntityType,
        name: &str,
        normalized_name: &str,
        properties: Option<&BTreeMap<String, Value>>,
    ) -> Value {
        let mut props = serde_json::Map::new();
        props.insert("normalized_name".into(), normalized_name.into());
        props.insert("source".into(), MATRIX_SOURCE.into());
        props.insert("created_at".into(), Utc::now().to_rfc3339().into());
        if let Some(extra) = properties {
            for (key, value) in extra {
                props.insert(key.clone(), value.clone());
            }
        }

        json!({
            "type": entity_type.as_str(),
            "name": name,
            "properties": props,
        })
    }

    fn relationship_payload(relationship: &Relationship) -> Value {
        let mut props = serde_json::Map::new();
        props.insert("source".into(), MATRIX_SOURCE.into());
        props.insert("created_at".into(), Utc::now().to_rfc3339().into());
        for (key, value) in &relationship.properties {
            props.insert(key.clone(), value.clone());
        }

        json!({
            "source_id": relationship.source_entity_id,
            "target_id": relationship.target_entity_id,
            "type": relationship.relationship_type.as_str(),
            "properties": props,
        })
    }

    fn extract_id(response: &Value, alt_key: &str) -> Option<String> {
        response
            .get("id")
            .or_else(|| response.get(alt_key))
            .and_then(Value::as_str)
            .map(String::from)
    }

    async fn cached_id(&self, entity_type: EntityType, normalized_name: &str) -> Option<String> {
        self.cache
            .lock()
            .await
            .get(&(entity_type, normalized_name.to_string()))
            .cloned()
    }

    async fn cache_id(&self, entity_type: EntityType, normalized_name: &str, id: &str) {
        self.cache
            .lock()
            .await
            .insert((entity_type, normalized_name.to_string()), id.to_string());
    }
}

#[async_trait]
impl GraphStore for GraphClient {
    async fn create_entity(
        &self,
        entity_type: EntityType,
        name: &str,
        normalized_name: &str,
        properties: Option<&BTreeMap<String, Value>>,
    ) -> GraphResult<String> {
        let endpoint = format!("/instances/{}/entities", self.instance_id);
        let payload = Self::entity_payload(entity_type, name, normalized_name, properties);

        let response = self
            .request(Method::POST, &endpoint, Some(&payload), None)
            .await?;
        let id = Self::extract_id(&response, "entity_id").ok_or(GraphError::MissingId)?;

        self.cache_id(entity_type, normalized_name, &id).await;
        tracing::debug!(%entity_type, name, %id, "created entity");
        Ok(id)
    }

    async fn find_entity(
        &self,
        entity_type: EntityType,
        normalized_name: &str,
    ) -> GraphResult<Option<String>> {
        if let Some(id) = self.cached_id(entity_type, normalized_name).await {
            return Ok(Some(id));
        }

        let endpoint = format!("/instances/{}/entities/search", self.instance_id);
        let ty = entity_type.as_str();
        let query = [
            ("type", ty),
            ("property", "normalized_name"),
            ("value", normalized_name),
        ];

        let response = match self.request(Method::GET, &endpoint, None, Some(&query)).await {
            Ok(response) => response,
            Err(GraphError::Api { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        let entities = response
            .get("entities")
            .or_else(|| response.get("results"))
            .and_then(Value::as_array);

        let id = entities
            .and_then(|list| list.first())
            .and_then(|entity| entity.get("id"))
            .and_then(Value::as_str)
            .map(String::from);

        if let Some(ref id) = id {
            self.cache_id(entity_type, normalized_name, id).await;
        }
        Ok(id)
    }

    async fn upsert_entity(
        &self,
        entity_type: EntityType,
        name: &str,
        normalized_name: &str,
        properties: Option<&BTreeMap<String, Value>>,
    ) -> GraphResult<String> {
        if let Some(id) = self.cached_id(entity_type, normalized_name).await {
            return Ok(id);
        }

        if let Some(id) = self.find_entity(entity_type, normalized_name).await? {
            return Ok(id);
        }

        self.create_entity(entity_type, name, normalized_name, properties)
            .await
    }

    async fn create_relationship(&self, relationship: &Relationship) -> GraphResult<String> {
        let endpoint = format!("/instances/{}/relationships", self.instance_id);
        let payload = Self::relationship_payload(relationship);

        let response = self
            .request(Method::POST, &endpoint, Some(&payload), None)
            .await?;
        let id = Self::extract_id(&response, "relationship_id").ok_or(GraphError::MissingId)?;

        tracing::debug!(
            source = relationship.source_entity_id,
            target = relationship.target_entity_id,
            ty = %relationship.relationship_type,
            "created relationship"
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationship::RelationshipType;

    #[test]
    fn test_rejects_invalid_url() {
        let result = GraphClient::new("not a url", "key", "inst");
        assert!(matches!(result, Err(GraphError::InvalidUrl(_))));
    }

    #[test]
    fn test_trims_trailing_slash() {
        let client = GraphClient::new("https://graph.example.com/api/", "key", "inst").unwrap();
        assert_eq!(client.api_url.as_str(), "https://graph.example.com/api");
    }

    #[test]
    fn test_entity_payload_shape() {
        let payload = GraphClient::entity_payload(EntityType::Surface, "Timber", "timber", None);

        assert_eq!(payload["type"], "Surface");
        assert_eq!(payload["name"], "Timber");
        assert_eq!(payload["properties"]["normalized_name"], "timber");
        assert_eq!(payload["properties"]["source"], MATRIX_SOURCE);
        assert!(payload["properties"]["created_at"].is_string());
    }

    #[test]
    fn test_entity_payload_merges_properties() {
        let mut props = BTreeMap::new();
        props.insert("is_discontinued".to_string(), Value::Bool(true));
        let payload =
            GraphClient::entity_payload(EntityType::Product, "Aerial", "aerial", Some(&props));

        assert_eq!(payload["properties"]["is_discontinued"], true);
    }

    #[test]
    fn test_relationship_payload_shape() {
        let rel = Relationship::new("a".into(), "b".into(), RelationshipType::SuitableFor)
            .with_property("context", "compatible surface".into());
        let payload = GraphClient::relationship_payload(&rel);

        assert_eq!(payload["source_id"], "a");
        assert_eq!(payload["target_id"], "b");
        assert_eq!(payload["type"], "SUITABLE_FOR");
        assert_eq!(payload["properties"]["context"], "compatible surface");
        assert_eq!(payload["properties"]["source"], MATRIX_SOURCE);
    }

    #[test]
    fn test_extract_id_fallback_key() {
        let response = json!({"relationship_id": "r-1"});
        assert_eq!(
            GraphClient::extract_id(&response, "relationship_id"),
            Some("r-1".to_string())
        );
    }
}
