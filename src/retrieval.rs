// coordinator-agent: Vector store client for candidate retrieval

use crate::config::{CoordinatorConfig, SERVICE_COLLECTION};
use crate::error::{CoordinatorError, CoordinatorResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// One nearest-neighbour hit from the service catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub metadata: Value,
    pub distance: f64,
}

/// Client for the Chroma v1 HTTP API.
pub struct VectorStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
}

impl VectorStore {
    pub fn new(config: &CoordinatorConfig) -> CoordinatorResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CoordinatorError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.chroma_url.trim_end_matches('/').to_string(),
            collection: SERVICE_COLLECTION.to_string(),
        })
    }

    /// Resolve the catalog collection name to its id.
    pub async fn collection_id(&self) -> CoordinatorResult<String> {
        let url = format!("{}/api/v1/collections", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CoordinatorError::Upstream(format!("chroma error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoordinatorError::Upstream(format!(
                "chroma collections returned HTTP {}",
                status
            )));
        }

        let collections: Vec<Value> = response
            .json()
            .await
            .map_err(|e| CoordinatorError::Upstream(format!("chroma response not JSON: {}", e)))?;

        collections
            .iter()
            .find(|col| col.get("name").and_then(Value::as_str) == Some(&self.collection))
            .and_then(|col| col.get("id").and_then(Value::as_str))
            .map(str::to_string)
            .ok_or_else(|| {
                CoordinatorError::Upstream(format!("collection '{}' not found", self.collection))
            })
    }

    /// Query the catalog with an embedding and return the top-k candidates.
    pub async fn query(&self, embedding: &[f32], k: usize) -> CoordinatorResult<Vec<SearchHit>> {
        let collection_id = self.collection_id().await?;
        let url = format!(
            "{}/api/v1/collections/{}/query",
            self.base_url, collection_id
        );

        let payload = json!({
            "query_embeddings": [embedding],
            "n_results": k,
            "include": ["documents", "metadatas", "distances"],
        });

        debug!(collection = %collection_id, k = k, "Querying vector store");

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| CoordinatorError::Upstream(format!("vector search error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CoordinatorError::Upstream(format!(
                "vector search error: {}",
                text
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CoordinatorError::Upstream(format!("vector search not JSON: {}", e)))?;

        Ok(parse_hits(&body))
    }
}

/// Chroma returns parallel arrays nested one level per query embedding.
fn parse_hits(body: &Value) -> Vec<SearchHit> {
    let first = |key: &str| -> Vec<Value> {
        body.get(key)
            .and_then(Value::as_array)
            .and_then(|outer| outer.first())
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    };

    let ids = first("ids");
    let metadatas = first("metadatas");
    let distances = first("distances");

    ids.iter()
        .enumerate()
        .filter_map(|(i, id)| {
            Some(SearchHit {
                id: id.as_str()?.to_string(),
                metadata: metadatas.get(i).cloned().unwrap_or(Value::Null),
                distance: distances.get(i).and_then(Value::as_f64).unwrap_or(0.0),
            })
        })
        .collect()
}
