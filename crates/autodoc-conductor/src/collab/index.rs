use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index transport error: {0}")]
    Transport(String),
    #[error("index returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected index response: {0}")]
    Decode(String),
    #[error("vector has dimension {got}, collection expects {expected}")]
    Dimension { expected: usize, got: usize },
    #[error("unknown collection: {0}")]
    UnknownCollection(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    pub id: Value,
    pub score: f32,
    #[serde(default)]
    pub payload: Value,
}

/// Vector store for retrieval over documented snippets.
#[async_trait::async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Create the collection if it does not exist.
    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<(), IndexError>;

    async fn upsert(&self, collection: &str, points: Vec<IndexPoint>) -> Result<(), IndexError>;

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, IndexError>;
}

// ── Qdrant ──

pub struct QdrantIndex {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

impl QdrantIndex {
    pub fn new(base_url: &str) -> Result<Self, IndexError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| IndexError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, IndexError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(IndexError::Status {
            status: status.as_u16(),
            body: body.chars().take(300).collect(),
        })
    }
}

fn transport(e: reqwest::Error) -> IndexError {
    IndexError::Transport(e.to_string())
}

#[async_trait::async_trait]
impl SimilarityIndex for QdrantIndex {
    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<(), IndexError> {
        let path = format!("collections/{name}");
        let existing = self
            .client
            .get(self.url(&path))
            .send()
            .await
            .map_err(transport)?;
        if existing.status().is_success() {
            debug!(collection = name, "collection exists");
            return Ok(());
        }
        if existing.status() != StatusCode::NOT_FOUND {
            Self::check(existing).await?;
        }

        info!(collection = name, dimension, "creating collection");
        let response = self
            .client
            .put(self.url(&path))
            .json(&json!({ "vectors": { "size": dimension, "distance": "Cosine" } }))
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<IndexPoint>) -> Result<(), IndexError> {
        if points.is_empty() {
            return Ok(());
        }
        let count = points.len();
        let response = self
            .client
            .put(self.url(&format!("collections/{collection}/points?wait=true")))
            .json(&json!({ "points": points }))
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?;
        debug!(collection, count, "points upserted");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let response = self
            .client
            .post(self.url(&format!("collections/{collection}/points/search")))
            .json(&json!({ "vector": vector, "limit": limit, "with_payload": true }))
            .send()
            .await
            .map_err(transport)?;
        let response = Self::check(response).await?;
        let parsed: QdrantResponse<Vec<SearchHit>> = response
            .json()
            .await
            .map_err(|e| IndexError::Decode(e.to_string()))?;
        Ok(parsed.result)
    }
}

// ── In-memory ──

struct Collection {
    dimension: usize,
    points: BTreeMap<String, IndexPoint>,
}

/// Process-local index with exact cosine search.
#[derive(Default)]
pub struct InMemoryIndex {
    collections: Mutex<BTreeMap<String, Collection>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .map(|c| c.get(collection).map(|c| c.points.len()).unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[async_trait::async_trait]
impl SimilarityIndex for InMemoryIndex {
    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<(), IndexError> {
        let mut collections = self.collections.lock().unwrap_or_else(|p| p.into_inner());
        collections.entry(name.to_string()).or_insert(Collection {
            dimension,
            points: BTreeMap::new(),
        });
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<IndexPoint>) -> Result<(), IndexError> {
        let mut collections = self.collections.lock().unwrap_or_else(|p| p.into_inner());
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| IndexError::UnknownCollection(collection.to_string()))?;
        for point in points {
            if point.vector.len() != target.dimension {
                return Err(IndexError::Dimension {
                    expected: target.dimension,
                    got: point.vector.len(),
                });
            }
            target.points.insert(point.id.clone(), point);
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let collections = self.collections.lock().unwrap_or_else(|p| p.into_inner());
        let target = collections
            .get(collection)
            .ok_or_else(|| IndexError::UnknownCollection(collection.to_string()))?;
        let mut hits: Vec<SearchHit> = target
            .points
            .values()
            .map(|p| SearchHit {
                id: Value::String(p.id.clone()),
                score: cosine(vector, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, vector: Vec<f32>) -> IndexPoint {
        IndexPoint {
            id: id.into(),
            vector,
            payload: json!({ "name": id }),
        }
    }

    #[tokio::test]
    async fn search_orders_by_similarity() {
        let index = InMemoryIndex::new();
        index.ensure_collection("c", 2).await.unwrap();
        index
            .upsert(
                "c",
                vec![
                    point("x", vec![1.0, 0.0]),
                    point("y", vec![0.0, 1.0]),
                    point("xy", vec![0.7, 0.7]),
                ],
            )
            .await
            .unwrap();

        let hits = index.search("c", &[1.0, 0.1], 2).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str().unwrap()).collect();
        assert_eq!(ids, vec!["x", "xy"]);
        assert_eq!(hits[0].payload["name"], "x");
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let index = InMemoryIndex::new();
        index.ensure_collection("c", 2).await.unwrap();
        index.upsert("c", vec![point("a", vec![1.0, 0.0])]).await.unwrap();
        index.upsert("c", vec![point("a", vec![0.0, 1.0])]).await.unwrap();
        assert_eq!(index.len("c"), 1);
    }

    #[tokio::test]
    async fn dimension_and_collection_are_checked() {
        let index = InMemoryIndex::new();
        assert!(matches!(
            index.upsert("missing", vec![]).await,
            Err(IndexError::UnknownCollection(_))
        ));
        index.ensure_collection("c", 3).await.unwrap();
        assert!(matches!(
            index.upsert("c", vec![point("a", vec![1.0])]).await,
            Err(IndexError::Dimension { expected: 3, got: 1 })
        ));
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine(&[2.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
