//! Qdrant evidence store over the REST API

use super::{EvidenceHit, EvidenceStore, StoreError, StoreSession, LOCAL_SOURCE_TAG};
use crate::config::StoreConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

/// Characters kept in the stored preview
const PREVIEW_CHARS: usize = 150;

/// Segments above this size are memory-mapped
const MEMMAP_THRESHOLD: u64 = 10_000;

/// Payload stored with every ingested document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidencePayload {
    pub filename: String,

    /// Full document text, used to build the prompt context
    #[serde(default)]
    pub text: String,

    pub text_preview: String,

    pub source: String,
}

impl EvidencePayload {
    pub fn local(filename: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            filename: filename.into(),
            text_preview: preview(&text),
            text,
            source: LOCAL_SOURCE_TAG.to_string(),
        }
    }
}

/// First 150 characters, with "..." when the text is longer
pub fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// One point to upsert
#[derive(Debug, Clone, Serialize)]
pub struct EvidencePoint {
    pub id: u64,
    pub vector: Vec<f32>,
    pub payload: EvidencePayload,
}

/// Factory for Qdrant sessions
#[derive(Debug, Clone)]
pub struct QdrantStore {
    config: StoreConfig,
}

impl QdrantStore {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    /// Open a concrete session, for callers that need write access
    pub fn open_session(&self) -> Result<QdrantSession, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
            .map_err(|e| StoreError::Transport {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(QdrantSession {
            client: Some(client),
            base_url: self.config.url.trim_end_matches('/').to_string(),
            collection: self.config.collection.clone(),
            api_key: self.config.api_key.clone(),
        })
    }
}

#[async_trait]
impl EvidenceStore for QdrantStore {
    async fn open(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        Ok(Box::new(self.open_session()?))
    }

    fn describe(&self) -> String {
        format!("{}/collections/{}", self.config.url, self.config.collection)
    }
}

/// One HTTP session against a Qdrant collection
pub struct QdrantSession {
    client: Option<reqwest::Client>,
    base_url: String,
    collection: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Deserialize)]
struct CollectionInfo {
    config: CollectionConfig,
}

#[derive(Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Deserialize)]
struct CollectionParams {
    vectors: VectorsConfig,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VectorsConfig {
    Single(VectorParams),
    Named(HashMap<String, VectorParams>),
}

#[derive(Deserialize)]
struct VectorParams {
    size: usize,
}

#[derive(Deserialize)]
struct ScoredPoint {
    id: serde_json::Value,
    score: f32,
    #[serde(default)]
    payload: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ScoredPoint {
    fn into_hit(self) -> EvidenceHit {
        let payload = self.payload.unwrap_or_default();
        let field = |name: &str| {
            payload
                .get(name)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        EvidenceHit {
            score: self.score,
            text: field("text").or_else(|| field("text_preview")).unwrap_or_default(),
            source: field("filename").unwrap_or_else(|| self.id.to_string()),
        }
    }
}

impl QdrantSession {
    fn client(&self) -> Result<&reqwest::Client, StoreError> {
        self.client.as_ref().ok_or(StoreError::Closed)
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    fn request(&self, method: reqwest::Method, url: String) -> Result<reqwest::RequestBuilder, StoreError> {
        let mut builder = self.client()?.request(method, url);
        if let Some(key) = &self.api_key {
            builder = builder.header("api-key", key);
        }
        Ok(builder)
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, StoreError> {
        let response = builder.send().await.map_err(transport)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::MissingCollection(self.collection.clone()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Transport {
                message: format!("HTTP {}: {}", status, body),
            });
        }

        let parsed: QdrantResponse<T> = response.json().await.map_err(|e| StoreError::Decode {
            message: e.to_string(),
        })?;
        Ok(parsed.result)
    }

    async fn collection_exists(&self) -> Result<bool, StoreError> {
        match self.vector_size().await {
            Ok(_) => Ok(true),
            Err(StoreError::MissingCollection(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create the collection with cosine distance when it does not exist
    pub async fn ensure_collection(&self, dimension: usize) -> Result<bool, StoreError> {
        if self.collection_exists().await? {
            return Ok(false);
        }

        let body = json!({
            "vectors": { "size": dimension, "distance": "Cosine" },
            "optimizers_config": { "memmap_threshold": MEMMAP_THRESHOLD },
        });
        let builder = self.request(reqwest::Method::PUT, self.collection_url())?.json(&body);
        let _: serde_json::Value = self.send(builder).await?;

        tracing::info!(collection = %self.collection, dimension, "Collection created");
        Ok(true)
    }

    /// Upsert points and wait until they are indexed
    pub async fn upsert(&self, points: &[EvidencePoint]) -> Result<(), StoreError> {
        if points.is_empty() {
            return Ok(());
        }

        let url = format!("{}/points?wait=true", self.collection_url());
        let builder = self
            .request(reqwest::Method::PUT, url)?
            .json(&json!({ "points": points }));
        let _: serde_json::Value = self.send(builder).await?;
        Ok(())
    }
}

#[async_trait]
impl StoreSession for QdrantSession {
    async fn vector_size(&self) -> Result<usize, StoreError> {
        let builder = self.request(reqwest::Method::GET, self.collection_url())?;
        let info: CollectionInfo = self.send(builder).await?;

        match info.config.params.vectors {
            VectorsConfig::Single(params) => Ok(params.size),
            VectorsConfig::Named(named) if named.len() == 1 => {
                Ok(named.into_values().next().map(|p| p.size).unwrap_or_default())
            }
            VectorsConfig::Named(named) => Err(StoreError::Decode {
                message: format!("expected one vector space, found {}", named.len()),
            }),
        }
    }

    async fn nearest(
        &self,
        vector: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<EvidenceHit>, StoreError> {
        let url = format!("{}/points/search", self.collection_url());
        let body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
            "score_threshold": score_threshold,
        });
        let builder = self.request(reqwest::Method::POST, url)?.json(&body);
        let points: Vec<ScoredPoint> = self.send(builder).await?;

        Ok(points.into_iter().map(ScoredPoint::into_hit).collect())
    }

    fn close(&mut self) {
        self.client = None;
    }
}

fn transport(error: reqwest::Error) -> StoreError {
    StoreError::Transport {
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_marks_truncation() {
        assert_eq!(preview("short text"), "short text");

        let long = "я".repeat(200);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), 153);

        let exact = "a".repeat(150);
        assert_eq!(preview(&exact), exact);
    }

    #[test]
    fn test_point_serialization() {
        let point = EvidencePoint {
            id: 42,
            vector: vec![0.5, 0.25],
            payload: EvidencePayload::local("nsclc.txt", "Osimertinib is first line."),
        };
        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(json["id"], 42);
        assert_eq!(json["payload"]["filename"], "nsclc.txt");
        assert_eq!(json["payload"]["source"], "local_processing");
        assert_eq!(json["payload"]["text_preview"], "Osimertinib is first line.");
    }

    #[test]
    fn test_collection_info_single_and_named() {
        let single = r#"{"result":{"status":"green","config":{"params":{"vectors":{"size":768,"distance":"Cosine"}}}}}"#;
        let parsed: QdrantResponse<CollectionInfo> = serde_json::from_str(single).unwrap();
        assert!(matches!(parsed.result.config.params.vectors, VectorsConfig::Single(VectorParams { size: 768 })));

        let named = r#"{"result":{"config":{"params":{"vectors":{"dense":{"size":384,"distance":"Cosine"}}}}}}"#;
        let parsed: QdrantResponse<CollectionInfo> = serde_json::from_str(named).unwrap();
        assert!(matches!(parsed.result.config.params.vectors, VectorsConfig::Named(ref m) if m["dense"].size == 384));
    }

    #[test]
    fn test_scored_point_text_falls_back_to_preview() {
        let raw = r#"[
            {"id": 7, "score": 0.81, "payload": {"filename": "a.txt", "text": "full body", "text_preview": "full..."}},
            {"id": 8, "score": 0.62, "payload": {"filename": "b.txt", "text_preview": "only preview"}},
            {"id": 9, "score": 0.55, "payload": null}
        ]"#;
        let points: Vec<ScoredPoint> = serde_json::from_str(raw).unwrap();
        let hits: Vec<EvidenceHit> = points.into_iter().map(ScoredPoint::into_hit).collect();

        assert_eq!(hits[0].text, "full body");
        assert_eq!(hits[1].text, "only preview");
        assert_eq!(hits[1].source, "b.txt");
        assert_eq!(hits[2].text, "");
        assert_eq!(hits[2].source, "9");
    }

    #[tokio::test]
    async fn test_closed_session_refuses_requests() {
        let store = QdrantStore::new(StoreConfig::default());
        let mut session = store.open_session().unwrap();
        session.close();
        session.close();
        assert!(matches!(session.vector_size().await, Err(StoreError::Closed)));
    }
}
