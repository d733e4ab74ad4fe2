//! Text encoders
//!
//! The embedding model is an external collaborator. `HashingEncoder` is a
//! deterministic offline stand-in; `HttpEncoder` talks to any
//! OpenAI-compatible `/embeddings` endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::config::{EmbeddingConfig, EmbeddingProvider};

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed embedding response: {0}")]
    Response(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("expected {expected} embeddings, got {actual}")]
    Count { expected: usize, actual: usize },
}

#[async_trait]
pub trait Encoder: Send + Sync {
    /// Identifier recorded in the index manifest.
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    /// One vector per input text, in input order.
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError>;
}

/// Build the encoder selected by `[embedding]`.
pub fn encoder_from_config(cfg: &EmbeddingConfig) -> Result<Arc<dyn Encoder>, EncoderError> {
    Ok(match cfg.provider {
        EmbeddingProvider::Hashing => Arc::new(HashingEncoder::new(cfg.dimensions as usize)),
        EmbeddingProvider::Http => Arc::new(HttpEncoder::from_config(cfg)?),
    })
}

// ---------------------------------------------------------------------------
// HashingEncoder
// ---------------------------------------------------------------------------

/// Signed feature hashing over lowercase word unigrams and bigrams.
#[derive(Debug, Clone)]
pub struct HashingEncoder {
    dimension: usize,
    model_id: String,
}

impl HashingEncoder {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_id: format!("hashing-v1-{dimension}"),
        }
    }

    fn tokens(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect()
    }

    fn accumulate(&self, feature: &str, weight: f32, out: &mut [f32]) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut word = [0u8; 8];
        word.copy_from_slice(&digest[..8]);
        let h = u64::from_le_bytes(word);
        let bucket = (h % self.dimension as u64) as usize;
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        out[bucket] += sign * weight;
    }

    pub fn encode_one(&self, text: &str) -> Vec<f32> {
        let mut out = vec![0.0; self.dimension];
        let tokens = Self::tokens(text);
        for token in &tokens {
            self.accumulate(token, 1.0, &mut out);
        }
        for pair in tokens.windows(2) {
            self.accumulate(&format!("{} {}", pair[0], pair[1]), 0.5, &mut out);
        }
        out
    }
}

#[async_trait]
impl Encoder for HashingEncoder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        Ok(texts.iter().map(|t| self.encode_one(t)).collect())
    }
}

// ---------------------------------------------------------------------------
// HttpEncoder
// ---------------------------------------------------------------------------

pub struct HttpEncoder {
    client: Client,
    url: String,
    model: String,
    dimension: usize,
    api_key: Option<String>,
}

impl HttpEncoder {
    pub fn from_config(cfg: &EmbeddingConfig) -> Result<Self, EncoderError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            url: format!("{}{}", cfg.api_base.trim_end_matches('/'), cfg.path),
            model: cfg.model.clone(),
            dimension: cfg.dimensions as usize,
            api_key: cfg.api_key.clone(),
        })
    }
}

#[async_trait]
impl Encoder for HttpEncoder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
            "dimensions": self.dimension,
        });
        let mut req = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        debug!(url = %self.url, batch = texts.len(), "requesting embeddings");
        let json: Value = req.send().await?.error_for_status()?.json().await?;

        let vectors = parse_embedding_response(json)?;
        if vectors.len() != texts.len() {
            return Err(EncoderError::Count {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(EncoderError::Dimension {
                expected: self.dimension,
                actual: bad.len(),
            });
        }
        Ok(vectors)
    }
}

/// Extract `data[].embedding`, ordered by `data[].index`.
fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>, EncoderError> {
    let data = json
        .get("data")
        .and_then(|v| v.as_array())
        .ok_or_else(|| EncoderError::Response("missing data array".to_string()))?;

    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
    for (fallback_index, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(fallback_index);
        let embedding = item
            .get("embedding")
            .and_then(|v| v.as_array())
            .ok_or_else(|| EncoderError::Response("item missing embedding array".to_string()))?;
        let vec = embedding
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|n| n as f32)
                    .ok_or_else(|| EncoderError::Response("non-numeric embedding value".into()))
            })
            .collect::<Result<Vec<f32>, _>>()?;
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}
