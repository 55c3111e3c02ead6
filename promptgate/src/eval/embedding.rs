// promptgate/src/eval/embedding.rs
//
// Text → fixed-width f32 vector, plus cosine similarity.
//
// Two backends:
//   HashEmbedder   — random feature hashing. Word 1..3-grams are hashed
//                    through SHA-256 into ±1 features over 512 dims, summed
//                    and L2-normalized. Deterministic, offline, ~150µs per
//                    text; approximates semantic similarity well enough for
//                    baseline comparison without an ML runtime.
//   RemoteEmbedder — OpenAI-compatible /embeddings endpoint. Model is pinned
//                    at boot and never part of the cache key.
//
// A process-wide LRU (default cap 128) keyed on the first 100 characters
// fronts both backends. Concurrent misses may duplicate backend calls; the
// cache itself stays consistent.

use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

pub const HASH_DIM: usize = 512;

#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Batch embedding. Output order MUST match input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

// ── Local backend: random feature hashing ─────────────────────────────────────

pub struct HashEmbedder;

impl HashEmbedder {
    pub fn new() -> Self {
        Self
    }

    fn token_feature(token: &str) -> [f32; HASH_DIM] {
        let mut hasher = Sha256::new();
        hasher.update(b"pg_rfh_v1:");
        hasher.update(token.as_bytes());
        let digest = hasher.finalize();

        let mut feature = [0.0f32; HASH_DIM];
        for i in 0..HASH_DIM {
            let byte = digest[i / 16];
            let bit = (byte >> (i % 8)) & 1;
            feature[i] = if bit == 1 { 1.0 } else { -1.0 };
        }
        feature
    }

    fn embed_text(text: &str) -> Vec<f32> {
        let normalized = normalize_text(text);
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        let mut vector = vec![0.0f32; HASH_DIM];

        for n in 1..=3usize {
            for window in tokens.windows(n) {
                let gram = window.join(" ");
                let feature = Self::token_feature(&gram);
                for i in 0..HASH_DIM {
                    vector[i] += feature[i];
                }
            }
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 1e-8 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingBackend for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::embed_text(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::embed_text(t)).collect())
    }
}

fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == ' ' { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Remote backend ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

pub struct RemoteEmbedder {
    http:     reqwest::Client,
    base_url: String,
    api_key:  String,
    model:    String,
}

impl RemoteEmbedder {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http:     reqwest::Client::new(),
            base_url: base_url.into(),
            api_key:  api_key.into(),
            model:    model.into(),
        }
    }

    async fn request(&self, input: serde_json::Value) -> Result<Vec<Vec<f32>>> {
        let response = self
            .http
            .post(format!("{}/embeddings", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": input }))
            .send()
            .await?
            .error_for_status()?;

        let mut parsed: EmbeddingsResponse = response.json().await?;
        // The API tags each vector with its input index; sort to guarantee
        // the order contract regardless of server behavior.
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingBackend for RemoteEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request(json!(text)).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::Embedding("empty embeddings response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.request(json!(texts)).await?;
        if vectors.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

// ── Cached service ────────────────────────────────────────────────────────────

pub struct EmbeddingService {
    backend: Arc<dyn EmbeddingBackend>,
    cache:   Mutex<LruCache<String, Vec<f32>>>,
}

impl EmbeddingService {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, cache_size: usize) -> Self {
        let cap = NonZeroUsize::new(cache_size.max(1)).expect("non-zero cache size");
        Self { backend, cache: Mutex::new(LruCache::new(cap)) }
    }

    pub fn local(cache_size: usize) -> Self {
        Self::new(Arc::new(HashEmbedder::new()), cache_size)
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = cache_key(text);
        if let Some(hit) = self.cache.lock().get(&key).cloned() {
            return Ok(hit);
        }
        let vector = self.backend.embed(text).await?;
        self.cache.lock().put(key, vector.clone());
        Ok(vector)
    }

    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self.backend.embed_batch(texts).await?;
        let mut cache = self.cache.lock();
        for (text, vector) in texts.iter().zip(vectors.iter()) {
            cache.put(cache_key(text), vector.clone());
        }
        Ok(vectors)
    }

    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.is_empty() || b.is_empty() || a.len() != b.len() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

/// First 100 characters of the input. The model is pinned at boot, so it is
/// deliberately not part of the key.
fn cache_key(text: &str) -> String {
    text.chars().take(100).collect()
}
