// promptgate/src/eval/baseline.rs
//
// Safe/unsafe reference corpora per domain. Exemplars are embedded once on
// initialization; after that the corpora are immutable and readers need no
// synchronization.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use super::embedding::EmbeddingService;
use super::types::Domain;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineClass {
    Safe,
    Unsafe,
}

/// Caller-supplied corpus file: `{"safe_patterns": [...], "unsafe_patterns": [...]}`.
#[derive(Debug, Deserialize)]
struct CorpusFile {
    #[serde(default)]
    safe_patterns: Vec<String>,
    #[serde(default)]
    unsafe_patterns: Vec<String>,
}

pub struct BaselineManager {
    domain:          Domain,
    safe_texts:      Vec<String>,
    unsafe_texts:    Vec<String>,
    safe_vectors:    Vec<Vec<f32>>,
    unsafe_vectors:  Vec<Vec<f32>>,
    initialized:     bool,
}

impl BaselineManager {
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            safe_texts:     Vec::new(),
            unsafe_texts:   Vec::new(),
            safe_vectors:   Vec::new(),
            unsafe_vectors: Vec::new(),
            initialized:    false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Embed the domain's default exemplars.
    pub async fn initialize(&mut self, embeddings: &EmbeddingService) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        let profile = self.domain.profile();
        let safe: Vec<String> = profile.safe_baselines.iter().map(|s| s.to_string()).collect();
        let unsafe_: Vec<String> = profile.unsafe_baselines.iter().map(|s| s.to_string()).collect();
        self.install(embeddings, safe, unsafe_).await
    }

    /// Embed a caller-supplied corpus instead of the defaults.
    pub async fn initialize_from_file(
        &mut self,
        embeddings: &EmbeddingService,
        path: &Path,
    ) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        let raw = std::fs::read_to_string(path)?;
        let corpus: CorpusFile = serde_json::from_str(&raw)?;
        if corpus.safe_patterns.is_empty() && corpus.unsafe_patterns.is_empty() {
            return Err(Error::Baseline(format!(
                "corpus file {} has no patterns",
                path.display()
            )));
        }
        self.install(embeddings, corpus.safe_patterns, corpus.unsafe_patterns).await
    }

    async fn install(
        &mut self,
        embeddings: &EmbeddingService,
        safe: Vec<String>,
        unsafe_: Vec<String>,
    ) -> Result<()> {
        self.safe_vectors = embeddings.embed_batch(&safe).await?;
        self.unsafe_vectors = embeddings.embed_batch(&unsafe_).await?;
        self.safe_texts = safe;
        self.unsafe_texts = unsafe_;
        self.initialized = true;
        Ok(())
    }

    /// Max cosine similarity of `embedding` over one class. Missing classes
    /// score 0.
    pub fn max_similarity(&self, embedding: &[f32], class: BaselineClass) -> f32 {
        let vectors = match class {
            BaselineClass::Safe => &self.safe_vectors,
            BaselineClass::Unsafe => &self.unsafe_vectors,
        };
        vectors
            .iter()
            .map(|v| EmbeddingService::cosine_similarity(embedding, v))
            .fold(0.0f32, f32::max)
    }

    pub fn counts(&self) -> (usize, usize) {
        (self.safe_texts.len(), self.unsafe_texts.len())
    }
}
