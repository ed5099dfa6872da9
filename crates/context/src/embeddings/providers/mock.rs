//! Deterministic hashing embedding provider.
//!
//! Words and their character trigrams are hashed into buckets, giving
//! content-dependent vectors without any model. Used offline and in tests;
//! texts that share vocabulary score higher than texts that do not.

use crate::embeddings::provider::EmbeddingProvider;
use dashlens_core::AppResult;
use std::collections::{BTreeMap, HashSet};

const DEFAULT_MODEL: &str = "trigram-v1";

const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them", "what", "how", "show", "me",
];

/// Mock provider for testing and development.
#[derive(Debug)]
pub struct MockProvider {
    model: String,
    dimensions: usize,
    stop_words: HashSet<&'static str>,
}

impl MockProvider {
    /// Create a new mock provider with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self::with_model(DEFAULT_MODEL, dimensions)
    }

    /// Create a mock provider that reports `model` as its model name.
    pub fn with_model(model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model: model.into(),
            dimensions: dimensions.max(1),
            stop_words: STOP_WORDS.iter().copied().collect(),
        }
    }

    /// Also skip `words` when hashing.
    pub fn ignoring(mut self, words: &[&'static str]) -> Self {
        self.stop_words.extend(words.iter().copied());
        self
    }

    fn tokens<'a>(&self, lower: &'a str) -> BTreeMap<&'a str, u32> {
        let mut freq = BTreeMap::new();
        for word in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 2 && !self.stop_words.contains(*w))
        {
            *freq.entry(word).or_insert(0) += 1;
        }
        freq
    }

    fn bucket(&self, bytes: impl Iterator<Item = u8>, multiplier: u64) -> usize {
        let hash = bytes.fold(0u64, |acc, b| {
            acc.wrapping_mul(multiplier).wrapping_add(u64::from(b))
        });
        (hash % self.dimensions as u64) as usize
    }

    /// Embed `text`; input without usable words yields the zero vector.
    fn generate(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];
        let lower = text.to_lowercase();

        for (word, freq) in self.tokens(&lower) {
            let chars: Vec<char> = word.chars().collect();
            let weight = (freq as f32).sqrt();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                embedding[self.bucket(trigram.bytes(), 37)] += weight;
            }
            embedding[self.bucket(word.bytes(), 31)] += freq as f32;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }
        embedding
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.generate(text)).collect())
    }
}
