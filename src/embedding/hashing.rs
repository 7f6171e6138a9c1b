//! 오프라인 해싱 임베딩
//!
//! 소문자 단어 unigram/bigram을 SHA-256으로 D개 버킷에 부호 해싱하고
//! L2 정규화합니다. API 키 없이 동작하며 같은 텍스트는 항상 같은 벡터가 됩니다.

use std::sync::OnceLock;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use sha2::{Digest, Sha256};

use super::EmbeddingProvider;

/// bigram 가중치 (unigram = 1.0)
const BIGRAM_WEIGHT: f32 = 0.5;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "in", "is", "it",
    "its", "of", "on", "or", "that", "the", "this", "to", "was", "were", "will", "with",
];

fn token_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\p{L}\p{N}]+(?:[.'][\p{L}\p{N}]+)*").ok())
        .as_ref()
}

/// 소문자 텍스트를 토큰으로 분리 (불용어 제외)
fn tokenize(lowered: &str) -> Vec<&str> {
    let tokens: Vec<&str> = match token_regex() {
        Some(re) => re.find_iter(lowered).map(|m| m.as_str()).collect(),
        None => lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect(),
    };

    tokens
        .into_iter()
        .filter(|t| !STOPWORDS.contains(t))
        .collect()
}

/// 해싱 기반 임베딩
#[derive(Debug, Clone)]
pub struct HashingEmbedding {
    dimension: usize,
}

impl HashingEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// 동기 벡터화 (임베딩 본체)
    pub fn vectorize(&self, text: &str) -> Option<Vec<f32>> {
        let lowered = text.to_lowercase();
        let tokens = tokenize(&lowered);

        if tokens.is_empty() {
            return None;
        }

        let mut vector = vec![0.0f32; self.dimension];

        for token in &tokens {
            self.accumulate(&mut vector, token, 1.0);
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.accumulate(&mut vector, &bigram, BIGRAM_WEIGHT);
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return None;
        }
        for x in &mut vector {
            *x /= norm;
        }

        Some(vector)
    }

    fn accumulate(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        let hash = u64::from_le_bytes(bytes);

        let index = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[index] += sign * weight;
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.vectorize(text)
            .ok_or_else(|| anyhow::anyhow!("Text has no embeddable tokens"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing-bow"
    }
}
