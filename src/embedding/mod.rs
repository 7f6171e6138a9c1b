//! 임베딩 모듈 - 기사 텍스트 벡터화
//!
//! 코어 엔진은 `EmbeddingProvider` 트레이트에만 의존하며 차원 D를 가정하지 않습니다.
//!
//! - `GeminiEmbedding`: Gemini API (gemini-embedding-001)
//! - `HashingEmbedding`: 오프라인 결정적 해싱 임베딩
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(false)?;
//! let embedding = embedder.embed("RBI hikes repo rate").await?;
//! ```

mod hashing;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::gemini::{has_api_key, GeminiClient};

pub use hashing::HashingEmbedding;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 같은 텍스트는 항상 같은 벡터를 반환해야 합니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

/// source: https://ai.google.dev/gemini-api/docs/embeddings
const GEMINI_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:embedContent";

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

/// 요청당 최대 입력 문자 수 (모델 입력 한도 2048 토큰 근사)
const MAX_INPUT_CHARS: usize = 8000;

/// Google Gemini 임베딩 구현체
///
/// 중복 판정과 쿼리 검색이 같은 벡터 공간을 쓰도록 `SEMANTIC_SIMILARITY`
/// 태스크 타입 하나만 사용합니다.
#[derive(Debug, Clone)]
pub struct GeminiEmbedding {
    client: GeminiClient,
    dimension: usize,
}

impl GeminiEmbedding {
    pub fn new(client: GeminiClient) -> Result<Self> {
        Self::with_dimension(client, DEFAULT_DIMENSION)
    }

    /// 차원 지정 (768, 1536, 3072 중 선택)
    pub fn with_dimension(client: GeminiClient, dimension: usize) -> Result<Self> {
        if ![768, 1536, 3072].contains(&dimension) {
            anyhow::bail!(
                "Invalid dimension: {}. Must be 768, 1536, or 3072",
                dimension
            );
        }

        Ok(Self { client, dimension })
    }

    /// 환경변수의 API 키로 생성
    pub fn from_env() -> Result<Self> {
        Self::new(GeminiClient::from_env()?)
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: &'static str,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: &'static str,
    #[serde(rename = "outputDimensionality")]
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            anyhow::bail!("Cannot embed empty text");
        }

        let request = EmbedRequest {
            model: "models/gemini-embedding-001",
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.chars().take(MAX_INPUT_CHARS).collect(),
                }],
            },
            task_type: "SEMANTIC_SIMILARITY",
            output_dimensionality: self.dimension,
        };

        let response: EmbedResponse = self.client.post_json(GEMINI_EMBED_URL, &request).await?;
        let values = response.embedding.values;

        if values.len() != self.dimension {
            anyhow::bail!(
                "Gemini returned {} dimensions, expected {}",
                values.len(),
                self.dimension
            );
        }

        Ok(values)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "gemini-embedding-001"
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 임베딩 프로바이더 생성
///
/// `offline`이거나 API 키가 없으면 해싱 임베딩을 사용합니다.
pub fn create_embedder(offline: bool) -> Result<Arc<dyn EmbeddingProvider>> {
    if offline || !has_api_key() {
        let embedder = HashingEmbedding::new(DEFAULT_DIMENSION);
        tracing::info!(
            "Using offline hashing embedding (dimension: {})",
            embedder.dimension()
        );
        return Ok(Arc::new(embedder));
    }

    let embedder = GeminiEmbedding::from_env()?;
    tracing::info!(
        "Using Gemini API embedding (dimension: {})",
        embedder.dimension()
    );
    Ok(Arc::new(embedder))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_client() -> GeminiClient {
        GeminiClient::new("fake_key".to_string()).unwrap()
    }

    #[test]
    fn test_invalid_dimension() {
        let result = GeminiEmbedding::with_dimension(fake_client(), 999);
        let err = result.err();
        assert!(err
            .as_ref()
            .map(|e| e.to_string().contains("Invalid dimension"))
            .unwrap_or(false));
    }

    #[test]
    fn test_valid_dimensions() {
        for dim in [768, 1536, 3072] {
            let result = GeminiEmbedding::with_dimension(fake_client(), dim);
            assert!(result.is_ok());
        }
    }

    #[tokio::test]
    async fn test_gemini_rejects_empty_text() {
        let embedder = GeminiEmbedding::new(fake_client()).unwrap();
        assert!(embedder.embed("   ").await.is_err());
    }

    #[test]
    fn test_create_offline_embedder() {
        let embedder = create_embedder(true).unwrap();
        assert_eq!(embedder.dimension(), DEFAULT_DIMENSION);
        assert_eq!(embedder.name(), "hashing-bow");
    }
}
