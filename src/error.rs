//! 에러 타입 - 코어 엔진의 에러 분류
//!
//! 어댑터/저장소 계층은 anyhow로 컨텍스트를 쌓고,
//! 엔진 경계에서는 호출자가 구분해야 하는 실패를 `IntelError`로 노출합니다.

use thiserror::Error;

/// 코어 엔진 에러
#[derive(Debug, Error)]
pub enum IntelError {
    /// 차원이 다른 두 벡터를 비교함 (해당 비교에만 치명적)
    #[error("Dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    /// 임베딩 프로바이더 실패/타임아웃 (해당 기사 수집 실패)
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// 추출 기능 실패/타임아웃 (기사 수집은 계속 진행)
    #[error("Extraction unavailable: {0}")]
    ExtractionUnavailable(String),

    /// 존재하지 않는 기사/엔티티 참조
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// 잘못된 입력 (URL, 설정값 등)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 저장소 에러
    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl IntelError {
    /// 기사 NotFound 생성
    pub fn article_not_found(id: i64) -> Self {
        Self::NotFound {
            kind: "Article",
            id: id.to_string(),
        }
    }
}

/// 코어 엔진 Result
pub type Result<T> = std::result::Result<T, IntelError>;
