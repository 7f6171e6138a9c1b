//! 추출 모듈 - 기사 텍스트에서 엔티티/주식 언급/감성 추출
//!
//! 코어 엔진은 `ExtractionCapability` 트레이트에만 의존합니다.
//! 신뢰도는 여기서 매기지 않고 분류기(`engine::classify`)가 결정합니다.
//!
//! - `GeminiExtraction`: Gemini generateContent JSON 응답
//! - `KeywordExtraction`: 오프라인 어휘 기반 추출

mod gemini;
mod keyword;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::corpus::model::{EntityKind, ImpactMagnitude, Sentiment};
use crate::gemini::has_api_key;
use crate::vocabulary::Vocabulary;

pub use gemini::GeminiExtraction;
pub use keyword::KeywordExtraction;

// ============================================================================
// Types
// ============================================================================

/// 추출된 엔티티 언급 (신뢰도 없음)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMention {
    pub text: String,
    pub kind: EntityKind,
}

impl EntityMention {
    pub fn new(text: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }
}

/// 추출된 주식 언급
///
/// `sector`/`regulator`는 해당 종목이 업종/규제 경로로 연결된 경우의 근거입니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockMention {
    pub symbol: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub regulator: Option<String>,
}

/// 추출 결과
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub entities: Vec<EntityMention>,
    pub stocks: Vec<StockMention>,
    pub sentiment: Sentiment,
    pub magnitude: Option<ImpactMagnitude>,
}

impl ExtractionResult {
    /// 형식 검증 (빈 텍스트/심볼은 잘못된 출력)
    pub fn validate(&self) -> Result<()> {
        if let Some(e) = self.entities.iter().find(|e| e.text.trim().is_empty()) {
            anyhow::bail!("Malformed extraction: empty {} entity", e.kind);
        }
        if self.stocks.iter().any(|s| s.symbol.trim().is_empty()) {
            anyhow::bail!("Malformed extraction: stock mention without symbol");
        }
        Ok(())
    }

    /// 종류별 엔티티 텍스트
    pub fn entities_of(&self, kind: EntityKind) -> impl Iterator<Item = &str> {
        self.entities
            .iter()
            .filter(move |e| e.kind == kind)
            .map(|e| e.text.as_str())
    }
}

// ============================================================================
// ExtractionCapability Trait
// ============================================================================

/// 외부 추출 기능
///
/// 실패/타임아웃은 호출자가 처리하며 기사 수집 자체를 막지 않습니다.
#[async_trait]
pub trait ExtractionCapability: Send + Sync {
    async fn extract(&self, text: &str) -> Result<ExtractionResult>;

    fn name(&self) -> &str;
}

// ============================================================================
// Factory Function
// ============================================================================

/// 추출기 생성
///
/// `offline`이거나 API 키가 없으면 어휘 기반 추출을 사용합니다.
pub fn create_extractor(
    offline: bool,
    vocabulary: &Vocabulary,
) -> Result<Arc<dyn ExtractionCapability>> {
    if offline || !has_api_key() {
        tracing::info!("Using offline keyword extraction");
        return Ok(Arc::new(KeywordExtraction::new(vocabulary.clone())));
    }

    let extractor = GeminiExtraction::from_env()?;
    tracing::info!("Using Gemini extraction ({})", extractor.name());
    Ok(Arc::new(extractor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_blank_values() {
        let mut result = ExtractionResult::default();
        assert!(result.validate().is_ok());

        result.entities.push(EntityMention::new("  ", EntityKind::Company));
        assert!(result.validate().is_err());

        result.entities.clear();
        result.stocks.push(StockMention::default());
        assert!(result.validate().is_err());
    }

    #[test]
    fn test_entities_of() {
        let result = ExtractionResult {
            entities: vec![
                EntityMention::new("HDFC Bank", EntityKind::Company),
                EntityMention::new("RBI", EntityKind::Regulator),
            ],
            ..Default::default()
        };
        assert_eq!(result.entities_of(EntityKind::Regulator).collect::<Vec<_>>(), vec!["RBI"]);
    }

    #[test]
    fn test_create_offline_extractor() {
        let extractor = create_extractor(true, &Vocabulary::builtin()).unwrap();
        assert_eq!(extractor.name(), "keyword");
    }
}
