//! 코퍼스 데이터 모델
//!
//! Article / Entity / StockImpact / DuplicateRecord 타입과
//! 고정 열거형(엔티티 종류, 임팩트 타입, 감성, 강도)을 정의합니다.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// Enums
// ============================================================================

/// 엔티티 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Company,
    Sector,
    Regulator,
    Person,
    Event,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Company,
        EntityKind::Sector,
        EntityKind::Regulator,
        EntityKind::Person,
        EntityKind::Event,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Company => "company",
            EntityKind::Sector => "sector",
            EntityKind::Regulator => "regulator",
            EntityKind::Person => "person",
            EntityKind::Event => "event",
        }
    }
}

/// 주식 임팩트 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactType {
    /// 기업이 직접 언급됨
    Direct,
    /// 업종을 통해 추론됨
    Sector,
    /// 규제 기관 조치를 통해 영향
    Regulatory,
}

impl ImpactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactType::Direct => "direct",
            ImpactType::Sector => "sector",
            ImpactType::Regulatory => "regulatory",
        }
    }
}

/// 감성 레이블
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }
}

/// 임팩트 강도
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactMagnitude {
    High,
    Medium,
    Low,
}

impl ImpactMagnitude {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactMagnitude::High => "high",
            ImpactMagnitude::Medium => "medium",
            ImpactMagnitude::Low => "low",
        }
    }
}

/// 열거형 문자열 파싱 에러
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant: {}", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

macro_rules! impl_str_enum {
    ($ty:ty { $($s:literal => $v:expr),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($s => Ok($v),)+
                    other => Err(UnknownVariant(other.to_string())),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.as_str())
            }
        }
    };
}

impl_str_enum!(EntityKind {
    "company" => EntityKind::Company,
    "companies" => EntityKind::Company,
    "sector" => EntityKind::Sector,
    "sectors" => EntityKind::Sector,
    "regulator" => EntityKind::Regulator,
    "regulators" => EntityKind::Regulator,
    "person" => EntityKind::Person,
    "people" => EntityKind::Person,
    "event" => EntityKind::Event,
    "events" => EntityKind::Event,
});

impl_str_enum!(ImpactType {
    "direct" => ImpactType::Direct,
    "sector" => ImpactType::Sector,
    "regulatory" => ImpactType::Regulatory,
});

impl_str_enum!(Sentiment {
    "positive" => Sentiment::Positive,
    "bullish" => Sentiment::Positive,
    "negative" => Sentiment::Negative,
    "bearish" => Sentiment::Negative,
    "neutral" => Sentiment::Neutral,
});

impl_str_enum!(ImpactMagnitude {
    "high" => ImpactMagnitude::High,
    "medium" => ImpactMagnitude::Medium,
    "low" => ImpactMagnitude::Low,
});

// ============================================================================
// Article
// ============================================================================

/// 저장된 기사
///
/// 임베딩과 중복/정본 필드는 삽입 시 한 번만 설정되고 이후 변경되지 않습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub source: Option<String>,
    /// 정규화된 URL (유일)
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub is_duplicate: bool,
    /// 중복일 때 정본 기사 ID (약한 참조)
    pub canonical_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// 새 기사 입력
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewArticle {
    pub title: String,
    #[serde(alias = "content")]
    pub body: String,
    #[serde(default)]
    pub source: Option<String>,
    pub url: String,
    #[serde(default, alias = "published_date", deserialize_with = "deserialize_published")]
    pub published_at: Option<DateTime<Utc>>,
}

impl NewArticle {
    /// 임베딩 입력 텍스트 (제목 + 본문)
    pub fn embedding_text(&self) -> String {
        format!("{}\n\n{}", self.title.trim(), self.body.trim())
    }

    /// 분류 입력 텍스트
    pub fn full_text(&self) -> String {
        self.embedding_text()
    }
}

/// 발행 시각 파싱 (RFC3339 또는 YYYY-MM-DD)
pub fn parse_published(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn deserialize_published<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) => match parse_published(&s) {
            Some(dt) => Ok(Some(dt)),
            None if s.trim().is_empty() => Ok(None),
            None => Err(serde::de::Error::custom(format!("invalid published date: {}", s))),
        },
    }
}

/// 기사 목록용 요약
#[derive(Debug, Clone, Serialize)]
pub struct ArticleSummary {
    pub id: i64,
    pub title: String,
    pub source: Option<String>,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub is_duplicate: bool,
    pub canonical_id: Option<i64>,
}

/// 기사 상세 (엔티티/임팩트 포함)
#[derive(Debug, Clone, Serialize)]
pub struct ArticleDetail {
    pub article: Article,
    pub entities: Vec<Entity>,
    pub impacts: Vec<StockImpact>,
}

// ============================================================================
// Entity / StockImpact
// ============================================================================

/// 정본 기사에 속한 엔티티
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    pub kind: EntityKind,
    /// 0.0 ~ 1.0
    pub confidence: f32,
}

/// 정본 기사에 속한 주식 임팩트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockImpact {
    pub symbol: String,
    pub impact_type: ImpactType,
    /// 0.0 ~ 1.0
    pub confidence: f32,
    pub sentiment: Sentiment,
    pub magnitude: Option<ImpactMagnitude>,
    /// 임팩트를 유발한 엔티티 (기업/업종/규제기관 이름)
    pub driver: String,
}

// ============================================================================
// Deduplication
// ============================================================================

/// 중복 판정 감사 기록 (append-only)
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateRecord {
    pub id: i64,
    /// 새로 삽입된 기사
    pub article_id: i64,
    /// 가장 유사했던 정본 기사
    pub matched_id: i64,
    /// 0.0 ~ 1.0
    pub similarity: f32,
    pub is_duplicate: bool,
    pub created_at: DateTime<Utc>,
}

/// 중복 판정 결과
#[derive(Debug, Clone, PartialEq)]
pub struct DedupDecision {
    pub is_duplicate: bool,
    pub canonical_id: Option<i64>,
    /// 최고 유사도 (비교 대상이 없으면 None)
    pub best_score: Option<f32>,
    pub best_match_id: Option<i64>,
}

impl DedupDecision {
    /// 비교 대상이 없을 때의 판정 (정본)
    pub fn unique() -> Self {
        Self {
            is_duplicate: false,
            canonical_id: None,
            best_score: None,
            best_match_id: None,
        }
    }
}

/// 중복 판정 비교 대상 (정본 기사의 벡터)
#[derive(Debug, Clone)]
pub struct CanonicalVector {
    pub id: i64,
    pub embedding: Vec<f32>,
    pub published_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_parse() {
        assert_eq!("company".parse::<EntityKind>(), Ok(EntityKind::Company));
        assert_eq!("Regulators".parse::<EntityKind>(), Ok(EntityKind::Regulator));
        assert_eq!("people".parse::<EntityKind>(), Ok(EntityKind::Person));
        assert!("stock".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_enum_display_roundtrip() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.to_string().parse::<EntityKind>(), Ok(kind));
        }
        assert_eq!(ImpactType::Regulatory.to_string(), "regulatory");
        assert_eq!("bearish".parse::<Sentiment>(), Ok(Sentiment::Negative));
    }

    #[test]
    fn test_new_article_deserialize_published_date_alias() {
        let json = r#"{
            "title": "HDFC Bank dividend",
            "body": "HDFC Bank announced a dividend.",
            "url": "https://example.com/hdfc",
            "published_date": "2025-01-15"
        }"#;
        let article: NewArticle = serde_json::from_str(json).unwrap();
        assert_eq!(article.published_at, parse_published("2025-01-15T00:00:00Z"));
        assert!(article.source.is_none());
    }

    #[test]
    fn test_parse_published() {
        assert!(parse_published("2024-01-02T10:30:00+05:30").is_some());
        assert!(parse_published("2024-01-02").is_some());
        assert!(parse_published("yesterday").is_none());
        assert!(parse_published("").is_none());
    }
}
