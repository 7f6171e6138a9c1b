//! 코어 엔진 - 시맨틱 매칭과 컨텍스트 확장
//!
//! - `similarity`: 코사인 유사도
//! - `dedup`: 중복 판정
//! - `classify`: 엔티티/임팩트 신뢰도 정책
//! - `expand`: 쿼리 컨텍스트 확장
//! - `rank`: 후보 정렬
//! - `pipeline`: 수집/검색/쿼리 오케스트레이션

pub mod classify;
pub mod dedup;
pub mod expand;
pub mod pipeline;
pub mod rank;
mod similarity;

pub use classify::{
    regulatory_confidence, sector_confidence, Classification, ImpactClassifier, SentimentSummary,
};
pub use dedup::DedupResolver;
pub use expand::{
    ContextCandidate, MatchRule, QueryContext, QueryContextExpander, QueryIntent, ResolvedMention,
};
pub use pipeline::{normalize_url, IngestResult, NewsEngine, QueryAnswer, SearchHit};
pub use rank::{rank, Rankable, Ranking, ScoredArticle};
pub use similarity::similarity;
