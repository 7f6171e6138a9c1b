//! 코퍼스 모듈 - 기사/엔티티/임팩트/중복 기록 저장
//!
//! - `model`: 도메인 타입
//! - `store`: SQLite 기반 코퍼스 저장소

pub mod model;
pub mod store;

pub use model::{
    parse_published, Article, ArticleDetail, ArticleSummary, CanonicalVector, DedupDecision,
    DuplicateRecord, Entity, EntityKind, ImpactMagnitude, ImpactType, NewArticle, Sentiment,
    StockImpact,
};
pub use store::{
    get_data_dir, CorpusStats, EntityFrequency, ImpactSummary, InsertOutcome, NewsStore,
    StockFrequency,
};
