//! finnews-rag - 금융 뉴스 인텔리전스
//!
//! 임베딩 기반 중복 기사 제거, 엔티티/주식 임팩트 신뢰도 산정,
//! 쿼리 의도에 따른 컨텍스트 확장 검색을 제공하는 로컬 시스템입니다.

pub mod cli;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extraction;
pub mod gemini;
pub mod scraper;
pub mod vocabulary;

// Re-exports
pub use config::EngineConfig;
pub use corpus::{
    get_data_dir, Article, ArticleDetail, ArticleSummary, CorpusStats, DuplicateRecord, Entity,
    EntityKind, ImpactMagnitude, ImpactType, NewArticle, NewsStore, Sentiment, StockImpact,
};
pub use embedding::{create_embedder, EmbeddingProvider, GeminiEmbedding, HashingEmbedding};
pub use engine::{
    similarity, ContextCandidate, DedupResolver, ImpactClassifier, IngestResult, NewsEngine,
    QueryAnswer, QueryIntent, SearchHit,
};
pub use error::{IntelError, Result};
pub use extraction::{
    create_extractor, ExtractionCapability, ExtractionResult, GeminiExtraction, KeywordExtraction,
};
pub use gemini::{get_api_key, has_api_key};
pub use scraper::{ScrapedArticle, WebScraper};
pub use vocabulary::Vocabulary;
