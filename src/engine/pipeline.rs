//! 뉴스 엔진 - 수집/검색/쿼리 파이프라인
//!
//! 수집: 텍스트 → 임베딩 → 중복 판정 → (정본만) 분류 → 저장
//! 쿼리: 텍스트 → 의도 해석 → (thematic이면 임베딩) → 컨텍스트 확장 → 랭킹
//!
//! 외부 임베딩/추출 호출은 저장소 락 밖에서 타임아웃과 함께 실행합니다.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;

use super::classify::{Classification, ImpactClassifier, SentimentSummary};
use super::dedup::DedupResolver;
use super::expand::{
    query_vocabulary, ContextCandidate, QueryContextExpander, QueryIntent, ResolvedMention,
};
use super::rank::{rank, ScoredArticle};
use crate::config::EngineConfig;
use crate::corpus::model::{
    Article, ArticleDetail, ArticleSummary, DedupDecision, Entity, EntityKind, NewArticle,
    StockImpact,
};
use crate::corpus::store::{
    get_data_dir, CorpusStats, EntityFrequency, ImpactSummary, InsertOutcome, NewsStore,
};
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::engine::similarity;
use crate::error::{IntelError, Result};
use crate::extraction::{create_extractor, ExtractionCapability, ExtractionResult};
use crate::vocabulary::Vocabulary;

// ============================================================================
// Types
// ============================================================================

/// 수집 결과
#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub article: Article,
    /// 이미 같은 URL이 있어 새로 저장하지 않음
    pub already_present: bool,
    /// 중복 판정 (기존 기사면 None)
    #[serde(skip)]
    pub decision: Option<DedupDecision>,
    pub best_score: Option<f32>,
    pub entities: Vec<Entity>,
    pub impacts: Vec<StockImpact>,
    pub sentiment: Option<SentimentSummary>,
    /// 추출/분류 저장 실패 사유 (분류 없이 수집된 경우)
    pub extraction_error: Option<String>,
}

/// 검색 결과
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub article_id: i64,
    pub title: String,
    pub url: String,
    pub similarity: f32,
    pub published_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// 쿼리 응답
#[derive(Debug, Clone, Serialize)]
pub struct QueryAnswer {
    pub query: String,
    pub intent: QueryIntent,
    pub mentions: Vec<ResolvedMention>,
    pub results: Vec<ContextCandidate>,
    /// 응답에 사용된 기사 수
    pub articles_used: usize,
    /// 랭킹 전 후보 수
    pub total_candidates: usize,
}

// ============================================================================
// NewsEngine
// ============================================================================

/// 뉴스 엔진
///
/// 코퍼스 저장소를 단독 소유하고 임베딩/추출 기능을 주입받습니다.
pub struct NewsEngine {
    store: NewsStore,
    embedder: Arc<dyn EmbeddingProvider>,
    extractor: Arc<dyn ExtractionCapability>,
    vocabulary: Vocabulary,
    config: EngineConfig,
    resolver: DedupResolver,
}

impl NewsEngine {
    /// 구성 요소로 생성
    pub fn new(
        store: NewsStore,
        embedder: Arc<dyn EmbeddingProvider>,
        extractor: Arc<dyn ExtractionCapability>,
        vocabulary: Vocabulary,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            store,
            embedder,
            extractor,
            vocabulary,
            resolver: DedupResolver::new(config.duplicate_threshold),
            config,
        })
    }

    /// 기본 데이터 디렉토리(~/.finnews-rag/)로 생성
    pub fn open_default(offline: bool, config: EngineConfig) -> Result<Self> {
        Self::with_data_dir(&get_data_dir(), offline, config)
    }

    /// 지정된 데이터 디렉토리로 생성
    pub fn with_data_dir(data_dir: &Path, offline: bool, config: EngineConfig) -> Result<Self> {
        if !data_dir.exists() {
            std::fs::create_dir_all(data_dir).context("Failed to create data directory")?;
        }

        let store = NewsStore::open(&data_dir.join("news.db")).context("Failed to open news store")?;
        let vocabulary = Vocabulary::load_or_builtin(config.vocabulary_path.as_deref())?;
        let embedder = create_embedder(offline).context("Failed to create embedder")?;
        let extractor =
            create_extractor(offline, &vocabulary).context("Failed to create extractor")?;

        Self::new(store, embedder, extractor, vocabulary, config)
    }

    pub fn store(&self) -> &NewsStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    pub fn extractor_name(&self) -> &str {
        self.extractor.name()
    }

    // ------------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------------

    /// 기사 수집
    ///
    /// 임베딩 실패는 이 기사의 수집 실패(`EmbeddingUnavailable`)입니다.
    /// 추출 실패는 빈 분류로 수집을 계속합니다.
    pub async fn ingest(&self, article: NewArticle) -> Result<IngestResult> {
        let article = validate_article(article)?;

        if let Some(existing) = self.store.get_by_url(&article.url)? {
            tracing::info!("Article already ingested: {} (id={})", article.url, existing.id);
            return self.existing_result(existing);
        }

        let embedding = self.embed(&article.embedding_text()).await?;

        let resolver = &self.resolver;
        let outcome = self
            .store
            .insert_article(&article, &embedding, |canonicals| {
                resolver.resolve(&embedding, canonicals)
            })?;

        let (stored, decision) = match outcome {
            InsertOutcome::Existing(existing) => return self.existing_result(existing),
            InsertOutcome::Inserted { article, decision } => (article, decision),
        };

        if stored.is_duplicate {
            tracing::info!(
                "Duplicate of article {:?} (similarity {:.3}): {}",
                stored.canonical_id,
                decision.best_score.unwrap_or_default(),
                stored.url
            );
            return Ok(IngestResult {
                best_score: decision.best_score,
                decision: Some(decision),
                article: stored,
                already_present: false,
                entities: vec![],
                impacts: vec![],
                sentiment: None,
                extraction_error: None,
            });
        }

        let text = article.full_text();
        let extraction = self.extract(&text).await;
        let classifier = ImpactClassifier::new(&self.vocabulary, self.config.confidence_floor);

        let (classification, extraction_error) = match classifier.classify(&text, extraction) {
            Ok(classification) => (classification, None),
            Err(e) => {
                tracing::warn!("Classification skipped for article {}: {}", stored.id, e);
                (Classification::default(), Some(e.to_string()))
            }
        };

        // 기사는 이미 커밋됨: 분류 저장 실패는 수집 실패가 아님
        let written = self.store.add_classification(
            stored.id,
            &classification.entities,
            &classification.impacts,
        );
        let (classification, extraction_error) = match written {
            Ok(()) => (classification, extraction_error),
            Err(e) => {
                tracing::warn!("Failed to store classification for article {}: {:#}", stored.id, e);
                (
                    Classification::default(),
                    Some(format!("Failed to store classification: {:#}", e)),
                )
            }
        };

        tracing::info!(
            "Ingested article {}: {} entities, {} impacts",
            stored.id,
            classification.entities.len(),
            classification.impacts.len()
        );

        Ok(IngestResult {
            best_score: decision.best_score,
            decision: Some(decision),
            article: stored,
            already_present: false,
            entities: classification.entities,
            impacts: classification.impacts,
            sentiment: classification.sentiment,
            extraction_error,
        })
    }

    fn existing_result(&self, article: Article) -> Result<IngestResult> {
        let impacts = self.store.impacts_for(article.id)?;
        // 감성은 모든 임팩트에 같은 값으로 기록됨
        let sentiment = impacts.first().map(|impact| SentimentSummary {
            label: impact.sentiment,
            magnitude: impact.magnitude,
        });

        Ok(IngestResult {
            entities: self.store.entities_for(article.id)?,
            impacts,
            article,
            already_present: true,
            decision: None,
            best_score: None,
            sentiment,
            extraction_error: None,
        })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = with_timeout(self.config.provider_timeout, self.embedder.embed(text))
            .await
            .map_err(|e| IntelError::EmbeddingUnavailable(format!("{:#}", e)))?;

        let expected = self.embedder.dimension();
        if embedding.len() != expected {
            return Err(IntelError::EmbeddingUnavailable(format!(
                "{} returned {} dimensions, expected {}",
                self.embedder.name(),
                embedding.len(),
                expected
            )));
        }

        Ok(embedding)
    }

    async fn extract(&self, text: &str) -> anyhow::Result<ExtractionResult> {
        with_timeout(self.config.provider_timeout, self.extractor.extract(text)).await
    }

    // ------------------------------------------------------------------------
    // Retrieval
    // ------------------------------------------------------------------------

    /// 시맨틱 검색 (정본 기사, 유사도 내림차순)
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let query = non_empty(query)?;
        let query_vector = self.embed(query).await?;

        let scored = self
            .store
            .canonical_vectors()?
            .into_iter()
            .filter_map(|candidate| match similarity(&query_vector, &candidate.embedding) {
                Ok(score) => Some(ScoredArticle {
                    article_id: candidate.id,
                    score,
                    published_at: candidate.published_at,
                }),
                Err(e) => {
                    tracing::warn!("Skipping article {} in search: {}", candidate.id, e);
                    None
                }
            });

        let ranked: Vec<ScoredArticle> = rank(scored, top_k).collect();
        let ids: Vec<i64> = ranked.iter().map(|s| s.article_id).collect();
        let summaries = self.store.summaries(&ids)?;

        Ok(ranked
            .into_iter()
            .filter_map(|hit| {
                summaries.get(&hit.article_id).map(|s| SearchHit {
                    article_id: hit.article_id,
                    title: s.title.clone(),
                    url: s.url.clone(),
                    similarity: hit.score,
                    published_at: hit.published_at,
                })
            })
            .collect())
    }

    /// 자연어 쿼리 (컨텍스트 확장 + 랭킹)
    pub async fn query(&self, query: &str, limit: usize) -> Result<QueryAnswer> {
        let query = non_empty(query)?;
        let vocabulary = query_vocabulary(&self.store, &self.vocabulary)?;
        let expander = QueryContextExpander::new(&self.store, &vocabulary, &self.config);

        let resolution = expander.resolve(query);
        let query_vector = if resolution.intent == QueryIntent::Thematic {
            Some(self.embed(query).await?)
        } else {
            None
        };

        let context = expander.expand(query, resolution, query_vector.as_deref())?;
        let total_candidates = context.candidates.len();
        let results: Vec<ContextCandidate> = rank(context.candidates, limit).collect();

        Ok(QueryAnswer {
            query: context.query,
            intent: context.intent,
            mentions: context.mentions,
            articles_used: results.len(),
            total_candidates,
            results,
        })
    }

    // ------------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------------

    /// 기사 상세 (엔티티/임팩트 포함)
    pub fn get_article(&self, id: i64) -> Result<ArticleDetail> {
        let article = self
            .store
            .get_article(id)?
            .ok_or_else(|| IntelError::article_not_found(id))?;

        Ok(ArticleDetail {
            entities: self.store.entities_for(id)?,
            impacts: self.store.impacts_for(id)?,
            article,
        })
    }

    pub fn list_articles(
        &self,
        skip: usize,
        limit: usize,
        unique_only: bool,
    ) -> Result<Vec<ArticleSummary>> {
        Ok(self.store.list_articles(skip, limit, unique_only)?)
    }

    pub fn list_entities(
        &self,
        kind: Option<EntityKind>,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<EntityFrequency>> {
        Ok(self.store.entity_frequencies(kind, skip, limit)?)
    }

    pub fn list_impacts(
        &self,
        symbol: Option<&str>,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<ImpactSummary>> {
        Ok(self.store.impact_summaries(symbol, skip, limit)?)
    }

    /// 코퍼스 통계
    pub fn statistics(&self) -> Result<CorpusStats> {
        Ok(self.store.stats()?)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 외부 호출 타임아웃 (초과 시 에러)
async fn with_timeout<T>(
    timeout: Duration,
    call: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => anyhow::bail!("timed out after {:?}", timeout),
    }
}

fn non_empty(query: &str) -> Result<&str> {
    let query = query.trim();
    if query.is_empty() {
        return Err(IntelError::InvalidInput("Query must not be empty".to_string()));
    }
    Ok(query)
}

/// 입력 검증 + URL 정규화
fn validate_article(mut article: NewArticle) -> Result<NewArticle> {
    article.title = article.title.trim().to_string();
    article.body = article.body.trim().to_string();

    if article.title.is_empty() && article.body.is_empty() {
        return Err(IntelError::InvalidInput(
            "Article needs a title or body".to_string(),
        ));
    }

    article.url = normalize_url(&article.url)?;
    article.source = article
        .source
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    Ok(article)
}

/// URL 정규화 (스킴/호스트 소문자, fragment 제거)
pub fn normalize_url(raw: &str) -> Result<String> {
    let mut url = url::Url::parse(raw.trim())
        .map_err(|e| IntelError::InvalidInput(format!("Invalid URL '{}': {}", raw, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(IntelError::InvalidInput(format!(
            "Unsupported URL scheme: {}",
            url.scheme()
        )));
    }

    url.set_fragment(None);
    Ok(url.to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::model::{parse_published, ImpactType};
    use crate::embedding::HashingEmbedding;
    use crate::extraction::KeywordExtraction;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// 텍스트 → 고정 벡터 (없으면 x축)
    struct TableEmbedding {
        table: HashMap<String, Vec<f32>>,
        dimension: usize,
    }

    impl TableEmbedding {
        fn new(entries: &[(&str, Vec<f32>)]) -> Self {
            Self {
                dimension: entries.first().map(|(_, v)| v.len()).unwrap_or(2),
                table: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for TableEmbedding {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            self.table
                .iter()
                .find(|(key, _)| text.contains(key.as_str()))
                .map(|(_, v)| v.clone())
                .ok_or_else(|| anyhow::anyhow!("no vector for text"))
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn name(&self) -> &str {
            "table"
        }
    }

    struct FailingExtraction;

    #[async_trait]
    impl ExtractionCapability for FailingExtraction {
        async fn extract(&self, _text: &str) -> anyhow::Result<ExtractionResult> {
            anyhow::bail!("extraction service down")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct SlowEmbedding;

    #[async_trait]
    impl EmbeddingProvider for SlowEmbedding {
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![1.0, 0.0])
        }

        fn dimension(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn engine_with(
        embedder: Arc<dyn EmbeddingProvider>,
        extractor: Arc<dyn ExtractionCapability>,
        config: EngineConfig,
    ) -> (TempDir, NewsEngine) {
        let dir = TempDir::new().unwrap();
        let store = NewsStore::open(&dir.path().join("news.db")).unwrap();
        let engine =
            NewsEngine::new(store, embedder, extractor, Vocabulary::builtin(), config).unwrap();
        (dir, engine)
    }

    fn offline_engine() -> (TempDir, NewsEngine) {
        engine_with(
            Arc::new(HashingEmbedding::new(256)),
            Arc::new(KeywordExtraction::new(Vocabulary::builtin())),
            EngineConfig::default(),
        )
    }

    fn news(title: &str, body: &str, url: &str, published: &str) -> NewArticle {
        NewArticle {
            title: title.to_string(),
            body: body.to_string(),
            source: Some("Test Wire".to_string()),
            url: url.to_string(),
            published_at: parse_published(published),
        }
    }

    /// x축과의 코사인이 `cos`인 단위 벡터
    fn at_cosine(cos: f32) -> Vec<f32> {
        vec![cos, (1.0 - cos * cos).sqrt()]
    }

    /// x축 아래쪽 단위 벡터 (위쪽 벡터와 멀리 떨어지도록)
    fn below_axis(cos: f32) -> Vec<f32> {
        vec![cos, -(1.0 - cos * cos).sqrt()]
    }

    #[tokio::test]
    async fn test_same_content_twice_is_duplicate() {
        let (_dir, engine) = offline_engine();
        let title = "HDFC Bank announces 15% dividend";
        let body = "HDFC Bank board approved a 15% dividend and a share buyback.";

        let first = engine
            .ingest(news(title, body, "https://a.example/hdfc", "2025-01-15"))
            .await
            .unwrap();
        let second = engine
            .ingest(news(title, body, "https://b.example/hdfc", "2025-01-15"))
            .await
            .unwrap();

        assert!(!first.article.is_duplicate);
        assert!(second.article.is_duplicate);
        assert_eq!(second.article.canonical_id, Some(first.article.id));
        assert!(second.entities.is_empty() && second.impacts.is_empty());

        let records = engine.store().duplicate_records(None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].article_id, second.article.id);
        assert_eq!(records[0].matched_id, first.article.id);
        assert!((records[0].similarity - 1.0).abs() < 1e-6);
        assert!(records[0].is_duplicate);
    }

    #[tokio::test]
    async fn test_threshold_boundary_through_engine() {
        let embedder = TableEmbedding::new(&[
            ("anchor", vec![1.0, 0.0]),
            ("below", below_axis(0.84)),
            ("above", at_cosine(0.86)),
        ]);
        let (_dir, engine) = engine_with(
            Arc::new(embedder),
            Arc::new(KeywordExtraction::new(Vocabulary::builtin())),
            EngineConfig::default(),
        );

        let anchor = engine.ingest(news("anchor", "x", "https://e.com/1", "")).await.unwrap();
        let below = engine.ingest(news("below", "x", "https://e.com/2", "")).await.unwrap();
        assert!(!anchor.article.is_duplicate);
        assert!(!below.article.is_duplicate);
        assert_eq!(below.decision.as_ref().and_then(|d| d.best_match_id), Some(anchor.article.id));

        let above = engine.ingest(news("above", "x", "https://e.com/3", "")).await.unwrap();
        assert!(above.article.is_duplicate);
        assert_eq!(above.article.canonical_id, Some(anchor.article.id));

        // 기록은 최고 일치가 있을 때마다 한 건
        assert_eq!(engine.store().duplicate_records(None).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_paraphrased_rbi_articles() {
        let embedder = TableEmbedding::new(&[
            ("RBI raises repo rate", vec![0.8, 0.6, 0.0]),
            ("Reserve Bank hikes policy rate", vec![0.75, 0.65, 0.1]),
        ]);
        let (_dir, engine) = engine_with(
            Arc::new(embedder),
            Arc::new(KeywordExtraction::new(Vocabulary::builtin())),
            EngineConfig::default(),
        );

        let first = engine
            .ingest(news(
                "RBI raises repo rate by 25 basis points",
                "The RBI raised the repo rate to 6.75%.",
                "https://e.com/rbi-1",
                "2025-01-10",
            ))
            .await
            .unwrap();
        let second = engine
            .ingest(news(
                "Reserve Bank hikes policy rate by 25 bps",
                "The central bank increased its key lending rate.",
                "https://e.com/rbi-2",
                "2025-01-10",
            ))
            .await
            .unwrap();

        assert!(second.best_score.unwrap() >= 0.85);
        assert!(second.article.is_duplicate);
        assert_eq!(second.article.canonical_id, Some(first.article.id));

        // 정본은 규제 임팩트를 가짐
        assert!(first
            .impacts
            .iter()
            .any(|i| i.impact_type == ImpactType::Regulatory && i.driver == "RBI"));
    }

    #[tokio::test]
    async fn test_same_url_is_idempotent() {
        let (_dir, engine) = offline_engine();
        let article = news("Infosys raises guidance", "Infosys raised FY guidance.", "https://e.com/infy#top", "");

        let first = engine.ingest(article.clone()).await.unwrap();
        let again = engine.ingest(article).await.unwrap();

        assert!(again.already_present);
        assert_eq!(again.article.id, first.article.id);
        assert_eq!(again.entities, first.entities);
        assert_eq!(again.impacts, first.impacts);
        assert!(first.sentiment.is_some());
        assert_eq!(again.sentiment, first.sentiment);
        assert_eq!(first.article.url, "https://e.com/infy");
        assert!(engine.store().duplicate_records(None).unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_content_is_linearized() {
        const N: usize = 8;
        let (_dir, engine) = offline_engine();
        let engine = Arc::new(engine);

        let handles: Vec<_> = (0..N)
            .map(|i| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    engine
                        .ingest(news(
                            "RBI hikes repo rate by 25 basis points",
                            "The Reserve Bank of India raised the repo rate to 6.75%.",
                            &format!("https://wire{}.example/rbi-hike", i),
                            "2025-01-16",
                        ))
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stats = engine.statistics().unwrap();
        assert_eq!(stats.total_articles, N);
        assert_eq!(stats.unique_articles, 1);
        assert_eq!(stats.duplicate_articles, N - 1);
        assert_eq!(stats.duplicate_record_count, N - 1);

        let canonical = engine.list_articles(0, N, true).unwrap();
        assert_eq!(canonical.len(), 1);
        let records = engine.store().duplicate_records(None).unwrap();
        assert!(records.iter().all(|r| r.is_duplicate && r.matched_id == canonical[0].id));
    }

    /// 추출 중에 같은 DB의 다른 커넥션으로 먼저 분류를 기록
    struct PreclassifyingExtraction {
        store: NewsStore,
    }

    #[async_trait]
    impl ExtractionCapability for PreclassifyingExtraction {
        async fn extract(&self, _text: &str) -> anyhow::Result<ExtractionResult> {
            let latest = self.store.list_articles(0, 1, false)?;
            let id = latest.first().map(|a| a.id).context("no article stored")?;
            let entity = Entity {
                text: "TCS".to_string(),
                kind: EntityKind::Company,
                confidence: 1.0,
            };
            self.store.add_classification(id, &[entity], &[])?;
            Ok(ExtractionResult::default())
        }

        fn name(&self) -> &str {
            "preclassifying"
        }
    }

    #[tokio::test]
    async fn test_classification_write_failure_keeps_article() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("news.db");
        let engine = NewsEngine::new(
            NewsStore::open(&path).unwrap(),
            Arc::new(HashingEmbedding::new(64)),
            Arc::new(PreclassifyingExtraction {
                store: NewsStore::open(&path).unwrap(),
            }),
            Vocabulary::builtin(),
            EngineConfig::default(),
        )
        .unwrap();

        let result = engine
            .ingest(news("TCS wins deal", "TCS signed a large deal.", "https://e.com/tcs", ""))
            .await
            .unwrap();

        assert!(!result.already_present);
        assert!(!result.article.is_duplicate);
        assert!(result.entities.is_empty() && result.impacts.is_empty());
        assert!(result
            .extraction_error
            .as_deref()
            .is_some_and(|e| e.contains("already classified")));
        assert!(engine.get_article(result.article.id).is_ok());
    }

    #[tokio::test]
    async fn test_extraction_failure_still_ingests() {
        let (_dir, engine) = engine_with(
            Arc::new(HashingEmbedding::new(64)),
            Arc::new(FailingExtraction),
            EngineConfig::default(),
        );

        let result = engine
            .ingest(news("TCS wins deal", "TCS signed a large deal.", "https://e.com/tcs", ""))
            .await
            .unwrap();

        assert!(!result.article.is_duplicate);
        assert!(result.entities.is_empty());
        assert!(result.impacts.is_empty());
        assert!(result
            .extraction_error
            .as_deref()
            .is_some_and(|e| e.contains("extraction service down")));
        assert!(engine.get_article(result.article.id).is_ok());
    }

    #[tokio::test]
    async fn test_embedding_failure_fails_ingest() {
        let (_dir, engine) = engine_with(
            Arc::new(TableEmbedding::new(&[("alpha", vec![1.0, 0.0])])),
            Arc::new(FailingExtraction),
            EngineConfig::default(),
        );

        let err = engine
            .ingest(news("beta", "text", "https://e.com/x", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, IntelError::EmbeddingUnavailable(_)));
        assert_eq!(engine.statistics().unwrap().total_articles, 0);
    }

    #[tokio::test]
    async fn test_embedding_timeout() {
        let config = EngineConfig {
            provider_timeout: Duration::from_millis(50),
            ..EngineConfig::default()
        };
        let (_dir, engine) = engine_with(Arc::new(SlowEmbedding), Arc::new(FailingExtraction), config);

        let err = engine
            .ingest(news("slow", "text", "https://e.com/slow", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, IntelError::EmbeddingUnavailable(ref m) if m.contains("timed out")));
    }

    #[tokio::test]
    async fn test_invalid_input() {
        let (_dir, engine) = offline_engine();
        let err = engine.ingest(news("t", "b", "not a url", "")).await.unwrap_err();
        assert!(matches!(err, IntelError::InvalidInput(_)));

        let err = engine.ingest(news("t", "b", "ftp://e.com/x", "")).await.unwrap_err();
        assert!(matches!(err, IntelError::InvalidInput(_)));

        assert!(matches!(engine.query("   ", 5).await, Err(IntelError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_company_and_sector_queries() {
        let (_dir, engine) = offline_engine();

        let hdfc = engine
            .ingest(news(
                "HDFC Bank announces dividend",
                "HDFC Bank, a leader in the banking sector, declared a dividend.",
                "https://e.com/hdfc",
                "2025-01-15",
            ))
            .await
            .unwrap();
        let icici = engine
            .ingest(news(
                "Lenders rally as bad loans fall",
                "Banking sector stocks gained as ICICI Bank reported lower NPAs.",
                "https://e.com/banks",
                "2025-01-16",
            ))
            .await
            .unwrap();
        engine
            .ingest(news(
                "Infosys raises revenue guidance",
                "Infosys lifted its outlook for the year.",
                "https://e.com/infy",
                "2025-01-17",
            ))
            .await
            .unwrap();

        let company = engine.query("HDFC Bank", 10).await.unwrap();
        assert_eq!(company.intent, QueryIntent::Company);
        assert_eq!(company.results[0].article_id, hdfc.article.id);
        assert_eq!(company.results[0].relevance, 1.0);

        let sector = engine.query("Banking sector", 10).await.unwrap();
        assert_eq!(sector.intent, QueryIntent::Sector);
        let sector_ids: Vec<i64> = sector.results.iter().map(|r| r.article_id).collect();
        assert!(sector_ids.contains(&hdfc.article.id));
        assert!(sector_ids.contains(&icici.article.id));
        for hit in &company.results {
            assert!(sector_ids.contains(&hit.article_id));
        }
    }

    #[tokio::test]
    async fn test_thematic_query_below_floor_is_empty() {
        let embedder = TableEmbedding::new(&[
            ("monsoon", vec![1.0, 0.0]),
            ("spacecraft", vec![0.0, 1.0]),
        ]);
        let (_dir, engine) = engine_with(
            Arc::new(embedder),
            Arc::new(FailingExtraction),
            EngineConfig::default(),
        );

        engine
            .ingest(news("monsoon arrives early", "rain", "https://e.com/m", ""))
            .await
            .unwrap();

        let answer = engine.query("spacecraft launch", 10).await.unwrap();
        assert_eq!(answer.intent, QueryIntent::Thematic);
        assert!(answer.results.is_empty());
        assert_eq!(answer.articles_used, 0);

        let answer = engine.query("monsoon update", 10).await.unwrap();
        assert_eq!(answer.articles_used, 1);
    }

    #[tokio::test]
    async fn test_search_ranks_canonical_articles() {
        let embedder = TableEmbedding::new(&[
            ("alpha", vec![1.0, 0.0]),
            ("beta", vec![0.6, 0.8]),
            ("gamma", vec![0.0, 1.0]),
            ("query", vec![0.9, 0.1]),
        ]);
        let (_dir, engine) = engine_with(
            Arc::new(embedder),
            Arc::new(FailingExtraction),
            EngineConfig::default(),
        );

        let alpha = engine.ingest(news("alpha", "-", "https://e.com/a", "")).await.unwrap();
        let beta = engine.ingest(news("beta", "-", "https://e.com/b", "")).await.unwrap();
        engine.ingest(news("gamma", "-", "https://e.com/c", "")).await.unwrap();

        let hits = engine.search("query", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].article_id, alpha.article.id);
        assert_eq!(hits[1].article_id, beta.article.id);
        assert!(hits[0].similarity >= hits[1].similarity);
    }

    #[tokio::test]
    async fn test_get_article_not_found() {
        let (_dir, engine) = offline_engine();
        let err = engine.get_article(404).unwrap_err();
        assert!(matches!(err, IntelError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_statistics() {
        let (_dir, engine) = offline_engine();
        let body = "RBI keeps the repo rate unchanged; banks rally.";
        engine.ingest(news("RBI policy", body, "https://e.com/1", "")).await.unwrap();
        engine.ingest(news("RBI policy", body, "https://e.com/2", "")).await.unwrap();

        let stats = engine.statistics().unwrap();
        assert_eq!(stats.total_articles, 2);
        assert_eq!(stats.unique_articles, 1);
        assert_eq!(stats.duplicate_articles, 1);
        assert!((stats.deduplication_rate - 50.0).abs() < 1e-4);
        assert!(stats.mean_duplicate_similarity.unwrap() > 0.99);
        assert_eq!(stats.entity_counts[&EntityKind::Regulator], 1);
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("HTTPS://News.Example.COM/a/b?x=1#frag").unwrap(),
            "https://news.example.com/a/b?x=1"
        );
        assert!(normalize_url("").is_err());
        assert!(normalize_url("mailto:someone@example.com").is_err());
    }
}
