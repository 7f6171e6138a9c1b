//! 쿼리 컨텍스트 확장
//!
//! 쿼리에서 기업/업종/규제기관 언급을 찾아 의도를 정하고,
//! 의도별 규칙으로 관련 정본 기사 집합을 만듭니다.
//!
//! 의도 우선순위: company > sector > regulatory > thematic
//!
//! - company: 기업 엔티티(1.0) ∪ 기업 소속 업종 엔티티 ∪ 해당 종목 임팩트
//! - sector: 업종 엔티티 ∪ 업종 소속 기업 엔티티
//! - regulatory: 규제기관 엔티티(1.0) ∪ 그 기관을 근거로 한 regulatory 임팩트
//! - thematic: 임베딩 유사도 상위 K개 (floor 이상)

use std::collections::HashMap;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::classify::{is_named_entity, sector_confidence};
use super::rank::{rank, Rankable, ScoredArticle};
use crate::config::EngineConfig;
use crate::corpus::model::{Entity, EntityKind, ImpactType};
use crate::corpus::store::NewsStore;
use crate::engine::similarity;
use crate::error::{IntelError, Result};
use crate::vocabulary::{CompanyTerm, RegulatorTerm, SectorTerm, Vocabulary};

// ============================================================================
// Types
// ============================================================================

/// 쿼리 의도
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryIntent {
    Company,
    Sector,
    Regulatory,
    Thematic,
}

impl std::fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QueryIntent::Company => "company",
            QueryIntent::Sector => "sector",
            QueryIntent::Regulatory => "regulatory",
            QueryIntent::Thematic => "thematic",
        };
        f.write_str(s)
    }
}

/// 후보가 선택된 확장 규칙
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    /// 본문에 등장한 기업/규제기관 엔티티 일치
    DirectEntity,
    /// 본문에 없이 추론된 기업/규제기관 엔티티 일치
    InferredEntity,
    /// 업종 엔티티 일치
    SectorEntity,
    /// 기업 종목 임팩트
    CompanyImpact,
    /// 업종 소속 기업 엔티티
    SectorMember,
    /// 규제기관을 근거로 한 regulatory 임팩트
    RegulatoryImpact,
    /// 임베딩 유사도
    Thematic,
}

/// 쿼리에서 해석된 언급
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedMention {
    /// 사전 기준 이름
    pub name: String,
    pub kind: EntityKind,
}

/// 쿼리 해석 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResolution {
    pub intent: QueryIntent,
    pub mentions: Vec<ResolvedMention>,
}

/// 컨텍스트 후보 기사
#[derive(Debug, Clone, Serialize)]
pub struct ContextCandidate {
    pub article_id: i64,
    pub title: String,
    pub relevance: f32,
    pub rule: MatchRule,
    /// 1 + 이 기사를 정본으로 가리키는 중복 기사 수
    pub coverage: usize,
    pub published_at: Option<DateTime<Utc>>,
}

impl Rankable for ContextCandidate {
    fn article_id(&self) -> i64 {
        self.article_id
    }

    fn score(&self) -> f32 {
        self.relevance
    }

    fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }
}

/// 쿼리 컨텍스트 (요청 단위)
#[derive(Debug, Clone, Serialize)]
pub struct QueryContext {
    pub query: String,
    pub intent: QueryIntent,
    pub mentions: Vec<ResolvedMention>,
    /// 순서 없음 (랭커가 정렬)
    pub candidates: Vec<ContextCandidate>,
}

// ============================================================================
// QueryContextExpander
// ============================================================================

/// 쿼리 컨텍스트 확장기
pub struct QueryContextExpander<'a> {
    store: &'a NewsStore,
    vocabulary: &'a Vocabulary,
    thematic_floor: f32,
    thematic_top_k: usize,
}

/// 기본 어휘 + 저장된 기업/업종/규제기관 이름
pub fn query_vocabulary(store: &NewsStore, base: &Vocabulary) -> Result<Vocabulary> {
    let mut vocabulary = base.clone();
    vocabulary.merge_names(
        store.distinct_entity_texts(EntityKind::Company)?,
        store.distinct_entity_texts(EntityKind::Sector)?,
        store.distinct_entity_texts(EntityKind::Regulator)?,
    );
    Ok(vocabulary)
}

impl<'a> QueryContextExpander<'a> {
    pub fn new(store: &'a NewsStore, vocabulary: &'a Vocabulary, config: &EngineConfig) -> Self {
        Self {
            store,
            vocabulary,
            thematic_floor: config.thematic_floor,
            thematic_top_k: config.thematic_top_k,
        }
    }

    /// 쿼리 해석 (언급 + 의도)
    pub fn resolve(&self, query: &str) -> QueryResolution {
        let companies = self.vocabulary.companies_in(query);
        let sectors = self.vocabulary.sectors_in(query);
        let regulators = self.vocabulary.regulators_in(query);

        let intent = if !companies.is_empty() {
            QueryIntent::Company
        } else if !sectors.is_empty() {
            QueryIntent::Sector
        } else if !regulators.is_empty() {
            QueryIntent::Regulatory
        } else {
            QueryIntent::Thematic
        };

        let mentions = companies
            .iter()
            .map(|c| (c.name.as_str(), EntityKind::Company))
            .chain(sectors.iter().map(|s| (s.name.as_str(), EntityKind::Sector)))
            .chain(regulators.iter().map(|r| (r.name.as_str(), EntityKind::Regulator)))
            .map(|(name, kind)| ResolvedMention {
                name: name.to_string(),
                kind,
            })
            .collect();

        tracing::debug!("Query intent: {} ({:?})", intent, query);
        QueryResolution { intent, mentions }
    }

    /// 확장
    ///
    /// thematic 의도에는 `query_vector`가 필요합니다.
    pub fn expand(
        &self,
        query: &str,
        resolution: QueryResolution,
        query_vector: Option<&[f32]>,
    ) -> Result<QueryContext> {
        let mut hits = Hits::default();

        match resolution.intent {
            QueryIntent::Company => {
                for company in self.mentioned(&resolution, EntityKind::Company, |v, n| v.company(n)) {
                    self.expand_company(company, &mut hits)?;
                }
            }
            QueryIntent::Sector => {
                for sector in self.mentioned(&resolution, EntityKind::Sector, |v, n| v.sector(n)) {
                    self.expand_sector(sector, &mut hits)?;
                }
            }
            QueryIntent::Regulatory => {
                for regulator in
                    self.mentioned(&resolution, EntityKind::Regulator, |v, n| v.regulator(n))
                {
                    self.expand_regulator(regulator, &mut hits)?;
                }
            }
            QueryIntent::Thematic => {
                let vector = query_vector.ok_or_else(|| {
                    IntelError::InvalidInput("Thematic expansion requires a query vector".to_string())
                })?;
                self.expand_thematic(vector, &mut hits)?;
            }
        }

        let candidates = self.materialize(hits)?;

        tracing::info!(
            "Expanded query ({}): {} candidates",
            resolution.intent,
            candidates.len()
        );

        Ok(QueryContext {
            query: query.to_string(),
            intent: resolution.intent,
            mentions: resolution.mentions,
            candidates,
        })
    }

    fn mentioned<T>(
        &self,
        resolution: &QueryResolution,
        kind: EntityKind,
        lookup: impl Fn(&'a Vocabulary, &str) -> Option<&'a T>,
    ) -> Vec<&'a T> {
        resolution
            .mentions
            .iter()
            .filter(|m| m.kind == kind)
            .filter_map(|m| lookup(self.vocabulary, &m.name))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Expansion Rules
    // ------------------------------------------------------------------------

    fn expand_company(&self, company: &CompanyTerm, hits: &mut Hits) -> Result<()> {
        for (article_id, entity) in self.store.entities_of_kind(EntityKind::Company)? {
            if matches_any(company.terms(), &entity.text) {
                hits.offer_entity(article_id, &entity);
            }
        }

        if !company.sectors.is_empty() {
            for (article_id, entity) in self.store.entities_of_kind(EntityKind::Sector)? {
                if company.sectors.iter().any(|s| self.same_sector(s, &entity.text)) {
                    hits.offer(article_id, entity.confidence, MatchRule::SectorEntity);
                }
            }
        }

        if let Some(symbol) = &company.symbol {
            for (article_id, impact) in self.store.impacts_matching(None, Some(symbol))? {
                hits.offer(article_id, impact.confidence, MatchRule::CompanyImpact);
            }
        }

        Ok(())
    }

    fn expand_sector(&self, sector: &SectorTerm, hits: &mut Hits) -> Result<()> {
        for (article_id, entity) in self.store.entities_of_kind(EntityKind::Sector)? {
            if self.same_sector(&sector.name, &entity.text) {
                hits.offer(article_id, entity.confidence, MatchRule::SectorEntity);
            }
        }

        let member_score = sector_confidence(1);
        for (article_id, entity) in self.store.entities_of_kind(EntityKind::Company)? {
            let in_sector = self
                .vocabulary
                .company(&entity.text)
                .is_some_and(|c| c.in_sector(&sector.name));
            if in_sector {
                hits.offer(article_id, member_score, MatchRule::SectorMember);
            }
        }

        Ok(())
    }

    fn expand_regulator(&self, regulator: &RegulatorTerm, hits: &mut Hits) -> Result<()> {
        for (article_id, entity) in self.store.entities_of_kind(EntityKind::Regulator)? {
            if matches_any(regulator.terms(), &entity.text) {
                hits.offer_entity(article_id, &entity);
            }
        }

        for (article_id, impact) in self
            .store
            .impacts_matching(Some(ImpactType::Regulatory), None)?
        {
            if matches_any(regulator.terms(), &impact.driver) {
                hits.offer(article_id, impact.confidence, MatchRule::RegulatoryImpact);
            }
        }

        Ok(())
    }

    fn expand_thematic(&self, query_vector: &[f32], hits: &mut Hits) -> Result<()> {
        let scored = self
            .store
            .canonical_vectors()?
            .into_iter()
            .filter_map(|candidate| match similarity(query_vector, &candidate.embedding) {
                Ok(score) if score >= self.thematic_floor => Some(ScoredArticle {
                    article_id: candidate.id,
                    score,
                    published_at: candidate.published_at,
                }),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!("Skipping article {} in thematic search: {}", candidate.id, e);
                    None
                }
            });

        for hit in rank(scored, self.thematic_top_k) {
            hits.offer(hit.article_id, hit.score, MatchRule::Thematic);
        }

        Ok(())
    }

    fn same_sector(&self, a: &str, b: &str) -> bool {
        let key = |name: &str| {
            self.vocabulary
                .sector(name)
                .map(|s| s.name.clone())
                .unwrap_or_else(|| name.trim().to_string())
        };
        key(a).eq_ignore_ascii_case(&key(b))
    }

    /// 후보 ID → 정본 기사 후보 (중복 기사는 제외)
    fn materialize(&self, hits: Hits) -> Result<Vec<ContextCandidate>> {
        let ids: Vec<i64> = hits.best.keys().copied().collect();
        let summaries = self
            .store
            .summaries(&ids)
            .context("Failed to load candidate articles")?;
        let coverage = self.store.duplicate_counts()?;

        let mut candidates: Vec<ContextCandidate> = hits
            .best
            .into_iter()
            .filter_map(|(article_id, (relevance, rule))| {
                let summary = summaries.get(&article_id).filter(|s| !s.is_duplicate)?;
                Some(ContextCandidate {
                    article_id,
                    title: summary.title.clone(),
                    relevance,
                    rule,
                    coverage: 1 + coverage.get(&article_id).copied().unwrap_or(0),
                    published_at: summary.published_at,
                })
            })
            .collect();

        candidates.sort_by_key(|c| c.article_id);
        Ok(candidates)
    }
}

/// 기사별 최고 점수 규칙
#[derive(Default)]
struct Hits {
    best: HashMap<i64, (f32, MatchRule)>,
}

impl Hits {
    fn offer(&mut self, article_id: i64, score: f32, rule: MatchRule) {
        let entry = self.best.entry(article_id).or_insert((score, rule));
        if score > entry.0 {
            *entry = (score, rule);
        }
    }

    /// 본문 등장 엔티티는 1.0, 추론 엔티티는 저장된 신뢰도
    fn offer_entity(&mut self, article_id: i64, entity: &Entity) {
        if is_named_entity(entity) {
            self.offer(article_id, 1.0, MatchRule::DirectEntity);
        } else {
            self.offer(article_id, entity.confidence, MatchRule::InferredEntity);
        }
    }
}

/// 저장된 텍스트가 용어 중 하나와 같은지 (대소문자 무시)
fn matches_any<'t>(mut terms: impl Iterator<Item = &'t str>, text: &str) -> bool {
    let text = text.trim();
    terms.any(|t| t.eq_ignore_ascii_case(text))
}
