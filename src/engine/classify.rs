//! 엔티티/임팩트 분류기 - 신뢰도 정책
//!
//! 추출 기능의 원시 출력(언급 목록)에 결정적인 신뢰도를 매깁니다.
//!
//! | 근거 | 신뢰도 |
//! |------|--------|
//! | 본문에 그대로 등장한 기업 | 1.0 (`direct`) |
//! | 업종 추론 | `sector_confidence(신호 수)` ∈ [0.6, 0.8] |
//! | 규제기관 | `regulatory_confidence(정책 수단 수)` ∈ [0.5, 0.9] |
//! | 본문에 없는 추론 언급 | 0.45 |
//!
//! floor 미만은 버립니다.

use std::collections::HashSet;

use serde::Serialize;

use crate::corpus::model::{
    Entity, EntityKind, ImpactMagnitude, ImpactType, Sentiment, StockImpact,
};
use crate::error::{IntelError, Result};
use crate::extraction::ExtractionResult;
use crate::vocabulary::{contains_exact, contains_term, Vocabulary};

/// 본문에 등장하지 않는 추론 언급의 신뢰도
pub const INFERRED_CONFIDENCE: f32 = 0.45;

const SECTOR_BASE: f32 = 0.6;
const SECTOR_STEP: f32 = 0.05;
const SECTOR_CAP: f32 = 0.8;

const REGULATORY_BASE: f32 = 0.5;
const REGULATORY_STEP: f32 = 0.1;
const REGULATORY_CAP: f32 = 0.9;

/// 업종 추론 신뢰도 (독립 신호 수에 단조 증가, 0.8 상한)
pub fn sector_confidence(signals: usize) -> f32 {
    let extra = signals.max(1) - 1;
    (SECTOR_BASE + SECTOR_STEP * extra as f32).min(SECTOR_CAP)
}

/// 규제 신뢰도 (명시된 정책 수단 수에 단조 증가, 0.9 상한)
pub fn regulatory_confidence(instruments: usize) -> f32 {
    (REGULATORY_BASE + REGULATORY_STEP * instruments as f32).min(REGULATORY_CAP)
}

/// 본문에 그대로 등장해서 저장된 엔티티인지 (저장된 신뢰도로 판별)
///
/// 기업/인물/이벤트는 1.0, 규제기관은 `regulatory_confidence` 구간만 본문 등장입니다.
/// 업종 엔티티는 항상 업종 신뢰도를 쓰므로 해당 없음.
pub fn is_named_entity(entity: &Entity) -> bool {
    match entity.kind {
        EntityKind::Company | EntityKind::Person | EntityKind::Event => entity.confidence >= 1.0,
        EntityKind::Regulator => entity.confidence >= REGULATORY_BASE,
        EntityKind::Sector => false,
    }
}

/// 기사 감성 요약
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SentimentSummary {
    pub label: Sentiment,
    pub magnitude: Option<ImpactMagnitude>,
}

/// 분류 결과
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Classification {
    pub entities: Vec<Entity>,
    pub impacts: Vec<StockImpact>,
    pub sentiment: Option<SentimentSummary>,
}

/// 엔티티/임팩트 분류기
pub struct ImpactClassifier<'a> {
    vocabulary: &'a Vocabulary,
    floor: f32,
}

impl<'a> ImpactClassifier<'a> {
    pub fn new(vocabulary: &'a Vocabulary, floor: f32) -> Self {
        Self { vocabulary, floor }
    }

    /// 분류
    ///
    /// 추출이 실패했거나 출력이 잘못되었으면 `ExtractionUnavailable`.
    /// 호출자는 이 경우 빈 분류로 수집을 계속합니다.
    pub fn classify(
        &self,
        text: &str,
        extraction: anyhow::Result<ExtractionResult>,
    ) -> Result<Classification> {
        let extraction = extraction
            .and_then(|result| {
                result.validate()?;
                Ok(result)
            })
            .map_err(|e| IntelError::ExtractionUnavailable(format!("{:#}", e)))?;

        Ok(self.score(text, &extraction))
    }

    /// 유효한 추출 결과에 신뢰도 부여
    pub fn score(&self, text: &str, extraction: &ExtractionResult) -> Classification {
        let instruments = self.instrument_count(text, extraction);

        let mut entities: Vec<Entity> = Vec::new();
        for mention in &extraction.entities {
            let name = mention.text.trim();
            let confidence = match mention.kind {
                EntityKind::Company => self.company_confidence(text, name, extraction),
                EntityKind::Sector => sector_confidence(self.sector_signals(text, name, extraction)),
                EntityKind::Regulator => {
                    if self.is_named(text, EntityKind::Regulator, name) {
                        regulatory_confidence(instruments)
                    } else {
                        INFERRED_CONFIDENCE
                    }
                }
                EntityKind::Person | EntityKind::Event => {
                    if contains_term(text, name) {
                        1.0
                    } else {
                        INFERRED_CONFIDENCE
                    }
                }
            };

            if confidence >= self.floor {
                merge_entity(
                    &mut entities,
                    Entity {
                        text: name.to_string(),
                        kind: mention.kind,
                        confidence,
                    },
                );
            }
        }

        let mut impacts: Vec<StockImpact> = Vec::new();
        let stamp = |symbol: String, impact_type: ImpactType, confidence: f32, driver: String| {
            StockImpact {
                symbol,
                impact_type,
                confidence,
                sentiment: extraction.sentiment,
                magnitude: extraction.magnitude,
                driver,
            }
        };

        for mention in &extraction.stocks {
            let symbol = mention.symbol.trim().to_uppercase();
            let company_named = contains_exact(text, &symbol)
                || mention
                    .company
                    .as_deref()
                    .is_some_and(|c| self.is_named(text, EntityKind::Company, c));

            let impact = if company_named {
                let driver = mention.company.clone().unwrap_or_else(|| symbol.clone());
                Some(stamp(symbol, ImpactType::Direct, 1.0, driver))
            } else if let Some(regulator) = mention
                .regulator
                .as_deref()
                .filter(|r| self.is_named(text, EntityKind::Regulator, r))
            {
                Some(stamp(
                    symbol,
                    ImpactType::Regulatory,
                    regulatory_confidence(instruments),
                    self.regulator_key(regulator),
                ))
            } else {
                mention.sector.as_deref().map(|sector| {
                    stamp(
                        symbol,
                        ImpactType::Sector,
                        sector_confidence(self.sector_signals(text, sector, extraction)),
                        self.sector_key(sector),
                    )
                })
            };

            if let Some(impact) = impact.filter(|i| i.confidence >= self.floor) {
                merge_impact(&mut impacts, impact);
            }
        }

        // 본문에 등장한 기업은 주식 언급이 없어도 직접 임팩트
        for mention in extraction
            .entities
            .iter()
            .filter(|e| e.kind == EntityKind::Company)
        {
            let name = mention.text.trim();
            if !self.is_named(text, EntityKind::Company, name) {
                continue;
            }
            if let Some(symbol) = self.vocabulary.company(name).and_then(|c| c.symbol.clone()) {
                if !impacts.iter().any(|i| i.symbol == symbol) {
                    merge_impact(
                        &mut impacts,
                        stamp(symbol, ImpactType::Direct, 1.0, name.to_string()),
                    );
                }
            }
        }

        tracing::debug!(
            "Classified {} entities, {} impacts ({} instruments)",
            entities.len(),
            impacts.len(),
            instruments
        );

        Classification {
            entities,
            impacts,
            sentiment: Some(SentimentSummary {
                label: extraction.sentiment,
                magnitude: extraction.magnitude,
            }),
        }
    }

    // ------------------------------------------------------------------------
    // Signals
    // ------------------------------------------------------------------------

    /// 본문에 그대로 등장하는지 (사전 별칭 포함)
    fn is_named(&self, text: &str, kind: EntityKind, name: &str) -> bool {
        let vocab = self.vocabulary;
        let terms: Vec<&str> = match kind {
            EntityKind::Company => vocab.company(name).map(|c| c.terms().collect()),
            EntityKind::Sector => vocab.sector(name).map(|s| s.terms().collect()),
            EntityKind::Regulator => vocab.regulator(name).map(|r| r.terms().collect()),
            EntityKind::Person | EntityKind::Event => None,
        }
        .unwrap_or_default();

        contains_term(text, name) || terms.iter().any(|t| contains_term(text, t))
    }

    fn sector_key(&self, name: &str) -> String {
        self.vocabulary
            .sector(name)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| name.trim().to_string())
    }

    fn regulator_key(&self, name: &str) -> String {
        self.vocabulary
            .regulator(name)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| name.trim().to_string())
    }

    /// 업종의 독립 신호 수
    ///
    /// 1. 본문에 등장한 업종 용어(이름/별칭)마다 1
    /// 2. 추출기가 업종 엔티티로 반환하면 1
    /// 3. 본문에 등장한 소속 기업마다 1
    fn sector_signals(&self, text: &str, sector: &str, extraction: &ExtractionResult) -> usize {
        let key = self.sector_key(sector);
        let vocab = self.vocabulary;

        let named_terms: HashSet<String> = match vocab.sector(&key) {
            Some(term) => term
                .terms()
                .filter(|t| contains_term(text, t))
                .map(str::to_lowercase)
                .collect(),
            None if contains_term(text, &key) => HashSet::from([key.to_lowercase()]),
            None => HashSet::new(),
        };

        let extracted = extraction
            .entities_of(EntityKind::Sector)
            .any(|s| self.sector_key(s).eq_ignore_ascii_case(&key));

        let member_companies = vocab
            .companies_in(text)
            .iter()
            .filter(|c| c.in_sector(&key))
            .count();

        named_terms.len() + usize::from(extracted) + member_companies
    }

    /// 본문에 명시된 구체적 정책 수단/종목 수
    fn instrument_count(&self, text: &str, extraction: &ExtractionResult) -> usize {
        let mut named: HashSet<String> = self
            .vocabulary
            .instruments_in(text)
            .into_iter()
            .map(str::to_lowercase)
            .collect();

        for mention in &extraction.stocks {
            let symbol = mention.symbol.trim();
            if contains_exact(text, symbol) {
                named.insert(symbol.to_lowercase());
            }
        }

        for name in extraction.entities_of(EntityKind::Company) {
            if self.is_named(text, EntityKind::Company, name) {
                let key = self
                    .vocabulary
                    .company(name)
                    .and_then(|c| c.symbol.clone())
                    .unwrap_or_else(|| name.trim().to_string());
                named.insert(key.to_lowercase());
            }
        }

        named.len()
    }

    /// 기업 엔티티 신뢰도
    fn company_confidence(&self, text: &str, name: &str, extraction: &ExtractionResult) -> f32 {
        if self.is_named(text, EntityKind::Company, name) {
            return 1.0;
        }

        match self.vocabulary.company(name) {
            Some(company) if !company.sectors.is_empty() => company
                .sectors
                .iter()
                .map(|s| sector_confidence(self.sector_signals(text, s, extraction)))
                .fold(0.0, f32::max),
            _ => INFERRED_CONFIDENCE,
        }
    }
}

/// (종류, 소문자 텍스트)당 하나, 최고 신뢰도 유지
fn merge_entity(entities: &mut Vec<Entity>, entity: Entity) {
    match entities
        .iter_mut()
        .find(|e| e.kind == entity.kind && e.text.eq_ignore_ascii_case(&entity.text))
    {
        Some(existing) if existing.confidence < entity.confidence => *existing = entity,
        Some(_) => {}
        None => entities.push(entity),
    }
}

fn impact_rank(impact_type: ImpactType) -> u8 {
    match impact_type {
        ImpactType::Direct => 0,
        ImpactType::Regulatory => 1,
        ImpactType::Sector => 2,
    }
}

/// 심볼당 하나, 최고 신뢰도 유지 (동점은 direct > regulatory > sector)
fn merge_impact(impacts: &mut Vec<StockImpact>, impact: StockImpact) {
    match impacts.iter_mut().find(|i| i.symbol == impact.symbol) {
        Some(existing) => {
            let better = impact.confidence > existing.confidence
                || (impact.confidence == existing.confidence
                    && impact_rank(impact.impact_type) < impact_rank(existing.impact_type));
            if better {
                *existing = impact;
            }
        }
        None => impacts.push(impact),
    }
}
