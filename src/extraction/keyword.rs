//! 오프라인 어휘 기반 추출
//!
//! 텍스트에 등장하는 기업/업종/규제기관을 사전에서 찾고,
//! 업종/규제 경로로 연결된 종목을 주식 언급으로 펼칩니다.
//! 감성은 단순 어휘 점수(긍정 - 부정)로 판정합니다.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use super::{EntityMention, ExtractionCapability, ExtractionResult, StockMention};
use crate::corpus::model::{EntityKind, ImpactMagnitude, Sentiment};
use crate::vocabulary::{contains_term, Vocabulary};

const POSITIVE_TERMS: &[&str] = &[
    "surge", "surges", "rally", "rallies", "gain", "gains", "growth", "record", "profit",
    "beats", "upgrade", "approves", "approval", "expansion", "raises", "rises", "strong",
    "wins", "dividend", "buyback", "boost", "jumps", "outperform",
];

const NEGATIVE_TERMS: &[&str] = &[
    "decline", "declines", "falls", "fell", "slump", "loss", "losses", "plunge", "downgrade",
    "penalty", "fine", "probe", "concern", "concerns", "weak", "restrictions", "cuts",
    "misses", "warning", "default", "pressure", "selloff",
];

const EVENT_TERMS: &[&str] = &[
    "dividend", "buyback", "merger", "acquisition", "IPO", "rate hike", "rate cut",
    "quarterly results", "earnings", "stake sale", "bonus issue", "stock split", "policy review",
];

/// 어휘 기반 추출기
#[derive(Debug, Clone)]
pub struct KeywordExtraction {
    vocabulary: Vocabulary,
}

impl KeywordExtraction {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self { vocabulary }
    }

    /// 동기 추출 (추출 본체)
    pub fn scan(&self, text: &str) -> ExtractionResult {
        let vocab = &self.vocabulary;
        let mut entities = Vec::new();
        let mut stocks = Vec::new();
        let mut named_symbols = HashSet::new();

        // 직접 언급된 기업
        for company in vocab.companies_in(text) {
            entities.push(EntityMention::new(&company.name, EntityKind::Company));
            if let Some(symbol) = &company.symbol {
                named_symbols.insert(symbol.clone());
                stocks.push(StockMention {
                    symbol: symbol.clone(),
                    company: Some(company.name.clone()),
                    sector: company.sectors.first().cloned(),
                    regulator: None,
                });
            }
        }

        // 업종 → 소속 종목
        for sector in vocab.sectors_in(text) {
            entities.push(EntityMention::new(&sector.name, EntityKind::Sector));
            for company in vocab.companies_in_sector(&sector.name) {
                if let Some(symbol) = &company.symbol {
                    if !named_symbols.contains(symbol) {
                        stocks.push(StockMention {
                            symbol: symbol.clone(),
                            company: Some(company.name.clone()),
                            sector: Some(sector.name.clone()),
                            regulator: None,
                        });
                    }
                }
            }
        }

        // 규제기관 → 감독 업종 종목
        for regulator in vocab.regulators_in(text) {
            entities.push(EntityMention::new(&regulator.name, EntityKind::Regulator));
            for sector in &regulator.oversees {
                for company in vocab.companies_in_sector(sector) {
                    if let Some(symbol) = &company.symbol {
                        if !named_symbols.contains(symbol) {
                            stocks.push(StockMention {
                                symbol: symbol.clone(),
                                company: Some(company.name.clone()),
                                sector: Some(sector.clone()),
                                regulator: Some(regulator.name.clone()),
                            });
                        }
                    }
                }
            }
        }

        for event in EVENT_TERMS.iter().filter(|e| contains_term(text, e)) {
            entities.push(EntityMention::new(*event, EntityKind::Event));
        }

        let (sentiment, magnitude) = lexicon_sentiment(text);

        ExtractionResult {
            entities,
            stocks,
            sentiment,
            magnitude,
        }
    }
}

#[async_trait]
impl ExtractionCapability for KeywordExtraction {
    async fn extract(&self, text: &str) -> Result<ExtractionResult> {
        Ok(self.scan(text))
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// 어휘 감성 점수 → (레이블, 강도)
fn lexicon_sentiment(text: &str) -> (Sentiment, Option<ImpactMagnitude>) {
    let positive = POSITIVE_TERMS.iter().filter(|t| contains_term(text, t)).count() as i32;
    let negative = NEGATIVE_TERMS.iter().filter(|t| contains_term(text, t)).count() as i32;
    let score = positive - negative;

    let sentiment = match score.signum() {
        1 => Sentiment::Positive,
        -1 => Sentiment::Negative,
        _ => Sentiment::Neutral,
    };

    let magnitude = match score.abs() {
        0 => None,
        1 => Some(ImpactMagnitude::Low),
        2 => Some(ImpactMagnitude::Medium),
        _ => Some(ImpactMagnitude::High),
    };

    (sentiment, magnitude)
}
