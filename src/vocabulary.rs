//! 시장 어휘 - 기업/업종/규제기관/정책 수단 사전
//!
//! 쿼리 엔티티 해석, 업종 추론, 키워드 추출이 모두 이 사전을 공유합니다.
//! 기본 사전은 인도 시장 기준이며 JSON 파일로 교체할 수 있습니다.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// Types
// ============================================================================

/// 기업 항목
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyTerm {
    pub name: String,
    /// 거래소 심볼 (NSE)
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// 소속 업종 이름
    #[serde(default)]
    pub sectors: Vec<String>,
}

/// 업종 항목
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorTerm {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// 규제기관 항목
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegulatorTerm {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// 감독 대상 업종
    #[serde(default)]
    pub oversees: Vec<String>,
}

/// 시장 어휘 사전
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vocabulary {
    #[serde(default)]
    pub companies: Vec<CompanyTerm>,
    #[serde(default)]
    pub sectors: Vec<SectorTerm>,
    #[serde(default)]
    pub regulators: Vec<RegulatorTerm>,
    /// 구체적 정책 수단 (repo rate, CRR 등)
    #[serde(default)]
    pub instruments: Vec<String>,
}

impl CompanyTerm {
    /// 이름 + 별칭 + 심볼
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str())
            .chain(self.aliases.iter().map(String::as_str))
            .chain(self.symbol.iter().map(String::as_str))
    }

    /// 업종 소속 여부 (대소문자 무시)
    pub fn in_sector(&self, sector: &str) -> bool {
        self.sectors.iter().any(|s| s.eq_ignore_ascii_case(sector))
    }
}

impl SectorTerm {
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

impl RegulatorTerm {
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

// ============================================================================
// Vocabulary
// ============================================================================

impl Vocabulary {
    /// JSON 파일에서 로드
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read vocabulary file: {:?}", path))?;
        let vocab: Vocabulary =
            serde_json::from_str(&raw).context("Failed to parse vocabulary JSON")?;

        tracing::info!(
            "Loaded vocabulary: {} companies, {} sectors, {} regulators",
            vocab.companies.len(),
            vocab.sectors.len(),
            vocab.regulators.len()
        );
        Ok(vocab)
    }

    /// 경로가 있으면 로드, 없으면 기본 사전
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::builtin()),
        }
    }

    /// 기업 조회 (이름/별칭/심볼, 대소문자 무시)
    pub fn company(&self, name: &str) -> Option<&CompanyTerm> {
        let name = name.trim();
        self.companies
            .iter()
            .find(|c| c.terms().any(|t| t.eq_ignore_ascii_case(name)))
    }

    /// 업종 조회
    pub fn sector(&self, name: &str) -> Option<&SectorTerm> {
        let name = name.trim();
        self.sectors
            .iter()
            .find(|s| s.terms().any(|t| t.eq_ignore_ascii_case(name)))
    }

    /// 규제기관 조회
    pub fn regulator(&self, name: &str) -> Option<&RegulatorTerm> {
        let name = name.trim();
        self.regulators
            .iter()
            .find(|r| r.terms().any(|t| t.eq_ignore_ascii_case(name)))
    }

    /// 업종 소속 기업 목록
    pub fn companies_in_sector(&self, sector: &str) -> Vec<&CompanyTerm> {
        let canonical = self
            .sector(sector)
            .map(|s| s.name.as_str())
            .unwrap_or(sector);
        self.companies
            .iter()
            .filter(|c| c.in_sector(canonical))
            .collect()
    }

    /// 저장된 엔티티 이름 병합 (사전에 없는 이름만 추가)
    pub fn merge_names(
        &mut self,
        companies: impl IntoIterator<Item = String>,
        sectors: impl IntoIterator<Item = String>,
        regulators: impl IntoIterator<Item = String>,
    ) {
        for name in companies {
            if !name.trim().is_empty() && self.company(&name).is_none() {
                self.companies.push(CompanyTerm {
                    name,
                    symbol: None,
                    aliases: vec![],
                    sectors: vec![],
                });
            }
        }
        for name in sectors {
            if !name.trim().is_empty() && self.sector(&name).is_none() {
                self.sectors.push(SectorTerm {
                    name,
                    aliases: vec![],
                });
            }
        }
        for name in regulators {
            if !name.trim().is_empty() && self.regulator(&name).is_none() {
                self.regulators.push(RegulatorTerm {
                    name,
                    aliases: vec![],
                    oversees: vec![],
                });
            }
        }
    }

    /// 텍스트에 언급된 기업
    pub fn companies_in(&self, text: &str) -> Vec<&CompanyTerm> {
        let lowered = text.to_lowercase();
        self.companies
            .iter()
            .filter(|c| c.terms().any(|t| contains_term_in(text, &lowered, t)))
            .collect()
    }

    /// 텍스트에 언급된 업종
    pub fn sectors_in(&self, text: &str) -> Vec<&SectorTerm> {
        let lowered = text.to_lowercase();
        self.sectors
            .iter()
            .filter(|s| s.terms().any(|t| contains_term_in(text, &lowered, t)))
            .collect()
    }

    /// 텍스트에 언급된 규제기관
    pub fn regulators_in(&self, text: &str) -> Vec<&RegulatorTerm> {
        let lowered = text.to_lowercase();
        self.regulators
            .iter()
            .filter(|r| r.terms().any(|t| contains_term_in(text, &lowered, t)))
            .collect()
    }

    /// 텍스트에 언급된 정책 수단 (중복 제거)
    pub fn instruments_in(&self, text: &str) -> Vec<&str> {
        let lowered = text.to_lowercase();
        let mut seen = HashSet::new();
        self.instruments
            .iter()
            .filter(|i| contains_term_in(text, &lowered, i))
            .filter(|i| seen.insert(i.to_lowercase()))
            .map(String::as_str)
            .collect()
    }

    /// 기본 사전 (인도 시장)
    pub fn builtin() -> Self {
        fn company(name: &str, symbol: &str, aliases: &[&str], sectors: &[&str]) -> CompanyTerm {
            CompanyTerm {
                name: name.to_string(),
                symbol: Some(symbol.to_string()),
                aliases: aliases.iter().map(|s| s.to_string()).collect(),
                sectors: sectors.iter().map(|s| s.to_string()).collect(),
            }
        }
        fn sector(name: &str, aliases: &[&str]) -> SectorTerm {
            SectorTerm {
                name: name.to_string(),
                aliases: aliases.iter().map(|s| s.to_string()).collect(),
            }
        }
        fn regulator(name: &str, aliases: &[&str], oversees: &[&str]) -> RegulatorTerm {
            RegulatorTerm {
                name: name.to_string(),
                aliases: aliases.iter().map(|s| s.to_string()).collect(),
                oversees: oversees.iter().map(|s| s.to_string()).collect(),
            }
        }

        Self {
            companies: vec![
                company("HDFC Bank", "HDFCBANK", &["HDFC"], &["Banking"]),
                company("ICICI Bank", "ICICIBANK", &["ICICI"], &["Banking"]),
                company("Axis Bank", "AXISBANK", &[], &["Banking"]),
                company("Kotak Mahindra Bank", "KOTAKBANK", &["Kotak"], &["Banking"]),
                company("State Bank of India", "SBIN", &["SBI"], &["Banking"]),
                company("Infosys", "INFY", &[], &["IT"]),
                company("Tata Consultancy Services", "TCS", &[], &["IT"]),
                company("Wipro", "WIPRO", &[], &["IT"]),
                company("Reliance Industries", "RELIANCE", &["Reliance", "Jio", "Reliance Jio"], &["Energy", "Telecom"]),
                company("Bharti Airtel", "BHARTIARTL", &["Airtel"], &["Telecom"]),
                company("Vodafone Idea", "IDEA", &[], &["Telecom"]),
                company("Bajaj Auto", "BAJAJ-AUTO", &[], &["Automobile"]),
                company("Maruti Suzuki", "MARUTI", &["Maruti"], &["Automobile"]),
                company("Dr. Reddy's Laboratories", "DRREDDY", &["Dr. Reddy's", "Dr Reddy's"], &["Pharma"]),
                company("Cipla", "CIPLA", &[], &["Pharma"]),
                company("Coal India", "COALINDIA", &[], &["Energy", "Mining"]),
                company("NTPC", "NTPC", &[], &["Power"]),
                company("Power Grid Corporation", "POWERGRID", &["Power Grid"], &["Power"]),
            ],
            sectors: vec![
                sector("Banking", &["banks", "bank stocks", "lenders", "banking sector"]),
                sector("IT", &["IT services", "information technology", "tech services"]),
                sector("Energy", &["oil and gas", "oil & gas"]),
                sector("Telecom", &["telecommunications", "telecom sector"]),
                sector("Automobile", &["auto sector", "automobiles", "two-wheeler"]),
                sector("Pharma", &["pharmaceutical", "pharmaceuticals", "pharma sector"]),
                sector("Power", &["power sector", "electricity", "renewable energy"]),
                sector("Mining", &["coal mining"]),
            ],
            regulators: vec![
                regulator("RBI", &["Reserve Bank of India", "Reserve Bank", "central bank"], &["Banking"]),
                regulator("SEBI", &["Securities and Exchange Board of India"], &[]),
                regulator("TRAI", &["Telecom Regulatory Authority"], &["Telecom"]),
                regulator("FDA", &["US FDA", "Food and Drug Administration"], &["Pharma"]),
                regulator("CERC", &["Central Electricity Regulatory Commission"], &["Power"]),
            ],
            instruments: [
                "repo rate",
                "reverse repo",
                "CRR",
                "SLR",
                "policy rate",
                "basis points",
                "T-bill",
                "bond",
                "F&O",
                "derivatives",
                "spectrum",
                "tariff",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

// ============================================================================
// Term Matching
// ============================================================================

/// 두 글자 이하 약어("IT")는 일반 단어와 겹치므로 대소문자를 구분합니다.
const CASE_SENSITIVE_MAX_CHARS: usize = 2;

/// 단어 경계를 고려한 포함 검사 (대소문자 무시)
pub fn contains_term(text: &str, term: &str) -> bool {
    contains_term_in(text, &text.to_lowercase(), term)
}

/// 단어 경계를 고려한 포함 검사 (대소문자 구분, 종목 심볼용)
pub fn contains_exact(text: &str, term: &str) -> bool {
    find_bounded(text, term.trim())
}

/// `lowered`는 `text`의 소문자 버전입니다.
fn contains_term_in(text: &str, lowered: &str, term: &str) -> bool {
    let term = term.trim();
    if term.chars().count() <= CASE_SENSITIVE_MAX_CHARS {
        find_bounded(text, term)
    } else {
        find_bounded(lowered, &term.to_lowercase())
    }
}

fn find_bounded(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }

    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        let begin = start + pos;
        let end = begin + needle.len();

        let before_ok = haystack[..begin]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());

        if before_ok && after_ok {
            return true;
        }

        // 다음 문자 경계로 이동
        start = begin
            + haystack[begin..]
                .chars()
                .next()
                .map_or(1, char::len_utf8);
    }

    false
}
