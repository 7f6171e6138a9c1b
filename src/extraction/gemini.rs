//! Gemini 기반 엔티티/감성 추출
//!
//! generateContent 한 번으로 JSON을 받아 `ExtractionResult`로 변환합니다.
//! 응답이 JSON 외 텍스트를 포함하면 첫 `{...}` 블록을 복구해 파싱합니다.

use std::sync::OnceLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{EntityMention, ExtractionCapability, ExtractionResult, StockMention};
use crate::corpus::model::{EntityKind, ImpactMagnitude, Sentiment};
use crate::gemini::GeminiClient;

const GEMINI_GENERATE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

/// 프롬프트에 넣을 최대 본문 길이
const MAX_PROMPT_CHARS: usize = 12_000;

const EXTRACTION_PROMPT: &str = r#"Extract market entities from this financial news article.

Return ONLY a JSON object with these keys:
- "companies": company names mentioned
- "sectors": industry sectors (e.g. "Banking", "IT", "Pharma")
- "regulators": regulatory bodies (e.g. "RBI", "SEBI")
- "people": people mentioned
- "events": market events (e.g. "dividend", "merger", "rate hike")
- "stocks": objects {"symbol", "company", "sector", "regulator"} for every listed
  stock affected. Set "sector" when the stock is affected through its sector and
  "regulator" when it is affected through a regulatory action.
- "sentiment": "positive", "negative" or "neutral"
- "impact_magnitude": "high", "medium" or "low"

Article:
"#;

/// Gemini 추출기
#[derive(Debug, Clone)]
pub struct GeminiExtraction {
    client: GeminiClient,
}

impl GeminiExtraction {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::new(GeminiClient::from_env()?))
    }
}

#[async_trait]
impl ExtractionCapability for GeminiExtraction {
    async fn extract(&self, text: &str) -> Result<ExtractionResult> {
        let prompt = format!(
            "{}{}",
            EXTRACTION_PROMPT,
            text.chars().take(MAX_PROMPT_CHARS).collect::<String>()
        );

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.1,
                max_output_tokens: 2048,
                response_mime_type: "application/json",
            },
        };

        let response: GenerateResponse = self
            .client
            .post_json(GEMINI_GENERATE_URL, &request)
            .await
            .context("Extraction request failed")?;

        let output = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap_or_default();

        if output.trim().is_empty() {
            anyhow::bail!("Gemini returned no extraction output");
        }

        parse_output(&output)
    }

    fn name(&self) -> &str {
        "gemini-2.0-flash"
    }
}

// ============================================================================
// Output Parsing
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    companies: Vec<String>,
    #[serde(default)]
    sectors: Vec<String>,
    #[serde(default)]
    regulators: Vec<String>,
    #[serde(default)]
    people: Vec<String>,
    #[serde(default)]
    events: Vec<String>,
    #[serde(default)]
    stocks: Vec<StockMention>,
    #[serde(default)]
    sentiment: Option<String>,
    #[serde(default)]
    impact_magnitude: Option<String>,
}

fn json_block_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").ok()).as_ref()
}

/// 모델 출력 파싱 (직접 파싱 → `{...}` 블록 복구)
fn parse_output(output: &str) -> Result<ExtractionResult> {
    let raw: RawExtraction = match serde_json::from_str(output.trim()) {
        Ok(raw) => raw,
        Err(direct_err) => {
            let block = json_block_regex()
                .and_then(|re| re.find(output))
                .map(|m| m.as_str())
                .with_context(|| format!("No JSON object in extraction output: {}", direct_err))?;
            tracing::debug!("Recovered JSON block from extraction output");
            serde_json::from_str(block).context("Malformed extraction JSON")?
        }
    };

    let sentiment = match raw.sentiment.as_deref() {
        Some(s) => s
            .parse::<Sentiment>()
            .with_context(|| format!("Unknown sentiment label: {}", s))?,
        None => Sentiment::Neutral,
    };
    let magnitude = raw
        .impact_magnitude
        .as_deref()
        .and_then(|m| m.parse::<ImpactMagnitude>().ok());

    let mut entities = Vec::new();
    for (kind, names) in [
        (EntityKind::Company, raw.companies),
        (EntityKind::Sector, raw.sectors),
        (EntityKind::Regulator, raw.regulators),
        (EntityKind::Person, raw.people),
        (EntityKind::Event, raw.events),
    ] {
        entities.extend(names.into_iter().map(|n| EntityMention::new(n.trim(), kind)));
    }

    let result = ExtractionResult {
        entities,
        stocks: raw
            .stocks
            .into_iter()
            .map(|s| StockMention {
                symbol: s.symbol.trim().to_uppercase(),
                ..s
            })
            .collect(),
        sentiment,
        magnitude,
    };

    result.validate()?;
    Ok(result)
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let output = r#"{
            "companies": ["HDFC Bank"],
            "sectors": ["Banking"],
            "regulators": [],
            "people": ["Sashidhar Jagdishan"],
            "events": ["dividend"],
            "stocks": [{"symbol": "hdfcbank", "company": "HDFC Bank"}],
            "sentiment": "positive",
            "impact_magnitude": "medium"
        }"#;

        let result = parse_output(output).unwrap();
        assert_eq!(result.entities.len(), 4);
        assert_eq!(result.stocks[0].symbol, "HDFCBANK");
        assert_eq!(result.sentiment, Sentiment::Positive);
        assert_eq!(result.magnitude, Some(ImpactMagnitude::Medium));
    }

    #[test]
    fn test_parse_recovers_json_block() {
        let output = "Here is the result:\n```json\n{\"regulators\": [\"RBI\"], \"sentiment\": \"negative\"}\n```";
        let result = parse_output(output).unwrap();
        assert_eq!(
            result.entities,
            vec![EntityMention::new("RBI", EntityKind::Regulator)]
        );
        assert_eq!(result.sentiment, Sentiment::Negative);
        assert!(result.magnitude.is_none());
    }

    #[test]
    fn test_parse_malformed_output() {
        assert!(parse_output("no json here").is_err());
        assert!(parse_output("{\"companies\": \"HDFC\"}").is_err());
        assert!(parse_output("{\"sentiment\": \"ecstatic\"}").is_err());
        assert!(parse_output("{\"stocks\": [{\"symbol\": \"  \"}]}").is_err());
    }
}
