//! 엔진 설정
//!
//! 기본값은 상수로 두고, `FINNEWS_*` 환경변수로 덮어쓸 수 있습니다.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{IntelError, Result};

/// 중복 판정 기본 임계값 (코사인 유사도)
pub const DEFAULT_DUPLICATE_THRESHOLD: f32 = 0.85;
/// 테마 검색 최소 유사도
pub const DEFAULT_THEMATIC_FLOOR: f32 = 0.70;
/// 테마 검색 최대 후보 수
pub const DEFAULT_THEMATIC_TOP_K: usize = 10;
/// 엔티티/임팩트 최소 신뢰도 (미만은 버림)
pub const DEFAULT_CONFIDENCE_FLOOR: f32 = 0.3;
/// 외부 프로바이더 호출 타임아웃
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// 엔진 설정
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 이 값 이상이면 중복으로 판정
    pub duplicate_threshold: f32,
    /// 테마 검색 후보 최소 유사도
    pub thematic_floor: f32,
    /// 테마 검색 후보 최대 개수
    pub thematic_top_k: usize,
    /// 분류 결과 최소 신뢰도
    pub confidence_floor: f32,
    /// 임베딩/추출 호출 타임아웃
    pub provider_timeout: Duration,
    /// 사용자 정의 어휘 파일 (JSON)
    pub vocabulary_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            duplicate_threshold: DEFAULT_DUPLICATE_THRESHOLD,
            thematic_floor: DEFAULT_THEMATIC_FLOOR,
            thematic_top_k: DEFAULT_THEMATIC_TOP_K,
            confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            vocabulary_path: None,
        }
    }
}

impl EngineConfig {
    /// 환경변수에서 설정 로드 (없는 값은 기본값)
    ///
    /// - `FINNEWS_DUPLICATE_THRESHOLD`
    /// - `FINNEWS_THEMATIC_FLOOR`
    /// - `FINNEWS_THEMATIC_TOP_K`
    /// - `FINNEWS_CONFIDENCE_FLOOR`
    /// - `FINNEWS_PROVIDER_TIMEOUT_SECS`
    /// - `FINNEWS_VOCABULARY`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = env_parse::<f32>("FINNEWS_DUPLICATE_THRESHOLD")? {
            config.duplicate_threshold = v;
        }
        if let Some(v) = env_parse::<f32>("FINNEWS_THEMATIC_FLOOR")? {
            config.thematic_floor = v;
        }
        if let Some(v) = env_parse::<usize>("FINNEWS_THEMATIC_TOP_K")? {
            config.thematic_top_k = v;
        }
        if let Some(v) = env_parse::<f32>("FINNEWS_CONFIDENCE_FLOOR")? {
            config.confidence_floor = v;
        }
        if let Some(v) = env_parse::<u64>("FINNEWS_PROVIDER_TIMEOUT_SECS")? {
            config.provider_timeout = Duration::from_secs(v);
        }
        if let Ok(path) = std::env::var("FINNEWS_VOCABULARY") {
            if !path.is_empty() {
                config.vocabulary_path = Some(PathBuf::from(path));
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("duplicate_threshold", self.duplicate_threshold),
            ("thematic_floor", self.thematic_floor),
            ("confidence_floor", self.confidence_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(IntelError::InvalidInput(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.thematic_top_k == 0 {
            return Err(IntelError::InvalidInput(
                "thematic_top_k must be at least 1".to_string(),
            ));
        }

        if self.provider_timeout.is_zero() {
            return Err(IntelError::InvalidInput(
                "provider_timeout must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// 환경변수 파싱 (미설정/빈 값은 None)
fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| IntelError::InvalidInput(format!("{} is not a valid value: {}", key, raw))),
        _ => Ok(None),
    }
}
