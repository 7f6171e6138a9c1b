//! 유사도 엔진 - 코사인 유사도
//!
//! f64로 같은 순서로 누적하므로 `similarity(a, b) == similarity(b, a)`가 정확히 성립합니다.

use crate::error::{IntelError, Result};

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 노름이 0인 벡터는 방향이 없으므로 0.0을 반환합니다.
///
/// # Errors
/// 두 벡터의 차원이 다르거나 비어 있으면 `DimensionMismatch`
pub fn similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() || a.is_empty() {
        return Err(IntelError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    let score = dot / (norm_a.sqrt() * norm_b.sqrt());
    Ok(score.clamp(-1.0, 1.0) as f32)
}
