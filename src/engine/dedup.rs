//! 중복 판정기
//!
//! 새 기사 벡터를 정본 기사들과만 비교해 최고 유사도 정본을 찾습니다.
//! 최고 점수가 임계값 이상이면 그 정본의 중복으로 판정합니다.
//! 이행적 클러스터링은 하지 않습니다 (greedy first-match).

use crate::corpus::model::{CanonicalVector, DedupDecision};
use crate::engine::similarity;

/// 중복 판정기
#[derive(Debug, Clone, Copy)]
pub struct DedupResolver {
    threshold: f32,
}

impl DedupResolver {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// 판정
    ///
    /// 동점이면 먼저 삽입된(ID가 작은) 정본이 이깁니다.
    /// 차원이 다른 후보는 그 비교만 건너뜁니다.
    pub fn resolve(&self, vector: &[f32], canonicals: &[CanonicalVector]) -> DedupDecision {
        let mut best: Option<(i64, f32)> = None;

        for candidate in canonicals {
            let score = match similarity(vector, &candidate.embedding) {
                Ok(score) if score.is_finite() => score,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("Skipping canonical article {}: {}", candidate.id, e);
                    continue;
                }
            };

            tracing::debug!("Similarity to article {}: {:.4}", candidate.id, score);

            best = match best {
                Some((best_id, best_score))
                    if best_score > score || (best_score == score && best_id < candidate.id) =>
                {
                    Some((best_id, best_score))
                }
                _ => Some((candidate.id, score)),
            };
        }

        match best {
            None => DedupDecision::unique(),
            Some((id, score)) => {
                let is_duplicate = score >= self.threshold;
                DedupDecision {
                    is_duplicate,
                    canonical_id: is_duplicate.then_some(id),
                    best_score: Some(score),
                    best_match_id: Some(id),
                }
            }
        }
    }
}

impl Default for DedupResolver {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_DUPLICATE_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(id: i64, embedding: Vec<f32>) -> CanonicalVector {
        CanonicalVector {
            id,
            embedding,
            published_at: None,
        }
    }

    /// 단위 벡터 x축과의 코사인이 `cos`인 2차원 단위 벡터
    fn at_cosine(cos: f32) -> Vec<f32> {
        vec![cos, (1.0 - cos * cos).sqrt()]
    }

    #[test]
    fn test_empty_corpus_is_unique() {
        let decision = DedupResolver::default().resolve(&[1.0, 0.0], &[]);
        assert_eq!(decision, DedupDecision::unique());
    }

    #[test]
    fn test_threshold_boundary() {
        let resolver = DedupResolver::new(0.85);
        let corpus = vec![canonical(1, vec![1.0, 0.0])];

        let below = resolver.resolve(&at_cosine(0.84), &corpus);
        assert!(!below.is_duplicate);
        assert_eq!(below.canonical_id, None);
        assert_eq!(below.best_match_id, Some(1));

        let above = resolver.resolve(&at_cosine(0.86), &corpus);
        assert!(above.is_duplicate);
        assert_eq!(above.canonical_id, Some(1));
    }

    #[test]
    fn test_exact_threshold_is_duplicate() {
        let resolver = DedupResolver::new(1.0);
        let corpus = vec![canonical(7, vec![0.0, 3.0])];
        assert!(resolver.resolve(&[0.0, 3.0], &corpus).is_duplicate);
    }

    #[test]
    fn test_best_match_wins() {
        let resolver = DedupResolver::new(0.85);
        let corpus = vec![
            canonical(1, at_cosine(0.5)),
            canonical(2, at_cosine(0.95)),
            canonical(3, at_cosine(0.7)),
        ];
        let decision = resolver.resolve(&[1.0, 0.0], &corpus);
        assert_eq!(decision.canonical_id, Some(2));
        assert!((decision.best_score.unwrap() - 0.95).abs() < 1e-5);
    }

    #[test]
    fn test_tie_goes_to_lowest_id() {
        let resolver = DedupResolver::new(0.85);
        let corpus = vec![canonical(5, vec![1.0, 0.0]), canonical(2, vec![1.0, 0.0])];
        let decision = resolver.resolve(&[1.0, 0.0], &corpus);
        assert_eq!(decision.canonical_id, Some(2));
    }

    #[test]
    fn test_mismatched_dimension_is_skipped() {
        let resolver = DedupResolver::new(0.85);
        let corpus = vec![
            canonical(1, vec![1.0, 0.0, 0.0]),
            canonical(2, at_cosine(0.6)),
        ];
        let decision = resolver.resolve(&[1.0, 0.0], &corpus);
        assert!(!decision.is_duplicate);
        assert_eq!(decision.best_match_id, Some(2));
    }
}
