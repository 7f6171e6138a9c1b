//! 랭커 - 후보 정렬
//!
//! 점수 내림차순, 동점이면 최신 발행일 우선(발행일 없음은 뒤로), 그다음 작은 ID.
//! 시맨틱 검색과 쿼리 후보 정렬이 같은 규칙을 씁니다.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 정렬 가능한 후보
pub trait Rankable {
    fn article_id(&self) -> i64;
    fn score(&self) -> f32;
    fn published_at(&self) -> Option<DateTime<Utc>>;
}

/// 점수가 매겨진 기사 (검색 결과)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredArticle {
    pub article_id: i64,
    pub score: f32,
    pub published_at: Option<DateTime<Utc>>,
}

impl Rankable for ScoredArticle {
    fn article_id(&self) -> i64 {
        self.article_id
    }

    fn score(&self) -> f32 {
        self.score
    }

    fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }
}

/// 정렬 결과 (한 번만 순회 가능)
#[derive(Debug)]
pub struct Ranking<T> {
    inner: std::vec::IntoIter<T>,
}

impl<T> Iterator for Ranking<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for Ranking<T> {}

/// 두 후보 비교 (앞설수록 Less)
pub fn compare<T: Rankable>(a: &T, b: &T) -> Ordering {
    b.score()
        .total_cmp(&a.score())
        .then_with(|| b.published_at().cmp(&a.published_at()))
        .then_with(|| a.article_id().cmp(&b.article_id()))
}

/// 후보 정렬 후 `limit`개로 자르기
pub fn rank<T, I>(candidates: I, limit: usize) -> Ranking<T>
where
    T: Rankable,
    I: IntoIterator<Item = T>,
{
    let mut items: Vec<T> = candidates.into_iter().collect();
    items.sort_by(compare);
    items.truncate(limit);

    Ranking {
        inner: items.into_iter(),
    }
}
