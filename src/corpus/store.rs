//! News Store - rusqlite 기반 코퍼스 저장소
//!
//! 기사/엔티티/주식 임팩트/중복 판정 기록을 소유합니다.
//! 저장 위치: ~/.finnews-rag/news.db
//!
//! 삽입은 커넥션 락 + 단일 트랜잭션 안에서
//! "정본 집합 읽기 → 판정 → 기사/기록 쓰기"를 수행하여 직렬화됩니다.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};
use serde::Serialize;

use super::model::{
    parse_published, Article, ArticleSummary, CanonicalVector, DedupDecision, DuplicateRecord,
    Entity, EntityKind, ImpactType, NewArticle, StockImpact,
};

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.finnews-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".finnews-rag")
}

// ============================================================================
// Types
// ============================================================================

/// 삽입 결과
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    /// 새로 삽입됨
    Inserted {
        article: Article,
        decision: DedupDecision,
    },
    /// 같은 URL이 이미 존재 (멱등)
    Existing(Article),
}

/// 엔티티 빈도
#[derive(Debug, Clone, Serialize)]
pub struct EntityFrequency {
    pub text: String,
    pub kind: EntityKind,
    pub frequency: usize,
}

/// (심볼, 임팩트 타입)별 집계
#[derive(Debug, Clone, Serialize)]
pub struct ImpactSummary {
    pub symbol: String,
    pub impact_type: ImpactType,
    pub average_confidence: f32,
    pub frequency: usize,
}

/// 심볼별 집계
#[derive(Debug, Clone, Serialize)]
pub struct StockFrequency {
    pub symbol: String,
    pub frequency: usize,
    pub average_confidence: f32,
}

/// 코퍼스 통계
#[derive(Debug, Clone, Serialize)]
pub struct CorpusStats {
    pub total_articles: usize,
    pub unique_articles: usize,
    pub duplicate_articles: usize,
    /// 중복 비율 (%)
    pub deduplication_rate: f32,
    pub duplicate_record_count: usize,
    /// 중복 판정된 기록의 평균 유사도
    pub mean_duplicate_similarity: Option<f32>,
    /// 전체 기록의 평균 유사도
    pub mean_match_similarity: Option<f32>,
    pub entity_counts: BTreeMap<EntityKind, usize>,
    pub unique_entities: usize,
    pub unique_stocks: usize,
    pub top_entities: Vec<EntityFrequency>,
    pub top_stocks: Vec<StockFrequency>,
    pub db_path: PathBuf,
}

// ============================================================================
// NewsStore
// ============================================================================

/// News Store - 동기 코퍼스 저장소
///
/// 프로세스(또는 테스트) 수명 동안 코퍼스를 단독 소유합니다.
pub struct NewsStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

const ARTICLE_COLUMNS: &str = "id, title, body, source, url, published_at, embedding, \
                               is_duplicate, canonical_id, created_at";

const SUMMARY_COLUMNS: &str = "id, title, source, url, published_at, is_duplicate, canonical_id";

impl NewsStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    /// 기본 위치에서 열기 (~/.finnews-rag/news.db)
    pub fn open_default() -> Result<Self> {
        Self::open(&get_data_dir().join("news.db"))
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                source TEXT,
                url TEXT NOT NULL UNIQUE,
                published_at TEXT,
                embedding BLOB NOT NULL,
                dimension INTEGER NOT NULL,
                is_duplicate INTEGER NOT NULL DEFAULT 0,
                canonical_id INTEGER REFERENCES articles(id),
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS entities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
                entity_text TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                confidence REAL NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS stock_impacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
                stock_symbol TEXT NOT NULL,
                impact_type TEXT NOT NULL,
                confidence REAL NOT NULL,
                sentiment TEXT NOT NULL,
                magnitude TEXT,
                driver TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS duplicate_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                article_id INTEGER NOT NULL REFERENCES articles(id),
                matched_id INTEGER NOT NULL REFERENCES articles(id),
                similarity REAL NOT NULL,
                is_duplicate INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_articles_canonical ON articles(canonical_id);
            CREATE INDEX IF NOT EXISTS idx_articles_duplicate ON articles(is_duplicate);
            CREATE INDEX IF NOT EXISTS idx_entities_article ON entities(article_id);
            CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type);
            CREATE INDEX IF NOT EXISTS idx_stock_impacts_article ON stock_impacts(article_id);
            CREATE INDEX IF NOT EXISTS idx_stock_impacts_symbol ON stock_impacts(stock_symbol);
            CREATE INDEX IF NOT EXISTS idx_dedup_articles ON duplicate_records(article_id, matched_id);
            "#,
        )
        .context("Failed to initialize schema")?;

        tracing::debug!("News store initialized at {:?}", self.db_path);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------------

    /// 기사 삽입 (중복 판정 포함, 직렬화된 임계 구역)
    ///
    /// `decide`는 현재 정본 기사 벡터 목록을 받아 판정을 반환합니다.
    /// 같은 URL이 이미 있으면 아무것도 쓰지 않고 기존 기사를 반환합니다.
    pub fn insert_article<F>(
        &self,
        article: &NewArticle,
        embedding: &[f32],
        decide: F,
    ) -> Result<InsertOutcome>
    where
        F: FnOnce(&[CanonicalVector]) -> DedupDecision,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;

        if let Some(existing) = query_article_by_url(&tx, &article.url)? {
            tracing::debug!("Article already stored: {} (id={})", article.url, existing.id);
            return Ok(InsertOutcome::Existing(existing));
        }

        let canonicals = query_canonical_vectors(&tx)?;
        let decision = decide(&canonicals);

        if decision.is_duplicate {
            let target = decision
                .canonical_id
                .context("Duplicate decision without canonical id")?;
            anyhow::ensure!(
                canonicals.iter().any(|c| c.id == target),
                "Canonical target {} is not a canonical article",
                target
            );
        }

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO articles
                (title, body, source, url, published_at, embedding, dimension,
                 is_duplicate, canonical_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                article.title,
                article.body,
                article.source,
                article.url,
                article.published_at.map(|dt| dt.to_rfc3339()),
                encode_embedding(embedding),
                embedding.len() as i64,
                decision.is_duplicate,
                if decision.is_duplicate { decision.canonical_id } else { None },
                now,
            ],
        )
        .context("Failed to insert article")?;

        let id = tx.last_insert_rowid();

        if let (Some(matched_id), Some(score)) = (decision.best_match_id, decision.best_score) {
            tx.execute(
                "INSERT INTO duplicate_records (article_id, matched_id, similarity, is_duplicate, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    matched_id,
                    f64::from(score.clamp(0.0, 1.0)),
                    decision.is_duplicate,
                    now,
                ],
            )
            .context("Failed to insert duplicate record")?;
        }

        tx.commit().context("Failed to commit article insert")?;

        let stored = query_article(&conn, id)?
            .with_context(|| format!("Inserted article {} disappeared", id))?;

        tracing::info!(
            "Stored article: {} (id={}, duplicate={}, canonical={:?})",
            stored.url,
            stored.id,
            stored.is_duplicate,
            stored.canonical_id
        );

        Ok(InsertOutcome::Inserted {
            article: stored,
            decision,
        })
    }

    /// 정본 기사에 엔티티/임팩트 저장 (한 번만)
    pub fn add_classification(
        &self,
        article_id: i64,
        entities: &[Entity],
        impacts: &[StockImpact],
    ) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;

        let is_duplicate: Option<bool> = tx
            .query_row(
                "SELECT is_duplicate FROM articles WHERE id = ?1",
                params![article_id],
                |row| row.get(0),
            )
            .optional()?;
        match is_duplicate {
            None => anyhow::bail!("Article {} does not exist", article_id),
            Some(true) => anyhow::bail!("Article {} is a duplicate; classification is canonical-only", article_id),
            Some(false) => {}
        }

        let existing: i64 = tx.query_row(
            "SELECT (SELECT COUNT(*) FROM entities WHERE article_id = ?1)
                  + (SELECT COUNT(*) FROM stock_impacts WHERE article_id = ?1)",
            params![article_id],
            |row| row.get(0),
        )?;
        anyhow::ensure!(existing == 0, "Article {} is already classified", article_id);

        let now = Utc::now().to_rfc3339();

        for entity in entities {
            tx.execute(
                "INSERT INTO entities (article_id, entity_text, entity_type, confidence, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    article_id,
                    entity.text,
                    entity.kind.as_str(),
                    f64::from(entity.confidence),
                    now
                ],
            )
            .context("Failed to insert entity")?;
        }

        for impact in impacts {
            tx.execute(
                "INSERT INTO stock_impacts
                    (article_id, stock_symbol, impact_type, confidence, sentiment, magnitude, driver, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    article_id,
                    impact.symbol,
                    impact.impact_type.as_str(),
                    f64::from(impact.confidence),
                    impact.sentiment.as_str(),
                    impact.magnitude.map(|m| m.as_str()),
                    impact.driver,
                    now
                ],
            )
            .context("Failed to insert stock impact")?;
        }

        tx.commit().context("Failed to commit classification")?;

        tracing::debug!(
            "Classified article {}: {} entities, {} impacts",
            article_id,
            entities.len(),
            impacts.len()
        );
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Article Lookups
    // ------------------------------------------------------------------------

    /// ID로 기사 조회
    pub fn get_article(&self, id: i64) -> Result<Option<Article>> {
        let conn = self.lock()?;
        query_article(&conn, id)
    }

    /// URL로 기사 조회
    pub fn get_by_url(&self, url: &str) -> Result<Option<Article>> {
        let conn = self.lock()?;
        query_article_by_url(&conn, url)
    }

    /// 기사 목록 (최신 삽입순)
    pub fn list_articles(
        &self,
        skip: usize,
        limit: usize,
        unique_only: bool,
    ) -> Result<Vec<ArticleSummary>> {
        let conn = self.lock()?;

        let sql = format!(
            "SELECT {} FROM articles {} ORDER BY id DESC LIMIT ?1 OFFSET ?2",
            SUMMARY_COLUMNS,
            if unique_only { "WHERE is_duplicate = 0" } else { "" }
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64, skip as i64], row_to_summary)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// ID 목록으로 요약 조회
    pub fn summaries(&self, ids: &[i64]) -> Result<HashMap<i64, ArticleSummary>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let conn = self.lock()?;
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM articles WHERE id IN ({})",
            SUMMARY_COLUMNS, placeholders
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), row_to_summary)?;

        let mut map = HashMap::with_capacity(ids.len());
        for summary in rows {
            let summary = summary?;
            map.insert(summary.id, summary);
        }
        Ok(map)
    }

    /// 모든 정본 기사 벡터 (삽입순)
    pub fn canonical_vectors(&self) -> Result<Vec<CanonicalVector>> {
        let conn = self.lock()?;
        query_canonical_vectors(&conn)
    }

    /// 정본별 중복 기사 수
    pub fn duplicate_counts(&self) -> Result<HashMap<i64, usize>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT canonical_id, COUNT(*) FROM articles
             WHERE is_duplicate = 1 AND canonical_id IS NOT NULL
             GROUP BY canonical_id",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;

        let mut map = HashMap::new();
        for row in rows {
            let (id, count) = row?;
            map.insert(id, count as usize);
        }
        Ok(map)
    }

    /// 중복 판정 기록 (기사 지정 시 해당 기사가 포함된 기록만)
    pub fn duplicate_records(&self, article_id: Option<i64>) -> Result<Vec<DuplicateRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, article_id, matched_id, similarity, is_duplicate, created_at
             FROM duplicate_records
             WHERE ?1 IS NULL OR article_id = ?1 OR matched_id = ?1
             ORDER BY id",
        )?;

        let rows = stmt.query_map(params![article_id], |row| {
            Ok(DuplicateRecord {
                id: row.get(0)?,
                article_id: row.get(1)?,
                matched_id: row.get(2)?,
                similarity: row.get::<_, f64>(3)? as f32,
                is_duplicate: row.get(4)?,
                created_at: parse_datetime(row.get::<_, String>(5)?),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ------------------------------------------------------------------------
    // Entity / Impact Lookups
    // ------------------------------------------------------------------------

    /// 기사의 엔티티
    pub fn entities_for(&self, article_id: i64) -> Result<Vec<Entity>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT entity_text, entity_type, confidence FROM entities
             WHERE article_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![article_id], |row| row_to_entity(row, 0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// 기사의 주식 임팩트
    pub fn impacts_for(&self, article_id: i64) -> Result<Vec<StockImpact>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT stock_symbol, impact_type, confidence, sentiment, magnitude, driver
             FROM stock_impacts WHERE article_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![article_id], |row| row_to_impact(row, 0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// 종류별 전체 엔티티 (기사 ID 포함)
    pub fn entities_of_kind(&self, kind: EntityKind) -> Result<Vec<(i64, Entity)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT article_id, entity_text, entity_type, confidence FROM entities
             WHERE entity_type = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![kind.as_str()], |row| {
            Ok((row.get::<_, i64>(0)?, row_to_entity(row, 1)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// 조건별 주식 임팩트 (기사 ID 포함)
    pub fn impacts_matching(
        &self,
        impact_type: Option<ImpactType>,
        symbol: Option<&str>,
    ) -> Result<Vec<(i64, StockImpact)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT article_id, stock_symbol, impact_type, confidence, sentiment, magnitude, driver
             FROM stock_impacts
             WHERE (?1 IS NULL OR impact_type = ?1)
               AND (?2 IS NULL OR UPPER(stock_symbol) = UPPER(?2))
             ORDER BY id",
        )?;
        let rows = stmt.query_map(
            params![impact_type.map(|t| t.as_str()), symbol],
            |row| Ok((row.get::<_, i64>(0)?, row_to_impact(row, 1)?)),
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// 종류별 고유 엔티티 텍스트
    pub fn distinct_entity_texts(&self, kind: EntityKind) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT entity_text FROM entities WHERE entity_type = ?1 ORDER BY entity_text",
        )?;
        let rows = stmt.query_map(params![kind.as_str()], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// 엔티티 빈도 목록
    pub fn entity_frequencies(
        &self,
        kind: Option<EntityKind>,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<EntityFrequency>> {
        let conn = self.lock()?;
        query_entity_frequencies(&conn, kind, skip, limit)
    }

    /// (심볼, 임팩트 타입)별 집계
    pub fn impact_summaries(
        &self,
        symbol: Option<&str>,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<ImpactSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT stock_symbol, impact_type, AVG(confidence), COUNT(*) AS frequency
             FROM stock_impacts
             WHERE ?1 IS NULL OR UPPER(stock_symbol) = UPPER(?1)
             GROUP BY stock_symbol, impact_type
             ORDER BY frequency DESC, stock_symbol
             LIMIT ?2 OFFSET ?3",
        )?;

        let rows = stmt.query_map(params![symbol, limit as i64, skip as i64], |row| {
            Ok(ImpactSummary {
                symbol: row.get(0)?,
                impact_type: parse_column(row, 1)?,
                average_confidence: row.get::<_, f64>(2)? as f32,
                frequency: row.get::<_, i64>(3)? as usize,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ------------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------------

    /// 코퍼스 통계 (저장된 기록의 순수 집계)
    pub fn stats(&self) -> Result<CorpusStats> {
        let conn = self.lock()?;

        let count = |sql: &str| -> Result<usize> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        let total_articles = count("SELECT COUNT(*) FROM articles")?;
        let duplicate_articles = count("SELECT COUNT(*) FROM articles WHERE is_duplicate = 1")?;
        let unique_articles = total_articles - duplicate_articles;
        let duplicate_record_count = count("SELECT COUNT(*) FROM duplicate_records")?;
        let unique_entities = count("SELECT COUNT(DISTINCT LOWER(entity_text)) FROM entities")?;
        let unique_stocks = count("SELECT COUNT(DISTINCT UPPER(stock_symbol)) FROM stock_impacts")?;

        let mean = |sql: &str| -> Result<Option<f32>> {
            let v: Option<f64> = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(v.map(|x| x as f32))
        };
        let mean_duplicate_similarity =
            mean("SELECT AVG(similarity) FROM duplicate_records WHERE is_duplicate = 1")?;
        let mean_match_similarity = mean("SELECT AVG(similarity) FROM duplicate_records")?;

        let mut entity_counts: BTreeMap<EntityKind, usize> =
            EntityKind::ALL.iter().map(|k| (*k, 0)).collect();
        {
            let mut stmt =
                conn.prepare("SELECT entity_type, COUNT(*) FROM entities GROUP BY entity_type")?;
            let rows = stmt.query_map([], |row| {
                Ok((parse_column::<EntityKind>(row, 0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (kind, n) = row?;
                entity_counts.insert(kind, n as usize);
            }
        }

        let top_entities = query_entity_frequencies(&conn, None, 0, 10)?;

        let top_stocks = {
            let mut stmt = conn.prepare(
                "SELECT stock_symbol, COUNT(*) AS frequency, AVG(confidence)
                 FROM stock_impacts
                 GROUP BY stock_symbol
                 ORDER BY frequency DESC, stock_symbol
                 LIMIT 10",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(StockFrequency {
                    symbol: row.get(0)?,
                    frequency: row.get::<_, i64>(1)? as usize,
                    average_confidence: row.get::<_, f64>(2)? as f32,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let deduplication_rate = if total_articles > 0 {
            duplicate_articles as f32 / total_articles as f32 * 100.0
        } else {
            0.0
        };

        Ok(CorpusStats {
            total_articles,
            unique_articles,
            duplicate_articles,
            deduplication_rate,
            duplicate_record_count,
            mean_duplicate_similarity,
            mean_match_similarity,
            entity_counts,
            unique_entities,
            unique_stocks,
            top_entities,
            top_stocks,
            db_path: self.db_path.clone(),
        })
    }
}

// ============================================================================
// Query Helpers
// ============================================================================

fn query_article(conn: &Connection, id: i64) -> Result<Option<Article>> {
    let sql = format!("SELECT {} FROM articles WHERE id = ?1", ARTICLE_COLUMNS);
    let article = conn
        .query_row(&sql, params![id], row_to_article)
        .optional()
        .context("Failed to query article")?;
    Ok(article)
}

fn query_article_by_url(conn: &Connection, url: &str) -> Result<Option<Article>> {
    let sql = format!("SELECT {} FROM articles WHERE url = ?1", ARTICLE_COLUMNS);
    let article = conn
        .query_row(&sql, params![url], row_to_article)
        .optional()
        .context("Failed to query article by URL")?;
    Ok(article)
}

fn query_canonical_vectors(conn: &Connection) -> Result<Vec<CanonicalVector>> {
    let mut stmt = conn.prepare(
        "SELECT id, embedding, published_at FROM articles WHERE is_duplicate = 0 ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(CanonicalVector {
            id: row.get(0)?,
            embedding: decode_embedding(&row.get::<_, Vec<u8>>(1)?),
            published_at: row
                .get::<_, Option<String>>(2)?
                .as_deref()
                .and_then(parse_published),
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn query_entity_frequencies(
    conn: &Connection,
    kind: Option<EntityKind>,
    skip: usize,
    limit: usize,
) -> Result<Vec<EntityFrequency>> {
    let mut stmt = conn.prepare(
        "SELECT entity_text, entity_type, COUNT(*) AS frequency
         FROM entities
         WHERE ?1 IS NULL OR entity_type = ?1
         GROUP BY LOWER(entity_text), entity_type
         ORDER BY frequency DESC, entity_text
         LIMIT ?2 OFFSET ?3",
    )?;

    let rows = stmt.query_map(
        params![kind.map(|k| k.as_str()), limit as i64, skip as i64],
        |row| {
            Ok(EntityFrequency {
                text: row.get(0)?,
                kind: parse_column(row, 1)?,
                frequency: row.get::<_, i64>(2)? as usize,
            })
        },
    )?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ============================================================================
// Row Mapping
// ============================================================================

fn row_to_article(row: &Row<'_>) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get(0)?,
        title: row.get(1)?,
        body: row.get(2)?,
        source: row.get(3)?,
        url: row.get(4)?,
        published_at: row
            .get::<_, Option<String>>(5)?
            .as_deref()
            .and_then(parse_published),
        embedding: decode_embedding(&row.get::<_, Vec<u8>>(6)?),
        is_duplicate: row.get(7)?,
        canonical_id: row.get(8)?,
        created_at: parse_datetime(row.get::<_, String>(9)?),
    })
}

fn row_to_summary(row: &Row<'_>) -> rusqlite::Result<ArticleSummary> {
    Ok(ArticleSummary {
        id: row.get(0)?,
        title: row.get(1)?,
        source: row.get(2)?,
        url: row.get(3)?,
        published_at: row
            .get::<_, Option<String>>(4)?
            .as_deref()
            .and_then(parse_published),
        is_duplicate: row.get(5)?,
        canonical_id: row.get(6)?,
    })
}

/// `offset`부터 (text, type, confidence)
fn row_to_entity(row: &Row<'_>, offset: usize) -> rusqlite::Result<Entity> {
    Ok(Entity {
        text: row.get(offset)?,
        kind: parse_column(row, offset + 1)?,
        confidence: row.get::<_, f64>(offset + 2)? as f32,
    })
}

/// `offset`부터 (symbol, type, confidence, sentiment, magnitude, driver)
fn row_to_impact(row: &Row<'_>, offset: usize) -> rusqlite::Result<StockImpact> {
    let magnitude = match row.get::<_, Option<String>>(offset + 4)? {
        Some(raw) => Some(raw.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(offset + 4, Type::Text, Box::new(e))
        })?),
        None => None,
    };

    Ok(StockImpact {
        symbol: row.get(offset)?,
        impact_type: parse_column(row, offset + 1)?,
        confidence: row.get::<_, f64>(offset + 2)? as f32,
        sentiment: parse_column(row, offset + 3)?,
        magnitude,
        driver: row.get(offset + 5)?,
    })
}

/// 문자열 컬럼을 열거형으로 파싱
fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 임베딩을 little-endian f32 바이트열로
fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::model::{ImpactMagnitude, Sentiment};
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, NewsStore) {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("test.db");
        let store = NewsStore::open(&db_path).unwrap();
        (dir, store)
    }

    fn new_article(url: &str, title: &str) -> NewArticle {
        NewArticle {
            title: title.to_string(),
            body: format!("{} body", title),
            source: Some("Reuters".to_string()),
            url: url.to_string(),
            published_at: parse_published("2025-01-15"),
        }
    }

    fn unique(_: &[CanonicalVector]) -> DedupDecision {
        DedupDecision::unique()
    }

    fn inserted(outcome: InsertOutcome) -> Article {
        match outcome {
            InsertOutcome::Inserted { article, .. } => article,
            InsertOutcome::Existing(_) => panic!("expected a new article"),
        }
    }

    #[test]
    fn test_embedding_codec() {
        let v = vec![0.25f32, -1.5, 3.0];
        assert_eq!(decode_embedding(&encode_embedding(&v)), v);
    }

    #[test]
    fn test_insert_and_get_article() {
        let (_dir, store) = create_test_store();

        let article = inserted(
            store
                .insert_article(&new_article("https://example.com/a", "HDFC dividend"), &[1.0, 0.0], unique)
                .unwrap(),
        );
        assert!(article.id > 0);
        assert!(!article.is_duplicate);
        assert_eq!(article.embedding, vec![1.0, 0.0]);

        let fetched = store.get_article(article.id).unwrap().unwrap();
        assert_eq!(fetched.title, "HDFC dividend");
        assert_eq!(fetched.source.as_deref(), Some("Reuters"));
        assert!(fetched.published_at.is_some());

        assert!(store.get_article(999).unwrap().is_none());
    }

    #[test]
    fn test_insert_same_url_is_idempotent() {
        let (_dir, store) = create_test_store();
        let a = new_article("https://example.com/a", "First");

        let first = inserted(store.insert_article(&a, &[1.0, 0.0], unique).unwrap());
        let second = store.insert_article(&a, &[1.0, 0.0], |_| panic!("must not decide")).unwrap();

        match second {
            InsertOutcome::Existing(existing) => assert_eq!(existing.id, first.id),
            InsertOutcome::Inserted { .. } => panic!("expected existing article"),
        }
        assert_eq!(store.stats().unwrap().total_articles, 1);
    }

    #[test]
    fn test_decide_sees_only_canonical_vectors() {
        let (_dir, store) = create_test_store();

        let first = inserted(
            store.insert_article(&new_article("https://e.com/1", "One"), &[1.0, 0.0], unique).unwrap(),
        );
        store
            .insert_article(&new_article("https://e.com/2", "Two"), &[1.0, 0.0], |canonicals| {
                assert_eq!(canonicals.len(), 1);
                DedupDecision {
                    is_duplicate: true,
                    canonical_id: Some(canonicals[0].id),
                    best_score: Some(1.0),
                    best_match_id: Some(canonicals[0].id),
                }
            })
            .unwrap();

        store
            .insert_article(&new_article("https://e.com/3", "Three"), &[0.0, 1.0], |canonicals| {
                let ids: Vec<i64> = canonicals.iter().map(|c| c.id).collect();
                assert_eq!(ids, vec![first.id]);
                DedupDecision::unique()
            })
            .unwrap();

        let records = store.duplicate_records(None).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_duplicate);
        assert_eq!(records[0].matched_id, first.id);
    }

    #[test]
    fn test_rejects_duplicate_pointing_at_unknown_canonical() {
        let (_dir, store) = create_test_store();
        let result = store.insert_article(&new_article("https://e.com/x", "X"), &[1.0], |_| DedupDecision {
            is_duplicate: true,
            canonical_id: Some(42),
            best_score: Some(0.9),
            best_match_id: Some(42),
        });
        assert!(result.is_err());
        assert_eq!(store.stats().unwrap().total_articles, 0);
    }

    #[test]
    fn test_classification_roundtrip() {
        let (_dir, store) = create_test_store();
        let article = inserted(
            store.insert_article(&new_article("https://e.com/1", "One"), &[1.0], unique).unwrap(),
        );

        let entities = vec![
            Entity {
                text: "HDFC Bank".to_string(),
                kind: EntityKind::Company,
                confidence: 1.0,
            },
            Entity {
                text: "Banking".to_string(),
                kind: EntityKind::Sector,
                confidence: 0.65,
            },
        ];
        let impacts = vec![StockImpact {
            symbol: "HDFCBANK".to_string(),
            impact_type: ImpactType::Direct,
            confidence: 1.0,
            sentiment: Sentiment::Positive,
            magnitude: Some(ImpactMagnitude::Medium),
            driver: "HDFC Bank".to_string(),
        }];

        store.add_classification(article.id, &entities, &impacts).unwrap();

        assert_eq!(store.entities_for(article.id).unwrap(), entities);
        assert_eq!(store.impacts_for(article.id).unwrap(), impacts);

        let sectors = store.entities_of_kind(EntityKind::Sector).unwrap();
        assert_eq!(sectors.len(), 1);
        assert_eq!(sectors[0].0, article.id);

        let direct = store.impacts_matching(Some(ImpactType::Direct), Some("hdfcbank")).unwrap();
        assert_eq!(direct.len(), 1);
        assert!(store.impacts_matching(Some(ImpactType::Sector), None).unwrap().is_empty());

        // 두 번째 분류는 거부
        assert!(store.add_classification(article.id, &entities, &impacts).is_err());
    }

    #[test]
    fn test_classification_rejected_for_duplicate() {
        let (_dir, store) = create_test_store();
        let first = inserted(
            store.insert_article(&new_article("https://e.com/1", "One"), &[1.0], unique).unwrap(),
        );
        let dup = inserted(
            store
                .insert_article(&new_article("https://e.com/2", "Two"), &[1.0], |_| DedupDecision {
                    is_duplicate: true,
                    canonical_id: Some(first.id),
                    best_score: Some(1.0),
                    best_match_id: Some(first.id),
                })
                .unwrap(),
        );

        assert!(store.add_classification(dup.id, &[], &[]).is_err());
        assert!(store.add_classification(12345, &[], &[]).is_err());
    }

    #[test]
    fn test_list_and_summaries() {
        let (_dir, store) = create_test_store();
        let mut ids = vec![];
        for i in 0..5 {
            let a = inserted(
                store
                    .insert_article(&new_article(&format!("https://e.com/{}", i), &format!("Doc {}", i)), &[1.0], unique)
                    .unwrap(),
            );
            ids.push(a.id);
        }

        let list = store.list_articles(0, 3, false).unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].id, ids[4]);

        let page = store.list_articles(3, 10, true).unwrap();
        assert_eq!(page.len(), 2);

        let map = store.summaries(&[ids[0], ids[2], 999]).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&ids[2]].title, "Doc 2");
    }

    #[test]
    fn test_stats() {
        let (_dir, store) = create_test_store();
        let first = inserted(
            store.insert_article(&new_article("https://e.com/1", "One"), &[1.0], unique).unwrap(),
        );
        store
            .insert_article(&new_article("https://e.com/2", "Two"), &[1.0], |_| DedupDecision {
                is_duplicate: true,
                canonical_id: Some(first.id),
                best_score: Some(0.9),
                best_match_id: Some(first.id),
            })
            .unwrap();
        store
            .insert_article(&new_article("https://e.com/3", "Three"), &[1.0], |_| DedupDecision {
                is_duplicate: false,
                canonical_id: None,
                best_score: Some(0.5),
                best_match_id: Some(first.id),
            })
            .unwrap();

        store
            .add_classification(
                first.id,
                &[Entity {
                    text: "RBI".to_string(),
                    kind: EntityKind::Regulator,
                    confidence: 0.7,
                }],
                &[],
            )
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_articles, 3);
        assert_eq!(stats.unique_articles, 2);
        assert_eq!(stats.duplicate_articles, 1);
        assert_eq!(stats.duplicate_record_count, 2);
        assert!((stats.mean_duplicate_similarity.unwrap() - 0.9).abs() < 1e-6);
        assert!((stats.mean_match_similarity.unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(stats.entity_counts[&EntityKind::Regulator], 1);
        assert_eq!(stats.entity_counts[&EntityKind::Person], 0);
        assert_eq!(store.duplicate_counts().unwrap()[&first.id], 1);
    }
}
