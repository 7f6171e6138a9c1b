//! CLI 모듈
//!
//! finnews-rag CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::EngineConfig;
use crate::corpus::model::{parse_published, EntityKind, NewArticle};
use crate::corpus::store::get_data_dir;
use crate::engine::{IngestResult, MatchRule, NewsEngine};
use crate::gemini::has_api_key;
use crate::scraper::WebScraper;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "finnews-rag")]
#[command(version, about = "금융 뉴스 중복 제거 + 주식 임팩트 분석 + 컨텍스트 검색", long_about = None)]
pub struct Cli {
    /// 데이터 디렉토리 (기본: ~/.finnews-rag)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// 외부 API 없이 해싱 임베딩/키워드 추출 사용
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 기사 수집 (직접 입력, URL 스크랩, 또는 JSON 배치 파일)
    Ingest {
        /// 기사 제목
        #[arg(short, long)]
        title: Option<String>,

        /// 기사 본문
        #[arg(short, long)]
        body: Option<String>,

        /// 출처
        #[arg(short, long)]
        source: Option<String>,

        /// 기사 URL (제목/본문 없이 주면 스크랩)
        #[arg(short, long)]
        url: Option<String>,

        /// 발행일 (RFC3339 또는 YYYY-MM-DD)
        #[arg(short, long)]
        published: Option<String>,

        /// 기사 배열 JSON 파일
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// 시맨틱 검색 (정본 기사)
    Search {
        /// 검색 쿼리
        query: String,

        /// 결과 개수
        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,
    },

    /// 컨텍스트 확장 쿼리 (기업/업종/규제기관/테마)
    Query {
        /// 자연어 쿼리
        query: String,

        /// 결과 개수 제한
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// 기사 상세 (엔티티/임팩트 포함)
    Show {
        /// 기사 ID
        id: i64,
    },

    /// 저장된 기사 목록
    List {
        /// 정본 기사만
        #[arg(long)]
        unique_only: bool,

        #[arg(long, default_value = "0")]
        skip: usize,

        /// 결과 개수 제한
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// 엔티티 빈도 목록
    Entities {
        /// 종류 필터 (company, sector, regulator, person, event)
        #[arg(short, long)]
        kind: Option<EntityKind>,

        #[arg(long, default_value = "0")]
        skip: usize,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// 종목 임팩트 집계
    Impacts {
        /// 종목 심볼 필터
        #[arg(short, long)]
        symbol: Option<String>,

        #[arg(long, default_value = "0")]
        skip: usize,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// 코퍼스 통계
    Stats,

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let data_dir = cli.data_dir.unwrap_or_else(get_data_dir);
    let offline = cli.offline;

    match cli.command {
        Commands::Ingest {
            title,
            body,
            source,
            url,
            published,
            file,
        } => {
            let engine = open_engine(&data_dir, offline)?;
            if let Some(path) = file {
                return cmd_ingest_file(&engine, &path).await;
            }
            cmd_ingest(&engine, title, body, source, url, published).await
        }
        Commands::Search { query, top_k } => {
            cmd_search(&open_engine(&data_dir, offline)?, &query, top_k).await
        }
        Commands::Query { query, limit } => {
            cmd_query(&open_engine(&data_dir, offline)?, &query, limit).await
        }
        // 조회 명령은 외부 API를 호출하지 않음
        Commands::Show { id } => cmd_show(&open_engine(&data_dir, true)?, id),
        Commands::List {
            unique_only,
            skip,
            limit,
        } => cmd_list(&open_engine(&data_dir, true)?, skip, limit, unique_only),
        Commands::Entities { kind, skip, limit } => {
            cmd_entities(&open_engine(&data_dir, true)?, kind, skip, limit)
        }
        Commands::Impacts {
            symbol,
            skip,
            limit,
        } => cmd_impacts(&open_engine(&data_dir, true)?, symbol.as_deref(), skip, limit),
        Commands::Stats => cmd_stats(&open_engine(&data_dir, true)?),
        Commands::Status => cmd_status(&data_dir, offline),
    }
}

fn open_engine(data_dir: &Path, offline: bool) -> Result<NewsEngine> {
    let config = EngineConfig::from_env().context("설정 로드 실패")?;
    NewsEngine::with_data_dir(data_dir, offline, config).context("NewsEngine 초기화 실패")
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 기사 수집 명령어 (ingest)
///
/// 제목/본문이 있으면 그대로, URL만 있으면 스크랩해서 수집합니다.
async fn cmd_ingest(
    engine: &NewsEngine,
    title: Option<String>,
    body: Option<String>,
    source: Option<String>,
    url: Option<String>,
    published: Option<String>,
) -> Result<()> {
    let Some(url) = url else {
        bail!("--url을 지정해야 합니다 (또는 --file로 배치 수집)");
    };

    let article = if title.is_none() && body.is_none() {
        println!("[*] URL 스크래핑 중: {}", url);

        let scraper = WebScraper::new().context("WebScraper 생성 실패")?;
        let mut article = scraper
            .scrape(&url)
            .await
            .context("URL 스크래핑 실패")?
            .into_new_article();

        if source.is_some() {
            article.source = source;
        }
        if let Some(p) = published.as_deref() {
            article.published_at = parse_published(p);
        }
        article
    } else {
        NewArticle {
            title: title.unwrap_or_default(),
            body: body.unwrap_or_default(),
            source,
            url,
            published_at: published.as_deref().and_then(parse_published),
        }
    };

    println!("[*] 임베딩 생성 및 중복 판정 중...");

    let result = engine.ingest(article).await.context("기사 수집 실패")?;
    print_ingest_result(&result);

    Ok(())
}

/// 배치 수집 명령어 (ingest --file)
async fn cmd_ingest_file(engine: &NewsEngine, path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("파일 읽기 실패: {}", path.display()))?;
    let articles: Vec<NewArticle> =
        serde_json::from_str(&raw).context("기사 JSON 파싱 실패")?;

    if articles.is_empty() {
        println!("[!] 수집할 기사가 없습니다.");
        return Ok(());
    }

    println!("[*] 수집 대상: {} 건", articles.len());
    println!();

    let total = articles.len();
    let mut unique_count = 0;
    let mut duplicate_count = 0;
    let mut existing_count = 0;
    let mut error_count = 0;

    for (i, article) in articles.into_iter().enumerate() {
        print!("[{}/{}] {}... ", i + 1, total, truncate_text(&article.title, 50));

        match engine.ingest(article).await {
            Ok(result) if result.already_present => {
                println!("이미 존재 (#{})", result.article.id);
                existing_count += 1;
            }
            Ok(result) if result.article.is_duplicate => {
                println!(
                    "중복 (#{} → #{})",
                    result.article.id,
                    result.article.canonical_id.unwrap_or_default()
                );
                duplicate_count += 1;
            }
            Ok(result) => {
                println!(
                    "완료 (#{}, 엔티티 {}, 임팩트 {})",
                    result.article.id,
                    result.entities.len(),
                    result.impacts.len()
                );
                unique_count += 1;
            }
            Err(e) => {
                println!("실패: {}", e);
                error_count += 1;
            }
        }
    }

    println!();
    println!(
        "[OK] 완료: 정본 {}, 중복 {}, 기존 {}, 실패 {}",
        unique_count, duplicate_count, existing_count, error_count
    );

    Ok(())
}

/// 검색 명령어 (search)
async fn cmd_search(engine: &NewsEngine, query: &str, top_k: usize) -> Result<()> {
    println!("[*] 검색 중: \"{}\"", query);

    let hits = engine.search(query, top_k).await.context("검색 실패")?;

    if hits.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", hits.len());

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [유사도: {:.4}] #{} {}",
            i + 1,
            hit.similarity,
            hit.article_id,
            truncate_text(&hit.title, 80)
        );
        println!("   URL: {}", hit.url);
        println!("   발행: {}", format_date(hit.published_at));
        println!();
    }

    Ok(())
}

/// 쿼리 명령어 (query)
///
/// 쿼리 의도를 해석해 관련 기사를 확장 조회합니다.
async fn cmd_query(engine: &NewsEngine, query: &str, limit: usize) -> Result<()> {
    println!("[*] 쿼리 분석 중: \"{}\"", query);

    let answer = engine.query(query, limit).await.context("쿼리 실패")?;

    println!("[*] 의도: {}", answer.intent);
    if !answer.mentions.is_empty() {
        let mentions: Vec<String> = answer
            .mentions
            .iter()
            .map(|m| format!("{} ({})", m.name, m.kind))
            .collect();
        println!("[*] 인식: {}", mentions.join(", "));
    }

    if answer.results.is_empty() {
        println!("\n[!] 관련 기사가 없습니다.");
        return Ok(());
    }

    println!(
        "\n[OK] 관련 기사 ({} / 후보 {} 건):\n",
        answer.articles_used, answer.total_candidates
    );

    for (i, hit) in answer.results.iter().enumerate() {
        println!(
            "{}. [{}] [관련도: {:.3}] #{} {}",
            i + 1,
            rule_label(hit.rule),
            hit.relevance,
            hit.article_id,
            truncate_text(&hit.title, 80)
        );
        println!(
            "   발행: {} | 보도 {} 건",
            format_date(hit.published_at),
            hit.coverage
        );
        println!();
    }

    Ok(())
}

/// 상세 명령어 (show)
fn cmd_show(engine: &NewsEngine, id: i64) -> Result<()> {
    let detail = engine.get_article(id)?;
    let article = &detail.article;

    println!("[OK] 기사 #{}", article.id);
    println!("     제목: {}", article.title);
    println!("     URL: {}", article.url);
    println!("     출처: {}", article.source.as_deref().unwrap_or("-"));
    println!("     발행: {}", format_date(article.published_at));

    if let Some(canonical) = article.canonical_id.filter(|_| article.is_duplicate) {
        println!("     중복: 정본 #{}", canonical);
    }

    println!();
    println!("     {}", truncate_text(&article.body, 300));

    if !detail.entities.is_empty() {
        println!();
        println!("[*] 엔티티 ({} 건):", detail.entities.len());
        for entity in &detail.entities {
            println!(
                "     {:<10} {:<30} {:.2}",
                entity.kind, entity.text, entity.confidence
            );
        }
    }

    if !detail.impacts.is_empty() {
        println!();
        println!("[*] 종목 임팩트 ({} 건):", detail.impacts.len());
        for impact in &detail.impacts {
            let magnitude = impact.magnitude.map(|m| m.to_string());
            println!(
                "     {:<12} {:<10} {:.2}  {} / {}  ← {}",
                impact.symbol,
                impact.impact_type,
                impact.confidence,
                impact.sentiment,
                magnitude.as_deref().unwrap_or("-"),
                impact.driver
            );
        }
    }

    Ok(())
}

/// 목록 명령어 (list)
fn cmd_list(engine: &NewsEngine, skip: usize, limit: usize, unique_only: bool) -> Result<()> {
    let articles = engine
        .list_articles(skip, limit, unique_only)
        .context("기사 목록 조회 실패")?;

    if articles.is_empty() {
        println!("[!] 저장된 기사가 없습니다.");
        return Ok(());
    }

    println!("[OK] 저장된 기사 ({} 건):\n", articles.len());

    for article in articles {
        let marker = match article.canonical_id.filter(|_| article.is_duplicate) {
            Some(canonical) => format!("DUP→#{}", canonical),
            None => "UNIQUE".to_string(),
        };

        println!("  #{:<4} [{}] {}", article.id, marker, truncate_text(&article.title, 60));
        println!("        URL: {}", article.url);
        println!(
            "        {} | {}",
            format_date(article.published_at),
            article.source.as_deref().unwrap_or("-")
        );
        println!();
    }

    Ok(())
}

/// 엔티티 목록 명령어 (entities)
fn cmd_entities(
    engine: &NewsEngine,
    kind: Option<EntityKind>,
    skip: usize,
    limit: usize,
) -> Result<()> {
    let entities = engine
        .list_entities(kind, skip, limit)
        .context("엔티티 조회 실패")?;

    if entities.is_empty() {
        println!("[!] 엔티티가 없습니다.");
        return Ok(());
    }

    println!("[OK] 엔티티 ({} 건):\n", entities.len());
    for entity in entities {
        println!("  {:<10} {:<35} {:>4}", entity.kind, entity.text, entity.frequency);
    }

    Ok(())
}

/// 임팩트 목록 명령어 (impacts)
fn cmd_impacts(
    engine: &NewsEngine,
    symbol: Option<&str>,
    skip: usize,
    limit: usize,
) -> Result<()> {
    let impacts = engine
        .list_impacts(symbol, skip, limit)
        .context("임팩트 조회 실패")?;

    if impacts.is_empty() {
        println!("[!] 종목 임팩트가 없습니다.");
        return Ok(());
    }

    println!("[OK] 종목 임팩트 ({} 건):\n", impacts.len());
    for impact in impacts {
        println!(
            "  {:<12} {:<10} 평균 신뢰도 {:.3}  ({} 건)",
            impact.symbol, impact.impact_type, impact.average_confidence, impact.frequency
        );
    }

    Ok(())
}

/// 통계 명령어 (stats)
fn cmd_stats(engine: &NewsEngine) -> Result<()> {
    let stats = engine.statistics().context("통계 조회 실패")?;

    println!("[OK] 코퍼스 통계");
    println!("     전체 기사: {} 건", stats.total_articles);
    println!("     정본: {} 건, 중복: {} 건", stats.unique_articles, stats.duplicate_articles);
    println!("     중복 비율: {:.1}%", stats.deduplication_rate);
    println!("     판정 기록: {} 건", stats.duplicate_record_count);
    println!(
        "     평균 유사도 (중복): {}",
        format_score(stats.mean_duplicate_similarity)
    );
    println!(
        "     평균 유사도 (전체): {}",
        format_score(stats.mean_match_similarity)
    );
    println!(
        "     엔티티: {} 종, 종목: {} 종",
        stats.unique_entities, stats.unique_stocks
    );

    if !stats.entity_counts.is_empty() {
        let counts: Vec<String> = stats
            .entity_counts
            .iter()
            .map(|(kind, count)| format!("{} {}", kind, count))
            .collect();
        println!("     종류별: {}", counts.join(", "));
    }

    if !stats.top_entities.is_empty() {
        println!();
        println!("[*] 상위 엔티티:");
        for entity in &stats.top_entities {
            println!("     {:<35} {:<10} {:>4}", entity.text, entity.kind, entity.frequency);
        }
    }

    if !stats.top_stocks.is_empty() {
        println!();
        println!("[*] 상위 종목:");
        for stock in &stats.top_stocks {
            println!(
                "     {:<12} {:>4} 건  평균 신뢰도 {:.3}",
                stock.symbol, stock.frequency, stock.average_confidence
            );
        }
    }

    Ok(())
}

/// 상태 명령어 (status)
///
/// 시스템 상태를 확인합니다.
fn cmd_status(data_dir: &Path, offline: bool) -> Result<()> {
    println!("finnews-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", data_dir.display());

    // API 키 상태
    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정 (오프라인 프로바이더 사용)");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    match EngineConfig::from_env() {
        Ok(config) => {
            println!(
                "[*] 중복 임계값: {:.2}, 테마 하한: {:.2} (top {}), 신뢰도 하한: {:.2}",
                config.duplicate_threshold,
                config.thematic_floor,
                config.thematic_top_k,
                config.confidence_floor
            );
        }
        Err(e) => println!("[!] 설정 오류: {}", e),
    }

    match open_engine(data_dir, offline) {
        Ok(engine) => {
            println!(
                "[OK] 프로바이더: 임베딩 {}, 추출 {}",
                engine.embedder_name(),
                engine.extractor_name()
            );
            match engine.statistics() {
                Ok(stats) => println!(
                    "[OK] 저장된 기사: {} 건 (정본 {}, 중복 {})",
                    stats.total_articles, stats.unique_articles, stats.duplicate_articles
                ),
                Err(e) => println!("[!] 통계 조회 실패: {}", e),
            }
        }
        Err(e) => println!("[!] NewsEngine 초기화 실패: {:#}", e),
    }

    Ok(())
}

fn print_ingest_result(result: &IngestResult) {
    let article = &result.article;

    if result.already_present {
        println!("[OK] 이미 수집된 기사입니다 (ID: {})", article.id);
        println!("     URL: {}", article.url);
        return;
    }

    if article.is_duplicate {
        println!(
            "[OK] 중복 기사로 저장되었습니다 (ID: {}, 정본: #{}, 유사도: {})",
            article.id,
            article.canonical_id.unwrap_or_default(),
            format_score(result.best_score)
        );
        println!("     URL: {}", article.url);
        return;
    }

    println!("[OK] 기사가 추가되었습니다 (ID: {})", article.id);
    println!("     URL: {}", article.url);
    if let Some(score) = result.best_score {
        println!("     최고 유사도: {:.4}", score);
    }

    if let Some(ref error) = result.extraction_error {
        println!("[!] 엔티티 추출 실패: {}", error);
        return;
    }

    if let Some(ref sentiment) = result.sentiment {
        let magnitude = sentiment.magnitude.map(|m| m.to_string());
        println!(
            "     감성: {} / {}",
            sentiment.label,
            magnitude.as_deref().unwrap_or("-")
        );
    }
    println!(
        "     엔티티 {} 건, 종목 임팩트 {} 건",
        result.entities.len(),
        result.impacts.len()
    );
    for impact in &result.impacts {
        println!(
            "       {:<12} {:<10} {:.2}  ← {}",
            impact.symbol, impact.impact_type, impact.confidence, impact.driver
        );
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn rule_label(rule: MatchRule) -> &'static str {
    match rule {
        MatchRule::DirectEntity => "ENT",
        MatchRule::InferredEntity => "INF",
        MatchRule::SectorEntity => "SEC",
        MatchRule::CompanyImpact => "IMP",
        MatchRule::SectorMember => "MEM",
        MatchRule::RegulatoryImpact => "REG",
        MatchRule::Thematic => "SEM",
    }
}

fn format_date(date: Option<chrono::DateTime<chrono::Utc>>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn format_score(score: Option<f32>) -> String {
    score
        .map(|s| format!("{:.4}", s))
        .unwrap_or_else(|| "-".to_string())
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================
