//! 웹 스크래퍼 모듈 - 뉴스 기사 페이지 추출
//!
//! 기사 URL에서 제목/본문/출처/발행일을 뽑아 수집 입력(`NewArticle`)으로 변환합니다.
//! 메타 태그(og:*, article:published_time)를 우선하고, 없으면 본문 구조에서 찾습니다.

use anyhow::{Context, Result};
use scraper::{ElementRef, Html, Selector};

use crate::corpus::model::{parse_published, NewArticle};

/// 본문으로 인정하는 최소 길이
const MIN_CONTENT_CHARS: usize = 100;

/// 스크랩된 기사
#[derive(Debug, Clone)]
pub struct ScrapedArticle {
    /// 기사 제목
    pub title: Option<String>,
    /// 본문 텍스트 (HTML 태그 제거됨)
    pub content: String,
    /// 출처 (og:site_name 또는 호스트)
    pub source: Option<String>,
    /// 발행 시각 원문 (article:published_time 등)
    pub published: Option<String>,
    /// 원본 URL
    pub url: String,
}

impl ScrapedArticle {
    /// 수집 입력으로 변환
    pub fn into_new_article(self) -> NewArticle {
        NewArticle {
            title: self.title.unwrap_or_default(),
            body: self.content,
            source: self.source,
            published_at: self.published.as_deref().and_then(parse_published),
            url: self.url,
        }
    }
}

/// 웹 스크래퍼
pub struct WebScraper {
    client: reqwest::Client,
}

impl WebScraper {
    /// 새 스크래퍼 생성
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("finnews-rag/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("HTTP 클라이언트 생성 실패")?;

        Ok(Self { client })
    }

    /// URL에서 기사 추출
    pub async fn scrape(&self, url: &str) -> Result<ScrapedArticle> {
        tracing::info!("Scraping: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("HTTP 요청 실패")?
            .error_for_status()
            .context("HTTP 에러 응답")?;

        let html = response.text().await.context("응답 본문 읽기 실패")?;

        Ok(self.parse(url, &html))
    }

    /// HTML 문서에서 기사 추출 (네트워크 없음)
    pub fn parse(&self, url: &str, html: &str) -> ScrapedArticle {
        let document = Html::parse_document(html);

        ScrapedArticle {
            title: self.extract_title(&document),
            content: self.extract_content(&document),
            source: self.extract_source(&document, url),
            published: self.extract_published(&document),
            url: url.to_string(),
        }
    }

    /// 제목 추출 (og:title > title > h1)
    fn extract_title(&self, document: &Html) -> Option<String> {
        if let Some(title) = meta_content(document, "meta[property='og:title']") {
            return Some(title);
        }

        ["title", "h1"]
            .iter()
            .find_map(|selector| first_text(document, selector))
    }

    /// 출처 추출 (og:site_name > URL 호스트)
    fn extract_source(&self, document: &Html, url: &str) -> Option<String> {
        meta_content(document, "meta[property='og:site_name']").or_else(|| {
            url::Url::parse(url)
                .ok()
                .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        })
    }

    /// 발행일 추출 (메타 태그 > time[datetime])
    fn extract_published(&self, document: &Html) -> Option<String> {
        let metas = [
            "meta[property='article:published_time']",
            "meta[name='publish-date']",
            "meta[itemprop='datePublished']",
        ];

        if let Some(value) = metas.iter().find_map(|s| meta_content(document, s)) {
            return Some(value);
        }

        let selector = Selector::parse("time[datetime]").ok()?;
        document
            .select(&selector)
            .next()
            .and_then(|e| e.value().attr("datetime"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// 본문 추출 (HTML 태그 제거)
    fn extract_content(&self, document: &Html) -> String {
        // 우선순위: article > main > body
        let selectors = [
            "article",
            "main",
            "[role=main]",
            ".article-body",
            ".story-content",
            ".content",
            "#content",
            "body",
        ];

        for selector_str in selectors {
            if let Ok(selector) = Selector::parse(selector_str) {
                if let Some(element) = document.select(&selector).next() {
                    let text = self.extract_text_from_element(&element);
                    if text.len() > MIN_CONTENT_CHARS {
                        return text;
                    }
                }
            }
        }

        // 폴백: 전체 body 텍스트
        if let Ok(selector) = Selector::parse("body") {
            if let Some(element) = document.select(&selector).next() {
                return self.extract_text_from_element(&element);
            }
        }

        String::new()
    }

    /// 요소에서 텍스트 추출 (스크립트/스타일 제외)
    fn extract_text_from_element(&self, element: &ElementRef) -> String {
        let mut text = String::new();

        for node in element.descendants() {
            let Some(t) = node.value().as_text() else {
                continue;
            };

            let skipped = node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|e| matches!(e.value().name(), "script" | "style" | "noscript"));
            if skipped {
                continue;
            }

            let trimmed = t.trim();
            if !trimmed.is_empty() {
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(trimmed);
            }
        }

        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl Default for WebScraper {
    fn default() -> Self {
        Self::new().unwrap_or_else(|e| {
            tracing::error!("WebScraper 생성 실패: {}", e);
            // 최소한의 클라이언트로 폴백
            Self {
                client: reqwest::Client::new(),
            }
        })
    }
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|e| e.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .map(|e| e.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE_URL: &str = "https://www.markets.example.com/news/rbi-repo";

    #[test]
    fn test_scraper_creation() {
        let scraper = WebScraper::new();
        assert!(scraper.is_ok());
    }

    #[test]
    fn test_extract_title_prefers_og_title() {
        let scraper = WebScraper::new().expect("scraper creation failed");
        let html = r#"
            <html>
                <head>
                    <title>RBI hikes repo rate | Markets Daily</title>
                    <meta property="og:title" content="RBI hikes repo rate by 25 bps">
                </head>
                <body><h1>Main Heading</h1></body>
            </html>
        "#;
        let article = scraper.parse(ARTICLE_URL, html);
        assert_eq!(article.title.as_deref(), Some("RBI hikes repo rate by 25 bps"));
    }

    #[test]
    fn test_extract_title_h1_fallback() {
        let scraper = WebScraper::new().expect("scraper creation failed");
        let html = r#"
            <html>
                <head><title></title></head>
                <body><h1>H1 Heading</h1></body>
            </html>
        "#;
        let document = Html::parse_document(html);
        let title = scraper.extract_title(&document);
        assert_eq!(title, Some("H1 Heading".to_string()));
    }

    #[test]
    fn test_source_and_published() {
        let scraper = WebScraper::new().expect("scraper creation failed");
        let html = r#"
            <html><head>
                <meta property="og:site_name" content="Markets Daily">
                <meta property="article:published_time" content="2025-01-15T09:30:00+05:30">
            </head><body></body></html>
        "#;
        let article = scraper.parse(ARTICLE_URL, html);
        assert_eq!(article.source.as_deref(), Some("Markets Daily"));
        assert_eq!(article.published.as_deref(), Some("2025-01-15T09:30:00+05:30"));

        let bare = scraper.parse(ARTICLE_URL, "<html><body><time datetime=\"2025-01-16\">Jan 16</time></body></html>");
        assert_eq!(bare.source.as_deref(), Some("markets.example.com"));
        assert_eq!(bare.published.as_deref(), Some("2025-01-16"));
    }

    #[test]
    fn test_extract_content_from_article() {
        let scraper = WebScraper::new().expect("scraper creation failed");
        let html = r#"
            <html>
                <body>
                    <nav>Navigation menu</nav>
                    <article>
                        <script>trackPageView();</script>
                        HDFC Bank shares rose after the lender reported strong quarterly numbers.
                        Analysts expect the banking sector to benefit from lower provisions.
                    </article>
                    <footer>Footer content</footer>
                </body>
            </html>
        "#;
        let document = Html::parse_document(html);
        let content = scraper.extract_content(&document);
        assert!(content.contains("HDFC Bank shares rose"));
        assert!(!content.contains("trackPageView"));
        assert!(!content.contains("Navigation"));
    }

    #[test]
    fn test_into_new_article() {
        let scraper = WebScraper::default();
        let html = r#"
            <html><head>
                <title>Infosys raises guidance</title>
                <meta property="article:published_time" content="2025-01-17">
            </head>
            <body><main>
                Infosys raised its full-year revenue guidance on Thursday, citing deal wins
                across financial services clients in North America and Europe.
            </main></body></html>
        "#;
        let article = scraper.parse(ARTICLE_URL, html).into_new_article();
        assert_eq!(article.title, "Infosys raises guidance");
        assert!(article.body.starts_with("Infosys raised"));
        assert_eq!(article.url, ARTICLE_URL);
        assert_eq!(article.published_at, parse_published("2025-01-17"));
    }
}
