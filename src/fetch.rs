use reqwest::blocking::Client;
use reqwest::StatusCode;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const USER_AGENT: &str = "deskrag/0.1 (documentation indexer)";

/// URL substrings that mark a page as documentation worth indexing.
const DOC_KEYWORDS: &[&str] = &[
    "guide",
    "tutorial",
    "api",
    "docs",
    "help",
    "getting-started",
    "setup",
    "integration",
];

const NAV_SELECTORS: &[&str] = &[
    "nav a",
    ".navigation a",
    ".menu a",
    ".sidebar a",
    "[role='navigation'] a",
];

const CONTENT_TAGS: &str = "p, h1, h2, h3, h4, h5, h6, li, div";

/// Lines shorter than this are navigation noise, not content.
const MIN_ELEMENT_CHARS: usize = 20;
const MIN_LINE_CHARS: usize = 10;
const MAX_CONTENT_LINES: usize = 50;

fn default_selectors() -> Vec<String> {
    ["article", ".content", ".markdown-body", "main", "[role='main']"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_exclude() -> Vec<String> {
    ["nav", "header", "footer", ".sidebar", ".navigation"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// One configured documentation site: where to start and which parts of a
/// page carry content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocSource {
    pub base_url: String,
    #[serde(default = "default_selectors")]
    pub selectors: Vec<String>,
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

impl DocSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            selectors: default_selectors(),
            exclude: default_exclude(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} returned status {status}")]
    Status { url: String, status: StatusCode },
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("no content extracted from {0}")]
    Empty(String),
}

/// Discovery and extraction capability consumed by the index builder. The
/// typed errors make the builder's skip-and-continue policy explicit.
pub trait PageFetcher: Send + Sync {
    /// Candidate page URLs for one source, bounded by `max_pages`.
    fn discover(&self, source: &DocSource, max_pages: usize) -> Result<Vec<String>, FetchError>;
    /// Readable text content of one page.
    fn extract(&self, url: &str, source: &DocSource) -> Result<String, FetchError>;
}

/// Blocking HTTP fetcher over the configured documentation sites.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    fn get(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }
        Ok(response.text()?)
    }
}

impl PageFetcher for HttpFetcher {
    fn discover(&self, source: &DocSource, max_pages: usize) -> Result<Vec<String>, FetchError> {
        let base = Url::parse(&source.base_url)?;
        let mut discovered = vec![source.base_url.clone()];

        // Sitemaps give the cleanest page list; try them first.
        for sitemap_name in ["sitemap.xml", "sitemap_index.xml"] {
            let sitemap_url = base.join(sitemap_name)?;
            match self.get(sitemap_url.as_str()) {
                Ok(body) => {
                    for loc in sitemap_locations(&body) {
                        if is_documentation_url(&loc) {
                            push_unique(&mut discovered, loc, max_pages);
                        }
                    }
                    if discovered.len() > 1 {
                        return Ok(discovered);
                    }
                }
                Err(err) => {
                    tracing::debug!(url = %sitemap_url, error = %err, "sitemap unavailable");
                }
            }
        }

        // Fall back to scraping navigation links off the landing page.
        let body = self.get(source.base_url.as_str())?;
        for link in navigation_links(&body, &base) {
            if is_documentation_url(&link) {
                push_unique(&mut discovered, link, max_pages);
            }
        }
        Ok(discovered)
    }

    fn extract(&self, url: &str, source: &DocSource) -> Result<String, FetchError> {
        let body = self.get(url)?;
        extract_page_content(&body, source).ok_or_else(|| FetchError::Empty(url.to_string()))
    }
}

/// Pull `<loc>` entries out of a sitemap document.
fn sitemap_locations(body: &str) -> Vec<String> {
    let document = Html::parse_document(body);
    let Ok(loc) = Selector::parse("loc") else {
        return Vec::new();
    };
    document
        .select(&loc)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|url| !url.is_empty())
        .collect()
}

/// Absolute link targets found under the page's navigation selectors.
fn navigation_links(body: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_document(body);
    let mut links = Vec::new();
    for selector_str in NAV_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Ok(resolved) = base.join(href) else {
                continue;
            };
            if resolved.scheme() == "http" || resolved.scheme() == "https" {
                links.push(resolved.to_string());
            }
        }
    }
    links
}

/// Readable text of a page: content-selector subtrees with excluded regions
/// skipped, short lines dropped, duplicates removed, capped at
/// `MAX_CONTENT_LINES` lines. `None` when nothing readable remains.
pub fn extract_page_content(body: &str, source: &DocSource) -> Option<String> {
    let document = Html::parse_document(body);

    let exclude: Vec<Selector> = source
        .exclude
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect();
    let Ok(content_tags) = Selector::parse(CONTENT_TAGS) else {
        return None;
    };

    let mut lines = Vec::new();
    for selector_str in &source.selectors {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        let roots: Vec<ElementRef> = document.select(&selector).collect();
        if roots.is_empty() {
            continue;
        }
        for root in roots {
            if is_excluded(&root, &exclude) {
                continue;
            }
            for element in root.select(&content_tags) {
                if is_excluded(&element, &exclude) {
                    continue;
                }
                let text = element.text().collect::<String>();
                let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
                if text.chars().count() > MIN_ELEMENT_CHARS {
                    lines.push(text);
                }
            }
        }
        break;
    }

    // Fallback: take every text node when no selector matched anything.
    if lines.is_empty() {
        lines = document
            .root_element()
            .text()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
    }

    let mut seen = HashSet::new();
    let unique: Vec<String> = lines
        .into_iter()
        .filter(|line| line.chars().count() > MIN_LINE_CHARS && seen.insert(line.clone()))
        .take(MAX_CONTENT_LINES)
        .collect();

    if unique.is_empty() {
        None
    } else {
        Some(unique.join("\n"))
    }
}

fn is_excluded(element: &ElementRef, exclude: &[Selector]) -> bool {
    if exclude.iter().any(|sel| sel.matches(element)) {
        return true;
    }
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| exclude.iter().any(|sel| sel.matches(&ancestor)))
}

fn is_documentation_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    DOC_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

fn push_unique(urls: &mut Vec<String>, url: String, max: usize) {
    if urls.len() < max && !urls.contains(&url) {
        urls.push(url);
    }
}
