//! Single-page patent abstract scraping.
//!
//! The abstract resolver talks to a scraper through [`AbstractScraper`] so the
//! mechanism can be swapped without touching pipeline logic:
//!
//! - [`HttpScraper`] fetches the Google Patents detail page in-process
//! - [`CommandScraper`] runs an external tool that prints a JSON object
//!   (`ID`, `Title`, `Abstract`) on stdout and exits non-zero on failure
//!
//! The `scrape` subcommand of the binary speaks the same protocol as
//! [`CommandScraper`] expects, so the binary can be its own collaborator.

use crate::error::{PatentError, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// User agent string for requests
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Title and abstract scraped from one patent page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ScrapedAbstract {
    #[serde(rename = "ID", default)]
    pub id: Option<String>,
    #[serde(rename = "Title", default)]
    pub title: Option<String>,
    #[serde(rename = "Abstract", default)]
    pub abstract_text: Option<String>,
    #[serde(rename = "URL", default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Why a scrape attempt produced no result.
///
/// The resolver records each variant under a different abstract source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScrapeError {
    /// The scraper ran and reported failure (non-zero exit, HTTP error status)
    #[error("{0}")]
    Failed(String),

    /// The attempt exceeded its time budget
    #[error("Timeout while fetching abstract")]
    Timeout,

    /// Anything else: spawn failure, transport error, unreadable output
    #[error("{0}")]
    Other(String),
}

/// Fetches the abstract behind a patent detail URL.
pub trait AbstractScraper {
    /// Scrape one patent page.
    fn scrape(&self, url: &str) -> impl Future<Output = std::result::Result<ScrapedAbstract, ScrapeError>>;
}

// ============================================================================
// In-process HTTP scraper
// ============================================================================

/// Scrapes Google Patents pages with `reqwest` and `scraper`
#[derive(Debug, Clone)]
pub struct HttpScraper {
    client: reqwest::Client,
}

impl HttpScraper {
    /// Create a scraper with the given user agent and per-request timeout.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .cookie_store(true)
            .build()
            .map_err(|e| PatentError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    async fn fetch_page(&self, url: &str) -> std::result::Result<String, ScrapeError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Failed(format!("HTTP error: {}", status)));
        }

        response.text().await.map_err(transport_error)
    }
}

fn transport_error(e: reqwest::Error) -> ScrapeError {
    if e.is_timeout() {
        ScrapeError::Timeout
    } else {
        ScrapeError::Other(e.to_string())
    }
}

impl AbstractScraper for HttpScraper {
    async fn scrape(&self, url: &str) -> std::result::Result<ScrapedAbstract, ScrapeError> {
        debug!(url = url, "Fetching patent page");
        let html = self.fetch_page(url).await?;
        let scraped = parse_patent_page(&html, url).map_err(|e| ScrapeError::Other(e.to_string()))?;

        if scraped.abstract_text.is_none() {
            warn!(url = url, "No abstract found on patent page");
        }
        Ok(scraped)
    }
}

/// Extract the patent id from a `/patent/<id>` URL.
pub fn extract_patent_id(url: &str) -> Option<String> {
    let re = Regex::new(r"/patent/([^/?#]+)").ok()?;
    re.captures(url).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())
}

/// Parse a Google Patents detail page.
///
/// Missing title or abstract elements yield `None` for that field.
pub fn parse_patent_page(html: &str, url: &str) -> Result<ScrapedAbstract> {
    let document = Html::parse_document(html);

    let title = first_text(&document, &["span[itemprop='title']", "h1"])?;
    let abstract_text = first_text(
        &document,
        &["div[itemprop='abstract']", "section[itemprop='abstract']", "div.abstract"],
    )?;

    Ok(ScrapedAbstract {
        id: extract_patent_id(url),
        title,
        abstract_text,
        url: Some(url.to_string()),
    })
}

/// Text of the first element matching any selector, tried in order.
fn first_text(document: &Html, selectors: &[&str]) -> Result<Option<String>> {
    for css in selectors {
        let selector = Selector::parse(css).map_err(|e| PatentError::Parse(e.to_string()))?;
        if let Some(elem) = document.select(&selector).next() {
            let text = element_text(elem);
            if !text.is_empty() {
                return Ok(Some(text));
            }
        }
    }
    Ok(None)
}

fn element_text(elem: ElementRef<'_>) -> String {
    elem.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// External command scraper
// ============================================================================

/// Runs an external scraper program with the URL as its last argument
#[derive(Debug, Clone)]
pub struct CommandScraper {
    program: String,
    args: Vec<String>,
}

impl CommandScraper {
    /// Build from a command line: program followed by fixed arguments.
    pub fn from_command_line(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| PatentError::Config("Scraper command is empty".to_string()))?;

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl AbstractScraper for CommandScraper {
    async fn scrape(&self, url: &str) -> std::result::Result<ScrapedAbstract, ScrapeError> {
        debug!(program = %self.program, url = url, "Running scraper command");

        // The child is killed if the caller drops this future on timeout.
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(url)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ScrapeError::Other(format!("Failed to run scraper '{}': {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("Scraper exited with {}", output.status)
            } else {
                stderr
            };
            return Err(ScrapeError::Failed(message));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| ScrapeError::Other(format!("Invalid scraper output: {}", e)))
    }
}

// ============================================================================
// Configured backend
// ============================================================================

/// Scraper chosen from configuration
#[derive(Debug, Clone)]
pub enum Scraper {
    Http(HttpScraper),
    Command(CommandScraper),
}

impl Scraper {
    /// Use the external command when one is configured, the HTTP scraper otherwise.
    pub fn from_config(config: &crate::config::FetcherConfig) -> Result<Self> {
        match &config.scraper_command {
            Some(command) => {
                info!(command = ?command, "Using external scraper command");
                Ok(Self::Command(CommandScraper::from_command_line(command)?))
            }
            None => Ok(Self::Http(HttpScraper::new(&config.user_agent, config.timeout())?)),
        }
    }
}

impl AbstractScraper for Scraper {
    async fn scrape(&self, url: &str) -> std::result::Result<ScrapedAbstract, ScrapeError> {
        match self {
            Self::Http(s) => s.scrape(url).await,
            Self::Command(s) => s.scrape(url).await,
        }
    }
}
