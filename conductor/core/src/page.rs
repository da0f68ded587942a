//! Page Context
//!
//! The record extracted from the page the user is reading. The extraction
//! routine itself runs elsewhere; this module ingests its response, applies
//! the ingestion bounds, and derives the short status line shown above the
//! chat.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Body characters kept from an extraction
pub const EXTRACTION_BODY_CHARS: usize = 8000;
/// Heading lines kept from an extraction
pub const EXTRACTION_HEADINGS: usize = 20;
/// Links kept from an extraction
pub const EXTRACTION_LINKS: usize = 40;

const INTERNAL_SCHEMES: &[&str] = &[
    "chrome://",
    "chrome-extension://",
    "about:",
    "edge://",
    "moz-extension://",
];

/// Why a page could not be used as context
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PageContextError {
    /// The extractor reported a failure
    #[error("{0}")]
    Extraction(String),
    /// The extractor succeeded but returned nothing
    #[error("No data returned from page")]
    NoData,
    /// Browser-internal pages cannot be read
    #[error("Cannot access browser internal pages. Open a regular website first.")]
    InternalPage,
}

/// Headings arrive either newline-joined or as a list
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum HeadingsField {
    Joined(String),
    List(Vec<String>),
}

fn deserialize_headings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let field = Option::<HeadingsField>::deserialize(deserializer)?;
    let lines = match field {
        None => Vec::new(),
        Some(HeadingsField::Joined(text)) => text.lines().map(str::to_string).collect(),
        Some(HeadingsField::List(list)) => list,
    };
    Ok(lines
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect())
}

/// A link found on the page
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageLink {
    /// Anchor text
    pub text: String,
    /// Target URL
    pub href: String,
}

/// Content extracted from the current page
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PageContext {
    /// Page URL
    pub url: String,
    /// Document title
    pub title: String,
    /// Meta description
    pub description: String,
    /// Visible body text
    pub body_text: String,
    /// Heading lines such as `H2: Pricing`
    #[serde(deserialize_with = "deserialize_headings")]
    pub headings: Vec<String>,
    /// Links on the page
    pub links: Vec<PageLink>,
}

/// Response envelope from the extraction routine
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExtractionResponse {
    /// Whether extraction succeeded
    pub success: bool,
    /// Extracted page, when successful
    pub data: Option<PageContext>,
    /// Failure detail
    pub error: Option<String>,
}

impl ExtractionResponse {
    /// Parse a JSON response
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl PageContext {
    /// Turn an extraction response into a bounded page record
    pub fn from_response(response: ExtractionResponse) -> Result<Self, PageContextError> {
        if !response.success {
            let detail = response
                .error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(PageContextError::Extraction(detail));
        }

        let page = response.data.ok_or(PageContextError::NoData)?;
        if is_internal_url(&page.url) {
            return Err(PageContextError::InternalPage);
        }

        Ok(page.bounded())
    }

    /// Apply the ingestion bounds
    #[must_use]
    pub fn bounded(mut self) -> Self {
        self.body_text = truncate_chars(self.body_text.trim(), EXTRACTION_BODY_CHARS).to_string();
        self.headings.truncate(EXTRACTION_HEADINGS);
        self.links.truncate(EXTRACTION_LINKS);
        self
    }

    /// Host name of the page URL, if it parses
    pub fn domain(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }

    /// Title, falling back to the domain
    pub fn display_name(&self) -> String {
        if self.title.trim().is_empty() {
            self.domain().unwrap_or_else(|| self.url.clone())
        } else {
            self.title.clone()
        }
    }

    /// Number of body characters available
    pub fn char_count(&self) -> usize {
        self.body_text.chars().count()
    }

    /// Status line, e.g. `Example Domain · 1,234 chars`
    pub fn status_line(&self) -> String {
        format!(
            "{} · {} chars",
            self.display_name(),
            group_thousands(self.char_count())
        )
    }
}

/// Whether a URL belongs to the browser itself
pub fn is_internal_url(url: &str) -> bool {
    INTERNAL_SCHEMES.iter().any(|scheme| url.starts_with(scheme))
}

/// Longest prefix of `text` with at most `max` characters
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
