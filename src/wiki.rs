//! Encyclopedia article fetching via the MediaWiki extracts API.

use std::collections::HashMap;

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::warn;

use crate::config::FetcherConfig;
use crate::document::{DocMetadata, Document};
use crate::error::{Error, Result};

/// Top-level response for `action=query&prop=extracts`.
#[derive(Debug, Deserialize)]
pub struct ExtractResponse {
    #[serde(default)]
    pub query: Option<ExtractQuery>,
}

#[derive(Debug, Deserialize)]
pub struct ExtractQuery {
    #[serde(default)]
    pub pages: HashMap<String, ExtractPage>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExtractPage {
    pub pageid: Option<u64>,
    pub title: Option<String>,
    pub extract: Option<String>,
    /// Present (as an empty string) when the title does not exist.
    pub missing: Option<String>,
}

/// HTTP client for plain-text article extracts.
///
/// Carries the fixed identifying User-Agent the upstream API asks for and
/// follows redirects server-side (`redirects=1`), so a keyword and the page
/// it resolves to may differ.
pub struct WikiClient {
    client: reqwest::Client,
    lang: String,
}

impl WikiClient {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| Error::Config(format!("Invalid user agent: {}", e)))?,
        );

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            lang: config.lang.clone(),
        })
    }

    fn api_url(&self) -> String {
        format!("https://{}.wikipedia.org/w/api.php", self.lang)
    }

    /// Fetch one article extract. `Ok(None)` means the page is missing or
    /// has no extract; both are skips, not errors.
    pub async fn fetch_page(&self, title: &str) -> Result<Option<Document>> {
        let response = self
            .client
            .get(self.api_url())
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("prop", "extracts"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("titles", title),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Fetch(format!(
                "HTTP {} for '{}'",
                response.status(),
                title
            )));
        }

        let body: ExtractResponse = response.json().await?;
        Ok(document_from_response(body, title, &self.lang))
    }
}

/// Turn an extracts API response into a document record, or `None` when the
/// page is missing or its extract is empty.
pub fn document_from_response(
    response: ExtractResponse,
    original_query: &str,
    lang: &str,
) -> Option<Document> {
    let pages = response.query?.pages;
    let page = pages.into_values().next()?;

    if page.missing.is_some() {
        warn!("Page not found for: {}", original_query);
        return None;
    }

    let extract = page.extract.unwrap_or_default().trim().to_string();
    if extract.is_empty() {
        warn!("Page has no extract: {}", original_query);
        return None;
    }

    let title = page.title.unwrap_or_else(|| original_query.to_string());
    let id = match page.pageid {
        Some(pageid) => format!("wiki_{}", pageid),
        None => format!("wiki_{}", title.replace(' ', "_")),
    };
    let url = page
        .pageid
        .map(|pageid| format!("https://{}.wikipedia.org/?curid={}", lang, pageid));

    Some(Document {
        id,
        text: extract,
        source: "wikipedia".to_string(),
        metadata: DocMetadata {
            title,
            lang: lang.to_string(),
            page_id: page.pageid,
            url,
            original_query: original_query.to_string(),
        },
        fetched_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> ExtractResponse {
        serde_json::from_str(body).expect("test fixture should parse")
    }

    #[test]
    fn test_document_from_normal_page() {
        let response = parse(
            r#"{"batchcomplete":"","query":{"pages":{"32927":{
                "pageid":32927,"ns":0,"title":"World War II",
                "extract":"World War II was a global conflict."}}}}"#,
        );

        let doc = document_from_response(response, "WWII", "en").expect("document expected");
        assert_eq!(doc.id, "wiki_32927");
        assert_eq!(doc.text, "World War II was a global conflict.");
        assert_eq!(doc.source, "wikipedia");
        assert_eq!(doc.metadata.title, "World War II");
        assert_eq!(doc.metadata.page_id, Some(32927));
        assert_eq!(
            doc.metadata.url.as_deref(),
            Some("https://en.wikipedia.org/?curid=32927")
        );
        assert_eq!(doc.metadata.original_query, "WWII");
    }

    #[test]
    fn test_missing_page_is_skipped() {
        let response = parse(
            r#"{"query":{"pages":{"-1":{
                "ns":0,"title":"Nonexistent Topic Xyz123","missing":""}}}}"#,
        );
        assert!(document_from_response(response, "Nonexistent Topic Xyz123", "en").is_none());
    }

    #[test]
    fn test_empty_extract_is_skipped() {
        let response = parse(
            r#"{"query":{"pages":{"7":{
                "pageid":7,"ns":0,"title":"Blank","extract":"   "}}}}"#,
        );
        assert!(document_from_response(response, "Blank", "en").is_none());
    }

    #[test]
    fn test_id_falls_back_to_title_without_pageid() {
        let response = parse(
            r#"{"query":{"pages":{"0":{
                "title":"Battle of France","extract":"The battle began in May 1940."}}}}"#,
        );

        let doc = document_from_response(response, "Battle of France", "en").unwrap();
        assert_eq!(doc.id, "wiki_Battle_of_France");
        assert!(doc.metadata.url.is_none());
    }

    #[test]
    fn test_empty_response_is_skipped() {
        let response = parse(r#"{"batchcomplete":""}"#);
        assert!(document_from_response(response, "anything", "en").is_none());
    }
}
