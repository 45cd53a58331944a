//! Document records and the cleaning/chunking pipeline.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::DocumentConfig;

/// One retrieved encyclopedia article, as written to the documents file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub source: String,
    pub metadata: DocMetadata,
    pub fetched_at: DateTime<Utc>,
}

/// Source context carried by a document and inherited, unchanged, by every
/// chunk split from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocMetadata {
    pub title: String,
    pub lang: String,
    pub page_id: Option<u64>,
    pub url: Option<String>,
    pub original_query: String,
}

/// A bounded span of cleaned document text, the unit indexed and retrieved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub metadata: DocMetadata,
}

/// Deterministic cleaner + paragraph chunker.
///
/// Cleaning strips bracketed citation markers and collapses runs of blank
/// lines; chunking packs consecutive paragraphs first-fit into bounded
/// chunks. Both are pure functions of the input text.
pub struct DocumentPipeline {
    config: DocumentConfig,
    citations: Regex,
    blank_runs: Regex,
}

impl DocumentPipeline {
    pub fn new(config: DocumentConfig) -> Self {
        Self {
            config,
            citations: Regex::new(r"\[\d+\]").expect("static pattern"),
            blank_runs: Regex::new(r"\n{3,}").expect("static pattern"),
        }
    }

    /// Remove `[n]` citation markers, collapse 3+ newlines to 2, trim.
    pub fn clean_text(&self, text: &str) -> String {
        let text = self.citations.replace_all(text, "");
        let text = self.blank_runs.replace_all(&text, "\n\n");
        text.trim().to_string()
    }

    /// Split a document's cleaned text into chunks.
    ///
    /// Paragraphs below the configured floor are dropped. Surviving
    /// paragraphs are packed greedily: a chunk keeps accepting the next
    /// paragraph while the running character count (paragraph text plus the
    /// blank-line joins) stays within the limit. A single paragraph larger
    /// than the limit becomes an oversized chunk on its own; paragraphs are
    /// never split.
    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        let cleaned = self.clean_text(&document.text);

        self.chunk_text(&cleaned)
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                id: format!("{}_chunk_{}", document.id, index),
                text,
                metadata: document.metadata.clone(),
            })
            .collect()
    }

    /// Chunk already-cleaned text into paragraph-aligned spans.
    pub fn chunk_text(&self, text: &str) -> Vec<String> {
        let paragraphs: Vec<&str> = text
            .split("\n\n")
            .map(str::trim)
            .filter(|p| p.chars().count() >= self.config.min_paragraph_chars)
            .collect();

        let mut chunks = Vec::new();
        let mut current = String::new();
        // Running count of characters in `current`, trailing separator included.
        let mut current_chars = 0usize;

        for paragraph in paragraphs {
            let paragraph_chars = paragraph.chars().count();

            if !current.is_empty()
                && current_chars + paragraph_chars > self.config.max_chunk_chars
            {
                chunks.push(current.trim_end().to_string());
                current.clear();
                current_chars = 0;
            }

            current.push_str(paragraph);
            current.push_str("\n\n");
            current_chars += paragraph_chars + 2;
        }

        if !current.is_empty() {
            chunks.push(current.trim_end().to_string());
        }

        chunks
    }
}
