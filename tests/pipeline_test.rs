//! End-to-end pipeline tests: chunk, embed, persist, reload, retrieve.
//! Uses a deterministic stub embedder so nothing needs a model server.

use async_trait::async_trait;
use chrono::Utc;

use wiki_rag::chat::ChatClient;
use wiki_rag::config::{ChatConfig, DocumentConfig};
use wiki_rag::document::{DocMetadata, Document, DocumentPipeline};
use wiki_rag::embedding::EmbeddingService;
use wiki_rag::index::{EmbeddingArchive, FlatIndex};
use wiki_rag::retriever::Retriever;
use wiki_rag::{Error, Result};

const STUB_MODEL: &str = "stub-letter-counts";
const STUB_DIMENSION: usize = 3;

/// Counts of 'a', 'b', 'c' — deterministic, and texts dominated by the same
/// letter land near each other.
struct StubEmbedder {
    model: String,
}

impl StubEmbedder {
    fn new() -> Self {
        Self {
            model: STUB_MODEL.to_string(),
        }
    }

    fn named(model: &str) -> Self {
        Self {
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingService for StubEmbedder {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let mut counts = [0f32; STUB_DIMENSION];
        for ch in text.chars() {
            match ch {
                'a' => counts[0] += 1.0,
                'b' => counts[1] += 1.0,
                'c' => counts[2] += 1.0,
                _ => {}
            }
        }
        Ok(counts.to_vec())
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_text(text).await?);
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        STUB_DIMENSION
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn sample_document() -> Document {
    // Three 400-char paragraphs; 400 + 2 + 400 exceeds the 800 limit, so
    // each paragraph becomes its own chunk.
    let text = format!(
        "{}\n\n{}\n\n{}",
        "a".repeat(400),
        "b".repeat(400),
        "c".repeat(400)
    );
    Document {
        id: "wiki_100".to_string(),
        text,
        source: "wikipedia".to_string(),
        metadata: DocMetadata {
            title: "Letters".to_string(),
            lang: "en".to_string(),
            page_id: Some(100),
            url: Some("https://en.wikipedia.org/?curid=100".to_string()),
            original_query: "Letters".to_string(),
        },
        fetched_at: Utc::now(),
    }
}

async fn build_artifacts() -> (EmbeddingArchive, FlatIndex) {
    let pipeline = DocumentPipeline::new(DocumentConfig::default());
    let chunks = pipeline.chunk_document(&sample_document());
    assert_eq!(chunks.len(), 3);

    let embedder = StubEmbedder::new();
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed_batch(&texts).await.unwrap();

    let archive = EmbeddingArchive::new(STUB_MODEL.to_string(), STUB_DIMENSION, chunks, vectors);
    let index = archive.build_index().unwrap();
    (archive, index)
}

fn retriever_from(archive: EmbeddingArchive, index: FlatIndex) -> Result<Retriever> {
    let chat = ChatClient::new(&ChatConfig::default())?;
    Retriever::new(
        archive,
        index,
        Box::new(StubEmbedder::new()),
        chat,
        "Answer only from the context.".to_string(),
        5,
    )
}

#[tokio::test]
async fn retrieval_round_trips_through_persisted_artifacts() {
    let (archive, index) = build_artifacts().await;

    let dir = tempfile::tempdir().unwrap();
    let embeddings_path = dir.path().join("vector_index/embeddings.bin");
    let index_path = dir.path().join("vector_index/index.bin");
    archive.save(&embeddings_path).unwrap();
    index.save(&index_path).unwrap();

    let archive = EmbeddingArchive::load(&embeddings_path).unwrap();
    let index = FlatIndex::load(&index_path).unwrap();
    assert_eq!(index.len(), archive.chunks.len());

    let retriever = retriever_from(archive, index).unwrap();

    // A query dominated by 'b' must retrieve the b-paragraph chunk first.
    let results = retriever.retrieve("bbbbbb with one a", Some(2)).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].chunk.id, "wiki_100_chunk_1");
    assert!(results[0].chunk.text.starts_with('b'));
    assert!(results[0].distance <= results[1].distance);
}

#[tokio::test]
async fn retrieval_returns_at_most_the_indexed_count() {
    let (archive, index) = build_artifacts().await;
    let retriever = retriever_from(archive, index).unwrap();

    let results = retriever.retrieve("aaa", Some(5)).await.unwrap();
    assert_eq!(results.len(), 3, "k=5 against 3 chunks returns 3 results");
}

#[tokio::test]
async fn retrieval_is_deterministic() {
    let (archive, index) = build_artifacts().await;
    let retriever = retriever_from(archive, index).unwrap();

    let first: Vec<(usize, String)> = retriever
        .retrieve("abc", None)
        .await
        .unwrap()
        .into_iter()
        .map(|r| (r.position, r.chunk.id))
        .collect();

    for _ in 0..3 {
        let again: Vec<(usize, String)> = retriever
            .retrieve("abc", None)
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.position, r.chunk.id))
            .collect();
        assert_eq!(again, first);
    }
}

#[tokio::test]
async fn chunk_positions_stay_aligned_with_archive_order() {
    let (archive, index) = build_artifacts().await;
    let expected: Vec<String> = archive.chunks.iter().map(|c| c.id.clone()).collect();
    let retriever = retriever_from(archive, index).unwrap();

    let results = retriever.retrieve("zzz", Some(3)).await.unwrap();
    for retrieved in results {
        assert_eq!(expected[retrieved.position], retrieved.chunk.id);
    }
}

#[tokio::test]
async fn model_identity_mismatch_is_fatal() {
    let (archive, index) = build_artifacts().await;
    let chat = ChatClient::new(&ChatConfig::default()).unwrap();

    let result = Retriever::new(
        archive,
        index,
        Box::new(StubEmbedder::named("some-other-model")),
        chat,
        "Answer only from the context.".to_string(),
        5,
    );

    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test]
async fn misaligned_artifacts_are_rejected() {
    let (archive, _) = build_artifacts().await;

    // An index rebuilt with one vector missing must not pair with the archive.
    let mut short_index = FlatIndex::new(STUB_DIMENSION);
    short_index.add(&archive.vectors[0]).unwrap();

    let chat = ChatClient::new(&ChatConfig::default()).unwrap();
    let result = Retriever::new(
        archive,
        short_index,
        Box::new(StubEmbedder::new()),
        chat,
        "Answer only from the context.".to_string(),
        5,
    );

    assert!(matches!(result, Err(Error::Index(_))));
}
