//! Query path: load persisted artifacts, retrieve chunks, generate answers.

use serde::Serialize;
use tracing::{debug, warn};

use crate::chat::{build_prompt, ChatClient, ChatOutcome};
use crate::config::Config;
use crate::document::Chunk;
use crate::embedding::{EmbeddingFactory, EmbeddingService};
use crate::error::{Error, Result};
use crate::index::{EmbeddingArchive, FlatIndex};

/// One retrieved chunk with its index position and distance to the query.
#[derive(Debug, Clone, Serialize)]
pub struct Retrieved {
    pub position: usize,
    pub distance: f32,
    pub chunk: Chunk,
}

/// One question/answer exchange.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

/// Append-only, in-memory conversation history. Created per surface
/// (REPL run, server process); never persisted.
#[derive(Debug, Default)]
pub struct ChatSession {
    turns: Vec<ChatTurn>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn record(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }
}

/// Holds the loaded artifacts and external clients for the lifetime of a
/// query surface. The archive and index are read once and never mutated.
pub struct Retriever {
    archive: EmbeddingArchive,
    index: FlatIndex,
    embedder: Box<dyn EmbeddingService>,
    chat: ChatClient,
    system_prompt: String,
    top_k: usize,
}

impl Retriever {
    /// Load artifacts per the active config and validate the cross-cutting
    /// invariants: positional alignment between the two artifacts, and the
    /// embedding model identity recorded at index time matching the model
    /// configured now. A model mismatch would silently produce meaningless
    /// distances, so it is a fatal configuration error.
    pub fn load(config: &Config) -> Result<Self> {
        let archive = EmbeddingArchive::load(&config.embeddings_path())?;
        let index = FlatIndex::load(&config.index_path())?;

        let embedder = EmbeddingFactory::create(&config.embedding)?;
        let chat = ChatClient::new(&config.chat)?;

        Self::new(
            archive,
            index,
            embedder,
            chat,
            config.chat.system_prompt.clone(),
            config.retrieval.top_k,
        )
    }

    pub fn new(
        archive: EmbeddingArchive,
        index: FlatIndex,
        embedder: Box<dyn EmbeddingService>,
        chat: ChatClient,
        system_prompt: String,
        top_k: usize,
    ) -> Result<Self> {
        archive.validate()?;

        if index.len() != archive.chunks.len() {
            return Err(Error::Index(format!(
                "Index holds {} vectors but the archive holds {} chunks",
                index.len(),
                archive.chunks.len()
            )));
        }
        if index.dimension() != archive.dimension {
            return Err(Error::Index(format!(
                "Index dimension {} does not match archive dimension {}",
                index.dimension(),
                archive.dimension
            )));
        }
        if embedder.model_name() != archive.model {
            return Err(Error::Config(format!(
                "Embedding model mismatch: archive was built with '{}' but '{}' is configured",
                archive.model,
                embedder.model_name()
            )));
        }
        if embedder.dimension() != archive.dimension {
            return Err(Error::Config(format!(
                "Embedding dimension mismatch: archive has {} but provider yields {}",
                archive.dimension,
                embedder.dimension()
            )));
        }

        Ok(Self {
            archive,
            index,
            embedder,
            chat,
            system_prompt,
            top_k,
        })
    }

    pub fn chunk_count(&self) -> usize {
        self.archive.chunks.len()
    }

    pub fn embedding_model(&self) -> &str {
        &self.archive.model
    }

    /// Embed the question and return the k nearest chunks, nearest first.
    pub async fn retrieve(&self, question: &str, k: Option<usize>) -> Result<Vec<Retrieved>> {
        let k = k.unwrap_or(self.top_k);
        let query_vector = self.embedder.embed_text(question).await?;
        let hits = self.index.search(&query_vector, k)?;

        debug!("Retrieved {} chunks for query", hits.len());

        Ok(hits
            .into_iter()
            .map(|(position, distance)| Retrieved {
                position,
                distance,
                chunk: self.archive.chunks[position].clone(),
            })
            .collect())
    }

    /// Answer a question from retrieved context and append the exchange to
    /// the session.
    pub async fn answer(
        &self,
        session: &mut ChatSession,
        question: &str,
        k: Option<usize>,
    ) -> Result<Answered> {
        let retrieved = self.retrieve(question, k).await?;
        let context = join_context(&retrieved);

        let messages = build_prompt(&self.system_prompt, &context, question);
        let outcome = self.chat.send(&messages).await?;

        if let ChatOutcome::Unrecognized(ref raw) = outcome {
            warn!("Chat service reply had no answer field: {}", raw);
        }
        let answer = outcome.into_text();

        session.record(ChatTurn {
            question: question.to_string(),
            answer: answer.clone(),
        });

        Ok(Answered { answer, retrieved })
    }
}

/// An answer plus the chunks it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct Answered {
    pub answer: String,
    pub retrieved: Vec<Retrieved>,
}

/// Concatenate retrieved chunk texts, nearest first, blank-line separated.
pub fn join_context(retrieved: &[Retrieved]) -> String {
    retrieved
        .iter()
        .map(|r| r.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
