//! Retrieval-augmented question answering over encyclopedia articles.
//!
//! The pipeline runs in four stages, each persisting its output for the
//! next: fetch article extracts into a documents file, clean and chunk them
//! into a chunks file, embed the chunks and build a flat nearest-neighbor
//! index, then answer questions by retrieving top-k chunks and handing them
//! to a chat model as grounding context.

pub mod chat;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod index;
pub mod retriever;
pub mod storage;
pub mod wiki;

pub use chat::{ChatClient, ChatMessage, ChatOutcome};
pub use config::{Config, EmbeddingProvider};
pub use document::{Chunk, DocMetadata, Document, DocumentPipeline};
pub use embedding::{EmbeddingFactory, EmbeddingService};
pub use error::{Error, Result};
pub use index::{EmbeddingArchive, FlatIndex};
pub use retriever::{Answered, ChatSession, ChatTurn, Retrieved, Retriever};
pub use wiki::WikiClient;
