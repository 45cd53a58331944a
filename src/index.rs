//! Flat brute-force vector index and the paired embedding archive.
//!
//! The index stores vectors row-major in one flat buffer; position `i`
//! always corresponds to `chunks[i]` in the archive persisted alongside it.
//! Both artifacts are rebuilt wholesale on every indexing run.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::Chunk;
use crate::error::{Error, Result};
use crate::storage;

/// Exact nearest-neighbor index over squared-L2 distance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a vector; its position becomes its id.
    pub fn add(&mut self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        self.data.extend_from_slice(vector);
        Ok(())
    }

    /// Top-k positions by ascending squared L2 distance. Ties resolve to the
    /// lower position, so results are deterministic for a fixed index.
    /// Returns at most `len()` results.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, row)| (position, squared_l2(query, row)))
            .collect();

        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        Ok(scored)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        storage::save_bincode(path, self)
    }

    pub fn load(path: &Path) -> Result<Self> {
        storage::load_bincode(path)
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Chunks and their vectors, aligned by position, plus the identity of the
/// model that produced the vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingArchive {
    pub model: String,
    pub dimension: usize,
    pub chunks: Vec<Chunk>,
    pub vectors: Vec<Vec<f32>>,
    pub built_at: DateTime<Utc>,
}

impl EmbeddingArchive {
    pub fn new(model: String, dimension: usize, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Self {
        Self {
            model,
            dimension,
            chunks,
            vectors,
            built_at: Utc::now(),
        }
    }

    /// Enforce the alignment invariants: one vector per chunk, every vector
    /// exactly `dimension` wide.
    pub fn validate(&self) -> Result<()> {
        if self.chunks.len() != self.vectors.len() {
            return Err(Error::Index(format!(
                "Archive misaligned: {} chunks but {} vectors",
                self.chunks.len(),
                self.vectors.len()
            )));
        }
        for (position, vector) in self.vectors.iter().enumerate() {
            if vector.len() != self.dimension {
                return Err(Error::Index(format!(
                    "Vector {} has dimension {}, expected {}",
                    position,
                    vector.len(),
                    self.dimension
                )));
            }
        }
        Ok(())
    }

    /// Build the search index over this archive's vectors, in order.
    pub fn build_index(&self) -> Result<FlatIndex> {
        self.validate()?;
        let mut index = FlatIndex::new(self.dimension);
        for vector in &self.vectors {
            index.add(vector)?;
        }
        Ok(index)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        storage::save_bincode(path, self)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let archive: Self = storage::load_bincode(path)?;
        archive.validate()?;
        Ok(archive)
    }
}
