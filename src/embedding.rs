//! Embedding providers behind a common async trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{EmbeddingConfig, EmbeddingProvider};
use crate::error::{Error, Result};

/// Maps text to fixed-dimension vectors. Implementations must be
/// deterministic for a given model version; index-time and query-time
/// embeddings are only comparable when they come from the same model.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    fn dimension(&self) -> usize;
    fn model_name(&self) -> &str;
}

fn check_dimension(vector: &[f32], expected: usize) -> Result<Vec<f32>> {
    if vector.len() != expected {
        return Err(Error::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(vector.to_vec())
}

/// Local Ollama embedding endpoint (`/api/embeddings`).
pub struct OllamaEmbedding {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl OllamaEmbedding {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dimension: config.dimension,
        })
    }
}

#[async_trait]
impl EmbeddingService for OllamaEmbedding {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            prompt: &'a str,
        }
        #[derive(Deserialize)]
        struct Response {
            embedding: Vec<f32>,
        }

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&Request {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Api(format!(
                "Embedding request failed with HTTP {}",
                response.status()
            )));
        }

        let response: Response = response.json().await?;
        check_dimension(&response.embedding, self.dimension)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // One request at a time; the pipeline is deliberately sequential.
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_text(text).await?);
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Generic external embedding endpoint speaking
/// `{model, text} -> {embedding}` and `{model, texts} -> {embeddings}`.
pub struct ExternalEmbedding {
    client: reqwest::Client,
    url: String,
    model: String,
    dimension: usize,
}

impl ExternalEmbedding {
    pub fn new(url: String, config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            url,
            model: config.model.clone(),
            dimension: config.dimension,
        })
    }
}

#[async_trait]
impl EmbeddingService for ExternalEmbedding {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            text: &'a str,
        }
        #[derive(Deserialize)]
        struct Response {
            embedding: Vec<f32>,
        }

        let response = self
            .client
            .post(&self.url)
            .json(&Request {
                model: &self.model,
                text,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Api(format!(
                "Embedding request failed with HTTP {}",
                response.status()
            )));
        }

        let response: Response = response.json().await?;
        check_dimension(&response.embedding, self.dimension)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            texts: &'a [String],
        }
        #[derive(Deserialize)]
        struct Response {
            embeddings: Vec<Vec<f32>>,
        }

        let response = self
            .client
            .post(&self.url)
            .json(&Request {
                model: &self.model,
                texts,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Api(format!(
                "Embedding request failed with HTTP {}",
                response.status()
            )));
        }

        let response: Response = response.json().await?;
        if response.embeddings.len() != texts.len() {
            return Err(Error::Api(format!(
                "Embedding count mismatch: sent {} texts, got {} vectors",
                texts.len(),
                response.embeddings.len()
            )));
        }
        response
            .embeddings
            .iter()
            .map(|v| check_dimension(v, self.dimension))
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Builds the configured embedding provider.
pub struct EmbeddingFactory;

impl EmbeddingFactory {
    pub fn create(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingService>> {
        match &config.provider {
            EmbeddingProvider::Ollama => Ok(Box::new(OllamaEmbedding::new(config)?)),
            EmbeddingProvider::Custom(url) => {
                Ok(Box::new(ExternalEmbedding::new(url.clone(), config)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension(&[1.0, 2.0, 3.0], 3).is_ok());

        let err = check_dimension(&[1.0, 2.0], 3).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_factory_selects_provider() {
        let config = EmbeddingConfig::default();
        let service = EmbeddingFactory::create(&config).unwrap();
        assert_eq!(service.model_name(), "all-minilm");
        assert_eq!(service.dimension(), 384);

        let custom = EmbeddingConfig {
            provider: EmbeddingProvider::Custom("http://localhost:9000/embed".to_string()),
            ..EmbeddingConfig::default()
        };
        let service = EmbeddingFactory::create(&custom).unwrap();
        assert_eq!(service.dimension(), 384);
    }
}
