use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub fetcher: FetcherConfig,
    pub document: DocumentConfig,
    pub embedding: EmbeddingConfig,
    pub chat: ChatConfig,
    pub retrieval: RetrievalConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for everything the pipeline writes.
    pub data_dir: PathBuf,
    pub documents_file: String,
    pub chunks_file: String,
    pub index_dir: String,
    pub embeddings_file: String,
    pub index_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = std::env::var("WIKI_RAG_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("wiki_data"));

        Self {
            data_dir,
            documents_file: "documents.jsonl".to_string(),
            chunks_file: "chunks.jsonl".to_string(),
            index_dir: "vector_index".to_string(),
            embeddings_file: "embeddings.bin".to_string(),
            index_file: "index.bin".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Article titles requested from the encyclopedia API, in order.
    pub keywords: Vec<String>,
    pub lang: String,
    /// Identifying User-Agent, required by the upstream API's etiquette.
    pub user_agent: String,
    pub request_timeout: Duration,
    /// Pause between consecutive requests.
    pub request_delay: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        let user_agent = std::env::var("WIKI_RAG_USER_AGENT")
            .unwrap_or_else(|_| "wiki-rag/0.1 (contact: ops@wiki-rag.dev)".to_string());

        Self {
            keywords: default_keywords(),
            lang: std::env::var("WIKI_RAG_LANG").unwrap_or_else(|_| "en".to_string()),
            user_agent,
            request_timeout: Duration::from_secs(15),
            request_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Upper bound on accumulated characters per chunk.
    pub max_chunk_chars: usize,
    /// Paragraphs below this many characters are discarded as noise.
    pub min_paragraph_chars: usize,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 800,
            min_paragraph_chars: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dimension: usize,
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Ollama,
            model: "all-minilm".to_string(),
            dimension: 384,
            base_url: ollama_base_url(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EmbeddingProvider {
    /// Local Ollama server (`/api/embeddings`).
    Ollama,
    /// Arbitrary embedding endpoint speaking `{model, text} -> {embedding}`.
    Custom(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub model: String,
    pub base_url: String,
    pub system_prompt: String,
    pub request_timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: "llama3:latest".to_string(),
            base_url: ollama_base_url(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert on the Second World War. \
Answer only from the context provided by the user. \
If the information is not in the context, say so clearly and do not invent facts. \
Prefer verifiable historical facts and exact dates. \
Keep answers concise, clear, and structured.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// How many chunks to retrieve per question.
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: std::env::var("WIKI_RAG_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8080),
            request_timeout: Duration::from_secs(180),
            enable_cors: true,
        }
    }
}

fn ollama_base_url() -> String {
    std::env::var("OLLAMA_URL").unwrap_or_else(|_| "http://127.0.0.1:11434".to_string())
}

impl Config {
    pub fn from_file(path: &PathBuf) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| crate::error::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.fetcher.keywords.is_empty() {
            return Err(crate::error::Error::Config(
                "Keyword list must not be empty".to_string(),
            ));
        }

        if self.embedding.dimension == 0 {
            return Err(crate::error::Error::Config(
                "Embedding dimension must be > 0".to_string(),
            ));
        }

        if self.document.max_chunk_chars <= self.document.min_paragraph_chars {
            return Err(crate::error::Error::Config(
                "Max chunk size must be greater than the paragraph floor".to_string(),
            ));
        }

        if self.retrieval.top_k == 0 {
            return Err(crate::error::Error::Config(
                "top_k must be > 0".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(crate::error::Error::Config(
                "Server port must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn documents_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.documents_file)
    }

    pub fn chunks_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.chunks_file)
    }

    pub fn embeddings_path(&self) -> PathBuf {
        self.storage
            .data_dir
            .join(&self.storage.index_dir)
            .join(&self.storage.embeddings_file)
    }

    pub fn index_path(&self) -> PathBuf {
        self.storage
            .data_dir
            .join(&self.storage.index_dir)
            .join(&self.storage.index_file)
    }
}

fn default_keywords() -> Vec<String> {
    [
        "World War II",
        "Second World War",
        "Invasion of Poland",
        "Battle of France",
        "Battle of Britain",
        "Operation Sea Lion",
        "Operation Barbarossa",
        "Operation Typhoon",
        "Operation Torch",
        "Operation Husky",
        "Operation Overlord",
        "Operation Bagration",
        "Operation Market Garden",
        "Pearl Harbor",
        "Battle of Moscow",
        "Battle of Stalingrad",
        "Battle of Kursk",
        "D-Day",
        "Normandy landings",
        "Battle of Midway",
        "Battle of Guadalcanal",
        "Battle of Iwo Jima",
        "Battle of Okinawa",
        "Winston Churchill",
        "Franklin D. Roosevelt",
        "Joseph Stalin",
        "Adolf Hitler",
        "Benito Mussolini",
        "Hideki Tojo",
        "Nazi Germany",
        "Fascist Italy",
        "Imperial Japan",
        "Allies of World War II",
        "Axis powers",
        "Holocaust",
        "Nazi concentration camps",
        "Final Solution",
        "War crimes in World War II",
        "Nuremberg trials",
        "German war economy",
        "British war economy",
        "American war production",
        "Manhattan Project",
        "Atomic bombings of Hiroshima and Nagasaki",
        "Firebombing of Tokyo",
        "European theatre of World War II",
        "Pacific War",
        "Eastern Front",
        "Western Front",
        "North African Campaign",
        "Italian Campaign",
        "Post–World War II",
        "Consequences of World War II",
        "Division of Germany",
        "Cold War origins",
        "United Nations",
        "Heinrich Himmler",
        "Reinhard Heydrich",
        "Joseph Goebbels",
        "Hermann Göring",
        "SS",
        "Gestapo",
        "Wehrmacht",
        "Red Army",
        "Royal Air Force",
        "Molotov–Ribbentrop Pact",
        "Yalta Conference",
        "Potsdam Conference",
        "Tehran Conference",
        "Luftwaffe",
        "Panzer divisions",
        "Battle of El Alamein",
        "Battle of the Bulge",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();

        assert_eq!(config.document.max_chunk_chars, 800);
        assert_eq!(config.document.min_paragraph_chars, 50);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.embedding.dimension, 384);
        assert!(!config.fetcher.keywords.is_empty());
        assert_eq!(config.fetcher.lang, "en");
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok(), "Default config should be valid");

        let mut config = Config::default();
        config.embedding.dimension = 0;
        assert!(
            config.validate().is_err(),
            "Zero dimension should fail validation"
        );

        let mut config = Config::default();
        config.document.max_chunk_chars = 40;
        assert!(
            config.validate().is_err(),
            "Chunk size below the paragraph floor should fail validation"
        );

        let mut config = Config::default();
        config.fetcher.keywords.clear();
        assert!(
            config.validate().is_err(),
            "Empty keyword list should fail validation"
        );

        let mut config = Config::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err(), "Zero top_k should fail validation");
    }

    #[test]
    fn test_artifact_paths() {
        let mut config = Config::default();
        config.storage.data_dir = PathBuf::from("/tmp/rag");

        assert_eq!(
            config.documents_path(),
            PathBuf::from("/tmp/rag/documents.jsonl")
        );
        assert_eq!(
            config.embeddings_path(),
            PathBuf::from("/tmp/rag/vector_index/embeddings.bin")
        );
        assert_eq!(config.index_path(), PathBuf::from("/tmp/rag/vector_index/index.bin"));
    }

    #[test]
    fn test_config_round_trip() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).expect("Should serialize");
        let parsed: Config = serde_json::from_str(&json).expect("Should deserialize");
        assert_eq!(parsed.document.max_chunk_chars, config.document.max_chunk_chars);
        assert_eq!(parsed.fetcher.keywords.len(), config.fetcher.keywords.len());
    }
}
