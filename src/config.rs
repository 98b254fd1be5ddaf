use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Chunk sizing is impossible to satisfy.
    #[error("Invalid chunk configuration: {0}")]
    InvalidChunking(#[from] crate::processing::ChunkingError),
}

/// Runtime configuration for the loan retrieval service.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Backend that stores embeddings.
    pub vector_store_provider: VectorStoreProvider,
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: Option<String>,
    /// Name of the Qdrant collection used for loan document passages.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// API key for the OpenAI embeddings endpoint.
    pub openai_api_key: Option<String>,
    /// Base URL for OpenAI-compatible embedding APIs.
    pub openai_base_url: String,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Number of texts sent to the provider per call.
    pub embedding_batch_size: usize,
    /// Per-text clip applied before embedding.
    pub embedding_max_input_chars: usize,
    /// Chunk window size in characters.
    pub chunk_max_chars: usize,
    /// Overlap between adjacent chunks in characters.
    pub chunk_overlap_chars: usize,
    /// Extracted text shorter than this is indexed as empty.
    pub index_min_text_chars: usize,
    /// Documents indexed concurrently within one batch.
    pub index_concurrency: usize,
    /// Skip re-embedding documents whose content hash is already stored.
    pub index_skip_unchanged: bool,
    /// Context budget expressed in tokens.
    pub context_max_tokens: usize,
    /// Characters assumed per token when converting the context budget.
    pub context_chars_per_token: usize,
    /// Default number of matches returned by a query.
    pub query_default_top_k: usize,
    /// Upper bound on matches returned by a query.
    pub query_max_top_k: usize,
    /// Timeout applied to every external HTTP call.
    pub request_timeout_secs: u64,
    /// Attempts made for transient failures, including the first.
    pub retry_max_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent attempt.
    pub retry_base_delay_ms: u64,
    /// Root directory of the file-backed document source.
    pub document_source_dir: Option<String>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported vector store backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreProvider {
    /// Qdrant over its REST API.
    Qdrant,
    /// Process-local store, useful for development.
    Memory,
}

/// Supported embedding backends for the processing pipeline.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Hosted OpenAI embeddings API.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic offline hashing embedder.
    Hash,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vector_store_provider = match load_env_optional("VECTOR_STORE_PROVIDER") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("VECTOR_STORE_PROVIDER".into()))?,
            None => VectorStoreProvider::Qdrant,
        };
        let qdrant_url = load_env_optional("QDRANT_URL");
        if vector_store_provider == VectorStoreProvider::Qdrant && qdrant_url.is_none() {
            return Err(ConfigError::MissingVariable("QDRANT_URL".into()));
        }

        let embedding_provider: EmbeddingProvider = load_env("EMBEDDING_PROVIDER")?
            .parse()
            .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))?;
        let openai_api_key = load_env_optional("OPENAI_API_KEY");
        if embedding_provider == EmbeddingProvider::OpenAI && openai_api_key.is_none() {
            return Err(ConfigError::MissingVariable("OPENAI_API_KEY".into()));
        }

        let embedding_dimension: usize = parse_required("EMBEDDING_DIMENSION")?;
        if embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }

        let config = Self {
            vector_store_provider,
            qdrant_url,
            qdrant_collection_name: load_env_optional("QDRANT_COLLECTION_NAME")
                .unwrap_or_else(|| "loan-documents".into()),
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            embedding_provider,
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension,
            openai_api_key,
            openai_base_url: load_env_optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".into()),
            ollama_url: load_env_optional("OLLAMA_URL")
                .unwrap_or_else(|| "http://127.0.0.1:11434".into()),
            embedding_batch_size: parse_optional("EMBEDDING_BATCH_SIZE")?.unwrap_or(64),
            embedding_max_input_chars: parse_optional("EMBEDDING_MAX_INPUT_CHARS")?
                .unwrap_or(8000),
            chunk_max_chars: parse_optional("CHUNK_MAX_CHARS")?.unwrap_or(4000),
            chunk_overlap_chars: parse_optional("CHUNK_OVERLAP_CHARS")?.unwrap_or(200),
            index_min_text_chars: parse_optional("INDEX_MIN_TEXT_CHARS")?.unwrap_or(50),
            index_concurrency: parse_optional("INDEX_CONCURRENCY")?.unwrap_or(4),
            index_skip_unchanged: load_env_optional("INDEX_SKIP_UNCHANGED")
                .map(|value| parse_bool("INDEX_SKIP_UNCHANGED", &value))
                .transpose()?
                .unwrap_or(true),
            context_max_tokens: parse_optional("CONTEXT_MAX_TOKENS")?.unwrap_or(7000),
            context_chars_per_token: parse_optional("CONTEXT_CHARS_PER_TOKEN")?.unwrap_or(4),
            query_default_top_k: parse_optional("QUERY_DEFAULT_TOP_K")?.unwrap_or(5),
            query_max_top_k: parse_optional("QUERY_MAX_TOP_K")?.unwrap_or(50),
            request_timeout_secs: parse_optional("REQUEST_TIMEOUT_SECS")?.unwrap_or(30),
            retry_max_attempts: parse_optional("RETRY_MAX_ATTEMPTS")?.unwrap_or(3),
            retry_base_delay_ms: parse_optional("RETRY_BASE_DELAY_MS")?.unwrap_or(250),
            document_source_dir: load_env_optional("DOCUMENT_SOURCE_DIR"),
            server_port: parse_optional("SERVER_PORT")?,
        };

        crate::processing::ChunkerSettings::new(config.chunk_max_chars, config.chunk_overlap_chars)?;
        Ok(config)
    }

    /// Character budget for assembled context derived from the token budget.
    pub fn context_max_chars(&self) -> usize {
        self.context_max_tokens
            .saturating_mul(self.context_chars_per_token.max(1))
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_required<T: std::str::FromStr>(key: &str) -> Result<T, ConfigError> {
    load_env(key)?
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(key.to_string())),
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for VectorStoreProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "qdrant" => Ok(Self::Qdrant),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        vector_store = ?config.vector_store_provider,
        collection = %config.qdrant_collection_name,
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        chunk_max_chars = config.chunk_max_chars,
        chunk_overlap_chars = config.chunk_overlap_chars,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
