use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::rag::Metric;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration for the whole service.
///
/// Every section has defaults, so a partial `config.yaml` only needs to name
/// what it overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub socket_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: "/tmp/docintel.sock".to_string(),
        }
    }
}

/// Static files loaded once at start-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// JSON array of passage strings.
    pub knowledge_base_path: PathBuf,
    /// Serialized similarity index snapshot, aligned with the knowledge base.
    pub index_path: PathBuf,
    /// Embed the knowledge base at start-up when the snapshot is missing
    /// instead of refusing to serve answers.
    #[serde(default)]
    pub build_index_if_missing: bool,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            knowledge_base_path: PathBuf::from("./assets/knowledge_base.json"),
            index_path: PathBuf::from("./assets/index.json"),
            build_index_if_missing: false,
        }
    }
}

/// Which embedding backend produces query and passage vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Ollama HTTP API (`/api/embed`)
    Ollama,
    /// In-process BERT sentence encoder
    Candle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    /// Model name passed to Ollama.
    pub model: String,
    pub base_url: String,
    /// Directory holding `config.json`, `model.safetensors` and `tokenizer.json`
    /// for the candle backend.
    pub model_dir: PathBuf,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Ollama,
            // all-MiniLM-L6-v2
            model: "all-minilm".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model_dir: PathBuf::from("./assets/embedding_model"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub model_dir: PathBuf,
    /// Token whose emission ends generation early.
    pub eos_token: String,
    /// Positions available to prompt plus generated tokens.
    pub max_context_tokens: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("./assets/generator"),
            eos_token: "<|endoftext|>".to_string(),
            max_context_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub model_dir: PathBuf,
    /// Label names indexed by the model's label id.
    pub class_names: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("./assets/final_classification_model"),
            class_names: crate::classifier::AG_NEWS_CLASSES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Retrieval and decoding settings for question answering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,
    #[serde(default = "default_no_repeat_ngram_size")]
    pub no_repeat_ngram_size: usize,
    #[serde(default)]
    pub metric: Metric,
}

fn default_top_k() -> usize {
    3
}

fn default_max_new_tokens() -> usize {
    200
}

fn default_no_repeat_ngram_size() -> usize {
    2
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_new_tokens: default_max_new_tokens(),
            no_repeat_ngram_size: default_no_repeat_ngram_size(),
            metric: Metric::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub filter: String,
    /// JSONL file receiving one record per served request. Disabled when unset.
    #[serde(default)]
    pub request_log_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            request_log_path: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from `config.yaml` if it exists, otherwise use defaults.
    pub fn load_or_default() -> Self {
        Self::load("config.yaml").unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_rag_config_defaults() {
        let config = RagConfig::default();
        assert_eq!(config.top_k, 3);
        assert_eq!(config.max_new_tokens, 200);
        assert_eq!(config.no_repeat_ngram_size, 2);
        assert_eq!(config.metric, Metric::L2);
    }

    #[test]
    fn test_classifier_config_defaults() {
        let config = ClassifierConfig::default();
        assert_eq!(
            config.class_names,
            vec!["World", "Sports", "Business", "Sci/Tech"]
        );
    }

    #[test]
    fn test_logging_disabled_by_default() {
        let config = LoggingConfig::default();
        assert_eq!(config.filter, "info");
        assert!(config.request_log_path.is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "rag:\n  top_k: 5\nembedding:\n  backend: candle\n  model_dir: ./models/minilm"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.rag.top_k, 5);
        assert_eq!(config.rag.no_repeat_ngram_size, 2);
        assert_eq!(config.embedding.backend, EmbeddingBackend::Candle);
        assert_eq!(config.embedding.model_dir, PathBuf::from("./models/minilm"));
        assert_eq!(config.embedding.base_url, "http://localhost:11434");
        assert_eq!(config.server.socket_path, "/tmp/docintel.sock");
        assert!(!config.assets.build_index_if_missing);
    }

    #[test]
    fn test_invalid_yaml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "rag: [not, a, map").unwrap();
        assert!(matches!(Config::load(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = Config::load("/definitely/not/here/config.yaml");
        assert!(matches!(result, Err(ConfigError::FileRead(_))));
    }
}
