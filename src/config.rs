use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub docs: DocsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Document source: a directory of readable files with extractable text.
#[derive(Debug, Deserialize, Clone)]
pub struct DocsConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.docx".to_string(),
        "**/*.pdf".to_string(),
        "**/*.md".to_string(),
        "**/*.txt".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Vector share of the fused score: 0.0 = lexical only, 1.0 = vector only.
    #[serde(default = "default_hybrid_weight")]
    pub hybrid_weight: f64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            hybrid_weight: default_hybrid_weight(),
            top_k: default_top_k(),
            candidate_k: default_candidate_k(),
        }
    }
}

fn default_hybrid_weight() -> f64 {
    0.5
}
fn default_top_k() -> usize {
    5
}
fn default_candidate_k() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Directory holding the persisted vector index (manifest + vectors).
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
            index_dir: default_index_dir(),
        }
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_index_dir() -> PathBuf {
    PathBuf::from("./data/vector_index")
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// Base URL of an OpenAI-compatible chat completions endpoint.
    #[serde(default = "default_generation_url")]
    pub url: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    /// Name of the environment variable holding the API key, if any.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Idle window between tokens before the stream is finalized as timed out.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default)]
    pub prompt_template: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            url: default_generation_url(),
            model: default_generation_model(),
            api_key_env: None,
            temperature: default_temperature(),
            idle_timeout_secs: default_idle_timeout_secs(),
            prompt_template: None,
        }
    }
}

fn default_generation_url() -> String {
    "http://localhost:11434/v1".to_string()
}
fn default_generation_model() -> String {
    "llama3".to_string()
}
fn default_temperature() -> f64 {
    0.1
}
fn default_idle_timeout_secs() -> u64 {
    90
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be smaller than chunking.chunk_size");
    }

    if !(0.0..=1.0).contains(&config.retrieval.hybrid_weight) {
        anyhow::bail!("retrieval.hybrid_weight must be in [0.0, 1.0]");
    }
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_minimal_config_loads_with_defaults() {
        let f = write_config(
            r#"
            [db]
            path = "./data/docqa.db"
            [docs]
            root = "./docs"
            [server]
            bind = "127.0.0.1:8080"
            "#,
        );
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.chunking.chunk_size, 1000);
        assert_eq!(cfg.chunking.overlap, 200);
        assert!((cfg.retrieval.hybrid_weight - 0.5).abs() < f64::EPSILON);
        assert_eq!(cfg.retrieval.top_k, 5);
        assert!(!cfg.embedding.is_enabled());
        assert_eq!(cfg.generation.idle_timeout_secs, 90);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let f = write_config(
            r#"
            [db]
            path = "./data/docqa.db"
            [docs]
            root = "./docs"
            [chunking]
            chunk_size = 100
            overlap = 100
            [server]
            bind = "127.0.0.1:8080"
            "#,
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_enabled_embedding_requires_model_and_dims() {
        let f = write_config(
            r#"
            [db]
            path = "./data/docqa.db"
            [docs]
            root = "./docs"
            [embedding]
            provider = "openai"
            [server]
            bind = "127.0.0.1:8080"
            "#,
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_hybrid_weight_out_of_range_rejected() {
        let f = write_config(
            r#"
            [db]
            path = "./data/docqa.db"
            [docs]
            root = "./docs"
            [retrieval]
            hybrid_weight = 1.5
            [server]
            bind = "127.0.0.1:8080"
            "#,
        );
        assert!(load_config(f.path()).is_err());
    }
}
