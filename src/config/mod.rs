//! Configuration management.
//!
//! Configuration is resolved in layers: built-in defaults, then a TOML file,
//! then environment variables (optionally loaded from a `.env` file).

use crate::{Error, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "INGRISK_CONFIG_PATH";

/// Main configuration for ingrisk.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngriskConfig {
    /// Directory holding the knowledge store and index files.
    pub data_dir: PathBuf,
    /// Knowledge store file (defaults to `<data_dir>/knowledge.json`).
    pub store_path: Option<PathBuf>,
    /// Index file (defaults to `<data_dir>/index.json`).
    pub index_path: Option<PathBuf>,
    /// Generative model settings.
    pub llm: LlmConfig,
    /// Embedding settings.
    pub embedding: EmbeddingConfig,
    /// Resolver settings.
    pub resolver: ResolverConfig,
    /// Explainer settings.
    pub explainer: ExplainerConfig,
    /// Logging settings.
    pub logging: LoggingSettings,
    /// Metrics settings.
    pub metrics: MetricsSettings,
}

impl Default for IngriskConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            store_path: None,
            index_path: None,
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            resolver: ResolverConfig::default(),
            explainer: ExplainerConfig::default(),
            logging: LoggingSettings::default(),
            metrics: MetricsSettings::default(),
        }
    }
}

/// Available LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    /// Ollama (local).
    #[default]
    Ollama,
    /// `OpenAI` or a compatible chat completions server.
    #[serde(alias = "openai-compatible")]
    OpenAi,
    /// No model; lookups use the heuristic and explanations a placeholder.
    #[serde(alias = "none", alias = "offline")]
    Unavailable,
}

impl LlmProviderKind {
    /// Parses a provider string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for unknown provider names.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" | "openai-compatible" => Ok(Self::OpenAi),
            "unavailable" | "none" | "offline" => Ok(Self::Unavailable),
            other => Err(Error::InvalidInput(format!("unknown llm provider: {other}"))),
        }
    }

    /// Returns the config name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
            Self::Unavailable => "unavailable",
        }
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    /// Provider.
    pub provider: LlmProviderKind,
    /// Model name (provider default when unset).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Base URL for the provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// API key for hosted providers.
    #[serde(with = "optional_secret_serde", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<SecretString>,
    /// Request timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Connect timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
    /// Retries for timed-out calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Backoff between retries in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_backoff_ms: Option<u64>,
    /// Consecutive failures before the circuit opens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breaker_failure_threshold: Option<u32>,
    /// How long the circuit stays open, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breaker_reset_ms: Option<u64>,
    /// Trial calls allowed while half-open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breaker_half_open_max_calls: Option<u32>,
}

/// Embedding backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Deterministic lexical hashing; no network or model files.
    #[default]
    Hash,
    /// Ollama `/api/embeddings`.
    Ollama,
    /// Native `fastembed` model (requires the `fastembed-embeddings` feature).
    Fastembed,
}

impl EmbeddingBackend {
    /// Parses a backend string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for unknown backend names.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "ollama" => Ok(Self::Ollama),
            "fastembed" => Ok(Self::Fastembed),
            other => Err(Error::InvalidInput(format!(
                "unknown embedding backend: {other}"
            ))),
        }
    }

    /// Returns the config name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hash => "hash",
            Self::Ollama => "ollama",
            Self::Fastembed => "fastembed",
        }
    }
}

/// Embedding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Backend.
    pub backend: EmbeddingBackend,
    /// Model name for the Ollama backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Base URL for the Ollama backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Vector size for the hash backend.
    pub dimensions: usize,
    /// Whether to save the index next to the store.
    pub persist_index: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Hash,
            model: None,
            base_url: None,
            dimensions: crate::embedding::DEFAULT_DIMENSIONS,
            persist_index: true,
        }
    }
}

/// Resolver configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Structured oracle attempts before the free-text fallback.
    pub max_structured_attempts: u32,
    /// Minimum accepted impact length in characters.
    pub min_impact_len: usize,
    /// Per-ingredient oracle budget in milliseconds (0 disables).
    pub oracle_deadline_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_structured_attempts: 3,
            min_impact_len: crate::models::MIN_IMPACT_LEN,
            oracle_deadline_ms: 120_000,
        }
    }
}

/// Explainer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExplainerConfig {
    /// Whether to generate an explanation at all.
    pub enabled: bool,
    /// Grounding documents retrieved per explanation.
    pub top_k: usize,
}

impl Default for ExplainerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: 5,
        }
    }
}

/// Logging section.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Filter directive, e.g. `info` or `ingrisk=debug`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Optional log file; stderr when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Metrics section.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsSettings {
    /// Whether to install the Prometheus recorder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Port for the Prometheus scrape listener.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl IngriskConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid config document.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })
    }

    /// Resolves the full configuration for a process.
    ///
    /// Uses `explicit` when given, else `INGRISK_CONFIG_PATH`, else the
    /// platform config file if it exists, else defaults. Environment
    /// overrides are applied last.
    ///
    /// # Errors
    ///
    /// Returns an error if a named config file is missing or invalid, or if
    /// an environment override has an invalid value.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let env_path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::load_from_file(&path)?,
            None => match default_config_path().filter(|path| path.exists()) {
                Some(path) => Self::load_from_file(&path)?,
                None => Self::default(),
            },
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies environment overrides using `lookup` to read variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a variable has an invalid value.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("INGRISK_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("INGRISK_STORE_PATH") {
            self.store_path = Some(PathBuf::from(v));
        }

        if let Some(v) = lookup("INGRISK_LLM_PROVIDER") {
            self.llm.provider = LlmProviderKind::parse(&v)?;
        }
        if let Some(v) = lookup("INGRISK_LLM_MODEL").or_else(|| lookup("OLLAMA_MODEL")) {
            self.llm.model = Some(v);
        }
        if let Some(v) = lookup("INGRISK_LLM_BASE_URL").or_else(|| {
            (self.llm.provider == LlmProviderKind::Ollama)
                .then(|| lookup("OLLAMA_HOST"))
                .flatten()
        }) {
            self.llm.base_url = Some(v);
        }
        if let Some(v) = lookup("INGRISK_LLM_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.llm.api_key = Some(SecretString::from(v));
        }
        if let Some(v) = lookup("INGRISK_LLM_TIMEOUT_MS") {
            self.llm.timeout_ms = Some(parse_env("INGRISK_LLM_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = lookup("INGRISK_LLM_MAX_RETRIES") {
            self.llm.max_retries = Some(parse_env("INGRISK_LLM_MAX_RETRIES", &v)?);
        }

        if let Some(v) = lookup("INGRISK_EMBEDDING_BACKEND") {
            self.embedding.backend = EmbeddingBackend::parse(&v)?;
        }
        if let Some(v) = lookup("INGRISK_EMBEDDING_MODEL") {
            self.embedding.model = Some(v);
        }

        if let Some(v) = lookup("INGRISK_ORACLE_DEADLINE_MS") {
            self.resolver.oracle_deadline_ms = parse_env("INGRISK_ORACLE_DEADLINE_MS", &v)?;
        }
        if let Some(v) = lookup("INGRISK_EXPLAINER_ENABLED") {
            self.explainer.enabled = parse_bool("INGRISK_EXPLAINER_ENABLED", &v)?;
        }

        if let Some(v) = lookup("INGRISK_LOG_FORMAT") {
            self.logging.format = Some(v);
        }
        if let Some(v) = lookup("INGRISK_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("INGRISK_METRICS_ENABLED") {
            self.metrics.enabled = Some(parse_bool("INGRISK_METRICS_ENABLED", &v)?);
        }
        if let Some(v) = lookup("INGRISK_METRICS_PORT") {
            self.metrics.port = Some(parse_env("INGRISK_METRICS_PORT", &v)?);
        }

        Ok(())
    }

    /// Returns the knowledge store file path.
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("knowledge.json"))
    }

    /// Returns the index file path, or `None` if index persistence is off.
    #[must_use]
    pub fn index_path(&self) -> Option<PathBuf> {
        self.embedding.persist_index.then(|| {
            self.index_path
                .clone()
                .unwrap_or_else(|| self.data_dir.join("index.json"))
        })
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Renders the effective configuration as TOML with secrets redacted.
    ///
    /// Store and index paths are shown resolved against `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if a path is not valid UTF-8.
    pub fn to_redacted_toml(&self) -> Result<String> {
        let effective = EffectiveConfig {
            data_dir: &self.data_dir,
            store_path: self.store_path(),
            index_path: self.index_path(),
            llm: &self.llm,
            embedding: &self.embedding,
            resolver: &self.resolver,
            explainer: &self.explainer,
            logging: &self.logging,
            metrics: &self.metrics,
        };
        toml::to_string_pretty(&effective).map_err(|e| Error::OperationFailed {
            operation: "render_config".to_string(),
            cause: e.to_string(),
        })
    }
}

/// Effective configuration as shown by `config --show`.
#[derive(Serialize)]
struct EffectiveConfig<'a> {
    data_dir: &'a Path,
    store_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    index_path: Option<PathBuf>,
    llm: &'a LlmConfig,
    embedding: &'a EmbeddingConfig,
    resolver: &'a ResolverConfig,
    explainer: &'a ExplainerConfig,
    logging: &'a LoggingSettings,
    metrics: &'a MetricsSettings,
}

/// Serde module for optional API keys. Keys are never written back out.
mod optional_secret_serde {
    use secrecy::SecretString;
    use serde::{Deserialize, Deserializer, Serializer};

    const REDACTED: &str = "<redacted>";

    #[allow(clippy::ref_option)]
    pub fn serialize<S>(secret: &Option<SecretString>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match secret {
            Some(_) => serializer.serialize_some(REDACTED),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Some(SecretString::from(s)))
    }
}

/// Returns the platform config file location.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new()
        .map(|dirs| dirs.config_dir().join("ingrisk").join("config.toml"))
}

fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".ingrisk"),
        |dirs| dirs.data_local_dir().join("ingrisk"),
    )
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::InvalidInput(format!("{key}={value}: {e}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidInput(format!("{key}={value}: expected a boolean"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = IngriskConfig::default();
        assert_eq!(config.llm.provider, LlmProviderKind::Ollama);
        assert_eq!(config.embedding.backend, EmbeddingBackend::Hash);
        assert_eq!(config.resolver.max_structured_attempts, 3);
        assert_eq!(config.resolver.min_impact_len, 20);
        assert_eq!(config.explainer.top_k, 5);
        assert!(config.store_path().ends_with("knowledge.json"));
    }

    #[test]
    fn test_parse_toml() {
        let config = IngriskConfig::from_toml(
            r#"
            data_dir = "/tmp/ingrisk"

            [llm]
            provider = "openai"
            model = "gpt-4o-mini"
            api_key = "sk-test"
            timeout_ms = 5000

            [embedding]
            backend = "ollama"
            persist_index = false

            [resolver]
            oracle_deadline_ms = 0

            [explainer]
            enabled = false
            "#,
        )
        .expect("valid config");

        assert_eq!(config.data_dir, PathBuf::from("/tmp/ingrisk"));
        assert_eq!(config.llm.provider, LlmProviderKind::OpenAi);
        assert_eq!(config.llm.timeout_ms, Some(5000));
        assert_eq!(
            config.llm.api_key.as_ref().map(|k| k.expose_secret().to_string()),
            Some("sk-test".to_string())
        );
        assert_eq!(config.embedding.backend, EmbeddingBackend::Ollama);
        assert!(config.index_path().is_none());
        assert_eq!(config.resolver.oracle_deadline_ms, 0);
        assert_eq!(config.resolver.max_structured_attempts, 3);
        assert!(!config.explainer.enabled);
        assert_eq!(
            config.store_path(),
            PathBuf::from("/tmp/ingrisk/knowledge.json")
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(IngriskConfig::from_toml("[llm]\nprovidr = \"ollama\"").is_err());
        assert!(IngriskConfig::from_toml("[llm]\nprovider = \"gemini\"").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = IngriskConfig::default();
        config
            .apply_env_overrides(env(&[
                ("INGRISK_DATA_DIR", "/var/lib/ingrisk"),
                ("OLLAMA_HOST", "http://gpu-box:11434"),
                ("OLLAMA_MODEL", "llama3.2"),
                ("INGRISK_EXPLAINER_ENABLED", "false"),
                ("INGRISK_METRICS_PORT", "9100"),
            ]))
            .expect("valid overrides");

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/ingrisk"));
        assert_eq!(config.llm.base_url.as_deref(), Some("http://gpu-box:11434"));
        assert_eq!(config.llm.model.as_deref(), Some("llama3.2"));
        assert!(!config.explainer.enabled);
        assert_eq!(config.metrics.port, Some(9100));
    }

    #[test]
    fn test_ollama_host_ignored_for_openai() {
        let mut config = IngriskConfig::default();
        config
            .apply_env_overrides(env(&[
                ("INGRISK_LLM_PROVIDER", "openai"),
                ("OLLAMA_HOST", "http://gpu-box:11434"),
            ]))
            .expect("valid overrides");
        assert!(config.llm.base_url.is_none());
    }

    #[test]
    fn test_invalid_env_values() {
        let mut config = IngriskConfig::default();
        assert!(
            config
                .apply_env_overrides(env(&[("INGRISK_LLM_TIMEOUT_MS", "soon")]))
                .is_err()
        );
        assert!(
            config
                .apply_env_overrides(env(&[("INGRISK_EXPLAINER_ENABLED", "maybe")]))
                .is_err()
        );
        assert!(
            config
                .apply_env_overrides(env(&[("INGRISK_LLM_PROVIDER", "gemini")]))
                .is_err()
        );
    }

    #[test]
    fn test_redacted_toml_hides_key() {
        let mut config = IngriskConfig::default();
        config.llm.api_key = Some(SecretString::from("sk-secret".to_string()));
        let rendered = config.to_redacted_toml().expect("render");
        assert!(rendered.contains("api_key = \"<redacted>\""));
        assert!(!rendered.contains("sk-secret"));

        let reparsed = IngriskConfig::from_toml(&rendered).expect("rendered config parses");
        assert_eq!(reparsed.llm.provider, LlmProviderKind::Ollama);
        assert_eq!(
            reparsed.llm.api_key.as_ref().map(|k| k.expose_secret().to_string()),
            Some("<redacted>".to_string())
        );
    }

    #[test]
    fn test_redacted_toml_escapes_control_characters() {
        let config = IngriskConfig::default().with_data_dir("/tmp/data\u{7f}dir");
        let rendered = config.to_redacted_toml().expect("render");
        assert!(toml::from_str::<toml::Value>(&rendered).is_ok(), "{rendered}");

        let reparsed = IngriskConfig::from_toml(&rendered).expect("rendered config parses");
        assert_eq!(reparsed.data_dir, PathBuf::from("/tmp/data\u{7f}dir"));
        assert_eq!(
            reparsed.store_path,
            Some(PathBuf::from("/tmp/data\u{7f}dir/knowledge.json"))
        );
    }

    #[test]
    fn test_redacted_toml_omits_unset_options() {
        let mut config = IngriskConfig::default().with_data_dir("/srv/ingrisk");
        config.embedding.persist_index = false;
        let rendered = config.to_redacted_toml().expect("render");
        assert!(!rendered.contains("api_key"));
        assert!(!rendered.contains("index_path"));
        assert!(rendered.contains("provider = \"ollama\""));
        assert!(rendered.contains("[resolver]"));
    }
}
