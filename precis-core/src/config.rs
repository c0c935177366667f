use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PrecisConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on request bodies; large documents are expected.
    pub body_limit_bytes: usize,
    /// `"*"` allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            body_limit_bytes: 5 * 1024 * 1024,
            cors_origins: vec!["*".to_string()],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HistoryConfig {
    pub path: String,
    /// Move an unparseable history file aside instead of discarding it.
    pub quarantine_corrupt: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: "history.json".to_string(),
            quarantine_corrupt: true,
        }
    }
}

impl HistoryConfig {
    /// History file location with `~` and environment variables expanded.
    pub fn resolved_path(&self) -> PathBuf {
        match shellexpand::full(&self.path) {
            Ok(expanded) => PathBuf::from(expanded.as_ref()),
            Err(e) => {
                tracing::warn!(path = %self.path, error = %e, "Could not expand history path, using it verbatim");
                PathBuf::from(&self.path)
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: crate::gemini::DEFAULT_MODEL.to_string(),
            base_url: crate::gemini::DEFAULT_BASE_URL.to_string(),
            timeout_seconds: 30,
        }
    }
}

impl GeminiConfig {
    /// Configured key, falling back to `GEMINI_API_KEY`. Empty when neither is set.
    pub fn resolved_api_key(&self) -> String {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .unwrap_or_default()
    }
}

impl PrecisConfig {
    /// Load from an optional TOML file, then apply `PRECIS_*` environment
    /// overrides (`PRECIS_HTTP__PORT=8080`).
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("PRECIS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("http.cors_origins"),
            )
            .build()?;
        s.try_deserialize()
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.http.host, self.http.port)
    }
}
