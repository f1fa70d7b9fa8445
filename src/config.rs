use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::services::GeminiOptions;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub gemini: GeminiSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
        }
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    #[serde(default = "default_model_path")]
    pub path: String,
    /// Score with the reference rules instead of failing when the artifact is missing
    #[serde(default)]
    pub fallback_to_rules: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            fallback_to_rules: false,
        }
    }
}

fn default_model_path() -> String { "artifacts/eligibility_model.json".to_string() }

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    #[serde(default = "default_gemini_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_gemini_cache_size")]
    pub cache_size: u64,
    #[serde(default = "default_gemini_cache_ttl")]
    pub cache_ttl_secs: u64,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_gemini_model(),
            base_url: default_gemini_base_url(),
            timeout_secs: default_gemini_timeout(),
            cache_size: default_gemini_cache_size(),
            cache_ttl_secs: default_gemini_cache_ttl(),
        }
    }
}

impl GeminiSettings {
    /// Client options, or `None` when no API key is configured
    pub fn options(&self) -> Option<GeminiOptions> {
        let api_key = self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())?;
        Some(GeminiOptions {
            api_key: api_key.to_string(),
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            timeout_secs: self.timeout_secs,
            cache_size: self.cache_size,
            cache_ttl_secs: self.cache_ttl_secs,
        })
    }
}

fn default_gemini_model() -> String { "gemini-1.5-flash".to_string() }
fn default_gemini_base_url() -> String { "https://generativelanguage.googleapis.com/v1beta".to_string() }
fn default_gemini_timeout() -> u64 { 30 }
fn default_gemini_cache_size() -> u64 { 1000 }
fn default_gemini_cache_ttl() -> u64 { 3600 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with HEMOLINK__)
    /// 5. GEMINI_API_KEY
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., HEMOLINK__SERVER__PORT -> server.port
            .add_source(env_source())
            .build()?;

        apply_env_overrides(settings)?.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(env_source())
            .build()?;

        apply_env_overrides(settings)?.try_deserialize()
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("HEMOLINK")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

/// Apply well-known environment variables that do not follow the prefix scheme
fn apply_env_overrides(settings: Config) -> Result<Config, ConfigError> {
    let mut builder = Config::builder().add_source(settings);

    if let Some(api_key) = std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.trim().is_empty()) {
        builder = builder.set_override("gemini.api_key", api_key)?;
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_logging() {
        let logging = LoggingSettings::default();
        assert_eq!(logging.level, "info");
        assert_eq!(logging.format, "json");
    }

    #[test]
    fn test_gemini_disabled_without_key() {
        let mut gemini = GeminiSettings::default();
        assert!(gemini.options().is_none());

        gemini.api_key = Some("   ".to_string());
        assert!(gemini.options().is_none());

        gemini.api_key = Some("secret".to_string());
        let options = gemini.options().unwrap();
        assert_eq!(options.api_key, "secret");
        assert_eq!(options.model, "gemini-1.5-flash");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[server]\nport = 9100\n\n[model]\npath = \"/tmp/m.json\"\nfallback_to_rules = true").unwrap();
        file.flush().unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.model.path, "/tmp/m.json");
        assert!(settings.model.fallback_to_rules);
        assert_eq!(settings.logging.level, "info");
    }
}
