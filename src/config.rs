use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::api::types::{ListQuery, SortOrder};

/// Main configuration structure for the moderation console
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Content backend connection
    pub api: ApiConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
    /// Defaults for list views
    pub listing: ListingConfig,
    /// Extra failure markers for the error classifier
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the admin REST API
    pub base_url: String,
    /// Bearer token (can be set via env var)
    pub token: Option<String>,
    /// Fixed transport timeout; timeouts classify as transient failures
    pub timeout_seconds: u64,
    /// Rate limiting settings
    pub rate_limit: RateLimitConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api/admin".to_string(),
            token: None,
            timeout_seconds: 15,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sustained requests per second
    pub requests_per_second: u32,
    /// Burst capacity
    pub burst_capacity: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            burst_capacity: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level / filter directive
    pub log_level: String,
    /// Emit JSON lines instead of compact text
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            json_logs: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListingConfig {
    pub page_size: u32,
    pub sort: Option<String>,
    pub order: SortOrder,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            sort: Some("updatedAt".to_string()),
            order: SortOrder::Desc,
        }
    }
}

impl ListingConfig {
    /// First page with the configured size and sort
    pub fn default_query(&self) -> ListQuery {
        let query = ListQuery::default().page_size(self.page_size);
        match &self.sort {
            Some(field) => query.sort(field.clone(), self.order),
            None => query,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Extra substrings signalling a referential-integrity block
    pub referential_integrity_markers: Vec<String>,
    /// Extra case-insensitive regex patterns signalling a referential-integrity block
    pub referential_integrity_patterns: Vec<String>,
    /// Extra substrings signalling an expired session
    pub auth_markers: Vec<String>,
}

impl ConsoleConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (modconsole.toml, .modconsole-rc)
    /// 3. Environment variables (prefixed with MODCONSOLE_, `__` between sections)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Same as `load`, resolving configuration files relative to `dir`
    pub fn load_from(dir: &Path) -> Result<Self> {
        let mut builder = Config::builder();

        let toml_path = dir.join("modconsole.toml");
        if toml_path.exists() {
            builder = builder.add_source(File::from(toml_path));
        }

        let rc_path = dir.join(".modconsole-rc");
        if rc_path.exists() {
            builder = builder.add_source(File::from(rc_path).format(config::FileFormat::Toml));
        }

        // Override with environment variables
        builder = builder.add_source(
            Environment::with_prefix("MODCONSOLE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let mut console_config: ConsoleConfig = config.try_deserialize()?;

        // Special handling for the API token - check the flat variable too
        if console_config.api.token.is_none() {
            if let Ok(token) = std::env::var("MODCONSOLE_TOKEN") {
                console_config.api.token = Some(token);
            }
        }

        Ok(console_config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}
