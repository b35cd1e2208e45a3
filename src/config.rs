use anyhow::{Result, anyhow};
use std::env;
use tracing::{info, warn};

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub session: SessionConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
}

/// OpenRouter client configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub max_retries: u32,
    pub max_tokens: u32,
    /// Sent as the HTTP-Referer header, per OpenRouter attribution rules.
    pub app_origin: String,
    /// Sent as the X-Title header.
    pub app_name: String,
}

/// MCQ session cache configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ttl_seconds: i64,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// History store configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        let config = Config {
            llm: LlmConfig::from_env()?,
            session: SessionConfig::from_env()?,
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
        };

        config.log_configuration_summary();
        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    fn log_configuration_summary(&self) {
        info!(
            api_key_masked = %mask_sensitive_data(&self.llm.api_key),
            endpoint = %self.llm.endpoint,
            model = %self.llm.model,
            max_retries = self.llm.max_retries,
            session_ttl_seconds = self.session.ttl_seconds,
            database_url = %self.database.url,
            server_address = %format!("{}:{}", self.server.host, self.server.port),
            "Configuration summary"
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        if self.session.ttl_seconds <= 0 {
            return Err(anyhow!("MCQ_SESSION_TTL_SECONDS must be greater than 0"));
        }

        if self.llm.max_tokens == 0 {
            return Err(anyhow!("OPENROUTER_MAX_TOKENS must be greater than 0"));
        }

        if self.llm.api_key.is_empty() {
            warn!("OPENROUTER_API_KEY is empty - generation requests will fail");
        }

        Ok(())
    }
}

impl LlmConfig {
    fn from_env() -> Result<Self> {
        // OPENROUTER_API_KEY wins; GEMINI_API_KEY is a legacy fallback kept
        // for deployments migrated from the Gemini-direct setup.
        let api_key = env::var("OPENROUTER_API_KEY")
            .or_else(|_| env::var("GEMINI_API_KEY"))
            .unwrap_or_default();

        let endpoint = env::var("OPENROUTER_ENDPOINT")
            .unwrap_or_else(|_| "https://openrouter.ai/api/v1/chat/completions".to_string());

        let model =
            env::var("OPENROUTER_MODEL").unwrap_or_else(|_| "openai/gpt-4o-mini".to_string());

        let max_retries = parse_env_number("OPENROUTER_MAX_RETRIES", 2)?;
        let max_tokens = parse_env_number("OPENROUTER_MAX_TOKENS", 1200)?;

        let app_origin =
            env::var("APP_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());
        let app_name = env::var("APP_NAME").unwrap_or_else(|_| "EduCator".to_string());

        Ok(LlmConfig {
            api_key,
            endpoint,
            model,
            max_retries,
            max_tokens,
            app_origin,
            app_name,
        })
    }
}

impl SessionConfig {
    fn from_env() -> Result<Self> {
        let ttl_seconds = parse_env_number("MCQ_SESSION_TTL_SECONDS", 3600)?;
        Ok(SessionConfig { ttl_seconds })
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
        let port = port_str.parse::<u16>().map_err(|_| {
            anyhow!(
                "Invalid PORT value: '{}'. Must be a number between 1-65535",
                port_str
            )
        })?;

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        Ok(ServerConfig { port, host })
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self> {
        let url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:studygen.db".to_string());
        Ok(DatabaseConfig { url })
    }
}

fn parse_env_number<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| anyhow!("Invalid {} value: '{}'. Must be a number", name, raw)),
        Err(_) => Ok(default),
    }
}

/// Mask sensitive data in configuration for safe logging
fn mask_sensitive_data(data: &str) -> String {
    if data.len() <= 8 {
        "*".repeat(data.len())
    } else {
        format!("{}***{}", &data[..4], &data[data.len() - 4..])
    }
}
