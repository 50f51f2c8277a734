use std::{net::SocketAddr, str::FromStr};

use thiserror::Error;

use crate::knowledge::size::parse_size;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct KnowledgeConfig {
    pub service_host: String,
    pub service_port: u16,
    /// Service-specific limit, in megabytes.
    pub max_file_size_mb: u64,
    /// Raw size strings ("2M", "512K") for the upload and whole-request limits.
    pub upload_max_filesize: String,
    pub post_max_size: String,
}

impl KnowledgeConfig {
    pub fn service_url(&self) -> String {
        format!("http://{}:{}", self.service_host, self.service_port)
    }

    /// Smallest of the three configured limits, in bytes.
    pub fn max_upload_size(&self) -> u64 {
        let upload = parse_size(&self.upload_max_filesize);
        let post = parse_size(&self.post_max_size);
        let service = parse_size(&format!("{}M", self.max_file_size_mb));
        upload.min(post).min(service)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_path: String,
    pub templates_glob: String,
    pub assets_dir: String,
    pub admin_email: Option<String>,
    pub llm: LlmConfig,
    pub knowledge: KnowledgeConfig,
}

fn var_or(key: &str, default: &str) -> String {
    dotenv::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = var_or(key, default);
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let admin_email = dotenv::var("ADMIN_EMAIL")
            .ok()
            .map(|email| email.trim().to_lowercase())
            .filter(|email| !email.is_empty());

        Ok(Config {
            bind_address: parse_var("BIND_ADDRESS", "0.0.0.0:3000")?,
            database_path: var_or("DATABASE_PATH", "bitty.db"),
            templates_glob: var_or("TEMPLATES_GLOB", "templates/**/*"),
            assets_dir: var_or("ASSETS_DIR", "assets"),
            admin_email,
            llm: LlmConfig {
                api_url: var_or("LLM_API_URL", "https://api.deepseek.com/chat/completions"),
                api_key: var_or("LLM_API_KEY", ""),
                model: var_or("LLM_MODEL", "deepseek-chat"),
            },
            knowledge: KnowledgeConfig {
                service_host: var_or("KNOWLEDGE_SERVICE_HOST", "127.0.0.1"),
                service_port: parse_var("KNOWLEDGE_SERVICE_PORT", "4001")?,
                max_file_size_mb: parse_var("KNOWLEDGE_MAX_FILE_SIZE", "2")?,
                upload_max_filesize: var_or("UPLOAD_MAX_FILESIZE", "2M"),
                post_max_size: var_or("POST_MAX_SIZE", "8M"),
            },
        })
    }
}

#[cfg(test)]
pub fn test_config() -> Config {
    Config {
        bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
        database_path: ":memory:".to_string(),
        templates_glob: "templates/**/*".to_string(),
        assets_dir: "assets".to_string(),
        admin_email: Some("admin@test.com".to_string()),
        llm: LlmConfig {
            api_url: "http://llm.invalid/chat/completions".to_string(),
            api_key: "test-key".to_string(),
            model: "deepseek-chat".to_string(),
        },
        knowledge: KnowledgeConfig {
            service_host: "127.0.0.1".to_string(),
            service_port: 4001,
            max_file_size_mb: 2,
            upload_max_filesize: "2M".to_string(),
            post_max_size: "8M".to_string(),
        },
    }
}
