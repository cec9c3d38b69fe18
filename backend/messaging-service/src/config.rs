use db_pool::env_utils::{parse_env_or, require_env};
use dotenvy::dotenv;
use std::env;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::Members;

/// Where conversation data is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    /// Process-local store for local runs and tests
    Memory,
}

impl StorageBackend {
    fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(AppError::Config(format!(
                "STORAGE_BACKEND must be postgres or memory, got {other:?}"
            ))),
        }
    }
}

/// Paging and content limits applied by the messaging service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatSettings {
    pub default_page_size: u32,
    pub max_page_size: u32,
    /// Maximum content length in characters
    pub max_content_length: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
            max_content_length: 5000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub storage: StorageBackend,
    /// Empty when running on the memory backend
    pub database_url: String,
    pub run_migrations: bool,
    pub chat: ChatSettings,
    /// Relationships preloaded into the memory backend's directory
    pub memory_relationships: Vec<(Uuid, Members)>,
}

/// Parse `relationship_id:user_a:user_b` entries separated by commas.
fn parse_relationships(raw: &str) -> Result<Vec<(Uuid, Members)>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let invalid = || {
                AppError::Config(format!(
                    "MEMORY_RELATIONSHIPS entry {entry:?} must be relationship_id:user_a:user_b"
                ))
            };
            let ids = entry
                .split(':')
                .map(|part| Uuid::parse_str(part.trim()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| invalid())?;
            match ids.as_slice() {
                [relationship_id, a, b] => Members::try_new(*a, *b)
                    .map(|members| (*relationship_id, members))
                    .ok_or_else(invalid),
                _ => Err(invalid()),
            }
        })
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let storage = match env::var("STORAGE_BACKEND") {
            Ok(value) => StorageBackend::parse(&value)?,
            Err(_) => StorageBackend::Postgres,
        };
        let database_url = match storage {
            StorageBackend::Postgres => require_env("DATABASE_URL")?,
            StorageBackend::Memory => env::var("DATABASE_URL").unwrap_or_default(),
        };
        let memory_relationships = match env::var("MEMORY_RELATIONSHIPS") {
            Ok(raw) => parse_relationships(&raw)?,
            Err(_) => Vec::new(),
        };

        let defaults = ChatSettings::default();
        let chat = ChatSettings {
            default_page_size: parse_env_or("CHAT_DEFAULT_PAGE_SIZE", defaults.default_page_size)?,
            max_page_size: parse_env_or("CHAT_MAX_PAGE_SIZE", defaults.max_page_size)?,
            max_content_length: parse_env_or(
                "CHAT_MAX_CONTENT_LENGTH",
                defaults.max_content_length,
            )?,
        };
        if chat.default_page_size == 0 || chat.default_page_size > chat.max_page_size {
            return Err(AppError::Config(format!(
                "CHAT_DEFAULT_PAGE_SIZE ({}) must be between 1 and CHAT_MAX_PAGE_SIZE ({})",
                chat.default_page_size, chat.max_page_size
            )));
        }

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: parse_env_or("PORT", 8085)?,
            storage,
            database_url,
            run_migrations: parse_env_or("RUN_MIGRATIONS", true)?,
            chat,
            memory_relationships,
        })
    }

    pub fn test_defaults() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            storage: StorageBackend::Memory,
            database_url: String::new(),
            run_migrations: false,
            chat: ChatSettings::default(),
            memory_relationships: Vec::new(),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
