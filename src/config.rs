use serde::{Deserialize, Serialize};
use std::env;

use crate::engine::FeedConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `memory` for the in-process store, anything starting with `sqlite:`
    /// for SQLite
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub feed: FeedSettings,
    pub seed_demo_data: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSettings {
    pub page_size: usize,
    pub fanout_concurrency: usize,
}

impl From<&FeedSettings> for FeedConfig {
    fn from(settings: &FeedSettings) -> Self {
        FeedConfig {
            page_size: settings.page_size,
            fanout_concurrency: settings.fanout_concurrency,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let feed = FeedConfig::default();
        Self {
            feed: FeedSettings {
                page_size: feed.page_size,
                fanout_concurrency: feed.fanout_concurrency,
            },
            seed_demo_data: false,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let page_size: usize = env::var("FEED_PAGE_SIZE")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .unwrap_or(50);
        if page_size == 0 {
            anyhow::bail!("FEED_PAGE_SIZE must be at least 1");
        }

        Ok(Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "memory".to_string()),
            },
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .unwrap_or(3000),
            },
            engine: EngineConfig {
                feed: FeedSettings {
                    page_size,
                    fanout_concurrency: env::var("FEED_FANOUT_CONCURRENCY")
                        .unwrap_or_else(|_| "16".to_string())
                        .parse()
                        .unwrap_or(16),
                },
                seed_demo_data: env::var("SEED_DEMO_DATA")
                    .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                    .unwrap_or(false),
            },
        })
    }

    /// Config for tests and embedding: in-memory store, default engine knobs
    pub fn in_memory() -> Self {
        Self {
            database: DatabaseConfig {
                url: "memory".to_string(),
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            engine: EngineConfig::default(),
        }
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_defaults() {
        let config = Config::in_memory();
        assert_eq!(config.database.url, "memory");
        assert_eq!(config.engine.feed.page_size, 50);
        assert_eq!(config.engine.feed.fanout_concurrency, 16);
        assert!(!config.engine.seed_demo_data);
        assert_eq!(config.server_address(), "127.0.0.1:0");
    }

    #[test]
    fn test_feed_settings_convert() {
        let feed: FeedConfig = (&EngineConfig::default().feed).into();
        assert_eq!(feed.page_size, 50);
    }
}
