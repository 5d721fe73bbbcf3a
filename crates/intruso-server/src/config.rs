use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use intruso_common::words::WordBank;

/// Intruso Server - room and match synchronization for the Intruso party game
#[derive(Parser, Debug, Clone)]
#[command(name = "intruso-server", version, about)]
pub struct ServerConfig {
    /// Address to bind the server to
    #[arg(short, long, env = "INTRUSO_BIND", default_value = "0.0.0.0:3001")]
    pub bind: String,

    /// Maximum simultaneous connections allowed
    #[arg(short, long, env = "INTRUSO_MAX_CONNECTIONS", default_value_t = 200)]
    pub max_connections: usize,

    /// Milliseconds an aborted room stays visible before its members are evicted
    #[arg(long, env = "INTRUSO_DELETE_GRACE_MS", default_value_t = 3000)]
    pub delete_grace_ms: u64,

    /// JSON word bank replacing the built-in one
    #[arg(short, long, env = "INTRUSO_WORDS")]
    pub words: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3001".into(),
            max_connections: 200,
            delete_grace_ms: 3000,
            words: None,
        }
    }
}

impl ServerConfig {
    pub fn delete_grace(&self) -> Duration {
        Duration::from_millis(self.delete_grace_ms)
    }

    /// Load the configured word bank, falling back to the built-in one.
    pub fn load_word_bank(&self) -> WordBank {
        let Some(path) = &self.words else {
            return WordBank::builtin();
        };
        match WordBank::load(path) {
            Ok(bank) => {
                tracing::info!(
                    path = %path.display(),
                    categories = bank.category_names().len(),
                    words = bank.word_count(),
                    "Loaded word bank"
                );
                bank
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "Using built-in word bank: {}", e);
                WordBank::builtin()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_cli_defaults() {
        let parsed = ServerConfig::parse_from(["intruso-server"]);
        let default = ServerConfig::default();
        assert_eq!(parsed.bind, default.bind);
        assert_eq!(parsed.max_connections, default.max_connections);
        assert_eq!(parsed.delete_grace(), Duration::from_millis(3000));
    }

    #[test]
    fn test_missing_word_file_falls_back_to_builtin() {
        let config = ServerConfig {
            words: Some(PathBuf::from("/nonexistent/words.json")),
            ..Default::default()
        };
        assert_eq!(config.load_word_bank().word_count(), WordBank::builtin().word_count());
    }
}
