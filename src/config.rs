//! Server configuration from the command line.

use clap::Parser;
use std::num::NonZeroUsize;

use crate::{DEFAULT_CAPACITY, DEFAULT_HOST, DEFAULT_PORT};

/// Command-line options for the lrukv server.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(
    name = "lrukv",
    author,
    version,
    about = "In-memory LRU cache server with per-key TTL",
    long_about = None
)]
pub struct ServerConfig {
    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Maximum number of keys held before LRU eviction (0 means the default)
    #[arg(short, long, default_value_t = DEFAULT_CAPACITY)]
    pub capacity: usize,

    /// Worker count, i.e. connections served at once (default: CPU cores)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Address to bind to
    #[arg(skip = DEFAULT_HOST.to_string())]
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            capacity: DEFAULT_CAPACITY,
            threads: None,
            host: DEFAULT_HOST.to_string(),
        }
    }
}

impl ServerConfig {
    /// Cache capacity with 0 mapped to [`DEFAULT_CAPACITY`].
    pub fn effective_capacity(&self) -> usize {
        match self.capacity {
            0 => DEFAULT_CAPACITY,
            n => n,
        }
    }

    /// Worker count: the requested number, or the number of CPU cores when
    /// unset or 0. Always at least 1.
    pub fn worker_threads(&self) -> usize {
        match self.threads {
            Some(n) if n > 0 => n,
            _ => std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
        }
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::try_parse_from(["lrukv"]).unwrap();

        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.bind_address(), "0.0.0.0:6379");
        assert_eq!(config.effective_capacity(), 10_000);
        assert!(config.worker_threads() >= 1);
    }

    #[test]
    fn test_short_and_long_flags() {
        let config =
            ServerConfig::try_parse_from(["lrukv", "-p", "7000", "-c", "50", "-t", "3"]).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.effective_capacity(), 50);
        assert_eq!(config.worker_threads(), 3);

        let config = ServerConfig::try_parse_from([
            "lrukv",
            "--port",
            "7001",
            "--capacity",
            "0",
            "--threads",
            "0",
        ])
        .unwrap();
        assert_eq!(config.port, 7001);
        assert_eq!(config.effective_capacity(), DEFAULT_CAPACITY);
        assert!(config.worker_threads() >= 1);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(ServerConfig::try_parse_from(["lrukv", "-p", "not-a-port"]).is_err());
        assert!(ServerConfig::try_parse_from(["lrukv", "-p", "70000"]).is_err());
        assert!(ServerConfig::try_parse_from(["lrukv", "--bogus"]).is_err());
    }
}
