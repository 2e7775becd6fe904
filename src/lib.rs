//! # lrukv - An In-Memory LRU Cache Server
//!
//! lrukv keeps a bounded set of binary-safe keys in memory, evicts the least
//! recently used key when full, and lets each key carry a time-to-live.
//! Clients talk to it over TCP with a plain line protocol: one command per
//! line, arguments separated by spaces, one reply per command.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                lrukv                                    │
//! │                                                                         │
//! │  ┌─────────────┐  submit   ┌─────────────┐    ┌─────────────┐           │
//! │  │   Server    │──────────>│    Task     │───>│ Connection  │           │
//! │  │ (accept +   │  NORMAL   │  Scheduler  │    │  Handler    │           │
//! │  │  sweep)     │           │ (N workers) │    └──────┬──────┘           │
//! │  └──────┬──────┘           └─────────────┘           │ line             │
//! │         │                                            ▼                  │
//! │         │ sweep_expired   ┌──────────────────────────────────────────┐  │
//! │         │                 │            Command Handler               │  │
//! │         │                 └──────────────────┬───────────────────────┘  │
//! │         │                                    ▼                          │
//! │         │        ┌──────────────────────────────────────────────────┐   │
//! │         └───────>│                 StorageEngine                    │   │
//! │                  │   Mutex<{ LruCache, ExpirationIndex }> + Clock   │   │
//! │                  └──────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use lrukv::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig { port: 7000, ..ServerConfig::default() };
//!     let server = Server::bind(&config).await?;
//!
//!     server.run(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     }).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Commands
//!
//! | Command               | Reply                                         |
//! |-----------------------|-----------------------------------------------|
//! | `SET key value [ttl]` | `+OK`                                         |
//! | `GET key`             | `$<len>` + value, or `$-1`                    |
//! | `DEL key`             | `:1` / `:0`                                   |
//! | `EXISTS key`          | `:1` / `:0`                                   |
//! | `EXPIRE key seconds`  | `:1` / `:0`                                   |
//! | `TTL key`             | `:<seconds>`, `:-1` no expiry, `:-2` missing  |
//! | `INCR key` / `DECR`   | `:<new value>`                                |
//! | `FLUSHALL`            | `+OK`                                         |
//! | `DBSIZE`              | `:<keys>`                                     |
//! | `INFO`                | `$<len>` + statistics text                    |
//! | `PING`                | `+PONG`                                       |
//! | `QUIT` / `EXIT`       | `+OK`, then the server closes the connection  |
//!
//! ## Module Overview
//!
//! - [`storage`]: LRU cache, expiration index and the locked engine
//! - [`protocol`]: line framing, tokenizing and reply encoding
//! - [`commands`]: command dispatch against the engine
//! - [`connection`]: per-client read/execute/reply loop
//! - [`scheduler`]: priority worker pool that runs connections
//! - [`server`]: accept loop, periodic sweep and graceful shutdown
//! - [`config`]: command-line options

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod scheduler;
pub mod server;
pub mod storage;

pub use commands::CommandHandler;
pub use config::ServerConfig;
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{LineParser, ParseError, Reply};
pub use scheduler::{Priority, TaskScheduler};
pub use server::{Server, ServerContext, ServerError};
pub use storage::{StorageEngine, StoreError};

/// The default port lrukv listens on
pub const DEFAULT_PORT: u16 = 6379;

/// Number of keys held before eviction when no capacity is given
pub const DEFAULT_CAPACITY: usize = 10_000;

/// The default host lrukv binds to
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Version of lrukv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
