//! Command Handler Module
//!
//! This module implements the command processing layer for lrukv.
//! It receives tokenized request lines, executes them against the storage
//! engine, and returns the reply to send back.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Line Parser    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Dispatch     │
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `SET`, `GET`, `DEL`/`DELETE`, `EXISTS`
//! - `EXPIRE`, `TTL`
//! - `INCR`, `DECR`
//! - `PING`, `INFO`, `DBSIZE`, `FLUSHALL`
//! - `QUIT`/`EXIT`

pub mod handler;

// Re-export the main command handler
pub use handler::{CommandError, CommandHandler, CommandOutcome};
