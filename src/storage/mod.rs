//! Storage Module
//!
//! The in-memory state behind the server: a bounded LRU cache, a side table of
//! expiry deadlines, and the engine that ties them together under one lock.
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────────────────────────────────────────┐
//!  │                StorageEngine                 │
//!  │        (one parking_lot::Mutex inside)       │
//!  │                                              │
//!  │   ┌──────────────┐     ┌─────────────────┐   │
//!  │   │   LruCache   │     │ ExpirationIndex │   │
//!  │   │ hash + arena │     │ key -> deadline │   │
//!  │   └──────────────┘     └─────────────────┘   │
//!  └──────────────────────────────────────────────┘
//!                       ▲
//!                       │ sweep_expired() every second
//!              ┌────────┴────────┐
//!              │   Server loop   │
//!              └─────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use lrukv::storage::{StorageEngine, TtlStatus};
//! use bytes::Bytes;
//!
//! let engine = StorageEngine::new(1_000).unwrap();
//!
//! engine.set(Bytes::from("name"), Bytes::from("Ariz"), None).unwrap();
//! assert_eq!(engine.get(b"name"), Some(Bytes::from("Ariz")));
//!
//! engine.set(Bytes::from("session"), Bytes::from("token123"), Some(3600)).unwrap();
//! assert_eq!(engine.ttl(b"session"), TtlStatus::Remaining(3600));
//! ```

pub mod clock;
pub mod engine;
pub mod error;
pub mod expiry;
pub mod lru;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{StorageEngine, StorageStats, TtlStatus, MAX_KEY_LEN, MAX_VALUE_LEN};
pub use error::{StoreError, StoreResult};
pub use expiry::ExpirationIndex;
pub use lru::{CacheStats, LruCache};
