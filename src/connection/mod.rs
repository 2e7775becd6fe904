//! Connection Handler Module
//!
//! This module manages individual client connections to lrukv.
//! Each accepted socket becomes one work item on the worker pool and keeps
//! that worker for as long as the client stays connected.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (server.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │  submit(NORMAL, ...)   │
//!           │   on TaskScheduler     │
//!           └────────────┬───────────┘
//!                        │
//!                        │ a worker dequeues it
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Read bytes  │───>│ Split lines │───>│ Execute cmd │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Send reply  │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Notes
//!
//! - Several commands in one TCP read are answered with a single flush
//! - An idle connection closes as soon as the server starts shutting down
//! - [`ConnectionStats`] is shared by every connection through the server context

pub mod handler;
pub mod stats;

// Re-export commonly used types
pub use handler::{handle_connection, ConnectionError, ConnectionHandler};
pub use stats::ConnectionStats;
