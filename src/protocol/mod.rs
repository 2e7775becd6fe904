//! Wire Protocol
//!
//! Requests are newline-terminated text lines; replies use a small set of
//! CRLF-framed types (status, error, integer, bulk, nil).
//!
//! ## Modules
//!
//! - `types`: the [`Reply`] enum and its serialization
//! - `parser`: incremental line splitting and tokenizing
//!
//! ## Example
//!
//! ```
//! use lrukv::protocol::{tokenize, LineParser, Reply};
//! use bytes::BytesMut;
//!
//! // Parsing incoming data
//! let mut buffer = BytesMut::from(&b"GET name\r\n"[..]);
//! let line = LineParser::new().next_line(&mut buffer).unwrap().unwrap();
//! assert_eq!(tokenize(&line).len(), 2);
//!
//! // Creating responses
//! let response = Reply::bulk("Ariz");
//! assert_eq!(response.serialize(), b"$4\r\nAriz\r\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{tokenize, LineParser, ParseError, ParseResult, MAX_LINE_LENGTH};
pub use types::Reply;
