//! Incremental Line Parser
//!
//! Requests are plain text lines terminated by `\n` (an optional `\r` before it
//! is dropped). The first whitespace-separated token is the command name and
//! the rest are its arguments:
//!
//! ```text
//! SET greeting hello 60\r\n
//! └┬┘ └──┬───┘ └─┬─┘ └┬┘
//!  │     │       │    └─ ttl_seconds
//!  │     │       └────── value
//!  │     └────────────── key
//!  └──────────────────── command name
//! ```
//!
//! The parser works on the connection's `BytesMut` read buffer. Each complete
//! line is split off the front of the buffer and frozen, so the returned tokens
//! are cheap `Bytes` slices of the received data rather than copies.
//!
//! Results follow the usual incremental shape:
//! - `Ok(Some(line))` - a complete line was removed from the buffer
//! - `Ok(None)` - no newline yet, read more data
//! - `Err(ParseError)` - the pending line is longer than allowed

use bytes::{Bytes, BytesMut};
use thiserror::Error;

use crate::storage::{MAX_KEY_LEN, MAX_VALUE_LEN};

/// Longest request line accepted: a maximal key and value plus slack for the
/// command name, a TTL and separators.
pub const MAX_LINE_LENGTH: usize = MAX_KEY_LEN + MAX_VALUE_LEN + 1024;

/// Errors that can occur while splitting request lines.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A line grew past [`MAX_LINE_LENGTH`] without a terminating newline.
    #[error("line too long")]
    LineTooLong { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Splits newline-terminated lines off a read buffer.
///
/// The parser remembers how much of the pending data it already searched, so
/// a large line arriving in many small reads is scanned only once.
///
/// # Example
///
/// ```
/// use lrukv::protocol::{tokenize, LineParser};
/// use bytes::BytesMut;
///
/// let mut parser = LineParser::new();
/// let mut buffer = BytesMut::from(&b"GET na"[..]);
/// assert!(parser.next_line(&mut buffer).unwrap().is_none());
///
/// buffer.extend_from_slice(b"me\r\n");
/// let line = parser.next_line(&mut buffer).unwrap().unwrap();
/// assert_eq!(tokenize(&line), vec!["GET", "name"]);
/// ```
#[derive(Debug, Default)]
pub struct LineParser {
    /// Bytes at the front of the buffer already known to hold no newline.
    searched: usize,
}

impl LineParser {
    pub fn new() -> Self {
        Self { searched: 0 }
    }

    /// Removes the next complete line from `buf`, without its terminator.
    pub fn next_line(&mut self, buf: &mut BytesMut) -> ParseResult<Option<Bytes>> {
        let start = self.searched.min(buf.len());

        let newline = match buf[start..].iter().position(|&b| b == b'\n') {
            Some(offset) => start + offset,
            None => {
                self.searched = buf.len();
                if buf.len() > MAX_LINE_LENGTH {
                    return Err(ParseError::LineTooLong {
                        size: buf.len(),
                        max: MAX_LINE_LENGTH,
                    });
                }
                return Ok(None);
            }
        };

        self.searched = 0;
        if newline > MAX_LINE_LENGTH {
            return Err(ParseError::LineTooLong {
                size: newline,
                max: MAX_LINE_LENGTH,
            });
        }

        let mut line = buf.split_to(newline + 1).freeze();
        line.truncate(newline);
        if line.last() == Some(&b'\r') {
            line.truncate(newline - 1);
        }

        Ok(Some(line))
    }
}

/// Splits a line into space- or tab-separated tokens.
///
/// Runs of separators count as one; a blank line yields no tokens.
pub fn tokenize(line: &Bytes) -> Vec<Bytes> {
    let mut tokens = Vec::new();
    let mut start = None;

    for (i, &b) in line.iter().enumerate() {
        let is_separator = b == b' ' || b == b'\t';
        match (start, is_separator) {
            (None, false) => start = Some(i),
            (Some(s), true) => {
                tokens.push(line.slice(s..i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        tokens.push(line.slice(s..));
    }

    tokens
}
