//! Connection Handler
//!
//! Each accepted client is served by one handler for its whole lifetime. The
//! handler runs as a task on the worker pool, reading request lines and
//! writing replies until the client leaves, sends QUIT, or the server shuts
//! down.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects, the accept loop queues a handler
//!        │
//!        ▼
//! 2. A pool worker picks the handler up
//!        │
//!        ▼
//! 3. ┌──────────────────────────────────┐
//!    │      Main Loop                   │
//!    │                                  │
//!    │  ┌─────────────────────────────┐ │
//!    │  │ Split complete lines off    │ │
//!    │  │ the read buffer             │ │
//!    │  └─────────────┬───────────────┘ │
//!    │                ▼                 │
//!    │  ┌─────────────────────────────┐ │
//!    │  │ Execute, buffer the reply   │ │
//!    │  └─────────────┬───────────────┘ │
//!    │                ▼                 │
//!    │  ┌─────────────────────────────┐ │
//!    │  │ Flush replies, then read    │ │
//!    │  │ (or stop on shutdown)       │ │
//!    │  └─────────────┬───────────────┘ │
//!    │                ▼                 │
//!    │           [Loop back]            │
//!    └──────────────────────────────────┘
//!        │
//!        ▼
//! 4. QUIT / EOF / error / shutdown: handler ends, socket closes
//! ```
//!
//! ## Buffer Management
//!
//! Incoming data accumulates in a `BytesMut`. TCP is a stream protocol, so a
//! read may hold half a line or several lines at once. Replies to every
//! complete line in the buffer are written before the next flush, which keeps
//! pipelined clients to one syscall per batch.

use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::commands::CommandHandler;
use crate::connection::ConnectionStats;
use crate::protocol::{tokenize, LineParser, ParseError, Reply};
use crate::server::ServerContext;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Handles a single client connection.
///
/// Generic over the stream so tests can drive it with in-memory I/O.
pub struct ConnectionHandler<S> {
    /// The client stream, buffered for writes
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    parser: LineParser,

    command_handler: CommandHandler,

    context: Arc<ServerContext>,

    /// Flips to `true` when the server begins shutting down
    shutdown: watch::Receiver<bool>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a handler and counts the connection as active.
    pub fn new(stream: S, addr: SocketAddr, context: Arc<ServerContext>) -> Self {
        context.stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: LineParser::new(),
            command_handler: CommandHandler::new(Arc::clone(&context)),
            shutdown: context.subscribe_shutdown(),
            context,
        }
    }

    fn stats(&self) -> &ConnectionStats {
        &self.context.stats
    }

    /// Runs the connection until the client leaves or the server stops.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    debug!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::ServerShutdown => {
                    debug!(client = %self.addr, "Closing connection for shutdown")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        // Best effort: the peer may already be gone.
        let _ = self.stream.shutdown().await;
        self.stats().connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(tokens) = self.try_parse_line().await? {
                if tokens.is_empty() {
                    continue;
                }

                let outcome = self.command_handler.execute(&tokens);
                self.stats().command_processed();
                self.write_reply(&outcome.reply).await?;

                if outcome.close_connection {
                    self.stream.flush().await?;
                    return Ok(());
                }
            }

            self.stream.flush().await?;
            self.read_more_data().await?;
        }
    }

    /// Splits the next complete line off the buffer and tokenizes it.
    ///
    /// An over-long line is answered with an error before the connection is
    /// dropped.
    async fn try_parse_line(&mut self) -> Result<Option<Vec<Bytes>>, ConnectionError> {
        match self.parser.next_line(&mut self.buffer) {
            Ok(Some(line)) => {
                trace!(
                    client = %self.addr,
                    len = line.len(),
                    remaining = self.buffer.len(),
                    "Parsed line"
                );
                Ok(Some(tokenize(&line)))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(client = %self.addr, error = %e, "Parse error");
                self.write_reply(&Reply::error(&e)).await?;
                self.stream.flush().await?;
                Err(ConnectionError::ParseError(e))
            }
        }
    }

    /// Reads more data from the socket into the buffer, or stops if the
    /// server is shutting down.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        // Ensure we have some capacity
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = tokio::select! {
            result = self.stream.get_mut().read_buf(&mut self.buffer) => result?,
            _ = self.shutdown.wait_for(|&stopping| stopping) => {
                return Err(ConnectionError::ServerShutdown);
            }
        };

        if n == 0 {
            // Connection closed by client
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                // Partial line in buffer
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        self.stats().record_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    /// Queues a reply in the write buffer.
    async fn write_reply(&mut self, reply: &Reply) -> Result<(), ConnectionError> {
        let bytes = reply.serialize();
        self.stream.write_all(&bytes).await?;
        self.stats().record_written(bytes.len());
        trace!(client = %self.addr, bytes = bytes.len(), reply = %reply, "Queued reply");
        Ok(())
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial line)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    #[error("Server shutting down")]
    ServerShutdown,
}

/// Serves an accepted TCP connection to completion.
///
/// This is the work item the server submits to the pool for every client.
pub async fn handle_connection(stream: TcpStream, addr: SocketAddr, context: Arc<ServerContext>) {
    let handler = ConnectionHandler::new(stream, addr, context);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected | ConnectionError::ServerShutdown => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MAX_LINE_LENGTH;
    use crate::storage::StorageEngine;
    use std::time::Duration;
    use tokio_test::io::Builder;

    fn test_context() -> Arc<ServerContext> {
        Arc::new(ServerContext::new(StorageEngine::new(100).unwrap()))
    }

    fn test_addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let stream = Builder::new().read(b"PING\r\n").write(b"+PONG\r\n").build();
        let context = test_context();

        let result = ConnectionHandler::new(stream, test_addr(), Arc::clone(&context))
            .run()
            .await;

        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
        assert_eq!(context.stats.commands_processed(), 1);
        assert_eq!(context.stats.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_set_get_across_reads() {
        let stream = Builder::new()
            .read(b"SET name Ar")
            .read(b"iz\r\nGET name\n")
            .write(b"+OK\r\n$4\r\nAriz\r\n")
            .read(b"GET missing\r\n")
            .write(b"$-1\r\n")
            .build();

        let result = ConnectionHandler::new(stream, test_addr(), test_context())
            .run()
            .await;
        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
    }

    #[tokio::test]
    async fn test_blank_lines_are_ignored() {
        let stream = Builder::new()
            .read(b"\r\n   \r\nPING\r\n\n")
            .write(b"+PONG\r\n")
            .build();
        let context = test_context();

        let _ = ConnectionHandler::new(stream, test_addr(), Arc::clone(&context))
            .run()
            .await;
        assert_eq!(context.stats.commands_processed(), 1);
    }

    #[tokio::test]
    async fn test_errors_keep_connection_open() {
        let stream = Builder::new()
            .read(b"FOO bar\r\n")
            .write(b"-ERR unknown command 'foo'\r\n")
            .read(b"GET\r\n")
            .write(b"-ERR wrong number of arguments for 'get' command\r\n")
            .read(b"PING\r\n")
            .write(b"+PONG\r\n")
            .build();

        let result = ConnectionHandler::new(stream, test_addr(), test_context())
            .run()
            .await;
        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
    }

    #[tokio::test]
    async fn test_quit_closes_after_reply() {
        // Nothing after QUIT is read or answered.
        let stream = Builder::new()
            .read(b"SET a 1\r\nQUIT\r\nSET b 2\r\n")
            .write(b"+OK\r\n+OK\r\n")
            .build();
        let context = test_context();

        let result = ConnectionHandler::new(stream, test_addr(), Arc::clone(&context))
            .run()
            .await;

        assert!(result.is_ok());
        assert!(context.storage.exists(b"a"));
        assert!(!context.storage.exists(b"b"));
    }

    #[tokio::test]
    async fn test_partial_line_at_eof() {
        let stream = Builder::new().read(b"GET fo").build();

        let result = ConnectionHandler::new(stream, test_addr(), test_context())
            .run()
            .await;
        assert!(matches!(result, Err(ConnectionError::UnexpectedEof)));
    }

    #[tokio::test]
    async fn test_line_too_long_closes() {
        let oversized = vec![b'x'; MAX_LINE_LENGTH + 1];
        let stream = Builder::new()
            .read(&oversized)
            .write(b"-ERR line too long\r\n")
            .build();

        let result = ConnectionHandler::new(stream, test_addr(), test_context())
            .run()
            .await;
        assert!(matches!(result, Err(ConnectionError::ParseError(_))));
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_connection() {
        let (client, server) = tokio::io::duplex(1024);
        let context = test_context();

        let task = tokio::spawn(
            ConnectionHandler::new(server, test_addr(), Arc::clone(&context)).run(),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        context.signal_shutdown();

        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("handler did not stop")
            .unwrap();
        assert!(matches!(result, Err(ConnectionError::ServerShutdown)));
        assert_eq!(context.stats.active_connections(), 0);
        drop(client);
    }
}
