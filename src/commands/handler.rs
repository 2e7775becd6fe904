//! Command Handler
//!
//! Turns one tokenized request line into one [`Reply`].
//!
//! ## Supported Commands
//!
//! ### Key Commands
//! - `SET key value [ttl_seconds]` - Store a value, optionally with a TTL
//! - `GET key` - Get a key's value
//! - `DEL key` (alias `DELETE`) - Delete a key
//! - `EXISTS key` - Check if a key exists
//! - `EXPIRE key seconds` - Set a TTL on an existing key
//! - `TTL key` - Remaining TTL in seconds (-2 missing, -1 no expiry)
//! - `INCR key` / `DECR key` - Add or subtract one
//!
//! ### Server Commands
//! - `PING` - Test connection
//! - `DBSIZE` - Number of keys
//! - `FLUSHALL` - Remove every key
//! - `INFO` - Server, traffic and cache statistics
//! - `QUIT` / `EXIT` - Close the connection
//!
//! Command names are case-insensitive. Arguments past the ones a command uses
//! are ignored.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   CommandHandler                     │
//! │                                                      │
//! │  ┌────────────┐    ┌────────────┐    ┌───────────┐   │
//! │  │ execute()  │───>│ dispatch() │───>│ cmd_xxx() │   │
//! │  └────────────┘    └────────────┘    └─────┬─────┘   │
//! │                                            │         │
//! │                                            ▼         │
//! │                  ServerContext { storage, stats }    │
//! └──────────────────────────────────────────────────────┘
//! ```

use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

use crate::protocol::Reply;
use crate::server::ServerContext;
use crate::storage::StoreError;

/// Reasons a command is rejected. Each becomes an `-ERR` reply.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    #[error("invalid expire time")]
    InvalidExpireTime,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<CommandError> for Reply {
    fn from(err: CommandError) -> Self {
        Reply::error(err)
    }
}

type CommandResult = Result<Reply, CommandError>;

/// The reply to a command plus whether the connection should close after it
/// is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub reply: Reply,
    pub close_connection: bool,
}

impl From<Reply> for CommandOutcome {
    fn from(reply: Reply) -> Self {
        Self {
            reply,
            close_connection: false,
        }
    }
}

/// Executes commands against the shared server state.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    context: Arc<ServerContext>,
}

impl CommandHandler {
    pub fn new(context: Arc<ServerContext>) -> Self {
        Self { context }
    }

    /// Executes a tokenized command line.
    ///
    /// `tokens[0]` is the command name; the rest are its arguments. Callers
    /// skip blank lines, so an empty slice only yields an error reply.
    pub fn execute(&self, tokens: &[Bytes]) -> CommandOutcome {
        let Some((name, args)) = tokens.split_first() else {
            return Reply::error("empty command").into();
        };

        let cmd = String::from_utf8_lossy(name).to_ascii_lowercase();

        if matches!(cmd.as_str(), "quit" | "exit") {
            return CommandOutcome {
                reply: Reply::ok(),
                close_connection: true,
            };
        }

        self.dispatch(&cmd, args)
            .unwrap_or_else(Reply::from)
            .into()
    }

    /// Dispatches a lower-cased command name to its handler.
    fn dispatch(&self, cmd: &str, args: &[Bytes]) -> CommandResult {
        match cmd {
            // Key commands
            "set" => self.cmd_set(args),
            "get" => self.cmd_get(args),
            "del" | "delete" => self.cmd_del(args),
            "exists" => self.cmd_exists(args),
            "expire" => self.cmd_expire(args),
            "ttl" => self.cmd_ttl(args),
            "incr" => self.cmd_incr(args),
            "decr" => self.cmd_decr(args),

            // Server commands
            "flushall" => self.cmd_flushall(),
            "dbsize" => self.cmd_dbsize(),
            "info" => self.cmd_info(),
            "ping" => Ok(Reply::pong()),

            _ => Err(CommandError::UnknownCommand(cmd.to_string())),
        }
    }

    // ========================================================================
    // Helper functions
    // ========================================================================

    /// Returns the first `N` arguments, or an arity error naming `cmd`.
    fn require<'a, const N: usize>(
        args: &'a [Bytes],
        cmd: &'static str,
    ) -> Result<&'a [Bytes; N], CommandError> {
        args.get(..N)
            .and_then(|slice| slice.try_into().ok())
            .ok_or(CommandError::WrongArity(cmd))
    }

    /// Parses a whole number of seconds.
    fn parse_seconds(arg: &[u8]) -> Result<i64, CommandError> {
        std::str::from_utf8(arg)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or(CommandError::InvalidExpireTime)
    }

    // ========================================================================
    // Key commands
    // ========================================================================

    /// SET key value [ttl_seconds]
    fn cmd_set(&self, args: &[Bytes]) -> CommandResult {
        let [key, value] = Self::require::<2>(args, "set")?;
        // A TTL of zero or less stores the value without an expiry.
        let ttl = match args.get(2) {
            Some(arg) => u64::try_from(Self::parse_seconds(arg)?)
                .ok()
                .filter(|&secs| secs > 0),
            None => None,
        };

        self.context.storage.set(key.clone(), value.clone(), ttl)?;
        Ok(Reply::ok())
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> CommandResult {
        let [key] = Self::require::<1>(args, "get")?;

        Ok(match self.context.storage.get(key) {
            Some(value) => Reply::bulk(value),
            None => Reply::Nil,
        })
    }

    /// DEL key
    fn cmd_del(&self, args: &[Bytes]) -> CommandResult {
        let [key] = Self::require::<1>(args, "del")?;
        Ok(Reply::integer(self.context.storage.delete(key) as i64))
    }

    /// EXISTS key
    fn cmd_exists(&self, args: &[Bytes]) -> CommandResult {
        let [key] = Self::require::<1>(args, "exists")?;
        Ok(Reply::integer(self.context.storage.exists(key) as i64))
    }

    /// EXPIRE key seconds
    fn cmd_expire(&self, args: &[Bytes]) -> CommandResult {
        let [key, seconds] = Self::require::<2>(args, "expire")?;
        let ttl = u64::try_from(Self::parse_seconds(seconds)?)
            .ok()
            .filter(|&secs| secs > 0)
            .ok_or(CommandError::InvalidExpireTime)?;

        let applied = self.context.storage.expire(key, ttl)?;
        Ok(Reply::integer(applied as i64))
    }

    /// TTL key
    fn cmd_ttl(&self, args: &[Bytes]) -> CommandResult {
        let [key] = Self::require::<1>(args, "ttl")?;
        Ok(Reply::integer(self.context.storage.ttl(key).as_integer()))
    }

    /// INCR key
    fn cmd_incr(&self, args: &[Bytes]) -> CommandResult {
        let [key] = Self::require::<1>(args, "incr")?;
        Ok(Reply::integer(self.context.storage.incr(key)?))
    }

    /// DECR key
    fn cmd_decr(&self, args: &[Bytes]) -> CommandResult {
        let [key] = Self::require::<1>(args, "decr")?;
        Ok(Reply::integer(self.context.storage.decr(key)?))
    }

    // ========================================================================
    // Server commands
    // ========================================================================

    /// FLUSHALL
    fn cmd_flushall(&self) -> CommandResult {
        self.context.storage.flush();
        Ok(Reply::ok())
    }

    /// DBSIZE
    fn cmd_dbsize(&self) -> CommandResult {
        Ok(Reply::integer(self.context.storage.len() as i64))
    }

    /// INFO
    fn cmd_info(&self) -> CommandResult {
        let storage = self.context.storage.stats();
        let cache = storage.cache;
        let connections = &self.context.stats;

        let info = format!(
            "# Server\r\n\
             lrukv_version:{}\r\n\
             uptime_in_seconds:{}\r\n\
             connected_clients:{}\r\n\
             \r\n\
             # Stats\r\n\
             total_connections_received:{}\r\n\
             total_commands_processed:{}\r\n\
             total_net_input_bytes:{}\r\n\
             total_net_output_bytes:{}\r\n\
             expired_keys:{}\r\n\
             \r\n\
             # Memory\r\n\
             cache_size:{}\r\n\
             cache_capacity:{}\r\n\
             cache_hits:{}\r\n\
             cache_misses:{}\r\n\
             cache_evictions:{}\r\n\
             hit_rate:{:.2}%\r\n",
            crate::VERSION,
            self.context.uptime().as_secs(),
            connections.active_connections(),
            connections.connections_accepted(),
            connections.commands_processed(),
            connections.bytes_read(),
            connections.bytes_written(),
            storage.expired_keys,
            cache.size,
            cache.capacity,
            cache.hits,
            cache.misses,
            cache.evictions,
            cache.hit_rate * 100.0,
        );

        Ok(Reply::bulk(Bytes::from(info)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ManualClock, StorageEngine};
    use std::time::Duration;

    fn create_handler() -> CommandHandler {
        let storage = StorageEngine::new(100).unwrap();
        CommandHandler::new(Arc::new(ServerContext::new(storage)))
    }

    fn create_handler_with_clock() -> (CommandHandler, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let storage = StorageEngine::with_clock(100, clock.clone()).unwrap();
        (
            CommandHandler::new(Arc::new(ServerContext::new(storage))),
            clock,
        )
    }

    fn make_command(args: &[&str]) -> Vec<Bytes> {
        args.iter().map(|s| Bytes::from(s.to_string())).collect()
    }

    fn run(handler: &CommandHandler, args: &[&str]) -> Reply {
        handler.execute(&make_command(args)).reply
    }

    #[test]
    fn test_ping() {
        let handler = create_handler();
        assert_eq!(run(&handler, &["PING"]), Reply::pong());
        assert_eq!(run(&handler, &["ping"]), Reply::pong());
    }

    #[test]
    fn test_set_get() {
        let handler = create_handler();

        assert_eq!(run(&handler, &["SET", "foo", "bar"]), Reply::ok());
        assert_eq!(run(&handler, &["GET", "foo"]), Reply::bulk("bar"));
        assert_eq!(run(&handler, &["GET", "missing"]), Reply::Nil);
    }

    #[test]
    fn test_case_insensitive_names() {
        let handler = create_handler();

        assert_eq!(run(&handler, &["sEt", "k", "v"]), Reply::ok());
        assert_eq!(run(&handler, &["get", "k"]), Reply::bulk("v"));
    }

    #[test]
    fn test_set_with_ttl() {
        let (handler, clock) = create_handler_with_clock();

        assert_eq!(run(&handler, &["SET", "session", "abc", "10"]), Reply::ok());
        assert_eq!(run(&handler, &["TTL", "session"]), Reply::integer(10));

        clock.advance(Duration::from_secs(10));
        assert_eq!(run(&handler, &["GET", "session"]), Reply::Nil);
    }

    #[test]
    fn test_set_rejects_non_integer_ttl() {
        let handler = create_handler();

        for ttl in ["soon", "1.5"] {
            assert_eq!(
                run(&handler, &["SET", "k", "v", ttl]),
                Reply::error("invalid expire time")
            );
        }
        assert_eq!(run(&handler, &["EXISTS", "k"]), Reply::integer(0));
    }

    #[test]
    fn test_set_with_non_positive_ttl_stores_without_expiry() {
        let handler = create_handler();

        assert_eq!(run(&handler, &["SET", "k", "old", "100"]), Reply::ok());
        assert_eq!(run(&handler, &["TTL", "k"]), Reply::integer(100));

        assert_eq!(run(&handler, &["SET", "k", "new", "0"]), Reply::ok());
        assert_eq!(run(&handler, &["GET", "k"]), Reply::bulk("new"));
        assert_eq!(run(&handler, &["TTL", "k"]), Reply::integer(-1));

        assert_eq!(run(&handler, &["SET", "n", "v", "-5"]), Reply::ok());
        assert_eq!(run(&handler, &["GET", "n"]), Reply::bulk("v"));
        assert_eq!(run(&handler, &["TTL", "n"]), Reply::integer(-1));
    }

    #[test]
    fn test_wrong_arity() {
        let handler = create_handler();

        assert_eq!(
            run(&handler, &["SET", "k"]),
            Reply::Error("ERR wrong number of arguments for 'set' command".to_string())
        );
        assert_eq!(
            run(&handler, &["GET"]),
            Reply::Error("ERR wrong number of arguments for 'get' command".to_string())
        );
        assert_eq!(
            run(&handler, &["DELETE"]),
            Reply::Error("ERR wrong number of arguments for 'del' command".to_string())
        );
        assert_eq!(
            run(&handler, &["EXPIRE", "k"]),
            Reply::Error("ERR wrong number of arguments for 'expire' command".to_string())
        );
    }

    #[test]
    fn test_unknown_command() {
        let handler = create_handler();

        let outcome = handler.execute(&make_command(&["FROB", "x"]));
        assert_eq!(
            outcome.reply,
            Reply::Error("ERR unknown command 'frob'".to_string())
        );
        assert!(!outcome.close_connection);
    }

    #[test]
    fn test_del_and_alias() {
        let handler = create_handler();

        run(&handler, &["SET", "a", "1"]);
        run(&handler, &["SET", "b", "2"]);

        assert_eq!(run(&handler, &["DEL", "a"]), Reply::integer(1));
        assert_eq!(run(&handler, &["DEL", "a"]), Reply::integer(0));
        assert_eq!(run(&handler, &["delete", "b"]), Reply::integer(1));
    }

    #[test]
    fn test_exists() {
        let handler = create_handler();

        assert_eq!(run(&handler, &["EXISTS", "k"]), Reply::integer(0));
        run(&handler, &["SET", "k", "v"]);
        assert_eq!(run(&handler, &["EXISTS", "k"]), Reply::integer(1));
    }

    #[test]
    fn test_expire_and_ttl() {
        let (handler, clock) = create_handler_with_clock();

        assert_eq!(run(&handler, &["EXPIRE", "foo", "10"]), Reply::integer(0));
        assert_eq!(run(&handler, &["TTL", "foo"]), Reply::integer(-2));

        run(&handler, &["SET", "foo", "bar"]);
        assert_eq!(run(&handler, &["TTL", "foo"]), Reply::integer(-1));
        assert_eq!(run(&handler, &["EXPIRE", "foo", "10"]), Reply::integer(1));

        match run(&handler, &["TTL", "foo"]) {
            Reply::Integer(secs) => assert!((1..=10).contains(&secs)),
            other => panic!("unexpected reply: {:?}", other),
        }

        clock.advance(Duration::from_secs(11));
        assert_eq!(run(&handler, &["GET", "foo"]), Reply::Nil);
        assert_eq!(run(&handler, &["DBSIZE"]), Reply::integer(0));
    }

    #[test]
    fn test_expire_rejects_non_positive() {
        let handler = create_handler();
        run(&handler, &["SET", "foo", "bar"]);

        assert_eq!(
            run(&handler, &["EXPIRE", "foo", "0"]),
            Reply::error("invalid expire time")
        );
        assert_eq!(
            run(&handler, &["EXPIRE", "foo", "ten"]),
            Reply::error("invalid expire time")
        );
        assert_eq!(run(&handler, &["TTL", "foo"]), Reply::integer(-1));
    }

    #[test]
    fn test_incr_decr() {
        let handler = create_handler();

        assert_eq!(run(&handler, &["INCR", "counter"]), Reply::integer(1));
        assert_eq!(run(&handler, &["INCR", "counter"]), Reply::integer(2));
        assert_eq!(run(&handler, &["DECR", "counter"]), Reply::integer(1));
        assert_eq!(run(&handler, &["DECR", "fresh"]), Reply::integer(-1));

        run(&handler, &["SET", "counter", "abc"]);
        assert_eq!(
            run(&handler, &["INCR", "counter"]),
            Reply::Error("ERR value is not an integer or out of range".to_string())
        );
    }

    #[test]
    fn test_key_too_long() {
        let handler = create_handler();
        let key = "k".repeat(257);

        assert_eq!(
            run(&handler, &["SET", &key, "v"]),
            Reply::error("key too long")
        );
    }

    #[test]
    fn test_flushall_and_dbsize() {
        let handler = create_handler();

        for i in 0..5 {
            run(&handler, &["SET", &format!("key{}", i), "v"]);
        }
        assert_eq!(run(&handler, &["DBSIZE"]), Reply::integer(5));

        assert_eq!(run(&handler, &["FLUSHALL"]), Reply::ok());
        assert_eq!(run(&handler, &["DBSIZE"]), Reply::integer(0));
    }

    #[test]
    fn test_quit_and_exit_close() {
        let handler = create_handler();

        for cmd in ["QUIT", "exit"] {
            let outcome = handler.execute(&make_command(&[cmd]));
            assert_eq!(outcome.reply, Reply::ok());
            assert!(outcome.close_connection);
        }
    }

    #[test]
    fn test_incr_overflow_is_out_of_range() {
        let handler = create_handler();

        let max = i64::MAX.to_string();
        run(&handler, &["SET", "big", max.as_str()]);
        assert_eq!(
            run(&handler, &["INCR", "big"]),
            Reply::error("value is not an integer or out of range")
        );
        assert_eq!(run(&handler, &["GET", "big"]), Reply::bulk(max));
    }

    #[test]
    fn test_info() {
        let handler = create_handler();
        run(&handler, &["SET", "a", "1"]);
        run(&handler, &["GET", "a"]);
        run(&handler, &["GET", "b"]);

        let info = match run(&handler, &["INFO"]) {
            Reply::Bulk(body) => String::from_utf8(body.to_vec()).unwrap(),
            other => panic!("unexpected reply: {:?}", other),
        };

        assert!(info.starts_with("# Server\r\n"));
        assert!(info.contains("# Stats\r\n"));
        assert!(info.contains("# Memory\r\n"));
        assert!(info.contains("cache_size:1\r\n"));
        assert!(info.contains("cache_capacity:100\r\n"));
        assert!(info.contains("cache_hits:1\r\n"));
        assert!(info.contains("cache_misses:1\r\n"));
        assert!(info.contains("hit_rate:50.00%\r\n"));
        assert!(info.contains("total_net_input_bytes:0\r\n"));
        assert!(info.contains("total_net_output_bytes:0\r\n"));
    }
}
