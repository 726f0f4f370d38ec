//! Echo protocol implementation.
//!
//! A line-oriented echo service:
//! - Client sends: `<bytes>\n`
//! - Server echoes: `Echo: <bytes>\n`
//!
//! ## Protocol Format
//!
//! A line is every byte up to and including the first `\n`. The response is
//! the literal ASCII prefix followed by the exact bytes of the request line,
//! delimiter included. Nothing is trimmed, decoded or re-encoded, so `\r\n`
//! terminated lines come back with their `\r` intact.
//!
//! ```text
//! Request:  hello world\n
//! Response: Echo: hello world\n
//! ```
//!
//! Bytes that are still unterminated when the client closes its write side
//! are dropped without a response. There is no maximum line length.

pub mod handler;
pub mod parser;

pub use handler::handle_connection;

/// Prefix written in front of every echoed line.
pub const ECHO_PREFIX: &[u8] = b"Echo: ";

/// Line delimiter.
pub const DELIMITER: u8 = b'\n';
