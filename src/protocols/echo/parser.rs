//! Echo protocol parser.

use bytes::BytesMut;

use super::{DELIMITER, ECHO_PREFIX};

/// Parse result.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseResult {
    /// A complete line of the given length, delimiter included.
    Complete(usize),
    /// No delimiter in the buffer yet.
    Incomplete,
}

/// Look for a complete line at the front of `input`.
///
/// `scanned` is the number of leading bytes already known to contain no
/// delimiter, so a long line arriving in many reads is only searched once.
pub fn parse(input: &[u8], scanned: usize) -> ParseResult {
    let start = scanned.min(input.len());
    match input[start..].iter().position(|&b| b == DELIMITER) {
        Some(pos) => ParseResult::Complete(start + pos + 1),
        None => ParseResult::Incomplete,
    }
}

/// Build the response for a request line.
pub fn response(line: &[u8]) -> BytesMut {
    let mut resp = BytesMut::with_capacity(ECHO_PREFIX.len() + line.len());
    resp.extend_from_slice(ECHO_PREFIX);
    resp.extend_from_slice(line);
    resp
}
