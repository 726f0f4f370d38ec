//! Echo protocol handler for the Tokio runtime.

use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::parser::{self, ParseResult};

/// Initial read buffer size; the buffer grows for longer lines.
const BUFFER_SIZE: usize = 4096;

/// Handle an echo protocol connection.
///
/// Reads newline-terminated lines and writes each one back behind
/// [`ECHO_PREFIX`](super::ECHO_PREFIX). A response is written in full before
/// the next line is looked at. Returns `Ok(())` once the peer closes its
/// write side; read and write failures are logged and returned. The stream
/// is dropped, and so closed, on every return path.
pub async fn handle_connection<S>(mut stream: S) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);
    let mut scanned = 0;

    loop {
        match parser::parse(&buffer, scanned) {
            ParseResult::Complete(len) => {
                let line = buffer.split_to(len);
                scanned = 0;
                info!(request = %line.escape_ascii(), "Received request");

                let response = parser::response(&line);
                info!(response = %response.escape_ascii(), "Sending response");

                if let Err(e) = stream.write_all(&response).await {
                    warn!(error = %e, "Failed to write data");
                    return Err(e);
                }
                info!("Response sent");
            }

            ParseResult::Incomplete => {
                scanned = buffer.len();

                match stream.read_buf(&mut buffer).await {
                    Ok(0) => {
                        if !buffer.is_empty() {
                            debug!(bytes = buffer.len(), "Discarding unterminated line");
                        }
                        debug!("Connection closed by client");
                        return Ok(());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Failed to read data");
                        return Err(e);
                    }
                }
            }
        }
    }
}
