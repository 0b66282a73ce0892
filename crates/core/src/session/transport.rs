use std::io::{BufRead, Write};

use thiserror::Error;

use crate::session::protocol::{ClientMessage, ServerMessage};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// One unparseable message; the connection itself is still usable.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Blocking message seam between a session and its connection.
///
/// `recv` returning `Ok(None)` means the peer closed cleanly. The
/// coordinator reads strictly one message at a time, which is what bounds
/// in-flight frames to one: backpressure instead of buffering.
pub trait MessageTransport {
    fn recv(&mut self) -> Result<Option<ClientMessage>, TransportError>;

    fn send(&mut self, message: &ServerMessage) -> Result<(), TransportError>;
}

/// JSON Lines framing over any `BufRead`/`Write` pair: one JSON message
/// per newline-terminated line. The CLI runs this over TCP streams.
pub struct JsonLinesTransport<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> JsonLinesTransport<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

impl<R: BufRead, W: Write> MessageTransport for JsonLinesTransport<R, W> {
    fn recv(&mut self) -> Result<Option<ClientMessage>, TransportError> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            if line.trim().is_empty() {
                continue;
            }
            return Ok(Some(serde_json::from_str(line.trim())?));
        }
    }

    fn send(&mut self, message: &ServerMessage) -> Result<(), TransportError> {
        serde_json::to_writer(&mut self.writer, message)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
