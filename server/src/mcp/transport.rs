//! Newline-delimited JSON-RPC transport
//!
//! One message per line. Generic over the reader and writer so the server
//! loop runs the same over stdio and in-memory pipes.

use super::protocol::{JsonRpcRequest, JsonRpcResponse};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// A line read from the peer
#[derive(Debug)]
pub enum Incoming {
    Request(JsonRpcRequest),
    /// Line that is not a valid JSON-RPC request
    Malformed(String),
}

pub struct Transport<R, W> {
    reader: R,
    writer: W,
}

/// Transport over the process's stdin and stdout
pub type StdioTransport = Transport<BufReader<tokio::io::Stdin>, tokio::io::Stdout>;

impl StdioTransport {
    pub fn stdio() -> Self {
        Transport::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> Transport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Read the next message, skipping blank lines; `None` at EOF
    pub async fn read_message(&mut self) -> io::Result<Option<Incoming>> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                return Ok(None);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            return Ok(Some(match serde_json::from_str(trimmed) {
                Ok(request) => Incoming::Request(request),
                Err(e) => {
                    tracing::error!("Failed to parse JSON-RPC request: {}", e);
                    Incoming::Malformed(e.to_string())
                }
            }));
        }
    }

    /// Write a response as a single line
    pub async fn write_response(&mut self, response: &JsonRpcResponse) -> io::Result<()> {
        let json = serde_json::to_string(response)?;
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}
