//! Line-delimited JSON-RPC transport
//!
//! One request per line in, one response per line out. Stdout carries only
//! protocol traffic; logs go to stderr.

use super::protocol::{JsonRpcRequest, JsonRpcResponse};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

pub struct AsyncLineTransport<R, W> {
    reader: R,
    writer: W,
}

/// Transport over the process's stdin and stdout
pub type AsyncStdioTransport = AsyncLineTransport<BufReader<tokio::io::Stdin>, tokio::io::Stdout>;

impl AsyncStdioTransport {
    pub fn stdio() -> Self {
        AsyncLineTransport::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> AsyncLineTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Read the next request, skipping blank lines
    ///
    /// `Ok(None)` means the peer closed the stream. A line that is not a
    /// JSON-RPC request is an `InvalidData` error; the stream stays usable.
    pub async fn read_request(&mut self) -> io::Result<Option<JsonRpcRequest>> {
        loop {
            let mut line = String::new();
            let bytes_read = self.reader.read_line(&mut line).await?;
            if bytes_read == 0 {
                return Ok(None);
            }

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            return match serde_json::from_str(line) {
                Ok(request) => Ok(Some(request)),
                Err(e) => {
                    tracing::error!("Failed to parse JSON-RPC request: {}", e);
                    Err(io::Error::new(io::ErrorKind::InvalidData, e))
                }
            };
        }
    }

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::JsonRpcError;

    #[tokio::test]
    async fn test_reads_requests_and_skips_blank_lines() {
        let input = b"\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n\n{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/list\"}\n";
        let mut transport = AsyncLineTransport::new(&input[..], Vec::new());

        let first = transport.read_request().await.unwrap().unwrap();
        assert_eq!(first.method, "ping");
        let second = transport.read_request().await.unwrap().unwrap();
        assert_eq!(second.method, "tools/list");
        assert!(transport.read_request().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_garbage_line_is_invalid_data() {
        let input = b"not json\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n";
        let mut transport = AsyncLineTransport::new(&input[..], Vec::new());

        let err = transport.read_request().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(transport.read_request().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_writes_one_line_per_response() {
        let mut transport = AsyncLineTransport::new(&b""[..], Vec::new());
        transport
            .write_response(&JsonRpcResponse::success(
                Some(serde_json::json!(1)),
                serde_json::json!({"status": "ok"}),
            ))
            .await
            .unwrap();
        transport
            .write_response(&JsonRpcResponse::error(
                Some(serde_json::json!(2)),
                JsonRpcError::method_not_found("unknown"),
            ))
            .await
            .unwrap();

        let out = String::from_utf8(transport.into_writer()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"result\""));
        assert!(lines[1].contains("-32601"));
    }
}
