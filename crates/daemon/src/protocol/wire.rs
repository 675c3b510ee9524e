// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire format encoding/decoding for the control socket protocol.
//!
//! Wire format: one JSON object per line, terminated by ASCII LF
//! (spec.md §4.2 "Protocol"). Unlike a length-prefixed scheme, a frame's
//! extent is discovered by scanning for the delimiter, so partial reads
//! are buffered rather than pre-sized.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("timeout")]
    Timeout,
}

/// Suggested per-command timeouts (spec.md §6 "Clients must treat
/// absence of a response ... as a transport error").
pub const ROUTE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);
pub const DISPATCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Encode a message to one JSON line, without the trailing LF (callers
/// that need the delimiter use [`write_line`]).
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(msg)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Read one LF-delimited frame. Returns `Ok(None)` on a clean EOF with
/// no partial data (the far end closed the connection between frames).
/// Empty or whitespace-only lines are skipped (spec.md §4.2 "Framing
/// rules").
pub async fn read_frame<R: AsyncBufReadExt + Unpin>(
    reader: &mut R,
) -> Result<Option<Vec<u8>>, ProtocolError> {
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        return Ok(Some(trimmed.as_bytes().to_vec()));
    }
}

/// Write one frame followed by LF, flushing immediately.
pub async fn write_frame<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), ProtocolError> {
    writer.write_all(data).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame with a timeout, decoding it as `T`.
pub async fn read_request<R: AsyncBufReadExt + Unpin, T: DeserializeOwned>(
    reader: &mut R,
    timeout: std::time::Duration,
) -> Result<T, ProtocolError> {
    let frame = tokio::time::timeout(timeout, read_frame(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??
        .ok_or(ProtocolError::ConnectionClosed)?;
    decode(&frame)
}

/// Encode and write a response with a timeout.
pub async fn write_response<W: tokio::io::AsyncWrite + Unpin, T: Serialize>(
    writer: &mut W,
    response: &T,
    timeout: std::time::Duration,
) -> Result<(), ProtocolError> {
    let data = encode(response)?;
    tokio::time::timeout(timeout, write_frame(writer, &data))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn reads_one_frame_per_line() {
        let data = b"{\"type\":\"status_request\"}\n{\"type\":\"ping\"}\n".to_vec();
        let mut reader = BufReader::new(Cursor::new(data));
        let first = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(first, b"{\"type\":\"status_request\"}");
        let second = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(second, b"{\"type\":\"ping\"}");
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn skips_blank_lines() {
        let data = b"\n   \n{\"type\":\"status_request\"}\n".to_vec();
        let mut reader = BufReader::new(Cursor::new(data));
        let frame = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(frame, b"{\"type\":\"status_request\"}");
    }

    #[tokio::test]
    async fn write_frame_appends_newline() {
        let mut out = Vec::new();
        write_frame(&mut out, b"{}").await.unwrap();
        assert_eq!(out, b"{}\n");
    }
}
