//! Newline-delimited framing for attach connections.
//!
//! Wraps [`tokio_util::codec::AnyDelimiterCodec`] with a maximum line
//! length so a peer that never sends `\n` cannot grow the receive buffer
//! without bound. Partial reads are buffered inside the codec; each
//! `decode` yields at most one complete line and keeps any trailing
//! fragment for the next read.
//!
//! Lines are framed as raw bytes. UTF-8 and JSON validity are checked by
//! [`AttachMessage::parse_line`], so a line of invalid UTF-8 is discarded
//! like any other malformed line instead of failing the stream.
//!
//! # Usage
//!
//! Use [`AttachCodec`] as the codec for [`tokio_util::codec::FramedRead`]
//! on the receive half of an attach connection, and [`write_message`] on
//! the send half.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, Encoder};

use super::protocol::AttachMessage;
use crate::{AppError, Result};

/// Maximum accepted line length: 64 KiB.
///
/// Handshake messages are a few hundred bytes; anything near this limit is
/// a misbehaving peer.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Line codec for handshake messages.
///
/// Each `\n`-terminated chunk of bytes is one candidate message. A trailing
/// `\r` is stripped so CRLF peers frame the same way.
///
/// # Decoder
///
/// Yields [`Bytes`] without the terminator. Returns `Ok(None)` while no
/// complete line is buffered. A line longer than the configured limit
/// returns [`AppError::Transport`]`("line too long: …")`; callers treat
/// that as fatal for the connection. Bytes are never validated here.
///
/// # Encoder
///
/// Outbound strings are encoded as `item\n`. The length limit is a
/// decoder-side concern and is not enforced when encoding.
///
/// # Examples
///
/// ```rust,ignore
/// use tokio_util::codec::FramedRead;
/// use agent_beacon::attach::codec::AttachCodec;
/// use agent_beacon::attach::protocol::AttachMessage;
///
/// let mut lines = FramedRead::new(recv_half, AttachCodec::new());
/// while let Some(line) = lines.next().await {
///     let Some(message) = AttachMessage::parse_line(&line?) else {
///         continue;
///     };
///     // ...
/// }
/// ```
#[derive(Debug)]
pub struct AttachCodec {
    inner: AnyDelimiterCodec,
    max_length: usize,
}

impl AttachCodec {
    /// Codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Codec with a custom limit.
    #[must_use]
    pub fn with_max_length(max: usize) -> Self {
        Self {
            inner: AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), b"\n".to_vec(), max),
            max_length: max,
        }
    }
}

impl Default for AttachCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for AttachCodec {
    type Item = Bytes;
    type Error = AppError;

    /// Decode the next newline-terminated line from `src`.
    ///
    /// Returns `Ok(None)` while no complete line is buffered.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let line = self
            .inner
            .decode(src)
            .map_err(|e| map_codec_error(e, self.max_length))?;
        Ok(line.map(strip_cr))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let line = self
            .inner
            .decode_eof(src)
            .map_err(|e| map_codec_error(e, self.max_length))?;
        Ok(line.map(strip_cr))
    }
}

impl Encoder<String> for AttachCodec {
    type Error = AppError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        self.inner
            .encode(item, dst)
            .map_err(|e| map_codec_error(e, self.max_length))
    }
}

fn strip_cr(mut line: Bytes) -> Bytes {
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
    line
}

fn map_codec_error(e: AnyDelimiterCodecError, max_length: usize) -> AppError {
    match e {
        AnyDelimiterCodecError::MaxChunkLengthExceeded => {
            AppError::Transport(format!("line too long: exceeded {max_length} bytes"))
        }
        AnyDelimiterCodecError::Io(io_err) => AppError::Transport(io_err.to_string()),
    }
}

/// Write `message` as one `\n`-terminated line and flush.
///
/// # Errors
///
/// Returns `AppError::Protocol` if the message cannot be encoded and
/// `AppError::Transport` if the write fails.
pub async fn write_message<W>(writer: &mut W, message: &AttachMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = message.to_line()?;
    line.push('\n');
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(|err| AppError::Transport(format!("failed to send {}: {err}", message.kind())))?;
    writer
        .flush()
        .await
        .map_err(|err| AppError::Transport(format!("failed to flush {}: {err}", message.kind())))
}
