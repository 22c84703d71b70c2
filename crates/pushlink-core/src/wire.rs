//! Wire format
//!
//! Three layers, innermost first:
//! - a *unit* is a list of byte parts, encoded as `u32` part count followed by
//!   `u32` length + bytes per part (all big-endian);
//! - an encoded unit is split into chunks, each prefixed by a flag byte
//!   ([`FLAG_MORE`] or [`FLAG_LAST`]) and encrypted as one Noise message;
//! - every Noise message goes on the socket as a `u16` big-endian length and
//!   the message bytes.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::crypto::{MAX_NOISE_MESSAGE, NOISE_TAG_LEN};
use crate::errors::ProtocolFramingError;

/// Another chunk of the same unit follows
pub const FLAG_MORE: u8 = 0x01;

/// Final chunk of a unit
pub const FLAG_LAST: u8 = 0x00;

/// Unit bytes carried by one transport message
pub const MAX_CHUNK: usize = MAX_NOISE_MESSAGE - NOISE_TAG_LEN - 1;

// ----------------------------------------------------------------------------
// Multipart Units
// ----------------------------------------------------------------------------

/// Encode parts into a single unit
pub fn encode_parts<P: AsRef<[u8]>>(parts: &[P]) -> Vec<u8> {
    let total: usize = parts.iter().map(|p| 4 + p.as_ref().len()).sum();
    let mut out = Vec::with_capacity(4 + total);

    out.extend_from_slice(&(parts.len() as u32).to_be_bytes());
    for part in parts {
        let part = part.as_ref();
        out.extend_from_slice(&(part.len() as u32).to_be_bytes());
        out.extend_from_slice(part);
    }
    out
}

/// Decode a unit into its parts
pub fn decode_parts(unit: &[u8]) -> Result<Vec<Vec<u8>>, ProtocolFramingError> {
    let mut cursor = unit;
    let count = take_u32(&mut cursor)? as usize;

    // Every part needs at least its length prefix, which bounds the
    // allocation no matter what count the sender claims.
    if count > cursor.len() / 4 {
        return Err(ProtocolFramingError::Truncated);
    }

    let mut parts = Vec::with_capacity(count);
    for _ in 0..count {
        let len = take_u32(&mut cursor)? as usize;
        if len > cursor.len() {
            return Err(ProtocolFramingError::Truncated);
        }
        let (part, rest) = cursor.split_at(len);
        parts.push(part.to_vec());
        cursor = rest;
    }

    if !cursor.is_empty() {
        return Err(ProtocolFramingError::TrailingBytes(cursor.len()));
    }
    Ok(parts)
}

fn take_u32(cursor: &mut &[u8]) -> Result<u32, ProtocolFramingError> {
    if cursor.len() < 4 {
        return Err(ProtocolFramingError::Truncated);
    }
    let (head, rest) = cursor.split_at(4);
    *cursor = rest;
    Ok(u32::from_be_bytes([head[0], head[1], head[2], head[3]]))
}

// ----------------------------------------------------------------------------
// Chunking
// ----------------------------------------------------------------------------

/// Split an encoded unit into flagged chunk plaintexts
pub fn chunk_unit(unit: &[u8]) -> Vec<Vec<u8>> {
    if unit.is_empty() {
        return vec![vec![FLAG_LAST]];
    }

    let mut chunks: Vec<Vec<u8>> = unit
        .chunks(MAX_CHUNK)
        .map(|chunk| {
            let mut plaintext = Vec::with_capacity(chunk.len() + 1);
            plaintext.push(FLAG_MORE);
            plaintext.extend_from_slice(chunk);
            plaintext
        })
        .collect();

    if let Some(last) = chunks.last_mut() {
        last[0] = FLAG_LAST;
    }
    chunks
}

/// Incrementally rebuilds a unit from chunk plaintexts
#[derive(Debug)]
pub struct UnitAssembler {
    buffer: Vec<u8>,
    max_unit: usize,
}

impl UnitAssembler {
    pub fn new(max_unit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_unit,
        }
    }

    /// Feed one chunk; returns the finished unit after its last chunk.
    ///
    /// Any error discards the unit in progress.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<Vec<u8>>, ProtocolFramingError> {
        let Some((&flag, body)) = chunk.split_first() else {
            self.buffer.clear();
            return Err(ProtocolFramingError::EmptyFrame);
        };

        if flag != FLAG_MORE && flag != FLAG_LAST {
            self.buffer.clear();
            return Err(ProtocolFramingError::UnknownFlag(flag));
        }

        let size = self.buffer.len() + body.len();
        if size > self.max_unit {
            self.buffer.clear();
            return Err(ProtocolFramingError::Oversized {
                size,
                max: self.max_unit,
            });
        }

        self.buffer.extend_from_slice(body);
        if flag == FLAG_MORE {
            return Ok(None);
        }
        Ok(Some(std::mem::take(&mut self.buffer)))
    }
}

// ----------------------------------------------------------------------------
// Socket Frames
// ----------------------------------------------------------------------------

/// Write one length-prefixed frame
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = u16::try_from(frame.len()).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("frame of {} bytes exceeds {}", frame.len(), MAX_NOISE_MESSAGE),
        )
    })?;

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(frame).await?;
    writer.flush().await
}

/// Read one length-prefixed frame; `None` on a clean close between frames
pub async fn read_frame<R>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len = [0u8; 2];
    match reader.read_exact(&mut len).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let mut frame = vec![0u8; u16::from_be_bytes(len) as usize];
    reader.read_exact(&mut frame).await?;
    Ok(Some(frame))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
