//! Wire format for the Source RCON protocol
//!
//! Frame layout, little-endian throughout:
//!
//! ```text
//! +-----------+-----------+-----------+----------------+------+
//! | size:u32  | reqid:i32 | type:i32  | body:utf8      | \0\0 |
//! +-----------+-----------+-----------+----------------+------+
//! ```
//!
//! `size` counts everything after itself: request id, type, body, the body's
//! null terminator, and one padding byte. The smallest legal remainder is 10
//! bytes (empty body), the largest 4096.

use bytes::BufMut;
use srcadmin_core::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Request: authenticate with the admin password
pub const TYPE_AUTH: i32 = 3;
/// Request: execute a console command
pub const TYPE_EXEC: i32 = 2;
/// Response: auth acknowledgement
pub const TYPE_AUTH_RESPONSE: i32 = 2;
/// Response: command output (possibly one of several fragments)
pub const TYPE_VALUE: i32 = 0;

/// Smallest legal remainder: reqid + type + null terminator + padding
pub const MIN_REMAINDER: usize = 10;
/// Largest legal remainder
pub const MAX_REMAINDER: usize = 4096;

/// One admin-protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub request_id: i32,
    pub packet_type: i32,
    pub body: String,
}

impl Packet {
    pub fn new(request_id: i32, packet_type: i32, body: impl Into<String>) -> Self {
        Self {
            request_id,
            packet_type,
            body: body.into(),
        }
    }

    /// Encode to wire bytes, size prefix included.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = self.body.as_bytes();
        let remainder = 4 + 4 + body.len() + 1 + 1;
        if remainder > MAX_REMAINDER {
            return Err(Error::Malformed(format!(
                "packet body too large ({} bytes)",
                body.len()
            )));
        }

        let mut buf = Vec::with_capacity(4 + remainder);
        buf.put_u32_le(remainder as u32);
        buf.put_i32_le(self.request_id);
        buf.put_i32_le(self.packet_type);
        buf.put_slice(body);
        buf.put_u8(0); // body null terminator
        buf.put_u8(0); // padding
        Ok(buf)
    }

    /// Decode from wire bytes. `data` must contain the size field and the
    /// full remainder it announces.
    pub fn decode(data: &[u8]) -> Result<Packet> {
        if data.len() < 4 {
            return Err(Error::Malformed(format!(
                "packet too short ({} bytes)",
                data.len()
            )));
        }

        let size = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if !(MIN_REMAINDER..=MAX_REMAINDER).contains(&size) {
            return Err(Error::Malformed(format!("invalid packet size {size}")));
        }
        if data.len() < 4 + size {
            return Err(Error::Malformed(format!(
                "truncated packet: have {} of {} bytes",
                data.len() - 4,
                size
            )));
        }

        decode_remainder(&data[4..4 + size])
    }

    /// Whether this is the empty VALUE frame that terminates a response.
    pub fn is_sentinel(&self, sentinel_id: i32) -> bool {
        self.request_id == sentinel_id && self.packet_type == TYPE_VALUE && self.body.is_empty()
    }
}

fn decode_remainder(remainder: &[u8]) -> Result<Packet> {
    // Callers validated the size bounds, so the id and type fields are present
    let request_id = i32::from_le_bytes([remainder[0], remainder[1], remainder[2], remainder[3]]);
    let packet_type = i32::from_le_bytes([remainder[4], remainder[5], remainder[6], remainder[7]]);

    let tail = &remainder[8..];
    let body_end = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::Malformed("packet body not null-terminated".to_string()))?;

    let body = std::str::from_utf8(&tail[..body_end])
        .map_err(|e| Error::Malformed(format!("packet body not utf-8: {e}")))?
        .to_string();

    Ok(Packet {
        request_id,
        packet_type,
        body,
    })
}

/// Read one complete frame: the 4-byte size first, then the remainder.
///
/// A clean EOF before the size field surfaces as `Error::Io` with
/// `UnexpectedEof`; a short read inside an announced remainder is `Malformed`.
pub async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Packet> {
    let mut size_buf = [0u8; 4];
    reader.read_exact(&mut size_buf).await?;

    let size = u32::from_le_bytes(size_buf) as usize;
    if !(MIN_REMAINDER..=MAX_REMAINDER).contains(&size) {
        return Err(Error::Malformed(format!("invalid packet size {size}")));
    }

    let mut remainder = vec![0u8; size];
    reader.read_exact(&mut remainder).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Malformed(format!("truncated packet: expected {size} bytes"))
        } else {
            Error::Io(e)
        }
    })?;

    decode_remainder(&remainder)
}

/// Write one frame.
pub async fn write_packet<W: AsyncWrite + Unpin>(writer: &mut W, packet: &Packet) -> Result<()> {
    let data = packet.encode()?;
    writer.write_all(&data).await?;
    Ok(())
}
