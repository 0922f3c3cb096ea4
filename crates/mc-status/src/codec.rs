//! Packet framing for the Java edition handshake/status protocol.
//!
//! Every packet is `VarInt length | VarInt packet id | body`. Strings are
//! a VarInt byte length followed by UTF-8.

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{ProbeError, Result};

/// Longest encoding of a 32-bit VarInt.
pub const MAX_VARINT_LEN: usize = 5;

/// Upper bound on a status packet. Real responses with favicons stay well below this.
pub const MAX_PACKET_LEN: usize = 2 * 1024 * 1024;

pub fn write_varint(buf: &mut Vec<u8>, value: i32) {
    let mut value = value as u32;
    loop {
        if value & !0x7F == 0 {
            buf.push(value as u8);
            return;
        }
        buf.push(((value & 0x7F) | 0x80) as u8);
        value >>= 7;
    }
}

/// Decode a VarInt from the front of `buf`, returning the value and bytes consumed.
pub fn read_varint_slice(buf: &[u8]) -> Result<(i32, usize)> {
    let mut result: u32 = 0;
    for (i, byte) in buf.iter().take(MAX_VARINT_LEN).enumerate() {
        result |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((result as i32, i + 1));
        }
    }
    if buf.len() < MAX_VARINT_LEN {
        Err(ProbeError::malformed("truncated VarInt"))
    } else {
        Err(ProbeError::malformed("VarInt is too long"))
    }
}

pub async fn read_varint<R: AsyncRead + Unpin>(reader: &mut R) -> Result<i32> {
    let mut result: u32 = 0;
    for i in 0..MAX_VARINT_LEN {
        let byte = reader.read_u8().await?;
        result |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(result as i32);
        }
    }
    Err(ProbeError::malformed("VarInt is too long"))
}

pub fn write_string(buf: &mut Vec<u8>, value: &str) {
    write_varint(buf, value.len() as i32);
    buf.extend_from_slice(value.as_bytes());
}

/// Decode a length-prefixed string from the front of `buf`.
pub fn read_string_slice(buf: &[u8]) -> Result<(String, usize)> {
    let (len, header) = read_varint_slice(buf)?;
    let len = usize::try_from(len).map_err(|_| ProbeError::malformed("negative string length"))?;
    let end = header
        .checked_add(len)
        .filter(|end| *end <= buf.len())
        .ok_or_else(|| ProbeError::malformed("string runs past end of packet"))?;
    let value = String::from_utf8(buf[header..end].to_vec())
        .map_err(|e| ProbeError::malformed(format!("string is not UTF-8: {e}")))?;
    Ok((value, end))
}

/// Wrap a packet id and body into a length-prefixed frame.
pub fn frame_packet(packet_id: i32, body: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(body.len() + MAX_VARINT_LEN);
    write_varint(&mut payload, packet_id);
    payload.extend_from_slice(body);

    let mut frame = Vec::with_capacity(payload.len() + MAX_VARINT_LEN);
    write_varint(&mut frame, payload.len() as i32);
    frame.extend_from_slice(&payload);
    frame
}

/// Read one frame and split it into packet id and body.
pub async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Result<(i32, Vec<u8>)> {
    let len = read_varint(reader).await?;
    let len = usize::try_from(len)
        .ok()
        .filter(|len| *len > 0 && *len <= MAX_PACKET_LEN)
        .ok_or_else(|| ProbeError::malformed(format!("bad packet length {len}")))?;

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).await?;

    let (packet_id, consumed) = read_varint_slice(&data)?;
    data.drain(..consumed);
    Ok((packet_id, data))
}

/// Run `fut` under a deadline, mapping expiry to [`ProbeError::Timeout`].
pub(crate) async fn with_timeout<T, F>(stage: &'static str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| ProbeError::timeout(stage, timeout))?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: i32) -> Vec<u8> {
        let mut buf = Vec::new();
        write_varint(&mut buf, value);
        buf
    }

    #[test]
    fn test_varint_known_vectors() {
        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(1), vec![0x01]);
        assert_eq!(encode(127), vec![0x7f]);
        assert_eq!(encode(128), vec![0x80, 0x01]);
        assert_eq!(encode(255), vec![0xff, 0x01]);
        assert_eq!(encode(25565), vec![0xdd, 0xc7, 0x01]);
        assert_eq!(encode(i32::MAX), vec![0xff, 0xff, 0xff, 0xff, 0x07]);
        assert_eq!(encode(-1), vec![0xff, 0xff, 0xff, 0xff, 0x0f]);
    }

    #[test]
    fn test_read_varint_slice_reports_consumed() {
        let (value, used) = read_varint_slice(&[0xdd, 0xc7, 0x01, 0x42]).unwrap();
        assert_eq!(value, 25565);
        assert_eq!(used, 3);
    }

    #[test]
    fn test_read_varint_slice_rejects_truncated_and_overlong() {
        assert!(read_varint_slice(&[0x80]).is_err());
        assert!(read_varint_slice(&[0xff, 0xff, 0xff, 0xff, 0xff, 0x01]).is_err());
    }

    #[test]
    fn test_read_string_slice_bounds() {
        let mut buf = Vec::new();
        write_string(&mut buf, "hello");
        let (value, used) = read_string_slice(&buf).unwrap();
        assert_eq!(value, "hello");
        assert_eq!(used, 6);

        assert!(read_string_slice(&[0x05, b'h', b'i']).is_err());
    }

    #[tokio::test]
    async fn test_read_packet_splits_id_and_body() {
        let frame = frame_packet(0x01, &[1, 2, 3]);
        let mut reader = &frame[..];
        let (id, body) = read_packet(&mut reader).await.unwrap();
        assert_eq!(id, 0x01);
        assert_eq!(body, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_read_packet_rejects_zero_length() {
        let mut reader: &[u8] = &[0x00];
        assert!(read_packet(&mut reader).await.is_err());
    }
}
