//! gRPC message framing.
//!
//! ```text
//! +------+----------+----------------+
//! | flag | length   | payload        |
//! | 1B   | 4B (BE)  | length bytes   |
//! +------+----------+----------------+
//! ```
//!
//! The flag is `0` for an uncompressed payload. Compression is never
//! negotiated here, so any other flag is rejected on decode.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::err::{RPCResult, RpcError};

pub const HEADER_SIZE: usize = 5;
pub const FLAG_UNCOMPRESSED: u8 = 0;

/// Largest payload accepted on decode, matching gRPC's default receive limit (4 MiB).
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Encodes `message` into a single uncompressed frame.
pub fn encode<M: Message>(message: &M) -> RPCResult<Bytes> {
    let len = message.encoded_len();
    let wire_len = u32::try_from(len)
        .map_err(|_| RpcError::Encoding(format!("message of {} bytes is too large", len)))?;

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + len);
    buf.put_u8(FLAG_UNCOMPRESSED);
    buf.put_u32(wire_len);
    message
        .encode(&mut buf)
        .map_err(|e| RpcError::Encoding(e.to_string()))?;
    Ok(buf.freeze())
}

/// Pulls exactly one frame off `buf` and decodes its payload.
///
/// On success `buf` is advanced by `5 + length` bytes and nothing more; any
/// bytes that follow are left for the caller.
pub fn decode<M, B>(buf: &mut B) -> RPCResult<M>
where
    M: Message + Default,
    B: Buf,
{
    if buf.remaining() < HEADER_SIZE {
        return Err(RpcError::Framing(format!(
            "expected a {} byte header, got {} bytes",
            HEADER_SIZE,
            buf.remaining()
        )));
    }

    let flag = buf.get_u8();
    let len = buf.get_u32() as usize;
    check_header(flag, len)?;

    if buf.remaining() < len {
        return Err(RpcError::Framing(format!(
            "truncated payload: declared {} bytes, {} available",
            len,
            buf.remaining()
        )));
    }

    let payload = buf.copy_to_bytes(len);
    Ok(M::decode(payload)?)
}

/// Reads one frame from an async byte stream, consuming exactly `5 + length` bytes.
/// The payload is decoded with [`decode`], so both paths reject the same frames.
pub async fn read_frame<M, R>(reader: &mut R) -> RPCResult<M>
where
    M: Message + Default,
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    reader
        .read_exact(&mut header)
        .await
        .map_err(|e| RpcError::Framing(format!("failed to read frame header: {}", e)))?;

    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    check_header(header[0], len)?;

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + len);
    frame.extend_from_slice(&header);
    frame.resize(HEADER_SIZE + len, 0);
    reader
        .read_exact(&mut frame[HEADER_SIZE..])
        .await
        .map_err(|e| RpcError::Framing(format!("failed to read {} byte payload: {}", len, e)))?;

    decode(&mut frame.freeze())
}

fn check_header(flag: u8, len: usize) -> RPCResult<()> {
    if flag != FLAG_UNCOMPRESSED {
        return Err(RpcError::Framing(format!(
            "unsupported compression flag {}",
            flag
        )));
    }
    if len > MAX_MESSAGE_SIZE {
        return Err(RpcError::Framing(format!(
            "declared length {} exceeds the {} byte limit",
            len, MAX_MESSAGE_SIZE
        )));
    }
    Ok(())
}
