//! Length-prefixed framing over an already-encrypted stream (§6 Wire-level:
//! "32-bit big-endian length" — the chosen alternative to relying on an
//! IP-aware underlay; see the external-interface decision record).

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, TransportError};

const LENGTH_PREFIX_BYTES: usize = 4;

/// Reads one length-prefixed frame, rejecting anything past `max_payload`
/// (MTU plus the headroom configured by the caller).
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_payload: usize,
) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; LENGTH_PREFIX_BYTES];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_payload {
        return Err(TransportError::FrameTooLarge(len, max_payload));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Writes `payload` as one length-prefixed frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
    max_payload: usize,
) -> Result<()> {
    if payload.len() > max_payload {
        return Err(TransportError::FrameTooLarge(payload.len(), max_payload));
    }
    let len = (payload.len() as u32).to_be_bytes();
    writer.write_all(&len).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
