//! Video channel framing: `[length: u32 big-endian][jpeg bytes]`, repeated.

use std::io::{Read, Write};

use crate::config::MAX_FRAME_BYTES;
use crate::error::{BridgeError, Result};

/// Write one length-prefixed frame.
pub fn write_frame<W: Write>(writer: &mut W, jpeg: &[u8]) -> Result<()> {
    let len = jpeg.len() as u32;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(jpeg)?;
    Ok(())
}

/// Read one length-prefixed frame. Returns `Ok(None)` on a clean EOF.
/// Oversized frames (length > `MAX_FRAME_BYTES`) are rejected; the caller
/// treats this the same as any other protocol error on the video channel.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(BridgeError::protocol(format!(
            "frame length {len} exceeds maximum {MAX_FRAME_BYTES}"
        )));
    }
    let mut data = vec![0u8; len as usize];
    reader.read_exact(&mut data)?;
    Ok(Some(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_a_frame() {
        let payload = vec![0xFFu8, 0xD8, 0xFF, 0xD9];
        let mut buf = Vec::new();
        write_frame(&mut buf, &payload).unwrap();
        assert_eq!(&buf[0..4], &(payload.len() as u32).to_be_bytes());
        let mut cursor = Cursor::new(buf);
        let decoded = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn rejects_oversized_frame_length() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_BYTES + 1).to_be_bytes());
        let mut cursor = Cursor::new(buf);
        let result = read_frame(&mut cursor);
        assert!(result.is_err());
    }

    #[test]
    fn clean_eof_before_any_bytes_returns_none() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert_eq!(read_frame(&mut cursor).unwrap(), None);
    }
}
