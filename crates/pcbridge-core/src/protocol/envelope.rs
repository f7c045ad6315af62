//! Line-delimited JSON envelope framing, used by the control and input
//! channels. One `T` per line, terminated by a single `\n`. Max 128 KiB.

use serde::{de::DeserializeOwned, Serialize};
use std::io::{BufRead, Write};

use crate::config::MAX_ENVELOPE_BYTES;
use crate::error::{BridgeError, Result};

/// Read one envelope from a buffered reader. Returns `Ok(None)` on a clean
/// EOF (the peer closed the socket between envelopes).
pub fn read_envelope<R: BufRead, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>> {
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        if line.len() > MAX_ENVELOPE_BYTES {
            return Err(BridgeError::EnvelopeTooLarge {
                max: MAX_ENVELOPE_BYTES,
            });
        }
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            // Tolerate a stray blank line (keepalive-style padding) rather
            // than treating it as a parse failure.
            continue;
        }
        let value: T = serde_json::from_str(trimmed)?;
        return Ok(Some(value));
    }
}

/// Serialize and write one envelope, followed by exactly one `\n`.
pub fn write_envelope<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<()> {
    let mut body = serde_json::to_string(value)?;
    if body.len() + 1 > MAX_ENVELOPE_BYTES {
        return Err(BridgeError::EnvelopeTooLarge {
            max: MAX_ENVELOPE_BYTES,
        });
    }
    body.push('\n');
    writer.write_all(body.as_bytes())?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::io::Cursor;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Ping {
        n: u32,
    }

    #[test]
    fn round_trips_a_single_envelope() {
        let mut buf = Vec::new();
        write_envelope(&mut buf, &Ping { n: 7 }).unwrap();
        assert_eq!(buf.last(), Some(&b'\n'));
        let mut cursor = Cursor::new(buf);
        let decoded: Ping = read_envelope(&mut cursor).unwrap().unwrap();
        assert_eq!(decoded, Ping { n: 7 });
    }

    #[test]
    fn splitting_multiple_envelopes_by_newline_yields_parseable_objects() {
        let mut buf = Vec::new();
        write_envelope(&mut buf, &Ping { n: 1 }).unwrap();
        write_envelope(&mut buf, &Ping { n: 2 }).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let _: Ping = serde_json::from_str(line).unwrap();
        }
    }

    #[test]
    fn rejects_oversized_envelope() {
        let huge = "x".repeat(MAX_ENVELOPE_BYTES + 1);
        let mut buf = format!("\"{}\"\n", huge).into_bytes();
        let mut cursor = Cursor::new(std::mem::take(&mut buf));
        let result: Result<Option<String>> = read_envelope(&mut cursor);
        assert!(matches!(result, Err(BridgeError::EnvelopeTooLarge { .. })));
    }

    #[test]
    fn clean_eof_between_envelopes_returns_none() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let result: Option<Ping> = read_envelope(&mut cursor).unwrap();
        assert_eq!(result, None);
    }
}
