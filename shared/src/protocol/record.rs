//! Binary codec for a single stack sample.
//!
//! Layout (big-endian):
//!
//! ```text
//! version:u16 | timestamp:i64 | frame_count:i32 | frame*
//! frame = module:str | function:str | file_absent:u8 | file:str | line:i32
//! str   = len:u16 | utf-8 bytes
//! ```
//!
//! # Schema evolution
//!
//! Every record starts with its version. A reader that sees a version it does
//! not know returns `None` and the record is skipped, so older readers survive
//! files written by newer writers. Trailing bytes after the last frame are
//! ignored for the same reason.
//!
//! A record that ends early is the normal result of a crash during a write and
//! is also reported as `None` instead of an error.

use crate::types::sample::{Frame, StackSample};
use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tracing::debug;

/// Record format version written by [`encode_sample`]
pub const RECORD_VERSION: u16 = 1;

/// Largest string a record can carry
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// Fixed bytes per frame besides its strings: three length prefixes, the
/// absent flag and the line number.
const FRAME_FIXED_LEN: usize = 2 * 3 + 1 + 4;

const HEADER_LEN: usize = 2 + 8 + 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("string field of {len} bytes exceeds the {max} byte record limit")]
    StringTooLong { len: usize, max: usize },

    #[error("sample with {0} frames does not fit a record")]
    TooManyFrames(usize),
}

/// Serialize a sample into one complete record.
///
/// The record is fully built in memory, so storage never sees a partial
/// record from the encoder.
pub fn encode_sample(sample: &StackSample) -> Result<Vec<u8>, CodecError> {
    let frame_count = i32::try_from(sample.frames.len())
        .map_err(|_| CodecError::TooManyFrames(sample.frames.len()))?;

    let capacity = HEADER_LEN
        + sample
            .frames
            .iter()
            .map(|f| {
                FRAME_FIXED_LEN
                    + f.module.len()
                    + f.function.len()
                    + f.file.as_ref().map_or(0, String::len)
            })
            .sum::<usize>();

    let mut buf = BytesMut::with_capacity(capacity);
    buf.put_u16(RECORD_VERSION);
    buf.put_i64(sample.timestamp_ms);
    buf.put_i32(frame_count);

    for frame in &sample.frames {
        put_str(&mut buf, &frame.module)?;
        put_str(&mut buf, &frame.function)?;
        buf.put_u8(u8::from(frame.file.is_none()));
        put_str(&mut buf, frame.file.as_deref().unwrap_or(""))?;
        buf.put_i32(frame.line);
    }

    Ok(buf.to_vec())
}

/// Deserialize one record.
///
/// Returns `None` for an unknown version or a truncated/malformed record.
pub fn decode_sample(bytes: &[u8]) -> Option<StackSample> {
    let mut buf = bytes;

    let version = get_u16(&mut buf)?;
    if version != RECORD_VERSION {
        debug!("Skipping sample record with unknown version {}", version);
        return None;
    }

    let timestamp_ms = get_i64(&mut buf)?;
    let frame_count = usize::try_from(get_i32(&mut buf)?).ok()?;

    // Cap the pre-allocation by what the remaining bytes could possibly hold.
    let mut frames = Vec::with_capacity(frame_count.min(buf.remaining() / FRAME_FIXED_LEN));
    for _ in 0..frame_count {
        let module = get_str(&mut buf)?;
        let function = get_str(&mut buf)?;
        let file_absent = get_u8(&mut buf)? != 0;
        let file = get_str(&mut buf)?;
        let line = get_i32(&mut buf)?;

        frames.push(Frame {
            module,
            function,
            file: if file_absent { None } else { Some(file) },
            line,
        });
    }

    Some(StackSample {
        timestamp_ms,
        frames,
    })
}

fn put_str(buf: &mut BytesMut, s: &str) -> Result<(), CodecError> {
    let len = u16::try_from(s.len()).map_err(|_| CodecError::StringTooLong {
        len: s.len(),
        max: MAX_STRING_LEN,
    })?;
    buf.put_u16(len);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn get_u8(buf: &mut &[u8]) -> Option<u8> {
    (buf.remaining() >= 1).then(|| buf.get_u8())
}

fn get_u16(buf: &mut &[u8]) -> Option<u16> {
    (buf.remaining() >= 2).then(|| buf.get_u16())
}

fn get_i32(buf: &mut &[u8]) -> Option<i32> {
    (buf.remaining() >= 4).then(|| buf.get_i32())
}

fn get_i64(buf: &mut &[u8]) -> Option<i64> {
    (buf.remaining() >= 8).then(|| buf.get_i64())
}

fn get_str(buf: &mut &[u8]) -> Option<String> {
    let len = get_u16(buf)? as usize;
    if buf.remaining() < len {
        return None;
    }
    let (head, tail) = buf.split_at(len);
    let s = std::str::from_utf8(head).ok()?.to_owned();
    *buf = tail;
    Some(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StackSample {
        StackSample::new(
            1_700_000_000_123,
            vec![
                Frame::new("app::db", "query", "db.rs", 88),
                Frame::without_file("app::ui", "on_click", -1),
                Frame::new("app::ui", "dispatch", "", 0),
                Frame::new("std::rt", "lang_start", "rt.rs", 1),
            ],
        )
    }

    #[test]
    fn test_roundtrip_keeps_absent_and_empty_file_apart() {
        let original = sample();
        let bytes = encode_sample(&original).unwrap();
        let decoded = decode_sample(&bytes).unwrap();

        assert_eq!(decoded, original);
        assert_eq!(decoded.frames[1].file, None);
        assert_eq!(decoded.frames[2].file.as_deref(), Some(""));
    }

    #[test]
    fn test_header_layout_is_big_endian() {
        let bytes = encode_sample(&StackSample::new(0x0102, vec![])).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(bytes[0..2], [0, 1]);
        assert_eq!(bytes[2..10], [0, 0, 0, 0, 0, 0, 0x01, 0x02]);
        assert_eq!(bytes[10..14], [0, 0, 0, 0]);
    }

    #[test]
    fn test_unknown_version_is_skipped() {
        let mut bytes = encode_sample(&sample()).unwrap();
        bytes[0..2].copy_from_slice(&2u16.to_be_bytes());
        assert!(decode_sample(&bytes).is_none());
    }

    #[test]
    fn test_every_truncation_yields_none() {
        let bytes = encode_sample(&sample()).unwrap();
        for len in 0..bytes.len() {
            assert!(
                decode_sample(&bytes[..len]).is_none(),
                "prefix of {} bytes decoded",
                len
            );
        }
    }

    #[test]
    fn test_negative_frame_count_is_rejected() {
        let mut bytes = encode_sample(&StackSample::new(1, vec![])).unwrap();
        bytes[10..14].copy_from_slice(&(-1i32).to_be_bytes());
        assert!(decode_sample(&bytes).is_none());
    }

    #[test]
    fn test_trailing_bytes_are_ignored() {
        let mut bytes = encode_sample(&sample()).unwrap();
        bytes.extend_from_slice(&[0xAB; 7]);
        assert_eq!(decode_sample(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_string_too_long() {
        let long = "x".repeat(MAX_STRING_LEN + 1);
        let s = StackSample::new(1, vec![Frame::new(long, "f", "f.rs", 1)]);
        assert_eq!(
            encode_sample(&s),
            Err(CodecError::StringTooLong {
                len: MAX_STRING_LEN + 1,
                max: MAX_STRING_LEN
            })
        );
    }

    #[test]
    fn test_unicode_strings() {
        let s = StackSample::new(5, vec![Frame::new("app::ünï", "größe", "日本.rs", 3)]);
        let bytes = encode_sample(&s).unwrap();
        assert_eq!(decode_sample(&bytes).unwrap(), s);
    }
}
