//! Compact file-id codec.
//!
//! A platform file handle decodes into four scalars (kind, DC, media id,
//! access hash) plus a high-entropy reference blob. The scalars are packed
//! little-endian, zero runs are run-length collapsed (the fields are
//! zero-heavy in practice), and the result is base64url without padding.
//! The reference blob skips the RLE step since it never compresses.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Fixed trailer appended before compression.
const TRAILER: [u8; 2] = [22, 4];
/// i32 + i32 + i64 + i64 + trailer.
const PACKED_LEN: usize = 4 + 4 + 8 + 8 + 2;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("file id is not valid base64url")]
    Base64,
    #[error("zero-run escape truncated at end of input")]
    TruncatedEscape,
    #[error("expanded file id is {0} bytes, expected {PACKED_LEN}")]
    Length(usize),
    #[error("file id trailer bytes do not match")]
    Trailer,
}

/// Encode the four scalar fields into the printable storage key.
/// Never fails for in-range input.
pub fn pack_file_id(kind: i32, dc_id: i32, media_id: i64, access_hash: i64) -> String {
    let mut buf = Vec::with_capacity(PACKED_LEN);
    buf.extend_from_slice(&kind.to_le_bytes());
    buf.extend_from_slice(&dc_id.to_le_bytes());
    buf.extend_from_slice(&media_id.to_le_bytes());
    buf.extend_from_slice(&access_hash.to_le_bytes());
    buf.extend_from_slice(&TRAILER);
    URL_SAFE_NO_PAD.encode(rle_compress(&buf))
}

/// Exact inverse of [`pack_file_id`]. Fails closed on malformed input.
pub fn unpack_file_id(id: &str) -> Result<(i32, i32, i64, i64), DecodeError> {
    let compressed = URL_SAFE_NO_PAD.decode(id).map_err(|_| DecodeError::Base64)?;
    let bytes = rle_expand(&compressed)?;
    if bytes.len() != PACKED_LEN {
        return Err(DecodeError::Length(bytes.len()));
    }
    if bytes[PACKED_LEN - 2..] != TRAILER {
        return Err(DecodeError::Trailer);
    }
    let kind = i32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let dc_id = i32::from_le_bytes(bytes[4..8].try_into().unwrap());
    let media_id = i64::from_le_bytes(bytes[8..16].try_into().unwrap());
    let access_hash = i64::from_le_bytes(bytes[16..24].try_into().unwrap());
    Ok((kind, dc_id, media_id, access_hash))
}

/// Plain base64url for the opaque reference blob.
pub fn encode_file_ref(file_ref: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(file_ref)
}

pub fn decode_file_ref(s: &str) -> Result<Vec<u8>, DecodeError> {
    URL_SAFE_NO_PAD.decode(s).map_err(|_| DecodeError::Base64)
}

/// Replace every maximal run of 1-255 zero bytes with `(0x00, run_len)`.
fn rle_compress(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut run = 0u8;
    for &b in data {
        if b == 0 {
            run += 1;
            if run == u8::MAX {
                out.extend_from_slice(&[0, u8::MAX]);
                run = 0;
            }
        } else {
            if run > 0 {
                out.extend_from_slice(&[0, run]);
                run = 0;
            }
            out.push(b);
        }
    }
    if run > 0 {
        out.extend_from_slice(&[0, run]);
    }
    out
}

fn rle_expand(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::with_capacity(data.len());
    let mut iter = data.iter();
    while let Some(&b) = iter.next() {
        if b == 0 {
            let &n = iter.next().ok_or(DecodeError::TruncatedEscape)?;
            out.resize(out.len() + n as usize, 0);
        } else {
            out.push(b);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_typical_fields() {
        let cases = [
            (4, 2, 5_248_573_266_821_562_481_i64, -6_403_989_334_119_541_919_i64),
            (8, 5, 1, 1),
            (1, 1, i64::MAX, i64::MIN),
            (i32::MAX, i32::MIN, 0, 0),
        ];
        for (kind, dc, media, hash) in cases {
            let id = pack_file_id(kind, dc, media, hash);
            assert_eq!(unpack_file_id(&id), Ok((kind, dc, media, hash)), "tuple {id}");
        }
    }

    #[test]
    fn round_trips_all_zero_fields() {
        // Worst case for the RLE path: a single 24-byte zero run.
        let id = pack_file_id(0, 0, 0, 0);
        assert_eq!(unpack_file_id(&id), Ok((0, 0, 0, 0)));
    }

    #[test]
    fn encoded_ids_are_printable_and_unpadded() {
        let id = pack_file_id(4, 2, 123_456, 789);
        assert!(!id.contains('='));
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn rejects_bad_base64() {
        assert_eq!(unpack_file_id("not base64!!"), Err(DecodeError::Base64));
    }

    #[test]
    fn rejects_truncated_escape() {
        // A lone 0x00 is an escape byte with no run length behind it.
        let s = URL_SAFE_NO_PAD.encode([0u8]);
        assert_eq!(unpack_file_id(&s), Err(DecodeError::TruncatedEscape));
    }

    #[test]
    fn rejects_wrong_length() {
        let s = URL_SAFE_NO_PAD.encode(b"abc");
        assert_eq!(unpack_file_id(&s), Err(DecodeError::Length(3)));
    }

    #[test]
    fn rejects_wrong_trailer() {
        let mut buf = vec![7u8; PACKED_LEN];
        buf[PACKED_LEN - 2] = 9;
        buf[PACKED_LEN - 1] = 9;
        let s = URL_SAFE_NO_PAD.encode(&buf);
        assert_eq!(unpack_file_id(&s), Err(DecodeError::Trailer));
    }

    #[test]
    fn file_ref_round_trips_without_rle() {
        let blob = [0u8, 0, 255, 1, 0, 42];
        let encoded = encode_file_ref(&blob);
        assert_eq!(decode_file_ref(&encoded).unwrap(), blob);
        // No zero-run escapes: decoded length equals input length.
        assert_eq!(URL_SAFE_NO_PAD.decode(&encoded).unwrap().len(), blob.len());
    }
}
