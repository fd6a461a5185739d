//! On-disk record codec.
//!
//! Layout, in order: a big-endian `i32` key length, the key bytes, a
//! big-endian `i32` value length, the value bytes, and a big-endian `i64`
//! expiry timestamp in epoch milliseconds (0 means no expiry).

/// Size of the fixed header: two 4-byte lengths plus an 8-byte timestamp.
pub const HEADER_SIZE: usize = 4 + 4 + 8;

/// Encodes a record at `at` and returns the offset just past it.
///
/// Panics if `at + encoded_len(key, value) > buf.len()`; callers must
/// perform the capacity check before calling this.
pub fn encode(buf: &mut [u8], at: usize, key: &str, value: &str, expire_ts: i64) -> usize {
    let key_bytes = key.as_bytes();
    let value_bytes = value.as_bytes();
    let mut pos = at;

    buf[pos..pos + 4].copy_from_slice(&(key_bytes.len() as i32).to_be_bytes());
    pos += 4;
    buf[pos..pos + key_bytes.len()].copy_from_slice(key_bytes);
    pos += key_bytes.len();

    buf[pos..pos + 4].copy_from_slice(&(value_bytes.len() as i32).to_be_bytes());
    pos += 4;
    buf[pos..pos + value_bytes.len()].copy_from_slice(value_bytes);
    pos += value_bytes.len();

    buf[pos..pos + 8].copy_from_slice(&expire_ts.to_be_bytes());
    pos += 8;

    pos
}

/// Returns the number of bytes a record for `key`/`value` would occupy.
pub fn encoded_len(key: &str, value: &str) -> usize {
    HEADER_SIZE + key.len() + value.len()
}

/// A fully decoded record, along with the offset just past it.
pub struct Decoded {
    pub key: String,
    pub value: String,
    pub expire_ts: i64,
    pub next_offset: usize,
}

/// Decodes a complete record at `at`. Returns `None` if the bytes at `at`
/// do not form a complete, well-formed record (used by recovery to detect
/// a truncated trailing write).
pub fn decode_at(buf: &[u8], at: usize) -> Option<Decoded> {
    let mut pos = at;
    if buf.len().saturating_sub(pos) < 4 {
        return None;
    }
    let key_len = i32::from_be_bytes(buf[pos..pos + 4].try_into().unwrap());
    if key_len <= 0 {
        return None;
    }
    let key_len = key_len as usize;
    pos += 4;
    if buf.len().saturating_sub(pos) < key_len + 4 + 8 {
        return None;
    }
    let key = std::str::from_utf8(&buf[pos..pos + key_len]).ok()?.to_owned();
    pos += key_len;

    let value_len = i32::from_be_bytes(buf[pos..pos + 4].try_into().unwrap());
    if value_len < 0 {
        return None;
    }
    let value_len = value_len as usize;
    pos += 4;
    if buf.len().saturating_sub(pos) < value_len + 8 {
        return None;
    }
    let value = std::str::from_utf8(&buf[pos..pos + value_len]).ok()?.to_owned();
    pos += value_len;

    let expire_ts = i64::from_be_bytes(buf[pos..pos + 8].try_into().unwrap());
    pos += 8;

    Some(Decoded {
        key,
        value,
        expire_ts,
        next_offset: pos,
    })
}

/// Decoded value and expiry only, skipping the key materialization. Used
/// by `get` and `expire`, which already know the key from the index.
pub struct Peeked {
    pub value: String,
    pub expire_ts: i64,
    pub next_offset: usize,
}

/// Reads a record at `at`, decoding only the value and expiry.
///
/// The caller is expected to pass an offset it placed in the index itself,
/// so a malformed record here indicates index/buffer corruption rather
/// than a normal operating condition; callers should treat `None` as a
/// bug, not a recoverable error.
pub fn peek_value_and_expiry(buf: &[u8], at: usize) -> Option<Peeked> {
    let mut pos = at;
    let key_len = i32::from_be_bytes(buf.get(pos..pos + 4)?.try_into().ok()?);
    if key_len < 0 {
        return None;
    }
    pos += 4 + key_len as usize;

    let value_len = i32::from_be_bytes(buf.get(pos..pos + 4)?.try_into().ok()?);
    if value_len < 0 {
        return None;
    }
    let value_len = value_len as usize;
    pos += 4;
    let value = std::str::from_utf8(buf.get(pos..pos + value_len)?).ok()?.to_owned();
    pos += value_len;

    let expire_ts = i64::from_be_bytes(buf.get(pos..pos + 8)?.try_into().ok()?);
    pos += 8;

    Some(Peeked {
        value,
        expire_ts,
        next_offset: pos,
    })
}
