use bytes::{Buf, BufMut};
use commonware_codec::{Error, ReadExt, Write};

/// Helper to write a string as length-prefixed UTF-8 bytes.
pub fn write_string(s: &str, writer: &mut impl BufMut) {
    let bytes = s.as_bytes();
    (bytes.len() as u32).write(writer);
    writer.put_slice(bytes);
}

/// Helper to read a string from length-prefixed UTF-8 bytes.
pub fn read_string(reader: &mut impl Buf, max_len: usize) -> Result<String, Error> {
    let len = u32::read(reader)? as usize;
    if len > max_len {
        return Err(Error::Invalid("String", "too long"));
    }
    if reader.remaining() < len {
        return Err(Error::EndOfBuffer);
    }
    let mut bytes = vec![0u8; len];
    reader.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).map_err(|_| Error::Invalid("String", "invalid UTF-8"))
}

/// Helper to get encode size of a string.
pub fn string_encode_size(s: &str) -> usize {
    4 + s.len()
}

pub fn write_opt_string(s: Option<&str>, writer: &mut impl BufMut) {
    match s {
        Some(s) => {
            1u8.write(writer);
            write_string(s, writer);
        }
        None => 0u8.write(writer),
    }
}

pub fn read_opt_string(reader: &mut impl Buf, max_len: usize) -> Result<Option<String>, Error> {
    match u8::read(reader)? {
        0 => Ok(None),
        1 => Ok(Some(read_string(reader, max_len)?)),
        tag => Err(Error::InvalidEnum(tag)),
    }
}

pub fn opt_string_encode_size(s: Option<&str>) -> usize {
    1 + s.map(string_encode_size).unwrap_or(0)
}

/// Signed values travel as their two's complement bit pattern.
pub fn write_i64(value: i64, writer: &mut impl BufMut) {
    (value as u64).write(writer);
}

pub fn read_i64(reader: &mut impl Buf) -> Result<i64, Error> {
    Ok(u64::read(reader)? as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use rand::{rngs::StdRng, RngCore, SeedableRng};

    #[test]
    fn read_string_rejects_too_long() {
        let mut buf = BytesMut::new();
        (5u32).write(&mut buf);
        buf.extend_from_slice(b"hello");

        let mut reader = buf.as_ref();
        let err = read_string(&mut reader, 4).expect_err("should reject too-long string");
        assert!(matches!(err, Error::Invalid("String", "too long")));
    }

    #[test]
    fn read_string_rejects_truncated_buffers() {
        let mut buf = BytesMut::new();
        (3u32).write(&mut buf);
        buf.extend_from_slice(b"ab");

        let mut reader = buf.as_ref();
        let err = read_string(&mut reader, 10).expect_err("should reject truncated buffer");
        assert!(matches!(err, Error::EndOfBuffer));
    }

    #[test]
    fn optional_strings_and_signed_values() {
        let mut buf = BytesMut::new();
        write_opt_string(Some("note"), &mut buf);
        write_opt_string(None, &mut buf);
        write_i64(-42, &mut buf);
        assert_eq!(
            buf.len(),
            opt_string_encode_size(Some("note")) + opt_string_encode_size(None) + 8
        );

        let mut reader = buf.as_ref();
        assert_eq!(read_opt_string(&mut reader, 16).unwrap().as_deref(), Some("note"));
        assert_eq!(read_opt_string(&mut reader, 16).unwrap(), None);
        assert_eq!(read_i64(&mut reader).unwrap(), -42);
        assert!(reader.is_empty());
    }

    #[test]
    fn read_string_handles_malformed_inputs() {
        let mut rng = StdRng::seed_from_u64(0x5eed_c0de);
        let max_len = 64;

        for _ in 0..500 {
            let len = (rng.next_u32() as usize) % 512;
            let mut buf = vec![0u8; len];
            rng.fill_bytes(&mut buf);
            let mut reader = buf.as_slice();
            if let Ok(s) = read_string(&mut reader, max_len) {
                assert!(s.len() <= max_len);
            }
        }
    }
}
