//! # MQTT Serialization Utilities
//!
//! Helpers for reading and writing MQTT wire primitives: variable-byte
//! integers and length-prefixed UTF-8 strings.

use crate::error::{CodecResult, MqttError, ProtocolError};

/// Largest value a four byte variable-byte integer can carry.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Reads a variable-byte integer from the buffer, advancing the cursor.
///
/// Returns `Ok(None)` when the buffer ends before the last length byte, which
/// lets the framer wait for more input instead of rejecting a partial read.
pub fn try_read_variable_byte_integer(cursor: &mut usize, buf: &[u8]) -> CodecResult<Option<usize>> {
    let mut multiplier = 1;
    let mut value = 0;
    let mut i = 0;
    loop {
        let Some(encoded_byte) = buf.get(*cursor + i) else {
            return Ok(None);
        };
        value += (encoded_byte & 127) as usize * multiplier;
        if (encoded_byte & 128) == 0 {
            break;
        }
        multiplier *= 128;
        i += 1;
        if i >= 4 {
            return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
        }
    }
    *cursor += i + 1;
    Ok(Some(value))
}

/// Reads a variable-byte integer that must be fully present in `buf`.
pub fn read_variable_byte_integer(cursor: &mut usize, buf: &[u8]) -> CodecResult<usize> {
    try_read_variable_byte_integer(cursor, buf)?
        .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))
}

/// Writes a variable-byte integer at the start of `buf`, returning the byte count.
pub fn write_variable_byte_integer(buf: &mut [u8], mut val: usize) -> CodecResult<usize> {
    if val > MAX_REMAINING_LENGTH {
        return Err(MqttError::Protocol(ProtocolError::PayloadTooLarge));
    }
    let mut i = 0;
    loop {
        let mut encoded_byte = (val % 128) as u8;
        val /= 128;
        if val > 0 {
            encoded_byte |= 128;
        }
        *buf.get_mut(i).ok_or(MqttError::BufferTooSmall)? = encoded_byte;
        i += 1;
        if val == 0 {
            break;
        }
    }
    Ok(i)
}

/// Reads a big-endian `u16`, advancing the cursor.
pub fn read_u16(cursor: &mut usize, buf: &[u8]) -> CodecResult<u16> {
    let bytes = buf
        .get(*cursor..*cursor + 2)
        .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
    *cursor += 2;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Reads a UTF-8 encoded string (prefixed with a 2-byte length) from the buffer.
pub fn read_utf8_string<'a>(cursor: &mut usize, buf: &'a [u8]) -> CodecResult<&'a str> {
    let len = read_u16(cursor, buf)? as usize;
    let bytes = buf
        .get(*cursor..*cursor + len)
        .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
    let s = core::str::from_utf8(bytes)
        .map_err(|_| MqttError::Protocol(ProtocolError::InvalidUtf8String))?;
    *cursor += len;
    Ok(s)
}

/// Writes a UTF-8 encoded string (prefixed with a 2-byte length) to the buffer.
pub fn write_utf8_string(buf: &mut [u8], s: &str) -> CodecResult<usize> {
    let len = s.len();
    if len > u16::MAX as usize {
        return Err(MqttError::Protocol(ProtocolError::PayloadTooLarge));
    }
    let required_space = 2 + len;
    let slice = buf
        .get_mut(0..required_space)
        .ok_or(MqttError::BufferTooSmall)?;

    slice[0..2].copy_from_slice(&(len as u16).to_be_bytes());
    slice[2..].copy_from_slice(s.as_bytes());
    Ok(required_space)
}

/// Copies `bytes` to the start of `buf`, returning the byte count.
pub fn write_bytes(buf: &mut [u8], bytes: &[u8]) -> CodecResult<usize> {
    buf.get_mut(..bytes.len())
        .ok_or(MqttError::BufferTooSmall)?
        .copy_from_slice(bytes);
    Ok(bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_byte_integer_boundaries() {
        let mut buf = [0u8; 4];
        assert_eq!(write_variable_byte_integer(&mut buf, 127).unwrap(), 1);
        assert_eq!(buf[0], 0x7F);

        assert_eq!(write_variable_byte_integer(&mut buf, 321).unwrap(), 2);
        assert_eq!(&buf[..2], &[0xC1, 0x02]);

        let mut cursor = 0;
        assert_eq!(read_variable_byte_integer(&mut cursor, &buf).unwrap(), 321);
        assert_eq!(cursor, 2);
    }

    #[test]
    fn partial_length_is_not_an_error() {
        let mut cursor = 0;
        assert_eq!(
            try_read_variable_byte_integer(&mut cursor, &[0x80]).unwrap(),
            None
        );
        assert_eq!(cursor, 0);
    }

    #[test]
    fn five_byte_length_is_malformed() {
        let mut cursor = 0;
        let err = try_read_variable_byte_integer(&mut cursor, &[0xFF, 0xFF, 0xFF, 0xFF, 0x01]);
        assert!(matches!(
            err,
            Err(MqttError::Protocol(ProtocolError::MalformedPacket))
        ));
    }

    #[test]
    fn strings_are_length_prefixed() {
        let mut buf = [0u8; 8];
        assert_eq!(write_utf8_string(&mut buf, "MQTT").unwrap(), 6);
        assert_eq!(&buf[..6], b"\x00\x04MQTT");

        let mut cursor = 0;
        assert_eq!(read_utf8_string(&mut cursor, &buf).unwrap(), "MQTT");
        assert_eq!(cursor, 6);

        assert!(matches!(
            write_utf8_string(&mut buf[..3], "MQTT"),
            Err(MqttError::BufferTooSmall)
        ));
    }
}
