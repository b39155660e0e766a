//! Text encodings used on the AniDB UDP wire
//!
//! Requests go out as UTF-16BE (no BOM) or ASCII. Replies carry their own
//! encoding, announced only by a byte order mark; no BOM means ASCII.

use crate::protocol::error::{ProtocolError, Result};
use log::trace;

const BOM_UTF7: &[u8] = &[0x2B, 0x2F, 0x76];
const BOM_UTF8: &[u8] = &[0xEF, 0xBB, 0xBF];
const BOM_UTF16_LE: &[u8] = &[0xFF, 0xFE];
const BOM_UTF16_BE: &[u8] = &[0xFE, 0xFF];
const BOM_UTF32: &[u8] = &[0x00, 0x00, 0xFE, 0xFF];

/// Encoding of a reply, identified from its leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf7,
    Utf8,
    Utf16Le,
    Utf16Be,
    Utf32,
    Ascii,
}

impl TextEncoding {
    /// Identify the encoding from a byte order mark, defaulting to ASCII
    pub fn detect(data: &[u8]) -> Self {
        if data.starts_with(BOM_UTF32) {
            Self::Utf32
        } else if data.starts_with(BOM_UTF7) {
            Self::Utf7
        } else if data.starts_with(BOM_UTF8) {
            Self::Utf8
        } else if data.starts_with(BOM_UTF16_LE) {
            Self::Utf16Le
        } else if data.starts_with(BOM_UTF16_BE) {
            Self::Utf16Be
        } else {
            Self::Ascii
        }
    }

    /// Decode bytes in this encoding. A leading BOM survives as U+FEFF.
    pub fn decode(&self, data: &[u8]) -> Result<String> {
        trace!("Decoding {} bytes as {}", data.len(), self.name());
        match self {
            Self::Ascii => Ok(decode_ascii(data)),
            Self::Utf8 => String::from_utf8(data.to_vec())
                .map_err(|e| ProtocolError::decoding(format!("Invalid UTF-8: {e}"))),
            Self::Utf16Le => decode_utf16(data, u16::from_le_bytes),
            Self::Utf16Be => decode_utf16(data, u16::from_be_bytes),
            Self::Utf32 => decode_utf32(data),
            Self::Utf7 => decode_utf7(data),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Utf7 => "UTF-7",
            Self::Utf8 => "UTF-8",
            Self::Utf16Le => "UTF-16LE",
            Self::Utf16Be => "UTF-16BE",
            Self::Utf32 => "UTF-32",
            Self::Ascii => "ASCII",
        }
    }
}

/// Decode a reply: detect the encoding, decode and strip a leading BOM
pub fn decode_reply(data: &[u8]) -> Result<String> {
    let encoding = TextEncoding::detect(data);
    let mut text = encoding.decode(data)?;
    if text.starts_with('\u{FEFF}') {
        text.drain(..'\u{FEFF}'.len_utf8());
    }
    Ok(text)
}

/// Encode a request: UTF-16BE without BOM when unicode is needed, else ASCII
pub fn encode_request(command: &str, needs_unicode: bool) -> Vec<u8> {
    if needs_unicode {
        command
            .encode_utf16()
            .flat_map(|unit| unit.to_be_bytes())
            .collect()
    } else {
        command
            .chars()
            .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
            .collect()
    }
}

fn decode_ascii(data: &[u8]) -> String {
    data.iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect()
}

fn decode_utf16(data: &[u8], to_unit: fn([u8; 2]) -> u16) -> Result<String> {
    if data.len() % 2 != 0 {
        return Err(ProtocolError::decoding(format!(
            "UTF-16 reply has odd length {}",
            data.len()
        )));
    }
    let units = data.chunks_exact(2).map(|pair| to_unit([pair[0], pair[1]]));
    char::decode_utf16(units)
        .collect::<std::result::Result<String, _>>()
        .map_err(|e| ProtocolError::decoding(format!("Invalid UTF-16: {e}")))
}

fn decode_utf32(data: &[u8]) -> Result<String> {
    if data.len() % 4 != 0 {
        return Err(ProtocolError::decoding(format!(
            "UTF-32 reply has length {} (not a multiple of 4)",
            data.len()
        )));
    }
    data.chunks_exact(4)
        .map(|quad| {
            let value = u32::from_be_bytes([quad[0], quad[1], quad[2], quad[3]]);
            char::from_u32(value).ok_or_else(|| {
                ProtocolError::decoding(format!("Invalid UTF-32 code point {value:#x}"))
            })
        })
        .collect()
}

fn base64_value(byte: u8) -> Option<u32> {
    match byte {
        b'A'..=b'Z' => Some((byte - b'A') as u32),
        b'a'..=b'z' => Some((byte - b'a') as u32 + 26),
        b'0'..=b'9' => Some((byte - b'0') as u32 + 52),
        b'+' => Some(62),
        b'/' => Some(63),
        _ => None,
    }
}

/// RFC 2152: direct ASCII, `+<modified base64 of UTF-16BE>-`, `+-` for `+`
fn decode_utf7(data: &[u8]) -> Result<String> {
    let mut units: Vec<u16> = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        let byte = data[i];
        if byte != b'+' {
            units.push(byte as u16);
            i += 1;
            continue;
        }

        i += 1;
        if data.get(i) == Some(&b'-') {
            units.push(b'+' as u16);
            i += 1;
            continue;
        }

        let mut bits: u32 = 0;
        let mut bit_count = 0;
        while let Some(value) = data.get(i).copied().and_then(base64_value) {
            bits = (bits << 6) | value;
            bit_count += 6;
            if bit_count >= 16 {
                bit_count -= 16;
                units.push((bits >> bit_count) as u16);
                bits &= (1 << bit_count) - 1;
            }
            i += 1;
        }
        // '-' terminates the shifted run and is absorbed
        if data.get(i) == Some(&b'-') {
            i += 1;
        }
    }

    char::decode_utf16(units)
        .collect::<std::result::Result<String, _>>()
        .map_err(|e| ProtocolError::decoding(format!("Invalid UTF-7: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_bom_signatures() {
        assert_eq!(TextEncoding::detect(&[0x2B, 0x2F, 0x76, 0x38]), TextEncoding::Utf7);
        assert_eq!(TextEncoding::detect(&[0xEF, 0xBB, 0xBF, 0x32]), TextEncoding::Utf8);
        assert_eq!(TextEncoding::detect(&[0xFF, 0xFE, 0x32, 0x00]), TextEncoding::Utf16Le);
        assert_eq!(TextEncoding::detect(&[0xFE, 0xFF, 0x00, 0x32]), TextEncoding::Utf16Be);
        assert_eq!(TextEncoding::detect(&[0x00, 0x00, 0xFE, 0xFF]), TextEncoding::Utf32);
        assert_eq!(TextEncoding::detect(b"200 PONG\n"), TextEncoding::Ascii);
        assert_eq!(TextEncoding::detect(&[]), TextEncoding::Ascii);
    }

    #[test]
    fn test_decode_reply_strips_bom() {
        let mut data = vec![0xEF, 0xBB, 0xBF];
        data.extend_from_slice("300 PONG\n\n".as_bytes());
        assert_eq!(decode_reply(&data).unwrap(), "300 PONG\n\n");

        let mut data = vec![0xFE, 0xFF];
        data.extend(encode_request("230 ANIME\nシ\n", true));
        assert_eq!(decode_reply(&data).unwrap(), "230 ANIME\nシ\n");
    }

    #[test]
    fn test_decode_utf16_le() {
        let mut data = vec![0xFF, 0xFE];
        data.extend("300 PONG".encode_utf16().flat_map(|u| u.to_le_bytes()));
        assert_eq!(decode_reply(&data).unwrap(), "300 PONG");
    }

    #[test]
    fn test_decode_utf32() {
        let mut data = vec![0x00, 0x00, 0xFE, 0xFF];
        data.extend("ok".chars().flat_map(|c| (c as u32).to_be_bytes()));
        assert_eq!(decode_reply(&data).unwrap(), "ok");
    }

    #[test]
    fn test_decode_utf7() {
        // "+/v8-" is the UTF-7 BOM, "+ZeVnLIqe-" is 日本語
        assert_eq!(decode_reply(b"+/v8-Hi +ZeVnLIqe-").unwrap(), "Hi 日本語");
        assert_eq!(TextEncoding::Utf7.decode(b"1 +- 1").unwrap(), "1 + 1");
    }

    #[test]
    fn test_ascii_replaces_non_ascii() {
        assert_eq!(TextEncoding::Ascii.decode(&[b'a', 0xE9, b'b']).unwrap(), "a?b");
        assert_eq!(encode_request("café", false), b"caf?");
    }

    #[test]
    fn test_encode_request_unicode_has_no_bom() {
        let encoded = encode_request("PING", true);
        assert_eq!(encoded, vec![0, b'P', 0, b'I', 0, b'N', 0, b'G']);
    }

    #[test]
    fn test_odd_length_utf16_is_error() {
        let result = TextEncoding::Utf16Be.decode(&[0xFE, 0xFF, 0x00]);
        assert!(matches!(result, Err(ProtocolError::Decoding { .. })));
    }
}
