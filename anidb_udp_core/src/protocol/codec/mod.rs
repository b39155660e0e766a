//! Reply decoding and request encoding
//!
//! A well formed reply is `"<code> <NAME>\n<payload>\n"`: exactly two
//! newlines. Anything with fewer lines or a malformed status line is rejected;
//! a reply with a different newline count is accepted but flagged truncated.

mod encoding;

pub use encoding::{TextEncoding, decode_reply, encode_request};

use crate::protocol::codes::ReturnCode;
use crate::protocol::error::{ProtocolError, Result};
use log::{debug, warn};

/// A parsed AniDB reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Return code from the status line
    pub code: ReturnCode,
    /// Full decoded text, BOM removed
    pub raw: String,
    /// Second line of the reply, trimmed
    pub payload: String,
    /// The reply did not contain exactly two newlines
    pub truncated: bool,
}

impl Response {
    /// Parse decoded reply text
    pub fn parse(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.split('\n').collect();
        if parts.len() < 2 {
            return Err(ProtocolError::unexpected_response(text));
        }

        let truncated = text.matches('\n').count() != 2;
        if truncated {
            warn!(
                "AniDB reply has {} lines, expected 2; treating as truncated",
                parts.len() - 1
            );
        }

        let status: Vec<&str> = parts[0].split(' ').collect();
        if status.len() != 2 {
            return Err(ProtocolError::unexpected_response(text));
        }
        let code: u16 = status[0]
            .parse()
            .map_err(|_| ProtocolError::unexpected_response(text))?;

        let response = Self {
            code: ReturnCode::from_code(code),
            raw: text.to_string(),
            payload: parts[1].trim().to_string(),
            truncated,
        };
        debug!("Parsed AniDB reply {}", response.code);
        Ok(response)
    }

    /// Decode reply bytes and parse them
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let text = decode_reply(data)?;
        Self::parse(&text)
    }

    /// Numeric return code
    pub fn code_value(&self) -> u16 {
        self.code.code()
    }

    /// Everything after the status line, untrimmed
    pub fn full_text(&self) -> &str {
        self.raw
            .split_once('\n')
            .map(|(_, rest)| rest)
            .unwrap_or_default()
    }

    /// Payload split into `|`-separated fields
    pub fn fields(&self) -> Vec<&str> {
        self.payload.split('|').collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_formed_reply() {
        let response = Response::parse("200 LOGIN_ACCEPTED\nabc12 LOGIN ACCEPTED\n").unwrap();
        assert_eq!(response.code, ReturnCode::LOGIN_ACCEPTED);
        assert_eq!(response.payload, "abc12 LOGIN ACCEPTED");
        assert!(!response.truncated);
    }

    #[test]
    fn test_parse_truncated_reply() {
        let response = Response::parse("220 FILE\n1|2|3\nextra\n").unwrap();
        assert_eq!(response.code, ReturnCode::FILE);
        assert_eq!(response.payload, "1|2|3");
        assert!(response.truncated);
        assert_eq!(response.fields(), vec!["1", "2", "3"]);

        let response = Response::parse("220 FILE\n1|2|3").unwrap();
        assert!(response.truncated);
    }

    #[test]
    fn test_parse_rejects_single_line() {
        let result = Response::parse("200 LOGIN_ACCEPTED");
        assert!(matches!(
            result,
            Err(ProtocolError::UnexpectedResponse { ref response }) if response == "200 LOGIN_ACCEPTED"
        ));
    }

    #[test]
    fn test_parse_rejects_bad_status_line() {
        assert!(Response::parse("200 LOGIN ACCEPTED\nx\n").is_err());
        assert!(Response::parse("200\nx\n").is_err());
        assert!(Response::parse("abc FILE\nx\n").is_err());
    }

    #[test]
    fn test_unknown_code_is_kept() {
        let response = Response::parse("777 SOMETHING\nx\n").unwrap();
        assert_eq!(response.code, ReturnCode::Unknown(777));
        assert_eq!(response.code_value(), 777);
    }

    #[test]
    fn test_full_text_is_untrimmed() {
        let response = Response::parse("230 ANIME\n  1|Title  \n").unwrap();
        assert_eq!(response.payload, "1|Title");
        assert_eq!(response.full_text(), "  1|Title  \n");
    }

    #[test]
    fn test_from_bytes_with_bom() {
        let mut data = vec![0xEF, 0xBB, 0xBF];
        data.extend_from_slice(b"300 PONG\n\n");
        let response = Response::from_bytes(&data).unwrap();
        assert_eq!(response.code, ReturnCode::PONG);
        assert_eq!(response.raw, "300 PONG\n\n");
    }
}
