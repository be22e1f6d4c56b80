//! RFC 7252 §3 binary format.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |Ver| T |  TKL  |      Code     |          Message ID           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   Token (if any, TKL bytes) ...
//! |   Options (if any) ...
//! |1 1 1 1 1 1 1 1|    Payload (if any) ...
//! ```

use super::{Code, MessageType};
use smallvec::SmallVec;

/// Largest token allowed by the header's 4-bit length (values 9-15 are reserved).
pub const MAX_TOKEN_LEN: usize = 8;
/// Separates options from the payload.
pub const PAYLOAD_MARKER: u8 = 0xff;

const VERSION: u8 = 1;
const HEADER_LEN: usize = 4;

/// Most messages carry a handful of options.
pub type OptionVec = SmallVec<[MessageOption; 8]>;

/// Codec failures. Malformed datagrams never reach the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Fewer than four bytes.
    #[error("datagram shorter than the 4-byte header ({0} bytes)")]
    TruncatedHeader(usize),
    /// Version field other than 1.
    #[error("unsupported version {0}")]
    BadVersion(u8),
    /// TKL in the reserved 9..=15 range.
    #[error("token length {0} exceeds 8")]
    BadTokenLength(u8),
    /// Datagram ends inside the token.
    #[error("datagram ends inside the token")]
    TruncatedToken,
    /// Delta or length nibble set to the reserved value 15.
    #[error("reserved option nibble 15 at offset {0}")]
    ReservedNibble(usize),
    /// Datagram ends inside an option.
    #[error("datagram ends inside an option at offset {0}")]
    TruncatedOption(usize),
    /// Payload marker followed by nothing.
    #[error("payload marker with an empty payload")]
    EmptyPayload,
    /// Option number overflowed u16.
    #[error("option number overflow")]
    OptionOverflow,
}

/// One option as it appears after delta decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageOption {
    /// Absolute option number
    pub number: u16,
    /// Raw value bytes
    pub value: Vec<u8>,
}

impl MessageOption {
    /// Build an option from raw bytes.
    pub fn new(number: u16, value: impl Into<Vec<u8>>) -> Self {
        Self {
            number,
            value: value.into(),
        }
    }

    /// Build a uint option using the shortest big-endian encoding.
    #[must_use]
    pub fn uint(number: u16, value: u32) -> Self {
        let bytes = value.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        Self::new(number, &bytes[skip..])
    }

    /// Interpret the value as a big-endian uint (at most four bytes).
    #[must_use]
    pub fn as_uint(&self) -> Option<u32> {
        if self.value.len() > 4 {
            return None;
        }
        Some(
            self.value
                .iter()
                .fold(0u32, |acc, b| (acc << 8) | u32::from(*b)),
        )
    }
}

/// A whole CoAP datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// CON / NON / ACK / RST
    pub mtype: MessageType,
    /// Method or response code
    pub code: Code,
    /// Deduplication / ACK matching id
    pub message_id: u16,
    /// Request/response matching token (0 to 8 bytes)
    pub token: Vec<u8>,
    /// Options sorted by number
    pub options: OptionVec,
    /// Payload bytes, empty when absent
    pub payload: Vec<u8>,
}

impl Message {
    /// A message with no token, options or payload.
    #[must_use]
    pub fn new(mtype: MessageType, code: Code, message_id: u16) -> Self {
        Self {
            mtype,
            code,
            message_id,
            token: Vec::new(),
            options: OptionVec::new(),
            payload: Vec::new(),
        }
    }

    /// Empty ACK for `message_id`.
    #[must_use]
    pub fn empty_ack(message_id: u16) -> Self {
        Self::new(MessageType::Acknowledgement, Code::EMPTY, message_id)
    }

    /// Empty RST for `message_id`.
    #[must_use]
    pub fn reset(message_id: u16) -> Self {
        Self::new(MessageType::Reset, Code::EMPTY, message_id)
    }

    /// Add an option, keeping the list sorted by number (stable for repeats).
    pub fn push_option(&mut self, option: MessageOption) {
        let at = self
            .options
            .iter()
            .position(|o| o.number > option.number)
            .unwrap_or(self.options.len());
        self.options.insert(at, option);
    }

    /// All values of a (possibly repeated) option.
    pub fn option_values(&self, number: u16) -> impl Iterator<Item = &[u8]> {
        self.options
            .iter()
            .filter(move |o| o.number == number)
            .map(|o| o.value.as_slice())
    }

    /// First occurrence of an option.
    #[must_use]
    pub fn option(&self, number: u16) -> Option<&MessageOption> {
        self.options.iter().find(|o| o.number == number)
    }

    /// Read the message type and id from a datagram whose body may be garbage.
    ///
    /// Lets the shell answer an undecodable confirmable message with a Reset.
    #[must_use]
    pub fn peek_header(bytes: &[u8]) -> Option<(MessageType, u16)> {
        if bytes.len() < HEADER_LEN || bytes[0] >> 6 != VERSION {
            return None;
        }
        Some((
            MessageType::from_bits(bytes[0] >> 4),
            u16::from_be_bytes([bytes[2], bytes[3]]),
        ))
    }

    /// Parse a datagram.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(DecodeError::TruncatedHeader(bytes.len()));
        }
        let version = bytes[0] >> 6;
        if version != VERSION {
            return Err(DecodeError::BadVersion(version));
        }
        let mtype = MessageType::from_bits(bytes[0] >> 4);
        let tkl = bytes[0] & 0x0f;
        if usize::from(tkl) > MAX_TOKEN_LEN {
            return Err(DecodeError::BadTokenLength(tkl));
        }
        let code = Code(bytes[1]);
        let message_id = u16::from_be_bytes([bytes[2], bytes[3]]);

        let token_end = HEADER_LEN + usize::from(tkl);
        let token = bytes
            .get(HEADER_LEN..token_end)
            .ok_or(DecodeError::TruncatedToken)?
            .to_vec();

        let mut options = OptionVec::new();
        let mut pos = token_end;
        let mut number: u16 = 0;
        let mut payload = Vec::new();
        while pos < bytes.len() {
            let byte = bytes[pos];
            if byte == PAYLOAD_MARKER {
                if pos + 1 == bytes.len() {
                    return Err(DecodeError::EmptyPayload);
                }
                payload = bytes[pos + 1..].to_vec();
                break;
            }
            let start = pos;
            pos += 1;
            let delta = read_extended(bytes, &mut pos, byte >> 4, start)?;
            let len = usize::from(read_extended(bytes, &mut pos, byte & 0x0f, start)?);
            number = number
                .checked_add(delta)
                .ok_or(DecodeError::OptionOverflow)?;
            let value = bytes
                .get(pos..pos + len)
                .ok_or(DecodeError::TruncatedOption(start))?;
            options.push(MessageOption::new(number, value));
            pos += len;
        }

        Ok(Self {
            mtype,
            code,
            message_id,
            token,
            options,
            payload,
        })
    }

    /// Serialize to a datagram.
    ///
    /// Tokens longer than [`MAX_TOKEN_LEN`] are truncated; options are written
    /// in ascending number order regardless of how they were pushed.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let tkl = self.token.len().min(MAX_TOKEN_LEN);
        let mut out = Vec::with_capacity(HEADER_LEN + tkl + 16 + self.payload.len());
        out.push((VERSION << 6) | (self.mtype.bits() << 4) | tkl as u8);
        out.push(self.code.0);
        out.extend_from_slice(&self.message_id.to_be_bytes());
        out.extend_from_slice(&self.token[..tkl]);

        let mut sorted: SmallVec<[&MessageOption; 8]> = self.options.iter().collect();
        sorted.sort_by_key(|o| o.number);
        let mut previous = 0u16;
        for option in sorted {
            let delta = option.number - previous;
            previous = option.number;
            let (delta_nibble, delta_ext) = split_extended(usize::from(delta));
            let (len_nibble, len_ext) = split_extended(option.value.len());
            out.push((delta_nibble << 4) | len_nibble);
            out.extend_from_slice(&delta_ext);
            out.extend_from_slice(&len_ext);
            out.extend_from_slice(&option.value);
        }

        if !self.payload.is_empty() {
            out.push(PAYLOAD_MARKER);
            out.extend_from_slice(&self.payload);
        }
        out
    }
}

fn read_extended(
    bytes: &[u8],
    pos: &mut usize,
    nibble: u8,
    start: usize,
) -> Result<u16, DecodeError> {
    match nibble {
        0..=12 => Ok(u16::from(nibble)),
        13 => {
            let b = *bytes.get(*pos).ok_or(DecodeError::TruncatedOption(start))?;
            *pos += 1;
            Ok(u16::from(b) + 13)
        }
        14 => {
            let hi = *bytes.get(*pos).ok_or(DecodeError::TruncatedOption(start))?;
            let lo = *bytes
                .get(*pos + 1)
                .ok_or(DecodeError::TruncatedOption(start))?;
            *pos += 2;
            u16::from_be_bytes([hi, lo])
                .checked_add(269)
                .ok_or(DecodeError::OptionOverflow)
        }
        _ => Err(DecodeError::ReservedNibble(start)),
    }
}

fn split_extended(value: usize) -> (u8, SmallVec<[u8; 2]>) {
    let mut ext = SmallVec::new();
    if value < 13 {
        (value as u8, ext)
    } else if value < 269 {
        ext.push((value - 13) as u8);
        (13, ext)
    } else {
        ext.extend_from_slice(&((value - 269) as u16).to_be_bytes());
        (14, ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::option;

    #[test]
    fn test_decode_minimal_get() {
        // CON GET, mid 0x7d34, no token, Uri-Path "temp"
        let bytes = [0x40, 0x01, 0x7d, 0x34, 0xb4, b't', b'e', b'm', b'p'];
        let msg = Message::decode(&bytes).unwrap();
        assert_eq!(msg.mtype, MessageType::Confirmable);
        assert_eq!(msg.code, Code::new(0, 1));
        assert_eq!(msg.message_id, 0x7d34);
        assert!(msg.token.is_empty());
        assert_eq!(msg.options.len(), 1);
        assert_eq!(msg.options[0].number, option::URI_PATH);
        assert_eq!(msg.options[0].value, b"temp");
        assert_eq!(msg.encode(), bytes);
    }

    #[test]
    fn test_extended_delta_and_length() {
        let mut msg = Message::new(MessageType::NonConfirmable, Code::new(0, 2), 1);
        msg.push_option(MessageOption::new(300, vec![7u8; 20]));
        let encoded = msg.encode();
        // delta 300 -> nibble 14, length 20 -> nibble 13
        assert_eq!(encoded[4], 0xed);
        assert_eq!(Message::decode(&encoded).unwrap(), msg);
    }

    #[test]
    fn test_reserved_nibble_rejected() {
        let bytes = [0x40, 0x01, 0x00, 0x01, 0xf1, 0x00];
        assert_eq!(
            Message::decode(&bytes),
            Err(DecodeError::ReservedNibble(4))
        );
    }

    #[test]
    fn test_uint_option_minimal_encoding() {
        assert!(MessageOption::uint(option::CONTENT_FORMAT, 0).value.is_empty());
        assert_eq!(MessageOption::uint(option::ACCEPT, 50).value, vec![50]);
        assert_eq!(MessageOption::uint(option::ACCEPT, 0x0102).as_uint(), Some(0x0102));
    }

    #[test]
    fn test_peek_header_on_garbage_body() {
        let bytes = [0x42, 0x01, 0x12, 0x34, 0xaa];
        assert!(Message::decode(&bytes).is_err());
        assert_eq!(
            Message::peek_header(&bytes),
            Some((MessageType::Confirmable, 0x1234))
        );
    }
}
