//! # Message Module
//!
//! CoAP message types (RFC 7252) and the binary codec.
//!
//! ## Overview
//!
//! - [`Message`] - a decoded datagram: header, token, options, payload
//! - [`Request`] / [`Response`] - what the dispatcher consumes and produces
//! - [`Method`], [`ResponseCode`], [`ContentFormat`] - closed enumerations
//!
//! Only the options the server acts on are interpreted (Uri-Path,
//! Content-Format, Uri-Query, Accept); any other option survives a
//! decode/encode cycle as opaque bytes.

mod codec;
mod request;

pub use codec::{DecodeError, Message, MessageOption, OptionVec, MAX_TOKEN_LEN, PAYLOAD_MARKER};
pub use request::{Request, RequestError, Response};

use std::fmt;

/// Option numbers the server understands.
pub mod option {
    /// Uri-Path, repeatable, one segment per option
    pub const URI_PATH: u16 = 11;
    /// Content-Format of the payload
    pub const CONTENT_FORMAT: u16 = 12;
    /// Uri-Query, repeatable
    pub const URI_QUERY: u16 = 15;
    /// Accept, the content format the client requires
    pub const ACCEPT: u16 = 17;
}

/// Message type from the fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Confirmable, needs an ACK
    Confirmable,
    /// Non-confirmable
    NonConfirmable,
    /// Acknowledgement
    Acknowledgement,
    /// Reset
    Reset,
}

impl MessageType {
    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::Confirmable,
            1 => Self::NonConfirmable,
            2 => Self::Acknowledgement,
            _ => Self::Reset,
        }
    }

    pub(crate) fn bits(self) -> u8 {
        match self {
            Self::Confirmable => 0,
            Self::NonConfirmable => 1,
            Self::Acknowledgement => 2,
            Self::Reset => 3,
        }
    }
}

/// Raw `class.detail` code byte.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Code(pub u8);

impl Code {
    /// 0.00, used by empty ACK / RST / ping
    pub const EMPTY: Code = Code(0);

    /// Build from class and detail.
    #[must_use]
    pub const fn new(class: u8, detail: u8) -> Self {
        Code((class << 5) | (detail & 0x1f))
    }

    /// Upper three bits.
    #[must_use]
    pub const fn class(self) -> u8 {
        self.0 >> 5
    }

    /// Lower five bits.
    #[must_use]
    pub const fn detail(self) -> u8 {
        self.0 & 0x1f
    }

    /// 0.00
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// 0.01 to 0.31
    #[must_use]
    pub const fn is_request(self) -> bool {
        self.class() == 0 && self.detail() != 0
    }

    /// 2.xx to 5.xx
    #[must_use]
    pub const fn is_response(self) -> bool {
        matches!(self.class(), 2..=5)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Code({self})")
    }
}

/// Request methods (RFC 7252 §12.1.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// 0.01
    Get,
    /// 0.02
    Post,
    /// 0.03
    Put,
    /// 0.04
    Delete,
}

impl Method {
    /// Map a request code to a method.
    #[must_use]
    pub fn from_code(code: Code) -> Option<Self> {
        match (code.class(), code.detail()) {
            (0, 1) => Some(Self::Get),
            (0, 2) => Some(Self::Post),
            (0, 3) => Some(Self::Put),
            (0, 4) => Some(Self::Delete),
            _ => None,
        }
    }

    /// Wire code of this method.
    #[must_use]
    pub fn code(self) -> Code {
        match self {
            Self::Get => Code::new(0, 1),
            Self::Post => Code::new(0, 2),
            Self::Put => Code::new(0, 3),
            Self::Delete => Code::new(0, 4),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        })
    }
}

/// Response codes produced by the dispatcher and the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    /// 2.05
    Content,
    /// 4.00, malformed request that still carried a request code
    BadRequest,
    /// 4.04
    NotFound,
    /// 4.05
    MethodNotAllowed,
    /// 4.06
    NotAcceptable,
    /// 5.00
    InternalServerError,
    /// 5.03
    ServiceUnavailable,
}

impl ResponseCode {
    /// Wire code.
    #[must_use]
    pub fn code(self) -> Code {
        match self {
            Self::Content => Code::new(2, 5),
            Self::BadRequest => Code::new(4, 0),
            Self::NotFound => Code::new(4, 4),
            Self::MethodNotAllowed => Code::new(4, 5),
            Self::NotAcceptable => Code::new(4, 6),
            Self::InternalServerError => Code::new(5, 0),
            Self::ServiceUnavailable => Code::new(5, 3),
        }
    }

    /// Parse a wire code back into a known response code.
    #[must_use]
    pub fn from_code(code: Code) -> Option<Self> {
        [
            Self::Content,
            Self::BadRequest,
            Self::NotFound,
            Self::MethodNotAllowed,
            Self::NotAcceptable,
            Self::InternalServerError,
            Self::ServiceUnavailable,
        ]
        .into_iter()
        .find(|rc| rc.code() == code)
    }

    /// 4.xx
    #[must_use]
    pub fn is_client_error(self) -> bool {
        self.code().class() == 4
    }

    /// 5.xx
    #[must_use]
    pub fn is_server_error(self) -> bool {
        self.code().class() == 5
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Content => "Content",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::NotAcceptable => "Not Acceptable",
            Self::InternalServerError => "Internal Server Error",
            Self::ServiceUnavailable => "Service Unavailable",
        };
        write!(f, "{} {}", self.code(), name)
    }
}

/// Content-Format registry value (RFC 7252 §12.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentFormat(pub u16);

impl ContentFormat {
    /// `text/plain; charset=utf-8`
    pub const TEXT_PLAIN: ContentFormat = ContentFormat(0);
    /// `application/link-format`
    pub const LINK_FORMAT: ContentFormat = ContentFormat(40);
    /// `application/json`
    pub const JSON: ContentFormat = ContentFormat(50);
}

impl fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::TEXT_PLAIN => f.write_str("text/plain;charset=utf-8"),
            Self::LINK_FORMAT => f.write_str("application/link-format"),
            Self::JSON => f.write_str("application/json"),
            ContentFormat(other) => write!(f, "content-format {other}"),
        }
    }
}
