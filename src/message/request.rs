use super::{
    option, Code, ContentFormat, Message, MessageOption, MessageType, Method, ResponseCode,
};
use crate::ids::RequestId;

/// A decoded request handed to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation id for logs
    pub request_id: RequestId,
    /// GET / POST / PUT / DELETE
    pub method: Method,
    /// Absolute path built from Uri-Path segments, `/` when there are none
    pub path: String,
    /// Uri-Query values in order
    pub query: Vec<String>,
    /// Request payload, if any
    pub payload: Option<Vec<u8>>,
    /// Content-Format of the payload
    pub content_format: Option<ContentFormat>,
    /// Accept option: the only format the client will take
    pub accept: Option<ContentFormat>,
    /// Message id of the carrying datagram
    pub message_id: u16,
    /// Token to echo in the response
    pub token: Vec<u8>,
    /// Whether the request arrived as CON
    pub confirmable: bool,
}

/// Why a request-class message could not become a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// Request code outside GET, POST, PUT and DELETE
    #[error("unsupported method code {0}")]
    UnknownMethod(Code),
    /// An interpreted option carries an unusable value
    #[error("malformed option {number}: {reason}")]
    BadOption { number: u16, reason: &'static str },
}

impl RequestError {
    /// Response code the server answers this error with.
    #[must_use]
    pub fn status(&self) -> ResponseCode {
        match self {
            Self::UnknownMethod(_) => ResponseCode::MethodNotAllowed,
            Self::BadOption { .. } => ResponseCode::BadRequest,
        }
    }
}

impl Request {
    /// A bare request, mostly for tests and the CLI client.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request_id: RequestId::new(),
            method,
            path: path.into(),
            query: Vec::new(),
            payload: None,
            content_format: None,
            accept: None,
            message_id: 0,
            token: Vec::new(),
            confirmable: true,
        }
    }

    /// Set the Accept option.
    #[must_use]
    pub fn with_accept(mut self, format: ContentFormat) -> Self {
        self.accept = Some(format);
        self
    }

    /// Attach a payload and its format.
    #[must_use]
    pub fn with_payload(mut self, format: ContentFormat, payload: impl Into<Vec<u8>>) -> Self {
        self.content_format = Some(format);
        self.payload = Some(payload.into());
        self
    }

    /// Convert a request-class message.
    ///
    /// Fails when the code is not a method this server knows or when an option
    /// the server interprets is malformed; [`RequestError::status`] gives the
    /// code to answer with.
    pub fn from_message(msg: &Message) -> Result<Self, RequestError> {
        let method = Method::from_code(msg.code).ok_or(RequestError::UnknownMethod(msg.code))?;

        let text = |number: u16, value: &[u8]| {
            std::str::from_utf8(value)
                .map(str::to_owned)
                .map_err(|_| RequestError::BadOption {
                    number,
                    reason: "not UTF-8",
                })
        };

        let mut path = String::new();
        for segment in msg.option_values(option::URI_PATH) {
            path.push('/');
            path.push_str(&text(option::URI_PATH, segment)?);
        }
        if path.is_empty() {
            path.push('/');
        }

        let query = msg
            .option_values(option::URI_QUERY)
            .map(|q| text(option::URI_QUERY, q))
            .collect::<Result<Vec<_>, _>>()?;

        let uint_format = |number| -> Result<Option<ContentFormat>, RequestError> {
            msg.option(number)
                .map(|opt| {
                    opt.as_uint()
                        .and_then(|v| u16::try_from(v).ok())
                        .map(ContentFormat)
                        .ok_or(RequestError::BadOption {
                            number,
                            reason: "content format wider than 2 bytes",
                        })
                })
                .transpose()
        };

        Ok(Self {
            request_id: RequestId::new(),
            method,
            path,
            query,
            payload: (!msg.payload.is_empty()).then(|| msg.payload.clone()),
            content_format: uint_format(option::CONTENT_FORMAT)?,
            accept: uint_format(option::ACCEPT)?,
            message_id: msg.message_id,
            token: msg.token.clone(),
            confirmable: msg.mtype == MessageType::Confirmable,
        })
    }

    /// Encode as a message (client side).
    #[must_use]
    pub fn to_message(&self) -> Message {
        let mtype = if self.confirmable {
            MessageType::Confirmable
        } else {
            MessageType::NonConfirmable
        };
        let mut msg = Message::new(mtype, self.method.code(), self.message_id);
        msg.token = self.token.clone();
        for segment in self.path.split('/').filter(|s| !s.is_empty()) {
            msg.push_option(MessageOption::new(option::URI_PATH, segment.as_bytes()));
        }
        for q in &self.query {
            msg.push_option(MessageOption::new(option::URI_QUERY, q.as_bytes()));
        }
        if let Some(format) = self.content_format {
            msg.push_option(MessageOption::uint(option::CONTENT_FORMAT, u32::from(format.0)));
        }
        if let Some(format) = self.accept {
            msg.push_option(MessageOption::uint(option::ACCEPT, u32::from(format.0)));
        }
        if let Some(payload) = &self.payload {
            msg.payload = payload.clone();
        }
        msg
    }
}

/// The dispatcher's answer to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code
    pub status: ResponseCode,
    /// Content-Format of `payload`
    pub content_format: Option<ContentFormat>,
    /// Payload bytes
    pub payload: Option<Vec<u8>>,
}

impl Response {
    /// A response with no payload.
    #[must_use]
    pub fn empty(status: ResponseCode) -> Self {
        Self {
            status,
            content_format: None,
            payload: None,
        }
    }

    /// 2.05 Content with a text/plain body.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            status: ResponseCode::Content,
            content_format: Some(ContentFormat::TEXT_PLAIN),
            payload: Some(body.into().into_bytes()),
        }
    }

    /// An error response with a short diagnostic payload (RFC 7252 §5.5.2).
    pub fn error(status: ResponseCode, diagnostic: &str) -> Self {
        Self {
            status,
            content_format: None,
            payload: (!diagnostic.is_empty()).then(|| diagnostic.as_bytes().to_vec()),
        }
    }

    /// Payload as UTF-8, lossy.
    #[must_use]
    pub fn payload_str(&self) -> Option<std::borrow::Cow<'_, str>> {
        self.payload.as_deref().map(String::from_utf8_lossy)
    }

    /// Wrap into a message with the given type, id and token.
    #[must_use]
    pub fn into_message(self, mtype: MessageType, message_id: u16, token: &[u8]) -> Message {
        let mut msg = Message::new(mtype, self.status.code(), message_id);
        msg.token = token.to_vec();
        if let Some(format) = self.content_format {
            msg.push_option(MessageOption::uint(option::CONTENT_FORMAT, u32::from(format.0)));
        }
        if let Some(payload) = self.payload {
            msg.payload = payload;
        }
        msg
    }

    /// Rebuild from a response-class message (client side).
    #[must_use]
    pub fn from_message(msg: &Message) -> Option<Self> {
        let status = ResponseCode::from_code(msg.code)?;
        Some(Self {
            status,
            content_format: msg
                .option(option::CONTENT_FORMAT)
                .and_then(MessageOption::as_uint)
                .and_then(|v| u16::try_from(v).ok())
                .map(ContentFormat),
            payload: (!msg.payload.is_empty()).then(|| msg.payload.clone()),
        })
    }
}

impl From<ResponseCode> for Response {
    fn from(status: ResponseCode) -> Self {
        Response::empty(status)
    }
}
