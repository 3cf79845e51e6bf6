use thiserror::Error;

/// Errors an exchange can settle with.
///
/// Codes follow Chromium's `net_error_list.h` where an equivalent exists;
/// crate-specific conditions use the -1000 range.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum NetError {
    // Generic
    #[error("Operation aborted")]
    Aborted,
    #[error("Invalid argument")]
    InvalidArgument,
    #[error("Request timed out")]
    TimedOut,

    // Connection Errors
    #[error("Connection closed (TCP FIN)")]
    ConnectionClosed,
    #[error("Connection reset (TCP RST)")]
    ConnectionReset,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection aborted")]
    ConnectionAborted,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Name not resolved")]
    NameNotResolved,
    #[error("SSL protocol error")]
    SslProtocolError,
    #[error("Address invalid")]
    AddressInvalid,
    #[error("Address unreachable")]
    AddressUnreachable,
    #[error("Connection timed out")]
    ConnectionTimedOut,

    // HTTP Errors
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Unknown URL scheme")]
    UnknownUrlScheme,
    #[error("Invalid response")]
    InvalidResponse,
    #[error("Empty response")]
    EmptyResponse,
    #[error("Content-Length mismatch")]
    ContentLengthMismatch,

    // Crate-specific
    #[error("Invalid header name or value")]
    InvalidHeader,
    #[error("Response timed out")]
    ResponseTimedOut,
    #[error("Request body source failed")]
    BodySourceFailed,
    #[error("No async runtime available")]
    NoRuntime,
    #[error("Response body is not valid UTF-8")]
    InvalidUtf8,
    #[error("Response body is not valid JSON")]
    JsonParseError,

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl NetError {
    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::Aborted => -3,
            NetError::InvalidArgument => -4,
            NetError::TimedOut => -7,

            NetError::ConnectionClosed => -100,
            NetError::ConnectionReset => -101,
            NetError::ConnectionRefused => -102,
            NetError::ConnectionAborted => -103,
            NetError::ConnectionFailed => -104,
            NetError::NameNotResolved => -105,
            NetError::SslProtocolError => -107,
            NetError::AddressInvalid => -108,
            NetError::AddressUnreachable => -109,
            NetError::ConnectionTimedOut => -118,

            NetError::InvalidUrl => -300,
            NetError::UnknownUrlScheme => -302,
            NetError::InvalidResponse => -320,
            NetError::EmptyResponse => -324,
            NetError::ContentLengthMismatch => -354,

            NetError::InvalidHeader => -1000,
            NetError::ResponseTimedOut => -1001,
            NetError::BodySourceFailed => -1002,
            NetError::NoRuntime => -1003,
            NetError::InvalidUtf8 => -1004,
            NetError::JsonParseError => -1005,
            NetError::Unknown(code) => *code,
        }
    }

    /// True for every synthesized timeout, whichever phase it fired in.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            NetError::TimedOut | NetError::ResponseTimedOut | NetError::ConnectionTimedOut
        )
    }

    /// Short errno-style marker callers can match on.
    pub fn marker(&self) -> &'static str {
        match self {
            NetError::TimedOut | NetError::ResponseTimedOut | NetError::ConnectionTimedOut => {
                "ETIMEDOUT"
            }
            NetError::ConnectionRefused => "ECONNREFUSED",
            NetError::ConnectionReset => "ECONNRESET",
            NetError::ConnectionAborted | NetError::Aborted => "ECONNABORTED",
            NetError::NameNotResolved => "ENOTFOUND",
            NetError::AddressUnreachable => "EHOSTUNREACH",
            NetError::ConnectionClosed => "EPIPE",
            _ => "EPROTO",
        }
    }
}

impl From<i32> for NetError {
    fn from(code: i32) -> Self {
        match code {
            -3 => NetError::Aborted,
            -4 => NetError::InvalidArgument,
            -7 => NetError::TimedOut,

            -100 => NetError::ConnectionClosed,
            -101 => NetError::ConnectionReset,
            -102 => NetError::ConnectionRefused,
            -103 => NetError::ConnectionAborted,
            -104 => NetError::ConnectionFailed,
            -105 => NetError::NameNotResolved,
            -107 => NetError::SslProtocolError,
            -108 => NetError::AddressInvalid,
            -109 => NetError::AddressUnreachable,
            -118 => NetError::ConnectionTimedOut,

            -300 => NetError::InvalidUrl,
            -302 => NetError::UnknownUrlScheme,
            -320 => NetError::InvalidResponse,
            -324 => NetError::EmptyResponse,
            -354 => NetError::ContentLengthMismatch,

            -1000 => NetError::InvalidHeader,
            -1001 => NetError::ResponseTimedOut,
            -1002 => NetError::BodySourceFailed,
            -1003 => NetError::NoRuntime,
            -1004 => NetError::InvalidUtf8,
            -1005 => NetError::JsonParseError,
            _ => NetError::Unknown(code),
        }
    }
}

/// Map a hyper error onto the closest error code.
pub fn from_hyper(err: &hyper::Error) -> NetError {
    let source = std::error::Error::source(err);

    if err.is_canceled() || err.is_body_write_aborted() {
        return NetError::ConnectionAborted;
    }
    if err.is_user() {
        return from_user_error(source);
    }

    if let Some(io) = source.and_then(|s| s.downcast_ref::<std::io::Error>()) {
        return crate::base::context::classify_io(io);
    }

    if err.is_timeout() {
        NetError::TimedOut
    } else if err.is_parse() {
        NetError::InvalidResponse
    } else if err.is_incomplete_message() || err.is_closed() {
        NetError::ConnectionClosed
    } else {
        NetError::ConnectionFailed
    }
}

/// hyper only attaches a cause to user errors raised by the request body;
/// the rest (unsupported method or version, absolute URI required) describe
/// a request hyper refused to send.
fn from_user_error(source: Option<&(dyn std::error::Error + 'static)>) -> NetError {
    match source {
        Some(_) => NetError::BodySourceFailed,
        None => NetError::InvalidArgument,
    }
}
