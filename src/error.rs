use std::error;
use std::fmt;
use std::io;
use std::str::Utf8Error;

use crate::signature::SignatureError;

/// Result alias using an [`Error`] as the error type by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error raised by this crate.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    #[inline]
    pub(crate) fn new(kind: ErrorKind) -> Error {
        Self { kind }
    }

    #[inline]
    pub(crate) fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// The D-Bus error name, if this error is an error reply from a peer.
    ///
    /// # Examples
    ///
    /// ```
    /// use minibus::Error;
    ///
    /// fn is_unknown_method(error: &Error) -> bool {
    ///     error.error_name() == Some("org.freedesktop.DBus.Error.UnknownMethod")
    /// }
    /// ```
    pub fn error_name(&self) -> Option<&str> {
        match &self.kind {
            ErrorKind::ResponseError(name, _) => Some(&**name),
            _ => None,
        }
    }
}

impl From<SignatureError> for Error {
    #[inline]
    fn from(error: SignatureError) -> Self {
        Self::new(ErrorKind::Signature(error))
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(error: io::Error) -> Self {
        Self::new(ErrorKind::Io(error))
    }
}

impl From<Utf8Error> for Error {
    #[inline]
    fn from(error: Utf8Error) -> Self {
        Self::new(ErrorKind::Utf8Error(error))
    }
}

impl From<ErrorKind> for Error {
    #[inline]
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            ErrorKind::Io(..) => write!(f, "I/O error"),
            ErrorKind::Signature(..) => write!(f, "Signature error"),
            ErrorKind::Utf8Error(..) => write!(f, "UTF-8 error"),
            ErrorKind::BufferUnderflow => write!(f, "Unexpected end of buffer"),
            ErrorKind::InvalidEndianness(byte) => {
                write!(f, "Invalid endianness marker {byte:#04x}")
            }
            ErrorKind::InvalidMessageType(byte) => write!(f, "Invalid message type {byte}"),
            ErrorKind::InvalidFieldCode(code) => {
                write!(f, "Invalid header field code {code}")
            }
            ErrorKind::InvalidFieldType(code) => {
                write!(f, "Invalid value type for header field {code}")
            }
            ErrorKind::BodyMismatch(expected, actual) => {
                write!(f, "Body is {actual} bytes but the header declared {expected}")
            }
            ErrorKind::InvalidBoolean(value) => write!(f, "Invalid boolean value {value}"),
            ErrorKind::ZeroSerial => write!(f, "Zero in header serial"),
            ErrorKind::ArrayOutOfBounds => {
                write!(f, "Array contents exceed the encoded byte length")
            }
            ErrorKind::ArrayTooLong(length) => {
                write!(f, "Array of length {length} is too long (max is 67108864)")
            }
            ErrorKind::BodyTooLong(length) => {
                write!(f, "Body of length {length} is too long (max is 134217728)")
            }
            ErrorKind::UnsupportedAddress => write!(f, "address type not supported"),
            ErrorKind::AuthRejected(line) => {
                write!(f, "Authentication failed, server said {line:?}")
            }
            ErrorKind::AuthTimedOut => write!(f, "Authentication handshake timed out"),
            ErrorKind::CallTimedOut => write!(f, "Call timed out"),
            ErrorKind::InvalidReply => write!(f, "Unexpected reply body"),
            ErrorKind::Closed => write!(f, "Client is closed"),
            ErrorKind::Disconnected => write!(f, "Connection closed"),
            ErrorKind::ResponseError(name, message) if message.is_empty() => {
                write!(f, "{name}")
            }
            ErrorKind::ResponseError(name, message) => write!(f, "{name}: {message}"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(error) => Some(error),
            ErrorKind::Signature(error) => Some(error),
            ErrorKind::Utf8Error(error) => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) enum ErrorKind {
    Io(io::Error),
    Signature(SignatureError),
    Utf8Error(Utf8Error),
    BufferUnderflow,
    InvalidEndianness(u8),
    InvalidMessageType(u8),
    InvalidFieldCode(u8),
    InvalidFieldType(u8),
    BodyMismatch(u32, u32),
    InvalidBoolean(u32),
    ZeroSerial,
    ArrayOutOfBounds,
    ArrayTooLong(u32),
    BodyTooLong(u32),
    UnsupportedAddress,
    AuthRejected(Box<str>),
    AuthTimedOut,
    CallTimedOut,
    InvalidReply,
    Closed,
    Disconnected,
    ResponseError(Box<str>, Box<str>),
}
