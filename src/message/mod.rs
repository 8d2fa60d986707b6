//! Messages and their fixed-layout header framing.

#[cfg(test)]
mod tests;

use crate::buf::{ByteReader, ByteWriter, MAX_BODY_LENGTH};
use crate::error::{Error, ErrorKind, Result};
use crate::proto::{Endianness, Flags, MessageType};
use crate::value::{self, Value};

/// The major protocol version spoken by this crate.
const PROTOCOL_VERSION: u8 = 1;

// The codes keying the header field array. Code 0 is invalid and codes
// past FIELD_UNIX_FDS are rejected on read.
const FIELD_PATH: u8 = 1;
const FIELD_INTERFACE: u8 = 2;
const FIELD_MEMBER: u8 = 3;
const FIELD_ERROR_NAME: u8 = 4;
const FIELD_REPLY_SERIAL: u8 = 5;
const FIELD_DESTINATION: u8 = 6;
const FIELD_SENDER: u8 = 7;
const FIELD_SIGNATURE: u8 = 8;
const FIELD_UNIX_FDS: u8 = 9;

/// The optional fields carried in the header field array, keyed by their
/// field code on the wire.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Fields {
    /// The object a call is sent to, or a signal is emitted from.
    pub path: Option<String>,
    /// The interface to invoke a method call on, or that a signal is
    /// emitted from.
    pub interface: Option<String>,
    /// The member, either the method name or signal name.
    pub member: Option<String>,
    /// The name of the error that occurred, for errors.
    pub error_name: Option<String>,
    /// The serial number of the message this message is a reply to.
    pub reply_serial: Option<u32>,
    /// The name of the connection this message is intended for.
    pub destination: Option<String>,
    /// Unique name of the sending connection.
    pub sender: Option<String>,
    /// The signature of the message body.
    pub signature: Option<String>,
    /// The number of Unix file descriptors accompanying the message.
    pub unix_fds: Option<u32>,
}

/// A message header: the fixed-layout prefix plus the header field array.
///
/// The on-wire form is padded to an 8-byte boundary at its end, since body
/// alignment is measured from the first byte of the message.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    /// The endianness the message is marshaled with.
    pub endianness: Endianness,
    /// The type of the message.
    pub message_type: MessageType,
    /// Message flags.
    pub flags: Flags,
    /// The byte length of the body following the header.
    pub body_length: u32,
    /// The sender-assigned serial of this message. Zero is reserved and
    /// never appears on the wire.
    pub serial: u32,
    /// The optional header fields.
    pub fields: Fields,
}

impl Header {
    /// Construct an empty header of the given message type, in native
    /// endian.
    pub fn new(message_type: MessageType) -> Self {
        Self {
            endianness: Endianness::NATIVE,
            message_type,
            flags: Flags::EMPTY,
            body_length: 0,
            serial: 0,
            fields: Fields::default(),
        }
    }

    /// Marshal the header into `buf`, which must be positioned at the start
    /// of a message and share the header's endianness.
    pub fn marshal(&self, buf: &mut ByteWriter) -> Result<()> {
        buf.write_byte(self.endianness.marker());
        buf.write_byte(self.message_type.as_byte());
        buf.write_byte(self.flags.bits());
        buf.write_byte(PROTOCOL_VERSION);
        buf.write_u32(self.body_length);
        buf.write_u32(self.serial);

        buf.write_u32(0);
        let length_at = buf.len() - 4;
        let start = buf.len();

        self.marshal_field(buf, FIELD_PATH, &self.fields.path, Value::ObjectPath)?;
        self.marshal_field(buf, FIELD_INTERFACE, &self.fields.interface, Value::String)?;
        self.marshal_field(buf, FIELD_MEMBER, &self.fields.member, Value::String)?;
        self.marshal_field(buf, FIELD_ERROR_NAME, &self.fields.error_name, Value::String)?;

        if let Some(serial) = self.fields.reply_serial {
            self.marshal_raw_field(buf, FIELD_REPLY_SERIAL, &Value::Uint32(serial))?;
        }

        self.marshal_field(buf, FIELD_DESTINATION, &self.fields.destination, Value::String)?;
        self.marshal_field(buf, FIELD_SENDER, &self.fields.sender, Value::String)?;
        self.marshal_field(buf, FIELD_SIGNATURE, &self.fields.signature, Value::Signature)?;

        if let Some(unix_fds) = self.fields.unix_fds {
            self.marshal_raw_field(buf, FIELD_UNIX_FDS, &Value::Uint32(unix_fds))?;
        }

        buf.set_u32(length_at, (buf.len() - start) as u32);
        buf.align(8);
        Ok(())
    }

    fn marshal_field(
        &self,
        buf: &mut ByteWriter,
        code: u8,
        field: &Option<String>,
        wrap: impl FnOnce(String) -> Value,
    ) -> Result<()> {
        if let Some(field) = field {
            self.marshal_raw_field(buf, code, &wrap(field.clone()))?;
        }

        Ok(())
    }

    fn marshal_raw_field(&self, buf: &mut ByteWriter, code: u8, value: &Value) -> Result<()> {
        buf.align(8);
        buf.write_byte(code);
        buf.write_signature(&value.signature());
        value.marshal(buf)
    }

    /// Unmarshal a header from `reader`, which must be positioned at the
    /// start of a message.
    ///
    /// The trailing padding up to the 8-byte boundary is consumed, leaving
    /// the reader at the first byte of the body.
    pub fn unmarshal(reader: &mut ByteReader<'_>) -> Result<Self> {
        let endianness = Endianness::from_byte(reader.read_byte()?)?;
        reader.set_endianness(endianness);

        let message_type = MessageType::from_byte(reader.read_byte()?)?;
        let flags = Flags::from_bits(reader.read_byte()?);
        let _version = reader.read_byte()?;
        let body_length = reader.read_u32()?;
        let serial = reader.read_u32()?;

        if serial == 0 {
            return Err(Error::new(ErrorKind::ZeroSerial));
        }

        let mut fields = Fields::default();

        reader.consume_array(8, |reader| {
            let code = reader.read_byte()?;
            let signature = reader.read_signature()?;
            let node = crate::signature::parse_single(&signature)?;
            let value = value::read_node(reader, &node)?;

            match (code, value) {
                (FIELD_PATH, Value::ObjectPath(path)) => {
                    fields.path = Some(path);
                }
                (FIELD_INTERFACE, Value::String(interface)) => {
                    fields.interface = Some(interface);
                }
                (FIELD_MEMBER, Value::String(member)) => {
                    fields.member = Some(member);
                }
                (FIELD_ERROR_NAME, Value::String(error_name)) => {
                    fields.error_name = Some(error_name);
                }
                (FIELD_REPLY_SERIAL, Value::Uint32(reply_serial)) => {
                    fields.reply_serial = Some(reply_serial);
                }
                (FIELD_DESTINATION, Value::String(destination)) => {
                    fields.destination = Some(destination);
                }
                (FIELD_SENDER, Value::String(sender)) => {
                    fields.sender = Some(sender);
                }
                (FIELD_SIGNATURE, Value::Signature(signature)) => {
                    fields.signature = Some(signature);
                }
                (FIELD_UNIX_FDS, Value::Uint32(unix_fds)) => {
                    fields.unix_fds = Some(unix_fds);
                }
                (0 | 10.., _) => {
                    return Err(Error::new(ErrorKind::InvalidFieldCode(code)));
                }
                _ => {
                    return Err(Error::new(ErrorKind::InvalidFieldType(code)));
                }
            }

            Ok(())
        })?;

        reader.align(8)?;

        Ok(Self {
            endianness,
            message_type,
            flags,
            body_length,
            serial,
            fields,
        })
    }
}

/// A header paired with its decoded body.
///
/// The body is opaque to the framing layer: zero or more values which are
/// marshaled under the signature header field.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// The message header.
    pub header: Header,
    /// The body values.
    pub body: Vec<Value>,
}

impl Message {
    /// Construct a method call addressed to `path` and `member`.
    ///
    /// # Examples
    ///
    /// ```
    /// use minibus::Message;
    ///
    /// let m = Message::method_call("/org/freedesktop/DBus", "Hello")
    ///     .with_interface("org.freedesktop.DBus")
    ///     .with_destination("org.freedesktop.DBus");
    ///
    /// assert_eq!(m.header.fields.member.as_deref(), Some("Hello"));
    /// ```
    pub fn method_call(path: impl Into<String>, member: impl Into<String>) -> Self {
        let mut header = Header::new(MessageType::MethodCall);
        header.fields.path = Some(path.into());
        header.fields.member = Some(member.into());

        Self {
            header,
            body: Vec::new(),
        }
    }

    /// Construct a method return replying to `reply_serial`.
    pub fn method_return(reply_serial: u32) -> Self {
        let mut header = Header::new(MessageType::MethodReturn);
        header.fields.reply_serial = Some(reply_serial);

        Self {
            header,
            body: Vec::new(),
        }
    }

    /// Construct an error reply to `reply_serial` carrying `error_name`.
    pub fn error(error_name: impl Into<String>, reply_serial: u32) -> Self {
        let mut header = Header::new(MessageType::Error);
        header.fields.error_name = Some(error_name.into());
        header.fields.reply_serial = Some(reply_serial);

        Self {
            header,
            body: Vec::new(),
        }
    }

    /// Construct a signal emitted from `path` and `interface`.
    pub fn signal(
        path: impl Into<String>,
        interface: impl Into<String>,
        member: impl Into<String>,
    ) -> Self {
        let mut header = Header::new(MessageType::Signal);
        header.fields.path = Some(path.into());
        header.fields.interface = Some(interface.into());
        header.fields.member = Some(member.into());

        Self {
            header,
            body: Vec::new(),
        }
    }

    /// Set the destination field.
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.header.fields.destination = Some(destination.into());
        self
    }

    /// Set the interface field.
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.header.fields.interface = Some(interface.into());
        self
    }

    /// Set the sender field.
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.header.fields.sender = Some(sender.into());
        self
    }

    /// Set the message flags.
    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.header.flags = flags;
        self
    }

    /// Set the body to a single value.
    pub fn with_body(mut self, value: impl Into<Value>) -> Self {
        self.body = vec![value.into()];
        self
    }

    /// Set the body to a sequence of values.
    pub fn with_body_values(mut self, values: Vec<Value>) -> Self {
        self.body = values;
        self
    }

    /// The serial of the message this one replies to.
    pub fn reply_serial(&self) -> Option<u32> {
        self.header.fields.reply_serial
    }

    /// The signature of the body: the concatenation of the signatures of
    /// its values.
    pub fn body_signature(&self) -> String {
        let mut out = String::new();

        for value in &self.body {
            value.write_signature(&mut out);
        }

        out
    }

    /// Marshal the message: header, padding to 8, then the body, with the
    /// body length patched in at offset 4 afterwards.
    ///
    /// When a body is present and the header carries no signature field,
    /// the field is filled in from the body.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut header = self.header.clone();

        if !self.body.is_empty() && header.fields.signature.is_none() {
            header.fields.signature = Some(self.body_signature());
        }

        let mut buf = ByteWriter::new(header.endianness);
        header.marshal(&mut buf)?;
        let body_start = buf.len();

        for value in &self.body {
            value.marshal(&mut buf)?;
        }

        buf.set_u32(4, (buf.len() - body_start) as u32);
        Ok(buf.take_bytes())
    }

    /// Inspect a buffered message prefix and compute the total frame
    /// length: fixed header, field array, padding and body.
    ///
    /// Returns `None` when fewer than the 16 fixed bytes are available.
    /// Used to carve complete messages out of a byte stream before
    /// decoding.
    pub fn frame_length(bytes: &[u8]) -> Result<Option<usize>> {
        if bytes.len() < 16 {
            return Ok(None);
        }

        let endianness = Endianness::from_byte(bytes[0])?;
        let mut reader = ByteReader::new(&bytes[..16], endianness);
        reader.skip(4)?;
        let body_length = reader.read_u32()? as usize;
        reader.skip(4)?;
        let fields_length = reader.read_u32()? as usize;

        if body_length as u32 > MAX_BODY_LENGTH {
            return Err(Error::new(ErrorKind::BodyTooLong(body_length as u32)));
        }

        let headers = 16 + fields_length;
        Ok(Some(headers + crate::utils::padding_to(headers, 8) + body_length))
    }

    /// Unmarshal one message from `reader`.
    ///
    /// The reader is rebased first, so alignment is measured from the first
    /// byte of this message.
    pub fn unmarshal(reader: &mut ByteReader<'_>) -> Result<Self> {
        reader.rebase();
        let header = Header::unmarshal(reader)?;
        let body_start = reader.position();

        let body = match header.fields.signature.as_deref() {
            None | Some("") => Vec::new(),
            Some(signature) => value::read(reader, signature)?,
        };

        let actual = (reader.position() - body_start) as u32;

        if actual != header.body_length {
            return Err(Error::new(ErrorKind::BodyMismatch(header.body_length, actual)));
        }

        Ok(Self { header, body })
    }
}

