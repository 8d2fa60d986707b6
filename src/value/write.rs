use crate::buf::ByteWriter;
use crate::error::Result;
use crate::signature::{self, SignatureError, SignatureErrorKind};
use crate::value::{Array, Value};

impl Value {
    /// Marshal this value into `buf` according to the D-Bus marshaling
    /// rules.
    pub fn marshal(&self, buf: &mut ByteWriter) -> Result<()> {
        match self {
            Value::Byte(value) => buf.write_byte(*value),
            Value::Bool(value) => buf.write_bool(*value),
            Value::Int16(value) => buf.write_i16(*value),
            Value::Uint16(value) => buf.write_u16(*value),
            Value::Int32(value) => buf.write_i32(*value),
            Value::Uint32(value) => buf.write_u32(*value),
            Value::Int64(value) => buf.write_i64(*value),
            Value::Uint64(value) => buf.write_u64(*value),
            Value::Double(value) => buf.write_f64(*value),
            Value::String(value) => buf.write_string(value),
            Value::ObjectPath(value) => buf.write_object_path(value),
            Value::Signature(value) => buf.write_signature(value),
            Value::UnixFd(value) => buf.write_unix_fd(*value),
            Value::Struct(fields) => {
                if fields.is_empty() {
                    return Err(
                        SignatureError::new(SignatureErrorKind::StructHasNoFields).into()
                    );
                }

                buf.align(8);

                for field in fields {
                    field.marshal(buf)?;
                }
            }
            Value::Array(array) => {
                array.marshal(buf)?;
            }
            Value::DictEntry(key, value) => {
                buf.align(8);
                key.marshal(buf)?;
                value.marshal(buf)?;
            }
            Value::Variant(value) => {
                buf.write_signature(&value.signature());
                value.marshal(buf)?;
            }
        }

        Ok(())
    }
}

impl Array {
    /// Marshal the array frame: byte length, padding up to the element
    /// alignment, then the elements.
    ///
    /// The length field is reserved first and patched once the end of the
    /// last element is known; the encoded length excludes the padding
    /// between the length field and the first element.
    pub(crate) fn marshal(&self, buf: &mut ByteWriter) -> Result<()> {
        let element = signature::parse_single(&self.signature)?;

        buf.write_u32(0);
        let length_at = buf.len() - 4;

        buf.align(element.alignment());
        let start = buf.len();

        for value in &self.values {
            value.marshal(buf)?;
        }

        buf.set_u32(length_at, (buf.len() - start) as u32);
        Ok(())
    }
}
