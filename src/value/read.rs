use crate::buf::ByteReader;
use crate::error::Result;
use crate::proto::Type;
use crate::signature::{self, Node};
use crate::value::{Array, Value};

/// Read as many values from `reader` as `signature` contains single
/// complete types.
pub fn read(reader: &mut ByteReader<'_>, signature: &str) -> Result<Vec<Value>> {
    let nodes = signature::parse(signature)?;
    let mut values = Vec::with_capacity(nodes.len());

    for node in &nodes {
        values.push(read_node(reader, node)?);
    }

    Ok(values)
}

/// Read one value under the given parse tree node.
pub(crate) fn read_node(reader: &mut ByteReader<'_>, node: &Node) -> Result<Value> {
    match node {
        Node::Basic(code) => read_basic(reader, *code),
        Node::Variant => {
            let signature = reader.read_signature()?;
            let node = signature::parse_single(&signature)?;
            let value = read_node(reader, &node)?;
            Ok(Value::Variant(Box::new(value)))
        }
        Node::Struct(fields) => {
            reader.align(8)?;
            let mut values = Vec::with_capacity(fields.len());

            for field in fields {
                values.push(read_node(reader, field)?);
            }

            Ok(Value::Struct(values))
        }
        Node::Dict(key, value) => {
            reader.align(8)?;
            let key = read_node(reader, key)?;
            let value = read_node(reader, value)?;
            Ok(Value::DictEntry(Box::new(key), Box::new(value)))
        }
        Node::Array(element) => read_array(reader, element),
    }
}

fn read_basic(reader: &mut ByteReader<'_>, code: Type) -> Result<Value> {
    Ok(match code {
        Type::Byte => Value::Byte(reader.read_byte()?),
        Type::Bool => Value::Bool(reader.read_bool()?),
        Type::Int16 => Value::Int16(reader.read_i16()?),
        Type::Uint16 => Value::Uint16(reader.read_u16()?),
        Type::Int32 => Value::Int32(reader.read_i32()?),
        Type::Uint32 => Value::Uint32(reader.read_u32()?),
        Type::Int64 => Value::Int64(reader.read_i64()?),
        Type::Uint64 => Value::Uint64(reader.read_u64()?),
        Type::Double => Value::Double(reader.read_f64()?),
        Type::String => Value::String(reader.read_string()?),
        Type::ObjectPath => Value::ObjectPath(reader.read_object_path()?),
        Type::Signature => Value::Signature(reader.read_signature()?),
        Type::UnixFd => Value::UnixFd(reader.read_unix_fd()?),
    })
}

/// Read an array. Arrays of dict entries are deduplicated on the key, with
/// the last entry winning while the position of the first is kept.
fn read_array(reader: &mut ByteReader<'_>, element: &Node) -> Result<Value> {
    let is_dict = matches!(element, Node::Dict(..));
    let mut values = Vec::new();

    reader.consume_array(element.alignment(), |reader| {
        let value = read_node(reader, element)?;

        if is_dict {
            let existing = match &value {
                Value::DictEntry(key, _) => values.iter().position(
                    |entry| matches!(entry, Value::DictEntry(k, _) if k == key),
                ),
                _ => None,
            };

            if let Some(existing) = existing {
                values[existing] = value;
                return Ok(());
            }
        }

        values.push(value);
        Ok(())
    })?;

    Ok(Value::Array(Array {
        signature: element.signature(),
        values,
    }))
}
