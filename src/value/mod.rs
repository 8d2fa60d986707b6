//! The dynamically typed value model.
//!
//! A [`Value`] is one variant per basic type code plus the container forms.
//! Values know their own signature, so marshaling never re-parses a
//! signature string; unmarshaling is driven by the signature parse tree.


pub use self::read::read;
pub(crate) use self::read::read_node;
mod read;

mod write;

use std::fmt;

/// A single D-Bus value.
///
/// # Examples
///
/// ```
/// use minibus::Value;
///
/// let value = Value::Struct(vec![
///     Value::Uint32(101),
///     Value::String(String::from("hello")),
/// ]);
///
/// assert_eq!(value.signature(), "(us)");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 8-bit unsigned integer, type code `y`.
    Byte(u8),
    /// Boolean, type code `b`.
    Bool(bool),
    /// 16-bit signed integer, type code `n`.
    Int16(i16),
    /// 16-bit unsigned integer, type code `q`.
    Uint16(u16),
    /// 32-bit signed integer, type code `i`.
    Int32(i32),
    /// 32-bit unsigned integer, type code `u`.
    Uint32(u32),
    /// 64-bit signed integer, type code `x`.
    Int64(i64),
    /// 64-bit unsigned integer, type code `t`.
    Uint64(u64),
    /// IEEE 754 double, type code `d`.
    Double(f64),
    /// UTF-8 string, type code `s`.
    String(String),
    /// Object path, type code `o`.
    ObjectPath(String),
    /// Type signature, type code `g`.
    Signature(String),
    /// Unix file descriptor handle, type code `h`.
    UnixFd(u32),
    /// Ordered sequence of fields, type code `(...)`. Must not be empty.
    Struct(Vec<Value>),
    /// Array of values sharing one signature, type code `a`.
    Array(Array),
    /// Key-value pair, type code `{..}`. Only legal as an array element,
    /// and the key must be a basic type.
    DictEntry(Box<Value>, Box<Value>),
    /// A value carrying its own signature on the wire, type code `v`.
    Variant(Box<Value>),
}

impl Value {
    /// The signature of this value.
    pub fn signature(&self) -> String {
        let mut out = String::new();
        self.write_signature(&mut out);
        out
    }

    pub(crate) fn write_signature(&self, out: &mut String) {
        match self {
            Value::Byte(..) => out.push('y'),
            Value::Bool(..) => out.push('b'),
            Value::Int16(..) => out.push('n'),
            Value::Uint16(..) => out.push('q'),
            Value::Int32(..) => out.push('i'),
            Value::Uint32(..) => out.push('u'),
            Value::Int64(..) => out.push('x'),
            Value::Uint64(..) => out.push('t'),
            Value::Double(..) => out.push('d'),
            Value::String(..) => out.push('s'),
            Value::ObjectPath(..) => out.push('o'),
            Value::Signature(..) => out.push('g'),
            Value::UnixFd(..) => out.push('h'),
            Value::Struct(fields) => {
                out.push('(');

                for field in fields {
                    field.write_signature(out);
                }

                out.push(')');
            }
            Value::Array(array) => {
                out.push('a');
                out.push_str(&array.signature);
            }
            Value::DictEntry(key, value) => {
                out.push('{');
                key.write_signature(out);
                value.write_signature(out);
                out.push('}');
            }
            Value::Variant(..) => out.push('v'),
        }
    }

    /// Coerce into a string slice, for the `s` and `o` type codes.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(string) | Value::ObjectPath(string) | Value::Signature(string) => {
                Some(string)
            }
            _ => None,
        }
    }

    /// Coerce into a `u32`, for the `u` and `h` type codes.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::Uint32(value) | Value::UnixFd(value) => Some(*value),
            _ => None,
        }
    }

    /// Coerce into a `bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Coerce into the contained array.
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }
}

impl From<u32> for Value {
    #[inline]
    fn from(value: u32) -> Self {
        Value::Uint32(value)
    }
}

impl From<bool> for Value {
    #[inline]
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<String> for Value {
    #[inline]
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    #[inline]
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

/// An array of values which all share one element signature.
///
/// The element signature is carried separately so that empty arrays still
/// marshal with the correct element alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    signature: String,
    values: Vec<Value>,
}

impl Array {
    /// Construct an empty array with the given element signature.
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            values: Vec::new(),
        }
    }

    /// Construct an array from a non-empty sequence of values. The element
    /// signature is taken from the first value.
    ///
    /// # Panics
    ///
    /// Panics if `values` is empty, or if the values do not all share one
    /// signature. Use [`Array::new`] when the element signature cannot be
    /// inferred.
    pub fn from_values(values: Vec<Value>) -> Self {
        let signature = values
            .first()
            .expect("cannot infer an element signature from an empty array")
            .signature();

        for value in &values[1..] {
            assert_eq!(
                value.signature(),
                signature,
                "array element signature mismatch"
            );
        }

        Self { signature, values }
    }

    /// Construct a dictionary, an array of dict entries, from key-value
    /// pairs. The element signature is taken from the first pair.
    ///
    /// # Panics
    ///
    /// Panics if `entries` is empty.
    pub fn dictionary(entries: Vec<(Value, Value)>) -> Self {
        let values = entries
            .into_iter()
            .map(|(key, value)| Value::DictEntry(Box::new(key), Box::new(value)))
            .collect::<Vec<_>>();

        Self::from_values(values)
    }

    /// The element signature.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// The values of the array.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// The number of elements in the array.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Test if the array is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Append a value.
    ///
    /// # Panics
    ///
    /// Panics if the value does not match the element signature.
    pub fn push(&mut self, value: Value) {
        assert_eq!(
            value.signature(),
            self.signature,
            "array element signature mismatch"
        );

        self.values.push(value);
    }

    /// Look up the value stored under `key` in an array of dict entries.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.values.iter().find_map(|entry| match entry {
            Value::DictEntry(k, v) if **k == *key => Some(&**v),
            _ => None,
        })
    }
}

impl IntoIterator for Array {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Byte(value) => write!(f, "{value}"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int16(value) => write!(f, "{value}"),
            Value::Uint16(value) => write!(f, "{value}"),
            Value::Int32(value) => write!(f, "{value}"),
            Value::Uint32(value) => write!(f, "{value}"),
            Value::Int64(value) => write!(f, "{value}"),
            Value::Uint64(value) => write!(f, "{value}"),
            Value::Double(value) => write!(f, "{value}"),
            Value::String(value) | Value::ObjectPath(value) | Value::Signature(value) => {
                write!(f, "{value:?}")
            }
            Value::UnixFd(value) => write!(f, "fd#{value}"),
            Value::Struct(fields) => {
                write!(f, "(")?;

                for (n, field) in fields.iter().enumerate() {
                    if n > 0 {
                        write!(f, ", ")?;
                    }

                    write!(f, "{field}")?;
                }

                write!(f, ")")
            }
            Value::Array(array) => {
                write!(f, "[")?;

                for (n, value) in array.values.iter().enumerate() {
                    if n > 0 {
                        write!(f, ", ")?;
                    }

                    write!(f, "{value}")?;
                }

                write!(f, "]")
            }
            Value::DictEntry(key, value) => write!(f, "{key}: {value}"),
            Value::Variant(value) => write!(f, "{value}"),
        }
    }
}
