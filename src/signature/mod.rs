//! The D-Bus signature grammar.
//!
//! A signature is a sequence of single complete types. [`parse`] walks the
//! signature left to right and produces one [`Node`] per single complete
//! type; both the reader and the writer drive the codec off the same parse
//! tree.

#[cfg(test)]
mod tests;

pub use self::signature_error::SignatureError;
pub(crate) use self::signature_error::SignatureErrorKind;
mod signature_error;

use crate::proto::Type;

/// The maximum nesting of containers in a signature.
pub(crate) const MAX_CONTAINER_DEPTH: usize = 32;

/// A parsed single complete type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    /// A basic type code.
    Basic(Type),
    /// A variant, which carries its own signature on the wire.
    Variant,
    /// A struct with one sub-node per field.
    Struct(Vec<Node>),
    /// An array of a single element type.
    Array(Box<Node>),
    /// A dict entry, only legal as the element of an array. The key is
    /// basic.
    Dict(Box<Node>, Box<Node>),
}

impl Node {
    /// The natural alignment of values of this type, applied before the
    /// first array element and between consecutive elements.
    pub(crate) fn alignment(&self) -> usize {
        match self {
            Node::Basic(code) => code.alignment(),
            Node::Variant => 1,
            Node::Struct(..) | Node::Dict(..) => 8,
            Node::Array(..) => 4,
        }
    }

    /// Render the node back into its signature string.
    pub(crate) fn signature(&self) -> String {
        let mut out = String::new();
        self.render(&mut out);
        out
    }

    fn render(&self, out: &mut String) {
        match self {
            Node::Basic(code) => out.push(char::from(code.code())),
            Node::Variant => out.push('v'),
            Node::Struct(fields) => {
                out.push('(');

                for field in fields {
                    field.render(out);
                }

                out.push(')');
            }
            Node::Array(element) => {
                out.push('a');
                element.render(out);
            }
            Node::Dict(key, value) => {
                out.push('{');
                key.render(out);
                value.render(out);
                out.push('}');
            }
        }
    }
}

/// Parse a signature into its sequence of single complete types.
pub(crate) fn parse(signature: &str) -> Result<Vec<Node>, SignatureError> {
    if signature.len() > u8::MAX as usize {
        return Err(SignatureError::new(SignatureErrorKind::SignatureTooLong));
    }

    let bytes = signature.as_bytes();
    let mut pos = 0;
    let mut nodes = Vec::new();

    while pos < bytes.len() {
        nodes.push(parse_one(bytes, &mut pos, 0, false)?);
    }

    Ok(nodes)
}

/// Parse a signature which must contain exactly one single complete type,
/// as required of the signature carried by a variant.
pub(crate) fn parse_single(signature: &str) -> Result<Node, SignatureError> {
    let mut nodes = parse(signature)?;

    if nodes.len() != 1 {
        return Err(SignatureError::new(SignatureErrorKind::NotSingleCompleteType));
    }

    Ok(nodes.remove(0))
}

fn parse_one(
    bytes: &[u8],
    pos: &mut usize,
    depth: usize,
    inside_array: bool,
) -> Result<Node, SignatureError> {
    use SignatureErrorKind::*;

    if depth > MAX_CONTAINER_DEPTH {
        return Err(SignatureError::new(ExceededMaximumRecursion));
    }

    let byte = bytes[*pos];
    *pos += 1;

    if let Some(code) = Type::from_code(byte) {
        return Ok(Node::Basic(code));
    }

    match byte {
        b'v' => Ok(Node::Variant),
        b'a' => {
            // A closing bracket cannot start the element type.
            if matches!(bytes.get(*pos), None | Some(b')') | Some(b'}')) {
                return Err(SignatureError::new(MissingArrayElementType));
            }

            let element = parse_one(bytes, pos, depth + 1, true)?;
            Ok(Node::Array(Box::new(element)))
        }
        b'(' => {
            let mut fields = Vec::new();

            loop {
                if *pos >= bytes.len() {
                    return Err(SignatureError::new(StructStartedButNotEnded));
                }

                if bytes[*pos] == b')' {
                    *pos += 1;
                    break;
                }

                fields.push(parse_one(bytes, pos, depth + 1, false)?);
            }

            if fields.is_empty() {
                return Err(SignatureError::new(StructHasNoFields));
            }

            Ok(Node::Struct(fields))
        }
        b'{' => {
            if !inside_array {
                return Err(SignatureError::new(DictEntryNotInsideArray));
            }

            if *pos >= bytes.len() {
                return Err(SignatureError::new(DictStartedButNotEnded));
            }

            if matches!(bytes[*pos], b'}' | b')') {
                return Err(SignatureError::new(DictEntryHasWrongNumberOfFields));
            }

            let key = parse_one(bytes, pos, depth + 1, false)?;

            if !matches!(key, Node::Basic(..)) {
                return Err(SignatureError::new(DictKeyMustBeBasicType));
            }

            if *pos >= bytes.len() {
                return Err(SignatureError::new(DictStartedButNotEnded));
            }

            if bytes[*pos] == b'}' {
                return Err(SignatureError::new(DictEntryHasWrongNumberOfFields));
            }

            let value = parse_one(bytes, pos, depth + 1, false)?;

            match bytes.get(*pos) {
                Some(b'}') => {
                    *pos += 1;
                }
                Some(..) => {
                    return Err(SignatureError::new(DictEntryHasWrongNumberOfFields));
                }
                None => {
                    return Err(SignatureError::new(DictStartedButNotEnded));
                }
            }

            Ok(Node::Dict(Box::new(key), Box::new(value)))
        }
        b')' => Err(SignatureError::new(StructEndedButNotStarted)),
        b'}' => Err(SignatureError::new(DictEndedButNotStarted)),
        byte => Err(SignatureError::new(UnknownTypeCode(byte))),
    }
}
