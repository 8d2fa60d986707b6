use super::{parse, parse_single, Node, SignatureErrorKind};

use SignatureErrorKind::*;

macro_rules! test {
    ($input:expr, $expected:pat) => {{
        let actual = parse($input).map_err(|e| e.kind);

        assert!(
            matches!(actual, $expected),
            "{actual:?} does not match {}",
            stringify!($expected)
        );
    }};
}

#[test]
fn signature_tests() {
    test!("", Ok(..));
    test!("sss", Ok(..));
    test!("i", Ok(..));
    test!("b", Ok(..));
    test!("ai", Ok(..));
    test!("(i)", Ok(..));
    test!("a{sv}", Ok(..));
    test!("a{s(uu)}", Ok(..));
    test!("uay(ss)a{qs}s", Ok(..));
    test!("w", Err(UnknownTypeCode(..)));
    test!("a", Err(MissingArrayElementType));
    test!("aaaaaa", Err(MissingArrayElementType));
    test!("ii(ii)a", Err(MissingArrayElementType));
    test!("ia", Err(MissingArrayElementType));
    test!(")", Err(StructEndedButNotStarted));
    test!("}", Err(DictEndedButNotStarted));
    test!("i)", Err(StructEndedButNotStarted));
    test!("(", Err(StructStartedButNotEnded));
    test!("(i", Err(StructStartedButNotEnded));
    test!("(ai", Err(StructStartedButNotEnded));
    test!("()", Err(StructHasNoFields));
    test!("(())", Err(StructHasNoFields));
    test!("a()", Err(StructHasNoFields));
    test!("()i", Err(StructHasNoFields));
    test!("(a)", Err(MissingArrayElementType));
    test!("a{ia}", Err(MissingArrayElementType));
    test!("a{}", Err(DictEntryHasWrongNumberOfFields));
    test!("a{aii}", Err(DictKeyMustBeBasicType));
    test!("a{(ii)i}", Err(DictKeyMustBeBasicType));
    test!("a{vi}", Err(DictKeyMustBeBasicType));
    test!("a{i}", Err(DictEntryHasWrongNumberOfFields));
    test!("a{isi}", Err(DictEntryHasWrongNumberOfFields));
    test!("{is}", Err(DictEntryNotInsideArray));
    test!("a{s{sv}}", Err(DictEntryNotInsideArray));
    test!("a{s", Err(DictStartedButNotEnded));
    test!("a{si", Err(DictStartedButNotEnded));
    test!(" ", Err(UnknownTypeCode(..)));
    test!("not a valid signature", Err(UnknownTypeCode(..)));
    test!("123", Err(UnknownTypeCode(..)));

    let long = "i".repeat(255);
    test!(&long, Ok(..));
    let too_long = "i".repeat(256);
    test!(&too_long, Err(SignatureTooLong));

    let deep = format!("{}i", "a".repeat(32));
    test!(&deep, Ok(..));
    let too_deep = format!("{}i", "a".repeat(33));
    test!(&too_deep, Err(ExceededMaximumRecursion));
}

#[test]
fn parse_tree_shape() {
    let nodes = parse("uay(ss)a{qs}s").unwrap();
    assert_eq!(nodes.len(), 5);
    assert!(matches!(nodes[0], Node::Basic(..)));
    assert!(matches!(nodes[1], Node::Array(..)));
    assert!(matches!(nodes[2], Node::Struct(ref fields) if fields.len() == 2));

    let Node::Array(ref element) = nodes[3] else {
        panic!("expected array, got {:?}", nodes[3]);
    };

    assert!(matches!(**element, Node::Dict(..)));
    assert!(matches!(nodes[4], Node::Basic(..)));
}

#[test]
fn alignments() {
    let nodes = parse("yqbxv").unwrap();
    let alignments = nodes.iter().map(Node::alignment).collect::<Vec<_>>();
    assert_eq!(alignments, [1, 2, 4, 8, 1]);

    let nodes = parse("(y)a{yy}ayg").unwrap();
    let alignments = nodes.iter().map(Node::alignment).collect::<Vec<_>>();
    assert_eq!(alignments, [8, 4, 4, 1]);
}

#[test]
fn single_complete_type() {
    assert!(parse_single("a{sv}").is_ok());
    assert!(parse_single("(iii)").is_ok());

    let error = parse_single("ii").unwrap_err();
    assert_eq!(error.kind, NotSingleCompleteType);

    let error = parse_single("").unwrap_err();
    assert_eq!(error.kind, NotSingleCompleteType);
}
