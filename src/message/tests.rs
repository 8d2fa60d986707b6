use crate::buf::{ByteReader, ByteWriter};
use crate::error::ErrorKind;
use crate::message::{Header, Message};
use crate::proto::{Endianness, Flags, MessageType};
use crate::value::Value;

#[rustfmt::skip]
const LE_BLOB: [u8; 36] = [
    // byte 0
    // endian, type, flags, version
    b'l',
    // reply (which is the simplest message)
    b'\x02',
    // no auto-starting
    b'\x02',
    // D-Bus version = 1
    b'\x01',
    // byte 4
    // bytes in body = 4
    b'\x04', b'\x00', b'\x00', b'\x00',
    // byte 8
    // serial number = 0x12345678
    b'\x78', b'\x56', b'\x34', b'\x12',
    // byte 12
    // bytes in the header field array = 15
    b'\x0f', b'\0', b'\0', b'\0',
    // byte 16
    // in reply to:
    b'\x05',
    // variant signature = u
    b'\x01', b'u', b'\0',
    // 0xabcdef12
    b'\x12', b'\xef', b'\xcd', b'\xab',
    // byte 24
    // signature:
    b'\x08',
    // variant signature = g
    b'\x01', b'g', b'\0',
    // 1 byte, u, NUL
    b'\x01', b'u', b'\0',
    // pad to 8-byte boundary for the body
    b'\0',
    // body; byte 32
    // 0xdeadbeef
    b'\xef', b'\xbe', b'\xad', b'\xde',
];

#[rustfmt::skip]
const BE_BLOB: [u8; 36] = [
    b'B',
    b'\x02',
    b'\x02',
    b'\x01',
    b'\x00', b'\x00', b'\x00', b'\x04',
    b'\x12', b'\x34', b'\x56', b'\x78',
    b'\x00', b'\x00', b'\x00', b'\x0f',
    b'\x05',
    b'\x01', b'u', b'\0',
    b'\xab', b'\xcd', b'\xef', b'\x12',
    b'\x08',
    b'\x01', b'g', b'\0',
    b'\x01', b'u', b'\0',
    b'\0',
    b'\xde', b'\xad', b'\xbe', b'\xef',
];

fn blob_message(endianness: Endianness) -> Message {
    let mut message = Message::method_return(0xabcdef12)
        .with_flags(Flags::NO_AUTO_START)
        .with_body(Value::Uint32(0xdeadbeef));

    message.header.endianness = endianness;
    message.header.serial = 0x12345678;
    message
}

#[test]
fn write_blobs() {
    let bytes = blob_message(Endianness::Little).to_bytes().unwrap();
    assert_eq!(bytes, LE_BLOB);

    let bytes = blob_message(Endianness::Big).to_bytes().unwrap();
    assert_eq!(bytes, BE_BLOB);
}

#[test]
fn read_blobs() {
    for (endianness, blob) in [
        (Endianness::Little, &LE_BLOB),
        (Endianness::Big, &BE_BLOB),
    ] {
        let mut reader = ByteReader::new(blob, endianness);
        let message = Message::unmarshal(&mut reader).unwrap();

        assert_eq!(message.header.endianness, endianness);
        assert_eq!(message.header.message_type, MessageType::MethodReturn);
        assert!(message.header.flags.contains(Flags::NO_AUTO_START));
        assert_eq!(message.header.body_length, 4);
        assert_eq!(message.header.serial, 0x12345678);
        assert_eq!(message.header.fields.reply_serial, Some(0xabcdef12));
        assert_eq!(message.header.fields.signature.as_deref(), Some("u"));
        assert_eq!(message.body, [Value::Uint32(0xdeadbeef)]);
    }
}

#[test]
fn header_round_trip() {
    for endianness in [Endianness::Little, Endianness::Big] {
        let mut header = Header::new(MessageType::MethodCall);
        header.endianness = endianness;
        header.serial = 0x42;
        header.body_length = 0xABCDEF12;
        header.fields.destination = Some("org.freewilly.Fish".into());
        header.fields.path = Some("/org.freewilly.Fish".into());
        header.fields.interface = Some("org.freedesktop.DBus.Properties".into());
        header.fields.member = Some("Test".into());

        let mut buf = ByteWriter::new(endianness);
        header.marshal(&mut buf).unwrap();
        let bytes = buf.take_bytes();
        assert_eq!(bytes.len() % 8, 0);

        let mut reader = ByteReader::new(&bytes, endianness);
        assert_eq!(Header::unmarshal(&mut reader).unwrap(), header);
        assert_eq!(reader.remaining(), 0);
    }
}

#[test]
fn message_round_trip_fills_signature_and_length() {
    let mut message = Message::method_call("/org/example/Thing", "Frobnicate")
        .with_interface("org.example.Iface")
        .with_destination(":1.98")
        .with_body_values(vec![
            Value::String("hi".into()),
            Value::Uint32(7),
        ]);

    message.header.serial = 9;

    let bytes = message.to_bytes().unwrap();

    let mut reader = ByteReader::new(&bytes, Endianness::NATIVE);
    let decoded = Message::unmarshal(&mut reader).unwrap();

    assert_eq!(decoded.header.fields.signature.as_deref(), Some("su"));
    assert_eq!(decoded.body, message.body);

    // The length at offset 4 was patched with the actual body byte count:
    // the 7-byte string "hi", a padding byte, then the u32.
    let mut reader = ByteReader::new(&bytes[..16], message.header.endianness);
    reader.skip(4).unwrap();
    let patched = reader.read_u32().unwrap();
    assert_eq!(patched, 12);
    assert_eq!(patched, decoded.header.body_length);

    // Everything except the auto-filled signature and patched length
    // matches what was sent.
    let mut expected = message.header.clone();
    expected.fields.signature = Some("su".into());
    expected.body_length = decoded.header.body_length;
    assert_eq!(decoded.header, expected);
}

#[test]
fn empty_body_has_no_signature_field() {
    let mut message = Message::method_call("/org/example/Thing", "Ping");
    message.header.serial = 1;

    let bytes = message.to_bytes().unwrap();
    let mut reader = ByteReader::new(&bytes, Endianness::NATIVE);
    let decoded = Message::unmarshal(&mut reader).unwrap();

    assert_eq!(decoded.header.fields.signature, None);
    assert_eq!(decoded.header.body_length, 0);
    assert!(decoded.body.is_empty());
}

#[test]
fn reject_invalid_endianness() {
    let mut blob = LE_BLOB;
    blob[0] = b'x';

    let mut reader = ByteReader::new(&blob, Endianness::Little);
    let error = Message::unmarshal(&mut reader).unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::InvalidEndianness(b'x')));
}

#[test]
fn reject_invalid_message_type() {
    for message_type in [0u8, 5, 200] {
        let mut blob = LE_BLOB;
        blob[1] = message_type;

        let mut reader = ByteReader::new(&blob, Endianness::Little);
        let error = Message::unmarshal(&mut reader).unwrap_err();
        assert!(matches!(
            error.kind(),
            ErrorKind::InvalidMessageType(t) if *t == message_type
        ));
    }
}

#[test]
fn reject_zero_serial() {
    let mut blob = LE_BLOB;
    blob[8..12].copy_from_slice(&[0, 0, 0, 0]);

    let mut reader = ByteReader::new(&blob, Endianness::Little);
    let error = Message::unmarshal(&mut reader).unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::ZeroSerial));
}

#[test]
fn reject_unknown_field_code() {
    for code in [0u8, 10, 0xAA] {
        let mut blob = LE_BLOB;
        blob[16] = code;

        let mut reader = ByteReader::new(&blob, Endianness::Little);
        let error = Message::unmarshal(&mut reader).unwrap_err();
        assert!(matches!(
            error.kind(),
            ErrorKind::InvalidFieldCode(c) if *c == code
        ));
    }
}

#[test]
fn reject_wrong_field_value_type() {
    // A MEMBER field whose variant holds a u32 instead of a string.
    let mut buf = ByteWriter::new(Endianness::Little);
    buf.write_byte(b'l');
    buf.write_byte(4);
    buf.write_byte(0);
    buf.write_byte(1);
    buf.write_u32(0);
    buf.write_u32(1);
    buf.write_u32(8);
    buf.write_byte(3);
    buf.write_signature("u");
    buf.write_u32(77);
    let bytes = buf.take_bytes();

    let mut reader = ByteReader::new(&bytes, Endianness::Little);
    let error = Message::unmarshal(&mut reader).unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::InvalidFieldType(3)));
}

#[test]
fn reject_body_length_mismatch() {
    let mut blob = LE_BLOB;
    blob[4] = 3;

    let mut reader = ByteReader::new(&blob, Endianness::Little);
    let error = Message::unmarshal(&mut reader).unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::BodyMismatch(3, 4)));
}

#[test]
fn frame_length() {
    assert_eq!(Message::frame_length(&LE_BLOB).unwrap(), Some(36));
    assert_eq!(Message::frame_length(&BE_BLOB).unwrap(), Some(36));
    assert_eq!(Message::frame_length(&LE_BLOB[..10]).unwrap(), None);
    assert!(Message::frame_length(&[b'x'; 16]).is_err());

    // A frame length computation only needs the fixed prefix.
    assert_eq!(Message::frame_length(&LE_BLOB[..16]).unwrap(), Some(36));
}
