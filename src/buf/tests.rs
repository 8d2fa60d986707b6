use crate::buf::{ByteReader, ByteWriter};
use crate::error::ErrorKind;
use crate::proto::Endianness;

#[test]
fn write_past_capacity() {
    let mut buf = ByteWriter::with_capacity(Endianness::Little, 10);

    for byte in 0..=15u8 {
        buf.write_byte(byte);
    }

    let bytes = buf.take_bytes();
    assert_eq!(bytes.len(), 16);
    assert_eq!(bytes, (0..=15u8).collect::<Vec<_>>());
}

#[test]
fn write_big_endian() {
    let mut buf = ByteWriter::new(Endianness::Big);
    buf.write_u32(0x1102_CAFE);
    buf.write_string("Hello world!");
    buf.write_byte(0x7F);

    let bytes = buf.take_bytes();
    assert_eq!(bytes.len(), 22);
    assert_eq!(&bytes[..4], [0x11, 0x02, 0xCA, 0xFE]);
    assert_eq!(&bytes[4..8], [0x00, 0x00, 0x00, 0x0C]);
    assert_eq!(&bytes[8..20], b"Hello world!");
    assert_eq!(bytes[20], 0);
    assert_eq!(bytes[21], 0x7F);
}

#[test]
fn write_alignment() {
    let mut buf = ByteWriter::new(Endianness::Little);
    buf.write_byte(1);
    buf.write_u16(2);
    assert_eq!(buf.len(), 4);
    buf.write_byte(3);
    buf.write_u32(4);
    assert_eq!(buf.len(), 12);
    buf.write_byte(5);
    buf.write_u64(6);
    assert_eq!(buf.len(), 24);
    buf.write_byte(7);
    buf.write_f64(8.0);
    assert_eq!(buf.len(), 40);

    let bytes = buf.take_bytes();
    assert_eq!(&bytes[..4], [1, 0, 2, 0]);
    assert_eq!(&bytes[4..8], [3, 0, 0, 0]);
    assert_eq!(&bytes[8..12], [4, 0, 0, 0]);
}

#[test]
fn write_empty_string() {
    let mut buf = ByteWriter::new(Endianness::Little);
    buf.write_byte(0xFF);
    buf.write_string("");

    // One byte, three bytes of padding, then the five byte empty string:
    // a zero length and the NUL terminator.
    let bytes = buf.take_bytes();
    assert_eq!(bytes.len(), 9);
    assert_eq!(&bytes[4..], [0, 0, 0, 0, 0]);

    let mut buf = ByteWriter::new(Endianness::Little);
    buf.write_signature("");
    assert_eq!(buf.take_bytes(), [0, 0]);
}

#[test]
fn write_bool() {
    let mut buf = ByteWriter::new(Endianness::Little);
    buf.write_bool(true);
    buf.write_bool(false);
    assert_eq!(buf.take_bytes(), [1, 0, 0, 0, 0, 0, 0, 0]);
}

#[test]
fn set_u32_patches_in_place() {
    let mut buf = ByteWriter::new(Endianness::Little);
    buf.write_u32(0);
    buf.write_string("hello");
    buf.set_u32(0, 0xAABB_CCDD);

    let bytes = buf.take_bytes();
    assert_eq!(&bytes[..4], [0xDD, 0xCC, 0xBB, 0xAA]);
    assert_eq!(&bytes[4..8], [5, 0, 0, 0]);
}

#[test]
fn read_scalars_both_endians() {
    for endianness in [Endianness::Little, Endianness::Big] {
        let mut buf = ByteWriter::new(endianness);
        buf.write_byte(0x7F);
        buf.write_u16(0xBEEF);
        buf.write_i16(-2);
        buf.write_u32(0xDEAD_BEEF);
        buf.write_i32(-3);
        buf.write_u64(0x0123_4567_89AB_CDEF);
        buf.write_i64(-4);
        buf.write_f64(13.37);
        buf.write_string("hello");
        buf.write_signature("a{sv}");
        buf.write_unix_fd(4);

        let bytes = buf.take_bytes();
        let mut reader = ByteReader::new(&bytes, endianness);
        assert_eq!(reader.read_byte().unwrap(), 0x7F);
        assert_eq!(reader.read_u16().unwrap(), 0xBEEF);
        assert_eq!(reader.read_i16().unwrap(), -2);
        assert_eq!(reader.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(reader.read_i32().unwrap(), -3);
        assert_eq!(reader.read_u64().unwrap(), 0x0123_4567_89AB_CDEF);
        assert_eq!(reader.read_i64().unwrap(), -4);
        assert_eq!(reader.read_f64().unwrap(), 13.37);
        assert_eq!(reader.read_string().unwrap(), "hello");
        assert_eq!(reader.read_signature().unwrap(), "a{sv}");
        assert_eq!(reader.read_unix_fd().unwrap(), 4);
        assert_eq!(reader.remaining(), 0);
    }
}

#[test]
fn read_invalid_bool() {
    let mut reader = ByteReader::new(&[2, 0, 0, 0], Endianness::Little);
    let error = reader.read_bool().unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::InvalidBoolean(2)));
}

#[test]
fn read_underflow() {
    let mut reader = ByteReader::new(&[1, 2], Endianness::Little);
    let error = reader.read_u32().unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::BufferUnderflow));
}

#[test]
fn rebase_moves_alignment_origin() {
    // Three bytes, then a rebase: the following u32 aligns relative to the
    // rebased origin, not the start of the buffer.
    let bytes = [0xAA, 0xBB, 0xCC, 0x78, 0x56, 0x34, 0x12];
    let mut reader = ByteReader::new(&bytes, Endianness::Little);
    reader.skip(3).unwrap();
    reader.rebase();
    assert_eq!(reader.read_u32().unwrap(), 0x1234_5678);
    assert_eq!(reader.remaining(), 0);
}

#[test]
fn consume_array_respects_declared_length() {
    // Array of three u16 elements: length 6, no padding at offset 4.
    let bytes = [6, 0, 0, 0, 1, 0, 2, 0, 3, 0];
    let mut reader = ByteReader::new(&bytes, Endianness::Little);
    let mut items = Vec::new();

    reader
        .consume_array(2, |reader| {
            items.push(reader.read_u16()?);
            Ok(())
        })
        .unwrap();

    assert_eq!(items, [1, 2, 3]);

    // A declared length of three cannot hold two u16 elements.
    let bytes = [3, 0, 0, 0, 1, 0, 2, 0];
    let mut reader = ByteReader::new(&bytes, Endianness::Little);

    let error = reader
        .consume_array(2, |reader| {
            reader.read_u16()?;
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(error.kind(), ErrorKind::ArrayOutOfBounds));
}

#[test]
fn consume_array_empty_still_aligns() {
    // An empty array of 8-aligned elements pads up to the element
    // boundary even though no element follows.
    let bytes = [0, 0, 0, 0, 0, 0, 0, 0, 0xFF];
    let mut reader = ByteReader::new(&bytes, Endianness::Little);

    reader
        .consume_array(8, |_| panic!("empty array has no elements"))
        .unwrap();

    assert_eq!(reader.read_byte().unwrap(), 0xFF);
}
