use std::mem::size_of;
use std::str;

use crate::buf::MAX_ARRAY_LENGTH;
use crate::error::{Error, ErrorKind, Result};
use crate::proto::Endianness;
use crate::utils::padding_to;

macro_rules! read_scalar {
    ($(#[doc = $doc:literal])* $name:ident, $ty:ty) => {
        $(#[doc = $doc])*
        ///
        /// Aligns the cursor to the width of the value before reading.
        pub fn $name(&mut self) -> Result<$ty> {
            self.align(size_of::<$ty>())?;
            let bytes = self.take(size_of::<$ty>())?;
            let bytes = <[u8; size_of::<$ty>()]>::try_from(bytes).expect("sized read");

            Ok(match self.endianness {
                Endianness::Little => <$ty>::from_le_bytes(bytes),
                Endianness::Big => <$ty>::from_be_bytes(bytes),
            })
        }
    };
}

/// A cursor over a byte view which reads values according to the D-Bus
/// marshaling rules.
///
/// Alignment is measured from the base of the view, which [`rebase()`] moves
/// to the current cursor. This matters when several messages share one
/// buffer, since D-Bus alignment is always relative to the start of the
/// message.
///
/// [`rebase()`]: Self::rebase
pub struct ByteReader<'a> {
    data: &'a [u8],
    cursor: usize,
    base: usize,
    endianness: Endianness,
}

impl<'a> ByteReader<'a> {
    /// Construct a reader over `data`.
    pub fn new(data: &'a [u8], endianness: Endianness) -> Self {
        Self {
            data,
            cursor: 0,
            base: 0,
            endianness,
        }
    }

    /// The endianness values are read with.
    #[inline]
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Change the endianness of subsequent reads.
    pub(crate) fn set_endianness(&mut self, endianness: Endianness) {
        self.endianness = endianness;
    }

    /// Bytes between the cursor and the end of the view.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    /// The cursor position, measured from the current base.
    #[inline]
    pub(crate) fn position(&self) -> usize {
        self.cursor - self.base
    }

    /// Rebase the view so subsequent alignment is measured from the current
    /// cursor.
    pub fn rebase(&mut self) {
        self.base = self.cursor;
    }

    /// Advance the cursor to the next multiple of `align` relative to the
    /// base.
    pub fn align(&mut self, align: usize) -> Result<()> {
        let padding = padding_to(self.cursor - self.base, align);

        if self.remaining() < padding {
            return Err(Error::new(ErrorKind::BufferUnderflow));
        }

        self.cursor += padding;
        Ok(())
    }

    /// Advance the cursor past `n` bytes without interpreting them.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n)?;
        Ok(())
    }

    /// Take `n` bytes from the front of the view.
    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::new(ErrorKind::BufferUnderflow));
        }

        let bytes = &self.data[self.cursor..self.cursor + n];
        self.cursor += n;
        Ok(bytes)
    }

    /// Read a single byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    read_scalar!(
        /// Read an unsigned 16-bit integer.
        read_u16,
        u16
    );

    read_scalar!(
        /// Read a signed 16-bit integer.
        read_i16,
        i16
    );

    read_scalar!(
        /// Read an unsigned 32-bit integer.
        read_u32,
        u32
    );

    read_scalar!(
        /// Read a signed 32-bit integer.
        read_i32,
        i32
    );

    read_scalar!(
        /// Read an unsigned 64-bit integer.
        read_u64,
        u64
    );

    read_scalar!(
        /// Read a signed 64-bit integer.
        read_i64,
        i64
    );

    read_scalar!(
        /// Read an IEEE 754 double.
        read_f64,
        f64
    );

    /// Read a boolean stored as a 32-bit integer. Only 0 and 1 are valid.
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u32()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(Error::new(ErrorKind::InvalidBoolean(value))),
        }
    }

    /// Read a Unix file descriptor handle.
    pub fn read_unix_fd(&mut self) -> Result<u32> {
        self.read_u32()
    }

    /// Read a string: 32-bit byte length, contents, then a NUL terminator
    /// which is skipped.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        let string = str::from_utf8(bytes)?.to_owned();
        self.skip(1)?;
        Ok(string)
    }

    /// Read an object path. Paths share the wire form of strings.
    pub fn read_object_path(&mut self) -> Result<String> {
        self.read_string()
    }

    /// Read a signature: single byte length, contents, then a NUL terminator
    /// which is skipped. Signatures are not aligned.
    pub fn read_signature(&mut self) -> Result<String> {
        let len = self.read_byte()? as usize;
        let bytes = self.take(len)?;
        let string = str::from_utf8(bytes)?.to_owned();
        self.skip(1)?;
        Ok(string)
    }

    /// Read an array frame: 32-bit byte length, padding up to the element
    /// alignment, then `per_item` until exactly the encoded byte length has
    /// been consumed past the post-alignment point.
    ///
    /// Consuming past the encoded length is a codec error.
    pub fn consume_array(
        &mut self,
        item_align: usize,
        mut per_item: impl FnMut(&mut Self) -> Result<()>,
    ) -> Result<()> {
        let len = self.read_u32()?;

        if len > MAX_ARRAY_LENGTH {
            return Err(Error::new(ErrorKind::ArrayTooLong(len)));
        }

        let len = len as usize;
        self.align(item_align)?;
        let start = self.cursor;

        while self.cursor - start < len {
            per_item(self)?;

            if self.cursor - start > len {
                return Err(Error::new(ErrorKind::ArrayOutOfBounds));
            }

            if self.cursor - start < len {
                self.align(item_align)?;
            }
        }

        Ok(())
    }
}
