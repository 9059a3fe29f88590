//! Binary cursor reader.
//!
//! Every classic format struct is decoded through [`Reader`]: a byte buffer,
//! an advancing cursor and a byte order. Offsets stored in the files are
//! always resolved as positions into this buffer, never as pointers.
//!
//! Reads that run past the end of the buffer are clamped: the available bytes
//! are copied, the rest of the destination is zero-filled, the cursor stops at
//! the end and the overrun is logged. Struct decoding therefore degrades in
//! content on malformed files but never reads out of bounds.

use std::borrow::Cow;
use std::io::{self, Read, Seek, SeekFrom};

use binrw::{BinRead, Endian};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Byte order of a classic asset buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl ByteOrder {
    /// Byte order of the host.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }
}

impl From<ByteOrder> for Endian {
    fn from(order: ByteOrder) -> Self {
        match order {
            ByteOrder::Little => Endian::Little,
            ByteOrder::Big => Endian::Big,
        }
    }
}

/// Cursor over an owned or borrowed byte buffer.
///
/// An owned buffer is released when the reader is dropped; a borrowed one
/// (static data, a memory-mapped region) is left alone.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: Cow<'a, [u8]>,
    cursor: usize,
    order: ByteOrder,
    overruns: usize,
}

impl Reader<'static> {
    /// Reader that owns its buffer.
    pub fn owned(data: Vec<u8>) -> Self {
        Self::new(Cow::Owned(data))
    }

    /// Reader over a zero-length buffer. Every read reports an overrun.
    pub fn empty() -> Self {
        Self::new(Cow::Borrowed(&[]))
    }
}

impl<'a> Reader<'a> {
    /// Reader that borrows a buffer it does not own.
    pub fn borrowed(data: &'a [u8]) -> Self {
        Self::new(Cow::Borrowed(data))
    }

    fn new(data: Cow<'a, [u8]>) -> Self {
        Self {
            data,
            cursor: 0,
            order: ByteOrder::Little,
            overruns: 0,
        }
    }

    /// Set the byte order used by all typed reads.
    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.order = order;
        self
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Whether the buffer is owned by this reader.
    pub fn is_owned(&self) -> bool {
        matches!(self.data, Cow::Owned(_))
    }

    /// Total buffer length.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current cursor position.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Bytes left between the cursor and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    /// Number of reads so far that ran past the end of the buffer.
    pub fn overruns(&self) -> usize {
        self.overruns
    }

    /// Move the cursor to an absolute position, clamped to the buffer length.
    pub fn set_position(&mut self, pos: usize) {
        if pos > self.data.len() {
            tracing::debug!(
                target: "classic_importer::reader",
                "seek to {} clamped to buffer length {}",
                pos,
                self.data.len()
            );
        }
        self.cursor = pos.min(self.data.len());
    }

    /// Copy `dest.len()` bytes from the cursor and advance it.
    ///
    /// Returns the number of bytes actually copied. A short read zero-fills the
    /// rest of `dest`, leaves the cursor at the end of the buffer and is
    /// reported once.
    pub fn read_bytes(&mut self, dest: &mut [u8]) -> usize {
        let available = self.remaining().min(dest.len());
        dest[..available].copy_from_slice(&self.data[self.cursor..self.cursor + available]);
        self.cursor += available;

        if available < dest.len() {
            dest[available..].fill(0);
            self.overruns += 1;
            tracing::error!(
                target: "classic_importer::reader",
                "Read past end: wanted {} bytes at offset {}, {} available",
                dest.len(),
                self.cursor - available,
                available
            );
        }
        available
    }

    fn read_array<const N: usize>(&mut self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.read_bytes(&mut bytes);
        bytes
    }

    pub fn read_u8(&mut self) -> u8 {
        self.read_array::<1>()[0]
    }

    pub fn read_u16(&mut self) -> u16 {
        let bytes = self.read_array();
        match self.order {
            ByteOrder::Little => u16::from_le_bytes(bytes),
            ByteOrder::Big => u16::from_be_bytes(bytes),
        }
    }

    pub fn read_u32(&mut self) -> u32 {
        let bytes = self.read_array();
        match self.order {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        }
    }

    pub fn read_i32(&mut self) -> i32 {
        self.read_u32() as i32
    }

    pub fn read_f32(&mut self) -> f32 {
        f32::from_bits(self.read_u32())
    }

    /// Read a NUL-terminated string at the cursor.
    ///
    /// The scan is bounded by the end of the buffer, so an unterminated string
    /// simply ends there. Invalid UTF-8 is replaced lossily.
    pub fn read_string(&mut self) -> String {
        let rest = &self.data[self.cursor..];
        let len = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        let string = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.cursor = (self.cursor + len + 1).min(self.data.len());
        string
    }

    /// Read a NUL-terminated string at an absolute position.
    pub fn read_string_at(&mut self, pos: u32) -> String {
        self.set_position(pos as usize);
        self.read_string()
    }

    /// Decode one format struct at the cursor, field by field.
    pub fn get<T>(&mut self) -> Result<T>
    where
        T: for<'b> BinRead<Args<'b> = ()>,
    {
        let endian = self.order.into();
        Ok(T::read_options(self, endian, ())?)
    }

    /// Decode one format struct at an absolute position.
    ///
    /// The cursor is left after the decoded struct, not restored.
    pub fn get_at<T>(&mut self, pos: u32) -> Result<T>
    where
        T: for<'b> BinRead<Args<'b> = ()>,
    {
        self.set_position(pos as usize);
        self.get()
    }

    /// Decode `count` consecutive structs at the cursor.
    ///
    /// Decoding stops early once the buffer is exhausted, so a bogus count
    /// cannot turn into an unbounded run of zero-filled entries.
    pub fn get_vec<T>(&mut self, count: usize) -> Result<Vec<T>>
    where
        T: for<'b> BinRead<Args<'b> = ()>,
    {
        let mut items = Vec::with_capacity(count.min(self.remaining()));
        for read in 0..count {
            if self.remaining() == 0 {
                self.overruns += 1;
                tracing::error!(
                    target: "classic_importer::reader",
                    "Read past end: table truncated after {} of {} entries",
                    read,
                    count
                );
                break;
            }
            items.push(self.get()?);
        }
        Ok(items)
    }

    /// Decode `count` consecutive structs at an absolute position.
    pub fn get_vec_at<T>(&mut self, pos: u32, count: usize) -> Result<Vec<T>>
    where
        T: for<'b> BinRead<Args<'b> = ()>,
    {
        self.set_position(pos as usize);
        self.get_vec(count)
    }
}

impl Read for Reader<'_> {
    /// Always fills `buf`; see [`Reader::read_bytes`]. Never reports end of file.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_bytes(buf);
        Ok(buf.len())
    }
}

impl Seek for Reader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => (self.data.len() as u64).checked_add_signed(delta),
            SeekFrom::Current(delta) => (self.cursor as u64).checked_add_signed(delta),
        }
        .ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of buffer")
        })?;

        self.set_position(usize::try_from(target).unwrap_or(usize::MAX));
        Ok(self.cursor as u64)
    }
}
