//! A growable byte buffer with independent read/write cursors and a
//! reclaimable "cheap prepend" region, modeled directly on the source DBF
//! codec's buffer (itself a muduo-style network buffer repurposed for file
//! framing instead of sockets).
//!
//! The buffer partitions its storage into three adjacent spans:
//! `[0, r)` prependable, `[r, w)` readable, `[w, capacity)` writable.
//! `retrieve`/`has_written` move the cursors; `ensure_writable_bytes`
//! compacts the readable span back to the front (restoring at least
//! [`CHEAP_PREPEND`] bytes of prependable room) or grows the backing vector.

use crate::codec::{self, trim_spaces};
use crate::error::{Error, Result};

/// Bytes always kept free ahead of the readable span after a compaction,
/// letting framing code prepend a small header without reallocating.
pub const CHEAP_PREPEND: usize = 8;

const DEFAULT_INITIAL_SIZE: usize = 1024;

/// A bidirectional byte buffer: read from the front, write at the back.
#[derive(Debug, Clone)]
pub struct Buffer {
    buf: Vec<u8>,
    reader_index: usize,
    writer_index: usize,
}

impl Default for Buffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_INITIAL_SIZE)
    }
}

impl Buffer {
    /// A buffer with the default initial capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer with room for at least `initial_size` writable bytes, plus
    /// the cheap-prepend region.
    pub fn with_capacity(initial_size: usize) -> Self {
        Buffer {
            buf: vec![0u8; CHEAP_PREPEND + initial_size],
            reader_index: CHEAP_PREPEND,
            writer_index: CHEAP_PREPEND,
        }
    }

    pub fn readable_bytes(&self) -> usize {
        self.writer_index - self.reader_index
    }

    pub fn writable_bytes(&self) -> usize {
        self.buf.len() - self.writer_index
    }

    pub fn prependable_bytes(&self) -> usize {
        self.reader_index
    }

    /// The full readable span.
    pub fn peek(&self) -> &[u8] {
        &self.buf[self.reader_index..self.writer_index]
    }

    /// The full writable span.
    pub fn begin_write(&mut self) -> &mut [u8] {
        &mut self.buf[self.writer_index..]
    }

    /// Reset both cursors, reclaiming everything as prependable.
    pub fn retrieve_all(&mut self) {
        self.reader_index = CHEAP_PREPEND;
        self.writer_index = CHEAP_PREPEND;
    }

    /// Consume `len` readable bytes. Reclaims the whole buffer if `len`
    /// equals `readable_bytes()`.
    pub fn retrieve(&mut self, len: usize) {
        assert!(len <= self.readable_bytes());
        if len < self.readable_bytes() {
            self.reader_index += len;
        } else {
            self.retrieve_all();
        }
    }

    /// Record that the caller filled `len` bytes of the writable span.
    pub fn has_written(&mut self, len: usize) {
        assert!(len <= self.writable_bytes());
        self.writer_index += len;
    }

    /// Rewind the writer cursor by `len` bytes (undoes a write).
    pub fn unwrite(&mut self, len: usize) {
        assert!(len <= self.readable_bytes());
        self.writer_index -= len;
    }

    /// Compact-or-grow so that at least `len` bytes are writable.
    pub fn ensure_writable_bytes(&mut self, len: usize) {
        if self.writable_bytes() < len {
            self.make_space(len);
        }
        debug_assert!(self.writable_bytes() >= len);
    }

    fn make_space(&mut self, len: usize) {
        if self.writable_bytes() + self.prependable_bytes() < len + CHEAP_PREPEND {
            self.buf.resize(self.writer_index + len, 0);
        } else {
            let readable = self.readable_bytes();
            self.buf
                .copy_within(self.reader_index..self.writer_index, CHEAP_PREPEND);
            self.reader_index = CHEAP_PREPEND;
            self.writer_index = self.reader_index + readable;
        }
    }

    fn read_window(&mut self, width: usize) -> Result<&[u8]> {
        if self.readable_bytes() < width {
            return Err(Error::ShortRead {
                expected: width,
                found: self.readable_bytes(),
            });
        }
        let start = self.reader_index;
        self.retrieve(width);
        Ok(&self.buf[start..start + width])
    }

    /// Read a `width`-byte space-padded text field and trim surrounding
    /// spaces.
    pub fn read_str(&mut self, width: usize) -> Result<String> {
        let window = self.read_window(width)?;
        Ok(String::from_utf8_lossy(trim_spaces(window)).into_owned())
    }

    /// Read a `width`-byte field verbatim (no trimming), space-filled.
    pub fn read_array(&mut self, width: usize) -> Result<Vec<u8>> {
        let window = self.read_window(width)?;
        Ok(window.to_vec())
    }

    /// Write `value` then space-pad the remaining `width - value.len()`
    /// bytes. Fails with [`Error::Overflow`] if `value` is longer than
    /// `width`.
    pub fn append_str(&mut self, value: &str, width: usize) -> Result<()> {
        if value.len() > width {
            return Err(Error::Overflow {
                field: None,
                width,
                actual: value.len(),
            });
        }
        self.ensure_writable_bytes(width);
        {
            let slot = &mut self.begin_write()[..width];
            slot[..value.len()].copy_from_slice(value.as_bytes());
            for b in &mut slot[value.len()..] {
                *b = b' ';
            }
        }
        self.has_written(width);
        Ok(())
    }

    /// Write one raw byte (used for the delete flag and the header/EOF
    /// markers).
    pub fn append_char(&mut self, value: u8) {
        self.ensure_writable_bytes(1);
        self.begin_write()[0] = value;
        self.has_written(1);
    }

    /// Read one raw byte.
    pub fn read_char(&mut self) -> Result<u8> {
        let window = self.read_window(1)?;
        Ok(window[0])
    }

    /// Read a `width`-byte NUL-padded binary string, stripping the trailing
    /// NULs (not spaces).
    pub fn read_binary_string(&mut self, width: usize) -> Result<String> {
        let window = self.read_window(width)?;
        let trimmed_len = window.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        Ok(String::from_utf8_lossy(&window[..trimmed_len]).into_owned())
    }

    /// Write `value` then NUL-fill the remaining `width - value.len()`
    /// bytes. Fails with [`Error::Overflow`] if `value` is longer than
    /// `width`.
    pub fn append_binary_string(&mut self, value: &str, width: usize) -> Result<()> {
        if value.len() > width {
            return Err(Error::Overflow {
                field: None,
                width,
                actual: value.len(),
            });
        }
        self.ensure_writable_bytes(width);
        {
            let slot = &mut self.begin_write()[..width];
            slot[..value.len()].copy_from_slice(value.as_bytes());
            for b in &mut slot[value.len()..] {
                *b = 0;
            }
        }
        self.has_written(width);
        Ok(())
    }
}

macro_rules! text_int_accessors {
    ($read:ident, $append:ident, $read_scaled:ident, $append_scaled:ident, $ty:ty) => {
        impl Buffer {
            #[doc = concat!("Read a space-padded, right-aligned `", stringify!($ty), "` from a fixed-width field.")]
            pub fn $read(&mut self, width: usize) -> Result<$ty> {
                let window = self.read_window(width)?;
                Ok(codec::decode_int(trim_spaces(window)) as $ty)
            }

            #[doc = concat!("Write `value` as a space-padded, right-aligned `", stringify!($ty), "`.")]
            pub fn $append(&mut self, value: $ty, width: usize) -> Result<()> {
                self.ensure_writable_bytes(width);
                let result = {
                    let slot = &mut self.begin_write()[..width];
                    codec::encode_int(value as i64, slot)
                };
                self.has_written(width);
                result.map_err(|_| Error::Overflow {
                    field: None,
                    width,
                    actual: (value as i64).unsigned_abs().to_string().len(),
                })
            }

            #[doc = concat!("Read a scaled-decimal `", stringify!($ty), "` (implicit decimal point `precision` digits from the right).")]
            pub fn $read_scaled(&mut self, width: usize, precision: u32) -> Result<$ty> {
                let window = self.read_window(width)?;
                Ok(codec::decode_scaled(trim_spaces(window), precision) as $ty)
            }

            #[doc = concat!("Write `value` (scaled by `10^precision`) as a fixed-width scaled-decimal field.")]
            pub fn $append_scaled(&mut self, value: $ty, width: usize, precision: u32) -> Result<()> {
                self.ensure_writable_bytes(width);
                let result = {
                    let slot = &mut self.begin_write()[..width];
                    codec::encode_scaled(value as i64, precision, slot)
                };
                self.has_written(width);
                result.map_err(|_| Error::Overflow {
                    field: None,
                    width,
                    actual: width + 1,
                })
            }
        }
    };
}

text_int_accessors!(read_i8, append_i8, read_scaled_i8, append_scaled_i8, i8);
text_int_accessors!(read_u8, append_u8, read_scaled_u8, append_scaled_u8, u8);
text_int_accessors!(read_i16, append_i16, read_scaled_i16, append_scaled_i16, i16);
text_int_accessors!(read_u16, append_u16, read_scaled_u16, append_scaled_u16, u16);
text_int_accessors!(read_i32, append_i32, read_scaled_i32, append_scaled_i32, i32);
text_int_accessors!(read_u32, append_u32, read_scaled_u32, append_scaled_u32, u32);
text_int_accessors!(read_i64, append_i64, read_scaled_i64, append_scaled_i64, i64);
text_int_accessors!(read_u64, append_u64, read_scaled_u64, append_scaled_u64, u64);

macro_rules! binary_int_accessors {
    ($read:ident, $append:ident, $ty:ty) => {
        impl Buffer {
            #[doc = concat!("Read a little-endian binary `", stringify!($ty), "`.")]
            pub fn $read(&mut self) -> Result<$ty> {
                const N: usize = std::mem::size_of::<$ty>();
                let window = self.read_window(N)?;
                let mut bytes = [0u8; N];
                bytes.copy_from_slice(window);
                Ok(<$ty>::from_le_bytes(bytes))
            }

            #[doc = concat!("Write `value` as a little-endian binary `", stringify!($ty), "`.")]
            pub fn $append(&mut self, value: $ty) {
                const N: usize = std::mem::size_of::<$ty>();
                self.ensure_writable_bytes(N);
                self.begin_write()[..N].copy_from_slice(&value.to_le_bytes());
                self.has_written(N);
            }
        }
    };
}

binary_int_accessors!(read_binary_i8, append_binary_i8, i8);
binary_int_accessors!(read_binary_u8, append_binary_u8, u8);
binary_int_accessors!(read_binary_i16, append_binary_i16, i16);
binary_int_accessors!(read_binary_u16, append_binary_u16, u16);
binary_int_accessors!(read_binary_i32, append_binary_i32, i32);
binary_int_accessors!(read_binary_u32, append_binary_u32, u32);
binary_int_accessors!(read_binary_i64, append_binary_i64, i64);
binary_int_accessors!(read_binary_u64, append_binary_u64, u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let buf = Buffer::with_capacity(1024);
        assert_eq!(buf.readable_bytes(), 0);
        assert_eq!(buf.writable_bytes(), 1024);
        assert_eq!(buf.prependable_bytes(), CHEAP_PREPEND);
    }

    #[test]
    fn append_and_read_string_roundtrip() {
        let mut buf = Buffer::new();
        buf.append_str("APPLE", 10).unwrap();
        assert_eq!(buf.read_str(10).unwrap(), "APPLE");
    }

    #[test]
    fn append_string_too_long_overflows() {
        let mut buf = Buffer::new();
        let err = buf.append_str("TOOLONG", 3);
        assert!(matches!(err, Err(Error::Overflow { .. })));
    }

    #[test]
    fn scaled_decimal_roundtrip() {
        let mut buf = Buffer::new();
        buf.append_scaled_i32(1234, 8, 2).unwrap();
        assert_eq!(buf.read_scaled_i32(8, 2).unwrap(), 1234);
    }

    #[test]
    fn binary_int_roundtrip_little_endian() {
        let mut buf = Buffer::new();
        buf.append_binary_i32(-7);
        assert_eq!(buf.read_binary_i32().unwrap(), -7);
    }

    #[test]
    fn binary_string_strips_only_trailing_nul() {
        let mut buf = Buffer::new();
        buf.append_binary_string("abc", 8).unwrap();
        assert_eq!(buf.read_binary_string(8).unwrap(), "abc");
    }

    #[test]
    fn short_read_errors() {
        let mut buf = Buffer::new();
        let err = buf.read_i32(4);
        assert!(matches!(err, Err(Error::ShortRead { .. })));
    }

    #[test]
    fn compaction_preserves_readable_bytes() {
        let mut buf = Buffer::with_capacity(512);
        for i in 0..512u32 {
            buf.append_binary_u32(i);
        }
        buf.retrieve(400);
        let before: Vec<u8> = buf.peek().to_vec();
        buf.ensure_writable_bytes(400);
        assert_eq!(buf.peek(), before.as_slice());
        assert_eq!(buf.prependable_bytes(), CHEAP_PREPEND);
    }

    #[test]
    fn buffer_invariant_after_retrieve_and_write() {
        let mut buf = Buffer::new();
        buf.append_str("hello", 5).unwrap();
        buf.retrieve(5);
        assert!(buf.prependable_bytes() <= buf.readable_bytes() + buf.prependable_bytes());
        assert!(buf.readable_bytes() <= buf.readable_bytes() + buf.writable_bytes());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Append(Vec<u8>),
        Retrieve(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            prop::collection::vec(any::<u8>(), 0..64).prop_map(Op::Append),
            (0..64usize).prop_map(Op::Retrieve),
        ]
    }

    proptest! {
        /// After any sequence of writes (via `begin_write`/`has_written`) and
        /// retrieves, the three cursor spans stay ordered:
        /// `0 <= prependable_bytes() <= readable-end <= capacity`.
        #[test]
        fn cursor_invariant_holds(ops in prop::collection::vec(op_strategy(), 0..32)) {
            let mut buf = Buffer::with_capacity(16);
            for op in ops {
                match op {
                    Op::Append(bytes) => {
                        buf.ensure_writable_bytes(bytes.len());
                        buf.begin_write()[..bytes.len()].copy_from_slice(&bytes);
                        buf.has_written(bytes.len());
                    }
                    Op::Retrieve(n) => {
                        let n = n.min(buf.readable_bytes());
                        buf.retrieve(n);
                    }
                }
                prop_assert!(buf.prependable_bytes() <= buf.prependable_bytes() + buf.readable_bytes());
                prop_assert!(buf.readable_bytes() <= buf.readable_bytes() + buf.writable_bytes());
            }
        }

        /// A string written with `append_str` and read back with `read_str`
        /// returns exactly what was written, for any width wide enough to
        /// hold it and any content with no leading/trailing spaces (which
        /// would otherwise be trimmed away on read).
        #[test]
        fn append_str_read_str_roundtrip(
            value in "[a-zA-Z0-9]{0,20}",
            extra_width in 0usize..10,
        ) {
            let width = value.len() + extra_width;
            let mut buf = Buffer::new();
            buf.append_str(&value, width).unwrap();
            prop_assert_eq!(buf.read_str(width).unwrap(), value);
        }
    }
}
