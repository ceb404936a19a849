//! Seekable byte cursor over an in-memory container.
//!
//! Every container read goes through [`ByteCursor`]: absolute seeks are
//! bounds-checked against the buffer length and fixed-size reads either return
//! exactly the requested bytes or a [`DecodeError::ShortRead`]. Reads borrow
//! from the underlying buffer, so no scratch allocation outlives the call that
//! consumes it.

use winnow::Parser;
use winnow::binary::{le_i32, le_u16, le_u32};

use crate::data::parser_utils::{WResult, align_up, read_null_terminated_string};
use crate::error::{DecodeError, DecodeResult};

#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Move to an absolute offset. Offsets at or past the end of the stream
    /// are rejected; `what` names the field the offset came from.
    pub fn seek(&mut self, offset: usize, what: &'static str) -> DecodeResult<()> {
        if offset >= self.data.len() {
            return Err(DecodeError::OffsetOutOfRange {
                what,
                offset,
                len: self.data.len(),
            });
        }
        self.pos = offset;
        Ok(())
    }

    /// Advance to the next multiple of `alignment`.
    pub fn align_to(&mut self, alignment: usize) {
        self.pos = align_up(self.pos, alignment);
    }

    pub fn skip(&mut self, count: usize) -> DecodeResult<()> {
        self.take(count).map(|_| ())
    }

    /// Read exactly `count` bytes.
    pub fn take(&mut self, count: usize) -> DecodeResult<&'a [u8]> {
        let available = self.data.len().saturating_sub(self.pos);
        let bytes = self
            .data
            .get(self.pos..self.pos + count)
            .ok_or(DecodeError::ShortRead {
                offset: self.pos,
                needed: count,
                available,
            })?;
        self.pos += count;
        Ok(bytes)
    }

    /// Read a `size`-byte record and run `parser` over it.
    pub fn parse<T>(
        &mut self,
        size: usize,
        mut parser: impl FnMut(&mut &'a [u8]) -> WResult<T>,
    ) -> DecodeResult<T> {
        let offset = self.pos;
        let mut record = self.take(size)?;
        parser(&mut record).map_err(|_| DecodeError::ShortRead {
            offset,
            needed: size,
            available: size,
        })
    }

    pub fn read_u16(&mut self) -> DecodeResult<u16> {
        self.parse(2, |input| le_u16.parse_next(input))
    }

    pub fn read_u32(&mut self) -> DecodeResult<u32> {
        self.parse(4, |input| le_u32.parse_next(input))
    }

    pub fn read_i32(&mut self) -> DecodeResult<i32> {
        self.parse(4, |input| le_i32.parse_next(input))
    }

    /// Read a NUL-terminated string of at most `max_len` bytes from the
    /// current position, leaving the cursor just past the terminator.
    pub fn read_null_terminated(&mut self, max_len: usize) -> String {
        let rest = self.data.get(self.pos..).unwrap_or_default();
        let (text, consumed) = read_null_terminated_string(rest, max_len);
        self.pos += consumed;
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_past_end_is_rejected() {
        let data = [0u8; 8];
        let mut cursor = ByteCursor::new(&data);
        assert!(cursor.seek(7, "test").is_ok());
        assert_eq!(
            cursor.seek(8, "test"),
            Err(DecodeError::OffsetOutOfRange {
                what: "test",
                offset: 8,
                len: 8
            })
        );
        assert_eq!(cursor.position(), 7);
    }

    #[test]
    fn short_read_reports_available_bytes() {
        let data = [1u8, 2, 3];
        let mut cursor = ByteCursor::new(&data);
        cursor.skip(1).unwrap();
        assert_eq!(
            cursor.read_u32(),
            Err(DecodeError::ShortRead {
                offset: 1,
                needed: 4,
                available: 2
            })
        );
    }

    #[test]
    fn reads_little_endian_fields() {
        let data = [0x46, 0x50, 0x4D, 0x31, 0xFE, 0xFF, 0x34, 0x12];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_u32().unwrap(), 0x314D5046);
        assert_eq!(cursor.read_u16().unwrap(), 0xFFFE);
        assert_eq!(cursor.read_u16().unwrap(), 0x1234);
        assert_eq!(cursor.position(), 8);
    }

    #[test]
    fn align_moves_to_next_boundary() {
        let data = [0u8; 64];
        let mut cursor = ByteCursor::new(&data);
        cursor.skip(0x11).unwrap();
        cursor.align_to(16);
        assert_eq!(cursor.position(), 0x20);
        cursor.align_to(16);
        assert_eq!(cursor.position(), 0x20);
    }

    #[test]
    fn null_terminated_read_advances_past_terminator() {
        let data = b"tex\0next";
        let mut cursor = ByteCursor::new(data);
        assert_eq!(cursor.read_null_terminated(0xFF), "tex");
        assert_eq!(cursor.take(4).unwrap(), b"next");
    }
}
