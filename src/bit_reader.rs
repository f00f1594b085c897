//! Marker-escape-aware bit reader over an entropy-coded JPEG-LS scan.
//!
//! The reader keeps a 32-bit shift register whose most significant bit is
//! the next bit to emit. Refilling is marker-aware: while the read position
//! is at least a cache-width of bytes away from the next `0xFF` in the
//! input, four bytes are loaded big-endian in one step; closer to a `0xFF`,
//! bytes are inspected one at a time so that a stuffed `0xFF` contributes
//! only 7 bits of the following byte and a real marker (second byte with
//! bit 7 set) terminates the refill. The reader never consumes past the
//! marker that ends the scan.

use crate::constants::{STREAM_BUFFER_SIZE, STREAM_REFILL_THRESHOLD};
use crate::error::JpeglsError;
use crate::jpeg_marker_code::JPEG_MARKER_START_BYTE;
use std::io::Read;

const CACHE_BITS: i32 = 32;

pub struct BitReader<'a> {
    source: &'a [u8],
    stream: Option<Box<dyn Read + 'a>>,
    buffer: Vec<u8>,
    position: usize,
    end_position: usize,
    next_ff_position: usize,
    cache: u32,
    valid_bits: i32,
}

impl<'a> BitReader<'a> {
    /// Creates a reader over a borrowed byte range.
    pub fn new(source: &'a [u8]) -> Result<Self, JpeglsError> {
        let mut reader = Self {
            source,
            stream: None,
            buffer: Vec::new(),
            position: 0,
            end_position: source.len(),
            next_ff_position: 0,
            cache: 0,
            valid_bits: 0,
        };
        reader.next_ff_position = reader.find_next_ff();
        reader.make_valid()?;
        Ok(reader)
    }

    /// Creates a reader fed from a streaming byte source. Bytes are pulled
    /// into an internal buffer; when close to exhaustion the residual bytes
    /// slide to the front and the source is asked for more.
    pub fn from_stream(stream: Box<dyn Read + 'a>) -> Result<Self, JpeglsError> {
        let mut reader = Self {
            source: &[],
            stream: Some(stream),
            buffer: vec![0; STREAM_BUFFER_SIZE],
            position: 0,
            end_position: 0,
            next_ff_position: 0,
            cache: 0,
            valid_bits: 0,
        };
        reader.fill_from_stream()?;
        reader.next_ff_position = reader.find_next_ff();
        reader.make_valid()?;
        Ok(reader)
    }

    fn bytes(&self) -> &[u8] {
        if self.stream.is_some() { &self.buffer } else { self.source }
    }

    fn fill_from_stream(&mut self) -> Result<(), JpeglsError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };

        let count = self.end_position - self.position;
        if count > STREAM_REFILL_THRESHOLD {
            return Ok(());
        }

        self.buffer.copy_within(self.position..self.end_position, 0);
        // The 0xFF position may be stale (behind the read position) after a
        // stuffed 0xFF was consumed; keep it clamped, it only gates the
        // fast path.
        self.next_ff_position = self.next_ff_position.saturating_sub(self.position);
        self.position = 0;
        self.end_position = count;

        while self.end_position < self.buffer.len() {
            let read = stream
                .read(&mut self.buffer[self.end_position..])
                .map_err(|_| JpeglsError::InvalidCompressedData)?;
            if read == 0 {
                break;
            }
            self.end_position += read;
        }
        Ok(())
    }

    fn find_next_ff(&self) -> usize {
        let bytes = self.bytes();
        let mut position = self.position;
        while position < self.end_position {
            if bytes[position] == JPEG_MARKER_START_BYTE {
                break;
            }
            position += 1;
        }
        position
    }

    /// Fast refill: no `0xFF` within reach, load four bytes big-endian.
    fn optimized_read(&mut self) -> bool {
        if self.position + 4 <= self.next_ff_position {
            let bytes = self.bytes();
            let word = u32::from_be_bytes([
                bytes[self.position],
                bytes[self.position + 1],
                bytes[self.position + 2],
                bytes[self.position + 3],
            ]);
            self.cache |= word >> self.valid_bits;
            let bytes_to_read = ((CACHE_BITS - self.valid_bits) >> 3) as usize;
            self.position += bytes_to_read;
            self.valid_bits += (bytes_to_read as i32) * 8;
            debug_assert!(self.valid_bits >= CACHE_BITS - 8);
            return true;
        }
        false
    }

    fn make_valid(&mut self) -> Result<(), JpeglsError> {
        if self.valid_bits < 0 {
            // A table-driven skip ran past the last bits of a truncated or
            // corrupt scan.
            return Err(JpeglsError::InvalidCompressedData);
        }
        if self.optimized_read() {
            return Ok(());
        }

        self.fill_from_stream()?;

        loop {
            if self.position >= self.end_position {
                if self.valid_bits <= 0 {
                    return Err(JpeglsError::InvalidCompressedData);
                }
                return Ok(());
            }

            let new_byte = self.bytes()[self.position];
            if new_byte == JPEG_MARKER_START_BYTE {
                // A 0xFF followed by a byte with bit 7 set is a marker and
                // ends the scan; a trailing 0xFF may still turn out to be
                // one, so neither is loaded.
                if self.position == self.end_position - 1
                    || (self.bytes()[self.position + 1] & 0x80) != 0
                {
                    if self.valid_bits <= 0 {
                        return Err(JpeglsError::InvalidCompressedData);
                    }
                    return Ok(());
                }
            }

            self.cache |= u32::from(new_byte) << (CACHE_BITS - 8 - self.valid_bits);
            self.position += 1;
            self.valid_bits += 8;
            if new_byte == JPEG_MARKER_START_BYTE {
                // The next byte carries a stuffing bit in its top position.
                self.valid_bits -= 1;
            }

            if self.valid_bits >= CACHE_BITS - 8 {
                break;
            }
        }

        self.next_ff_position = self.find_next_ff();
        Ok(())
    }

    /// Consumes bits whose value is already known, e.g. after a table hit
    /// on a peeked byte.
    #[inline]
    pub(crate) fn skip(&mut self, length: i32) {
        debug_assert!((0..32).contains(&length));
        self.valid_bits -= length;
        self.cache <<= length;
    }

    /// Consumes `length` bits (1..=24) and returns them MSB-first.
    #[inline]
    pub fn read_value(&mut self, length: i32) -> Result<i32, JpeglsError> {
        if self.valid_bits < length {
            self.make_valid()?;
            if self.valid_bits < length {
                return Err(JpeglsError::InvalidCompressedData);
            }
        }
        debug_assert!(length > 0 && length <= 24);
        let result = (self.cache >> (CACHE_BITS - length)) as i32;
        self.skip(length);
        Ok(result)
    }

    /// Like [`Self::read_value`] but supports lengths up to 32, split as
    /// (length - 24, 24).
    pub fn read_long_value(&mut self, length: i32) -> Result<i32, JpeglsError> {
        if length <= 24 {
            return self.read_value(length);
        }
        let high = self.read_value(length - 24)? as u32;
        let low = self.read_value(24)? as u32;
        Ok(((high << 24) | low) as i32)
    }

    /// Returns the next 8 bits without consuming them.
    #[inline]
    pub fn peek_byte(&mut self) -> Result<i32, JpeglsError> {
        if self.valid_bits < 8 {
            self.make_valid()?;
        }
        Ok((self.cache >> (CACHE_BITS - 8)) as i32)
    }

    #[inline]
    pub fn read_bit(&mut self) -> Result<bool, JpeglsError> {
        if self.valid_bits <= 0 {
            self.make_valid()?;
        }
        let set = (self.cache & (1 << (CACHE_BITS - 1))) != 0;
        self.skip(1);
        Ok(set)
    }

    /// Counts the leading zero bits visible in the cache, up to 15.
    /// Returns -1 when 16 zeros are visible.
    #[inline]
    fn peek_zero_bits(&mut self) -> Result<i32, JpeglsError> {
        if self.valid_bits < 16 {
            self.make_valid()?;
        }
        let mut value = self.cache;
        for count in 0..16 {
            if (value & (1 << (CACHE_BITS - 1))) != 0 {
                return Ok(count);
            }
            value <<= 1;
        }
        Ok(-1)
    }

    /// Consumes a unary prefix: leading zeros and the terminating 1 bit.
    pub fn read_high_bits(&mut self) -> Result<i32, JpeglsError> {
        let count = self.peek_zero_bits()?;
        if count >= 0 {
            self.skip(count + 1);
            return Ok(count);
        }
        self.skip(15);

        let mut high_bits = 15;
        loop {
            if self.read_bit()? {
                return Ok(high_bits);
            }
            high_bits += 1;
        }
    }

    /// Verifies that the scan ends cleanly: the next input byte must be the
    /// marker start byte (allowing one padding bit) and the cache must hold
    /// no unconsumed set bits.
    pub fn finalize(&mut self) -> Result<(), JpeglsError> {
        if !self.positioned_at_marker_byte() {
            self.read_bit()?;
            if !self.positioned_at_marker_byte() {
                return Err(JpeglsError::TooMuchCompressedData);
            }
        }
        if self.cache != 0 {
            return Err(JpeglsError::TooMuchCompressedData);
        }
        Ok(())
    }

    fn positioned_at_marker_byte(&self) -> bool {
        self.position < self.end_position
            && self.bytes()[self.position] == JPEG_MARKER_START_BYTE
    }

    /// Byte position of the next unconsumed bit, walking consumed bytes
    /// back out of the cache. A preceding `0xFF` contributes only 7 bits.
    /// Only meaningful for readers over a borrowed byte range.
    pub fn current_byte_position(&self) -> usize {
        let bytes = self.bytes();
        let mut valid_bits = self.valid_bits;
        let mut position = self.position;
        loop {
            let last_bit_count =
                if position > 0 && bytes[position - 1] == JPEG_MARKER_START_BYTE { 7 } else { 8 };
            if valid_bits < last_bit_count {
                return position;
            }
            valid_bits -= last_bit_count;
            position -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_values_msb_first() {
        let data = [0b1011_0001, 0x2C, 0x00, 0x00, 0x00];
        let mut reader = BitReader::new(&data).unwrap();
        assert_eq!(reader.read_value(4).unwrap(), 0b1011);
        assert_eq!(reader.read_value(4).unwrap(), 0b0001);
        assert_eq!(reader.read_value(8).unwrap(), 0x2C);
    }

    #[test]
    fn stuffed_ff_contributes_seven_bits_of_the_next_byte() {
        // 0xFF 0x00: the zero's top bit is the stuffing bit.
        let data = [0xFF, 0x00, 0x00, 0x00, 0x00];
        let mut reader = BitReader::new(&data).unwrap();
        assert_eq!(reader.read_value(8).unwrap(), 0xFF);
        assert_eq!(reader.read_value(7).unwrap(), 0x00);

        // 0xFF 0x7F: bit 7 of 0x7F is clear, so it is an escape, and the
        // seven data bits are all ones.
        let data = [0xFF, 0x7F, 0x00, 0x00, 0x00];
        let mut reader = BitReader::new(&data).unwrap();
        assert_eq!(reader.read_value(8).unwrap(), 0xFF);
        assert_eq!(reader.read_value(7).unwrap(), 0x7F);
    }

    #[test]
    fn refill_stops_at_marker() {
        let data = [0x12, 0xFF, 0xD9];
        let mut reader = BitReader::new(&data).unwrap();
        assert_eq!(reader.read_value(8).unwrap(), 0x12);
        assert_eq!(reader.read_value(8), Err(JpeglsError::InvalidCompressedData));
    }

    #[test]
    fn empty_scan_reports_invalid_data() {
        assert!(BitReader::new(&[0xFF, 0xD9]).is_err());
        assert!(BitReader::new(&[]).is_err());
    }

    #[test]
    fn read_high_bits_counts_unary_prefix() {
        // 001..... -> two zeros, terminating one.
        let data = [0b0010_0000, 0x00, 0x00, 0x00, 0x00];
        let mut reader = BitReader::new(&data).unwrap();
        assert_eq!(reader.read_high_bits().unwrap(), 2);

        // 23 zeros followed by a one crosses the 16-bit peek window.
        let data = [0x00, 0x00, 0b0000_0001, 0x00, 0x00, 0x00];
        let mut reader = BitReader::new(&data).unwrap();
        assert_eq!(reader.read_high_bits().unwrap(), 23);
    }

    #[test]
    fn peek_byte_does_not_consume() {
        let data = [0xA5, 0x3C, 0x00, 0x00, 0x00];
        let mut reader = BitReader::new(&data).unwrap();
        assert_eq!(reader.peek_byte().unwrap(), 0xA5);
        assert_eq!(reader.peek_byte().unwrap(), 0xA5);
        assert_eq!(reader.read_value(8).unwrap(), 0xA5);
        assert_eq!(reader.peek_byte().unwrap(), 0x3C);
    }

    #[test]
    fn read_long_value_splits_wide_reads() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x00, 0x00, 0x00, 0x00];
        let mut reader = BitReader::new(&data).unwrap();
        assert_eq!(reader.read_long_value(32).unwrap(), 0x1234_5678);
    }

    #[test]
    fn current_byte_position_accounts_for_cached_bits() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9A, 0x00, 0x00, 0x00];
        let mut reader = BitReader::new(&data).unwrap();
        assert_eq!(reader.current_byte_position(), 0);
        reader.read_value(8).unwrap();
        assert_eq!(reader.current_byte_position(), 1);
        reader.read_value(4).unwrap();
        // A partially consumed byte counts as consumed: the outer parser
        // resumes after it.
        assert_eq!(reader.current_byte_position(), 2);
        reader.read_value(4).unwrap();
        assert_eq!(reader.current_byte_position(), 2);
        reader.read_value(8).unwrap();
        assert_eq!(reader.current_byte_position(), 3);
    }

    #[test]
    fn current_byte_position_counts_seven_bits_after_ff() {
        let data = [0xFF, 0x00, 0x12, 0x34, 0x00, 0x00];
        let mut reader = BitReader::new(&data).unwrap();
        // The 0xFF escape pair holds 8 + 7 data bits.
        reader.read_value(8).unwrap();
        reader.read_value(7).unwrap();
        assert_eq!(reader.current_byte_position(), 2);
        reader.read_value(8).unwrap();
        assert_eq!(reader.current_byte_position(), 3);
    }

    #[test]
    fn finalize_accepts_clean_scan_end() {
        let data = [0xAC, 0xFF, 0xD9];
        let mut reader = BitReader::new(&data).unwrap();
        assert_eq!(reader.read_value(8).unwrap(), 0xAC);
        assert!(reader.finalize().is_ok());
    }

    #[test]
    fn finalize_rejects_unconsumed_bits() {
        let data = [0xAC, 0x55, 0xFF, 0xD9];
        let mut reader = BitReader::new(&data).unwrap();
        assert_eq!(reader.read_value(8).unwrap(), 0xAC);
        assert_eq!(reader.finalize(), Err(JpeglsError::TooMuchCompressedData));
    }

    #[test]
    fn finalize_allows_one_padding_bit_before_the_marker() {
        // One byte of data, 7 bits consumed: the eighth is padding.
        let data = [0b1010_1010, 0xFF, 0xD9];
        let mut reader = BitReader::new(&data).unwrap();
        assert_eq!(reader.read_value(7).unwrap(), 0b1010101);
        assert!(reader.finalize().is_ok());
    }

    /// Byte source that trickles data out a few bytes at a time.
    struct TrickleReader {
        data: Vec<u8>,
        position: usize,
    }

    impl Read for TrickleReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let count = std::cmp::min(7, std::cmp::min(buf.len(), self.data.len() - self.position));
            buf[..count].copy_from_slice(&self.data[self.position..self.position + count]);
            self.position += count;
            Ok(count)
        }
    }

    #[test]
    fn streaming_source_matches_borrowed_source() {
        // Enough data to force the buffer to slide and refill, without any
        // 0xFF so every byte is plain data.
        let data: Vec<u8> = (0..45_000u32).map(|i| (i % 255) as u8).collect();
        let mut streamed =
            BitReader::from_stream(Box::new(TrickleReader { data: data.clone(), position: 0 }))
                .unwrap();
        let mut borrowed = BitReader::new(&data).unwrap();
        for _ in 0..data.len() {
            assert_eq!(streamed.read_value(8).unwrap(), borrowed.read_value(8).unwrap());
        }
    }

    #[test]
    fn streaming_source_handles_stuffed_ff() {
        let mut data = vec![0x11u8, 0xFF, 0x00, 0x22];
        data.extend_from_slice(&[0u8; 8]);
        let expected = {
            let mut reader = BitReader::new(&data).unwrap();
            (reader.read_value(8).unwrap(), reader.read_value(8).unwrap(), reader.read_value(7).unwrap())
        };
        let mut reader =
            BitReader::from_stream(Box::new(TrickleReader { data, position: 0 })).unwrap();
        assert_eq!(reader.read_value(8).unwrap(), expected.0);
        assert_eq!(reader.read_value(8).unwrap(), expected.1);
        assert_eq!(reader.read_value(7).unwrap(), expected.2);
    }
}
