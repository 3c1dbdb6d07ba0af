//! Zero-copy field scanner over a delimited `tag=value` byte range.
//!
//! A [`Fields`] view keeps a cursor that advances past every value it reads,
//! so reading fields in wire order costs a single pass. A tag that lies before
//! the cursor is still found: the search wraps once to the start of the range.
//! All offsets are absolute positions in the underlying buffer, which keeps
//! error offsets meaningful for sub-range views.

use std::cell::Cell;

use crate::error::{BookError, Result};

/// Sum of bytes modulo 256, each delimiter counted as `1`.
pub fn checksum(bytes: &[u8], soh: u8) -> u8 {
    bytes
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(if b == soh { 1 } else { b }))
}

/// Cursor-carrying view over `buf[begin..end]`.
#[derive(Debug)]
pub struct Fields<'a> {
    buf: &'a [u8],
    soh: u8,
    begin: usize,
    end: usize,
    cursor: Cell<usize>,
}

impl<'a> Fields<'a> {
    pub fn new(buf: &'a [u8], soh: u8) -> Self {
        Self::with_range(buf, soh, 0, buf.len())
    }

    pub(crate) fn with_range(buf: &'a [u8], soh: u8, begin: usize, end: usize) -> Self {
        debug_assert!(begin <= end && end <= buf.len());
        Self {
            buf,
            soh,
            begin,
            end,
            cursor: Cell::new(begin),
        }
    }

    pub fn soh(&self) -> u8 {
        self.soh
    }

    pub fn begin(&self) -> usize {
        self.begin
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn cursor(&self) -> usize {
        self.cursor.get()
    }

    pub(crate) fn buf(&self) -> &'a [u8] {
        self.buf
    }

    pub(crate) fn set_cursor(&self, at: usize) {
        self.cursor.set(at);
    }

    /// Narrow the view to `[begin, end)` and rewind the cursor to `begin`.
    pub(crate) fn narrow(&mut self, begin: usize, end: usize) {
        debug_assert!(self.begin <= begin && begin <= end && end <= self.end);
        self.begin = begin;
        self.end = end;
        self.cursor.set(begin);
    }

    /// Position of the first byte of `tag`, searching from `from` to the end
    /// and then from the range start back up to `from`.
    pub fn find_tag_begin(&self, tag: &[u8], from: usize) -> Option<usize> {
        self.scan(tag, from, self.end)
            .or_else(|| self.scan(tag, self.begin, from))
    }

    /// Forward-only search for `tag` at field starts in `[from, stop)`.
    pub(crate) fn scan(&self, tag: &[u8], from: usize, stop: usize) -> Option<usize> {
        let mut at = from;
        while at < stop {
            if self.buf[at..self.end].starts_with(tag) {
                return Some(at);
            }
            let next = self.buf[at..stop].iter().position(|&b| b == self.soh)?;
            at += next + 1;
        }
        None
    }

    /// Locate `tag` and move the cursor just past it.
    fn seek(&self, tag: &[u8]) -> Result<usize> {
        let from = self.cursor.get();
        let at = self
            .find_tag_begin(tag, from)
            .ok_or_else(|| BookError::unknown_field(tag, from))?;
        Ok(at + tag.len())
    }

    fn read_field<T>(&self, tag: &[u8], read: impl FnOnce(&mut usize) -> Result<T>) -> Result<T> {
        let mut pos = self.seek(tag)?;
        let value = read(&mut pos)?;
        self.cursor.set(pos);
        Ok(value)
    }

    pub fn read_int_field(&self, tag: &[u8]) -> Result<u64> {
        self.read_field(tag, |pos| self.read_int_value(pos))
    }

    pub fn read_decimal_field(&self, tag: &[u8]) -> Result<f64> {
        self.read_field(tag, |pos| self.read_decimal_value(pos))
    }

    pub fn read_str_field(&self, tag: &[u8]) -> Result<&'a str> {
        self.read_field(tag, |pos| self.read_str_value(pos))
    }

    fn byte_at(&self, pos: usize) -> Result<u8> {
        if pos < self.end {
            Ok(self.buf[pos])
        } else {
            Err(BookError::malformed("value runs past end of range", pos))
        }
    }

    fn check_value_start(&self, pos: usize) -> Result<()> {
        if self.byte_at(pos)? == self.soh {
            return Err(BookError::malformed("empty value", pos));
        }
        Ok(())
    }

    /// Raw value bytes up to the next delimiter; `pos` ends past the delimiter.
    pub fn read_raw_value(&self, pos: &mut usize) -> Result<&'a [u8]> {
        self.check_value_start(*pos)?;
        let start = *pos;
        let len = self.buf[start..self.end]
            .iter()
            .position(|&b| b == self.soh)
            .ok_or_else(|| BookError::malformed("unterminated value", start))?;
        *pos = start + len + 1;
        Ok(&self.buf[start..start + len])
    }

    pub fn read_str_value(&self, pos: &mut usize) -> Result<&'a str> {
        let start = *pos;
        let raw = self.read_raw_value(pos)?;
        std::str::from_utf8(raw)
            .map_err(|_| BookError::malformed("value is not valid UTF-8", start))
    }

    pub fn read_int_value(&self, pos: &mut usize) -> Result<u64> {
        self.check_value_start(*pos)?;
        let mut at = *pos;
        let mut value: u64 = 0;
        loop {
            let b = self.byte_at(at)?;
            if b == self.soh {
                break;
            }
            if !b.is_ascii_digit() {
                return Err(BookError::malformed("non-digit in integer value", at));
            }
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(b - b'0')))
                .ok_or_else(|| BookError::malformed("integer value overflows", at))?;
            at += 1;
        }
        *pos = at + 1;
        Ok(value)
    }

    pub fn read_decimal_value(&self, pos: &mut usize) -> Result<f64> {
        self.check_value_start(*pos)?;
        let mut at = *pos;
        let negative = self.byte_at(at)? == b'-';
        if negative {
            at += 1;
        }

        let mut digits = 0usize;
        let mut value = 0.0f64;
        let mut b = self.byte_at(at)?;
        while b.is_ascii_digit() {
            value = value * 10.0 + f64::from(b - b'0');
            digits += 1;
            at += 1;
            b = self.byte_at(at)?;
        }

        if b == b'.' {
            at += 1;
            let mut frac = 0.0f64;
            let mut frac_digits = 0i32;
            b = self.byte_at(at)?;
            while b.is_ascii_digit() {
                frac = frac * 10.0 + f64::from(b - b'0');
                frac_digits += 1;
                at += 1;
                b = self.byte_at(at)?;
            }
            digits += frac_digits as usize;
            value += frac / 10f64.powi(frac_digits);
        }

        if b != self.soh {
            return Err(BookError::malformed("unexpected byte in decimal value", at));
        }
        if digits == 0 {
            return Err(BookError::malformed("decimal value has no digits", *pos));
        }
        *pos = at + 1;
        Ok(if negative { -value } else { value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn fields(s: &str) -> Fields<'_> {
        Fields::new(s.as_bytes(), b'|')
    }

    #[test]
    fn reads_fields_in_any_order() {
        let f = fields("34=7|55=EUR/USD|268=2|");
        assert_eq!(f.read_int_field(b"268=").unwrap(), 2);
        // tag before the cursor: found on the wrapped pass
        assert_eq!(f.read_str_field(b"55=").unwrap(), "EUR/USD");
        assert_eq!(f.read_int_field(b"34=").unwrap(), 7);
        assert_eq!(f.cursor(), "34=7|".len());
    }

    #[test]
    fn tag_must_start_a_field() {
        // "4=" occurs inside "34=", but never at a field start
        let f = fields("34=7|55=X|");
        let err = f.read_int_field(b"4=").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownField);
    }

    #[test]
    fn missing_tag_is_unknown_field() {
        let f = fields("34=7|");
        f.set_cursor(5);
        assert!(matches!(
            f.read_str_field(b"55="),
            Err(BookError::UnknownField { ref tag, offset: 5 }) if tag == "55"
        ));
    }

    #[test]
    fn string_values() {
        assert_eq!(fields("55=|").read_str_field(b"55=").unwrap_err().kind(), ErrorKind::Malformed);
        let err = fields("55=ABC").read_str_field(b"55=").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
        assert_eq!(fields("55=ABC|").read_str_field(b"55=").unwrap(), "ABC");
    }

    #[test]
    fn integer_values() {
        assert_eq!(fields("34=0012|").read_int_field(b"34=").unwrap(), 12);
        for bad in ["34=12", "34=1a|", "34=|", "34=99999999999999999999|"] {
            let err = fields(bad).read_int_field(b"34=").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Malformed, "{bad}");
        }
    }

    #[test]
    fn decimal_values() {
        let cases = [
            ("270=1.1|", 1.1),
            ("270=100|", 100.0),
            ("270=-2.50|", -2.5),
            ("270=.5|", 0.5),
            ("270=7.|", 7.0),
        ];
        for (raw, want) in cases {
            let got = fields(raw).read_decimal_field(b"270=").unwrap();
            assert!((got - want).abs() < 1e-12, "{raw}: {got}");
        }
        for bad in ["270=1.2.3|", "270=1e5|", "270=-|", "270=.|", "270=12", "270=1.5"] {
            let err = fields(bad).read_decimal_field(b"270=").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Malformed, "{bad}");
        }
    }

    #[test]
    fn failed_read_keeps_cursor() {
        let f = fields("34=x|55=A|");
        assert!(f.read_int_field(b"34=").is_err());
        assert_eq!(f.cursor(), 0);
    }

    #[test]
    fn checksum_counts_delimiter_as_one() {
        assert_eq!(checksum(b"A|", b'|'), 66);
        assert_eq!(checksum(b"A\x01", 0x01), 66);
        let long = vec![b'z'; 10];
        assert_eq!(checksum(&long, b'|'), ((122 * 10) % 256) as u8);
    }

    #[test]
    fn checksum_of_very_long_input_wraps() {
        // past the point where a 32-bit running sum of 0xFF bytes would overflow
        let n = (u32::MAX as usize / 255) + 4096;
        let long = vec![0xFFu8; n];
        assert_eq!(checksum(&long, b'|'), ((255 * n as u64) % 256) as u8);
    }
}
