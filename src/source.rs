//! Line-oriented message source.
//!
//! Captures hold one message per line. [`MessageSource`] reads them into a
//! reused buffer and hands out borrowed lines, so the caller parses a line
//! and finishes with it before asking for the next one.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

pub struct MessageSource<R> {
    reader: R,
    line: Vec<u8>,
    line_no: u64,
}

impl MessageSource<Box<dyn BufRead>> {
    /// Open a capture file, or stdin when `path` is `-`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let reader: Box<dyn BufRead> = if path.as_os_str() == "-" {
            Box::new(BufReader::new(io::stdin()))
        } else {
            Box::new(BufReader::with_capacity(1 << 16, File::open(path)?))
        };
        Ok(Self::new(reader))
    }
}

impl<R: BufRead> MessageSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::with_capacity(512),
            line_no: 0,
        }
    }

    /// 1-based number of the line last returned.
    pub fn line_no(&self) -> u64 {
        self.line_no
    }

    /// Next non-blank line, line ending included. `None` at end of input.
    pub fn next_message(&mut self) -> io::Result<Option<&[u8]>> {
        loop {
            self.line.clear();
            if self.reader.read_until(b'\n', &mut self.line)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            if self.line.iter().any(|b| !b.is_ascii_whitespace()) {
                return Ok(Some(&self.line));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_lines_and_skips_blank_ones() {
        let input: &[u8] = b"first|\r\n\n  \nsecond|";
        let mut src = MessageSource::new(input);
        assert_eq!(src.next_message().unwrap(), Some(&b"first|\r\n"[..]));
        assert_eq!(src.line_no(), 1);
        assert_eq!(src.next_message().unwrap(), Some(&b"second|"[..]));
        assert_eq!(src.line_no(), 4);
        assert_eq!(src.next_message().unwrap(), None);
    }
}
