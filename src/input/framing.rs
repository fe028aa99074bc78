//! # Stream Framing
//!
//! Reassembly of records from chunked reads. Byte sources (event files,
//! serial ports) hand over whatever the kernel had buffered, which rarely
//! lines up with record boundaries.
//!
//! - [`RecordBuffer`]: fixed-size binary records. Keeps exactly
//!   `len % record_size` trailing bytes between pushes.
//! - [`LineBuffer`]: newline-delimited text. Drops any line that grows past
//!   its limit before a newline arrives.

use bytes::{Buf, Bytes, BytesMut};

/// Reassembles fixed-size records across arbitrary chunk boundaries.
///
/// # Examples
///
/// ```
/// use pie_bridge::input::framing::RecordBuffer;
///
/// let mut buf = RecordBuffer::new(4);
/// assert_eq!(buf.push(&[1, 2, 3]).count(), 0);
/// let records: Vec<_> = buf.push(&[4, 5, 6, 7, 8]).collect();
/// assert_eq!(records.len(), 2);
/// assert_eq!(&records[1][..], &[5, 6, 7, 8]);
/// assert_eq!(buf.leftover(), 0);
/// ```
#[derive(Debug)]
pub struct RecordBuffer {
    record_size: usize,
    pending: BytesMut,
}

impl RecordBuffer {
    /// Creates a buffer for records of `record_size` bytes.
    #[must_use]
    pub fn new(record_size: usize) -> Self {
        assert!(record_size > 0, "record size must be non-zero");
        Self {
            record_size,
            pending: BytesMut::with_capacity(record_size * 2),
        }
    }

    /// Appends a chunk and yields every record it completes.
    pub fn push(&mut self, chunk: &[u8]) -> impl Iterator<Item = Bytes> {
        self.pending.extend_from_slice(chunk);

        let size = self.record_size;
        let count = self.pending.len() / size;
        let complete = self.pending.split_to(count * size).freeze();

        (0..count).map(move |i| complete.slice(i * size..(i + 1) * size))
    }

    /// Bytes held back waiting for the rest of a record.
    #[must_use]
    pub fn leftover(&self) -> usize {
        self.pending.len()
    }

    /// Discards any partial record.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Splits a byte stream into text lines.
#[derive(Debug)]
pub struct LineBuffer {
    max_line: usize,
    pending: BytesMut,
    overflowed: bool,
}

impl LineBuffer {
    /// Creates a line buffer that drops lines longer than `max_line` bytes.
    #[must_use]
    pub fn new(max_line: usize) -> Self {
        Self {
            max_line,
            pending: BytesMut::with_capacity(max_line),
            overflowed: false,
        }
    }

    /// Appends a chunk and returns every complete line, without the
    /// trailing `\n` or `\r\n`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for segment in chunk.split_inclusive(|&b| b == b'\n') {
            let terminated = segment.last() == Some(&b'\n');
            let body = if terminated {
                &segment[..segment.len() - 1]
            } else {
                segment
            };

            if !self.overflowed {
                self.pending.extend_from_slice(body);
                if self.pending.len() > self.max_line {
                    self.pending.clear();
                    self.overflowed = true;
                }
            }

            if terminated {
                if !self.overflowed {
                    let mut line = self.pending.split().freeze();
                    if line.last() == Some(&b'\r') {
                        line.truncate(line.len() - 1);
                    }
                    lines.push(String::from_utf8_lossy(line.chunk()).into_owned());
                }
                self.overflowed = false;
            }
        }

        lines
    }

    /// Bytes of the unterminated line held back.
    #[must_use]
    pub fn leftover(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_split_20_28() {
        let mut buf = RecordBuffer::new(24);
        let data: Vec<u8> = (0..48).collect();

        let first: Vec<Bytes> = buf.push(&data[..20]).collect();
        assert!(first.is_empty());
        assert_eq!(buf.leftover(), 20);

        let second: Vec<Bytes> = buf.push(&data[20..]).collect();
        assert_eq!(second.len(), 2);
        assert_eq!(&second[0][..], &data[..24]);
        assert_eq!(&second[1][..], &data[24..]);
        assert_eq!(buf.leftover(), 0);
    }

    #[test]
    fn test_record_any_split_point() {
        let data: Vec<u8> = (0..48).collect();
        for split in 0..=48 {
            let mut buf = RecordBuffer::new(24);
            let count = buf.push(&data[..split]).count() + buf.push(&data[split..]).count();
            assert_eq!(count, 2, "split at {}", split);
            assert_eq!(buf.leftover(), 0);
        }
    }

    #[test]
    fn test_record_leftover_is_bounded() {
        let mut buf = RecordBuffer::new(12);
        for _ in 0..100 {
            let _ = buf.push(&[0u8; 7]).count();
            assert!(buf.leftover() < 12);
        }
    }

    #[test]
    fn test_lines_across_chunks() {
        let mut buf = LineBuffer::new(64);
        assert!(buf.push(b"0.1,0.2").is_empty());
        let lines = buf.push(b",0.3\r\n1,2,3\n4,");
        assert_eq!(lines, vec!["0.1,0.2,0.3".to_string(), "1,2,3".to_string()]);
        assert_eq!(buf.leftover(), 2);
    }

    #[test]
    fn test_overlong_line_dropped() {
        let mut buf = LineBuffer::new(8);
        assert!(buf.push(b"0123456789").is_empty());
        assert_eq!(buf.leftover(), 0);
        // Rest of the overlong line is skipped, next line survives
        let lines = buf.push(b"abc\nok\n");
        assert_eq!(lines, vec!["ok".to_string()]);
    }
}
