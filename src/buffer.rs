use crate::nom_parser::next_line;

/// Receive buffer for the adapter byte stream.
///
/// Bytes are appended as they arrive from the transport and complete lines
/// are taken off the front. Anything after the last line terminator is kept
/// until the rest of the line arrives.
#[derive(Debug, Default)]
pub struct Buffer {
    data: Vec<u8>,
    read_pos: usize,
}

impl Buffer {
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(100),
            read_pos: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len() - self.read_pos
    }

    pub fn consume(&mut self, len: usize) {
        assert!(len <= self.len());
        self.read_pos += len;
    }

    pub fn write(&mut self, bytes: &[u8]) {
        if self.read_pos == self.data.len() {
            self.clear();
        } else if self.read_pos > 0 {
            self.data.drain(..self.read_pos);
            self.read_pos = 0;
        }
        let write_pos = self.data.len();
        self.data.extend_from_slice(bytes);
        for byte in self.data[write_pos..].iter_mut() {
            if *byte > 0x7f {
                *byte = 0; // map all non-ASCII bytes to NUL
            }
        }
    }

    /// Take the next complete line off the buffer, without its terminator.
    pub fn take_line(&mut self) -> Option<String> {
        let (consumed, line) = next_line(self.as_ref());
        let line = line.map(|l| String::from_utf8_lossy(l).into_owned());
        self.consume(consumed);
        line
    }

    /// Drop all complete lines, keeping a partially received one.
    /// Returns the dropped lines.
    pub fn discard_lines(&mut self) -> Vec<String> {
        let mut dropped = Vec::new();
        while let Some(line) = self.take_line() {
            dropped.push(line);
        }
        dropped
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.read_pos = 0;
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        &self.data[self.read_pos..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_line() {
        let mut buf = Buffer::new();
        buf.write(b"p,ACK\r\nv,1.2");
        assert_eq!(buf.take_line().as_deref(), Some("p,ACK"));
        assert_eq!(buf.take_line(), None);
        assert_eq!(buf.len(), 5);

        buf.write(b".3.4,CAFE\r\n");
        assert_eq!(buf.take_line().as_deref(), Some("v,1.2.3.4,CAFE"));
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn test_partial_lines_do_not_accumulate() {
        let mut buf = Buffer::new();
        buf.write(b"x,");
        for _ in 0..10_000 {
            buf.write(b"33,M\r\nx,");
            assert_eq!(buf.take_line().as_deref(), Some("x,33,M"));
            assert_eq!(buf.take_line(), None);
        }
        assert_eq!(buf.as_ref(), b"x,");
        assert!(buf.data.len() < 100);
    }

    #[test]
    fn test_non_ascii() {
        let mut buf = Buffer::new();
        buf.write(b"x,\xff\n");
        assert_eq!(buf.take_line().as_deref(), Some("x,\0"));
    }

    #[test]
    fn test_discard_keeps_partial_line() {
        let mut buf = Buffer::new();
        buf.write(b"p,NACK\r\nm,ACK\r\np,0");
        assert_eq!(buf.discard_lines(), vec!["p,NACK", "m,ACK"]);
        assert_eq!(buf.as_ref(), b"p,0");
    }
}
