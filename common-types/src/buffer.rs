use std::fmt;
use std::io::Write;

use byteorder::{BigEndian, ByteOrder};

// LENGTH_PREFIX_SIZE is the number of bytes used to prefix encode the
// length of a block inside a serialized payload and on the wire.
const LENGTH_PREFIX_SIZE: usize = 4;

/// A block read ran past the end of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("truncated input: need {needed} bytes at offset {offset}, {available} available")]
pub struct BufferError {
    pub offset: usize,
    pub needed: usize,
    pub available: usize,
}

/// `Buffer` is an owned growable byte vector. Every serialized payload in
/// the protocol is assembled in one of these; the length-prepended append
/// below is the only framing primitive the codecs use.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    data: Vec<u8>,
}

impl Buffer {
    pub fn new(initial_capacity: usize) -> Self {
        Buffer {
            data: Vec::with_capacity(initial_capacity),
        }
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.reserve_for(bytes.len());
        self.data.extend_from_slice(bytes);
    }

    pub fn append_str(&mut self, text: &str) {
        self.append(text.as_bytes());
    }

    pub fn append_buffer(&mut self, other: &Buffer) {
        self.append(other.as_slice());
    }

    pub fn append_fmt(&mut self, args: fmt::Arguments) {
        // writing into a Vec cannot fail
        let _ = self.data.write_fmt(args);
    }

    /// Appends `block` prefixed with its length as a 4-byte big-endian
    /// integer. The inner payloads of every message are concatenations of
    /// such blocks, and the wire framing uses the same shape.
    pub fn append_length_prepended(&mut self, block: &[u8]) {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        BigEndian::write_u32(&mut prefix, block.len() as u32);
        self.append(&prefix);
        self.append(block);
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    /// Zero-extends the buffer so it holds at least `size` bytes.
    pub fn set_min_size(&mut self, size: usize) {
        if self.data.len() < size {
            self.reserve_for(size - self.data.len());
            self.data.resize(size, 0);
        }
    }

    pub fn equals(&self, other: &Buffer) -> bool {
        self.data == other.data
    }

    /// The write position, i.e. how many bytes are held.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// The allocated size, always at least [`len`](Buffer::len).
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Lossy UTF-8 view of the contents.
    pub fn copy_to_string(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    // doubles the capacity until the pending append fits, so repeated
    // appends stay amortized
    fn reserve_for(&mut self, extra: usize) {
        let needed = self.data.len() + extra;
        let mut capacity = self.data.capacity().max(1);
        while capacity < needed {
            capacity *= 2;
        }
        self.data.reserve(capacity - self.data.len());
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Buffer [ {} ]", super::HexDebug(&self.data))
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self {
        Buffer { data }
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Reads one length-prepended block out of `data` starting at `offset`.
/// Returns the block and the offset just past it.
pub fn read_length_prepended(data: &[u8], offset: usize) -> Result<(&[u8], usize), BufferError> {
    let body = offset.checked_add(LENGTH_PREFIX_SIZE).ok_or(BufferError {
        offset,
        needed: LENGTH_PREFIX_SIZE,
        available: data.len().saturating_sub(offset),
    })?;
    if data.len() < body {
        return Err(BufferError {
            offset,
            needed: LENGTH_PREFIX_SIZE,
            available: data.len().saturating_sub(offset),
        });
    }
    let length = BigEndian::read_u32(&data[offset..body]) as usize;
    let end = body.checked_add(length).filter(|&end| end <= data.len());
    match end {
        Some(end) => Ok((&data[body..end], end)),
        None => Err(BufferError {
            offset: body,
            needed: length,
            available: data.len() - body,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_compare() {
        let mut a = Buffer::new(4);
        a.append(b"HELLO");
        a.append_str(" WORLD!");

        let mut b = Buffer::new(64);
        b.append_str("HELLO WORLD!");
        assert!(a.equals(&b));
        assert_eq!(a, b);

        b.truncate(5);
        assert_eq!(b.copy_to_string(), "HELLO");
        assert!(!a.equals(&b));

        b.clear();
        assert!(b.is_empty());
    }

    #[test]
    fn append_fmt_renders() {
        let mut buffer = Buffer::new(0);
        buffer.append_fmt(format_args!("{}:{:02}", "round", 7));
        assert_eq!(buffer.copy_to_string(), "round:07");
    }

    #[test]
    fn set_min_size_zero_extends() {
        let mut buffer = Buffer::new(0);
        buffer.append(&[1, 2]);
        buffer.set_min_size(5);
        assert_eq!(buffer.as_slice(), &[1, 2, 0, 0, 0]);
        // never shrinks
        buffer.set_min_size(1);
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn length_prepended_round_trip() {
        let mut buffer = Buffer::new(0);
        buffer.append_length_prepended(b"first");
        buffer.append_length_prepended(b"");
        buffer.append_length_prepended(b"second block");

        let data = buffer.as_slice();
        let (first, offset) = read_length_prepended(data, 0).unwrap();
        assert_eq!(first, b"first");
        let (empty, offset) = read_length_prepended(data, offset).unwrap();
        assert_eq!(empty, b"");
        let (second, offset) = read_length_prepended(data, offset).unwrap();
        assert_eq!(second, b"second block");
        assert_eq!(offset, data.len());
    }

    #[test]
    fn length_prepended_truncated_input() {
        let mut buffer = Buffer::new(0);
        buffer.append_length_prepended(b"block");

        let data = buffer.as_slice();
        // cut into the prefix
        assert!(read_length_prepended(&data[..3], 0).is_err());
        // cut into the body
        assert!(read_length_prepended(&data[..data.len() - 1], 0).is_err());
        // reading past the end
        assert!(read_length_prepended(data, data.len()).is_err());
    }
}
