use std::fmt;

use rand::RngCore;

use super::WrongLength;

/// SEQUENCE_SIZE is the length in bytes of a re-authentication sequence
/// number on the wire.
pub const SEQUENCE_SIZE: usize = 32;

/// A 32-byte big-endian counter, most significant byte first. Each side of
/// a continuous session keeps one for its own outbound messages and one
/// tracking the value expected next from the peer.
#[derive(Clone, PartialEq, Eq)]
pub struct SequenceNumber {
    data: [u8; SEQUENCE_SIZE],
}

impl SequenceNumber {
    pub fn zero() -> Self {
        SequenceNumber {
            data: [0u8; SEQUENCE_SIZE],
        }
    }

    pub fn random() -> Self {
        let mut data = [0u8; SEQUENCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut data);
        SequenceNumber { data }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WrongLength> {
        WrongLength::check(SEQUENCE_SIZE, bytes.len())?;
        let mut data = [0u8; SEQUENCE_SIZE];
        data.copy_from_slice(bytes);
        Ok(SequenceNumber { data })
    }

    pub fn as_bytes(&self) -> &[u8; SEQUENCE_SIZE] {
        &self.data
    }

    /// Adds one, wrapping to all-zero past the maximum.
    pub fn increment(&mut self) {
        for byte in self.data.iter_mut().rev() {
            let (next, overflow) = byte.overflowing_add(1);
            *byte = next;
            if !overflow {
                return;
            }
        }
    }

    /// The value the sender of `self` is expected to use next: a copy of
    /// this number incremented once. A receiver stores this after
    /// validating an incoming message.
    pub fn next_expected(&self) -> SequenceNumber {
        let mut next = self.clone();
        next.increment();
        next
    }
}

impl fmt::Debug for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SequenceNumber [ {} ]", super::HexDebug(&self.data))
    }
}

impl From<[u8; SEQUENCE_SIZE]> for SequenceNumber {
    fn from(data: [u8; SEQUENCE_SIZE]) -> Self {
        SequenceNumber { data }
    }
}

impl AsRef<[u8]> for SequenceNumber {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
