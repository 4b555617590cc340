#![forbid(unsafe_code)]

//! Primitive value types shared by every layer of the protocol: the owned
//! byte buffer with its length-prepended framing, the 8-byte session nonce
//! and the 32-byte big-endian sequence counter.

mod buffer;
mod nonce;
mod sequence;

pub use self::buffer::{read_length_prepended, Buffer, BufferError};
pub use self::nonce::{Nonce, NONCE_SIZE};
pub use self::sequence::{SequenceNumber, SEQUENCE_SIZE};

use std::fmt;

/// A value was constructed from a slice of the wrong size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected} bytes, got {actual}")]
pub struct WrongLength {
    pub expected: usize,
    pub actual: usize,
}

impl WrongLength {
    pub(crate) fn check(expected: usize, actual: usize) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(WrongLength { expected, actual })
        }
    }
}

pub(crate) struct HexDebug<'a>(pub &'a [u8]);

impl<'a> fmt::Display for HexDebug<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
