#![forbid(unsafe_code)]

//! Persistent lists consulted at the edges of a protocol run: the
//! authorized-user store the verifier checks identities against, and the
//! list of known Bluetooth beacons.
//!
//! Both are line-oriented text files. Blank lines and lines starting with
//! `#` are comments; a loader keeps them attached (leading ones to the
//! store itself, later ones to the entry that follows) so an unmodified
//! store exports byte-for-byte.

mod beacons;
mod store;

pub use self::beacons::{Beacon, Beacons};
pub use self::store::{UserEntry, UserStore};

#[derive(Debug, thiserror::Error)]
pub enum UsersError {
    #[error("malformed entry at line {line}")]
    Format { line: usize },
    #[error("malformed device address {0:?}")]
    BadAddress(String),
    #[error("commitment mismatch for {name:?} at line {line}")]
    CommitmentMismatch { line: usize, name: String },
    #[error("crypto: {0}")]
    Crypto(#[from] crypto::CryptoError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Splits file text into lines for the comment-preserving loaders. A
/// trailing newline does not produce a phantom empty line.
fn split_lines(text: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = text.split('\n').collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }
    lines
}

fn is_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.is_empty() || trimmed.starts_with('#')
}
