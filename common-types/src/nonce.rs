use std::fmt;

use rand::RngCore;

use super::WrongLength;

/// NONCE_SIZE is the length in bytes of the session nonces both sides
/// contribute to the key derivation.
pub const NONCE_SIZE: usize = 8;

/// An 8-byte random value. Each side generates one per protocol run; both
/// end up bound into the derived session keys.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Nonce {
    data: [u8; NONCE_SIZE],
}

impl Nonce {
    pub fn random() -> Self {
        let mut data = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut data);
        Nonce { data }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WrongLength> {
        WrongLength::check(NONCE_SIZE, bytes.len())?;
        let mut data = [0u8; NONCE_SIZE];
        data.copy_from_slice(bytes);
        Ok(Nonce { data })
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.data
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Nonce [ {} ]", super::HexDebug(&self.data))
    }
}

impl From<[u8; NONCE_SIZE]> for Nonce {
    fn from(data: [u8; NONCE_SIZE]) -> Self {
        Nonce { data }
    }
}

impl AsRef<[u8]> for Nonce {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
