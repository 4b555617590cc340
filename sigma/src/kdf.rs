use common_types::Nonce;

// each block of the expansion is one HMAC-SHA-256 output
const BLOCK_SIZE: usize = 32;

/// The SIGMA key expansion. Both sides feed in the ECDH shared secret and
/// the two session nonces and pull the session keys out of the resulting
/// bit stream in an agreed order; the streams are byte-equal on both ends.
///
/// The derivation key is `K = HMAC-SHA-256(key = Nₚ ‖ Nₛ, msg = S)`, and
/// the stream is the concatenation of blocks
/// `Bₖ = HMAC-SHA-256(K, Bₖ₋₁ ‖ [k] ‖ Nₚ ‖ Nₛ)` for k = 1, 2, …, where
/// `[k]` is a single octet and `B₀` is omitted.
pub struct KeyDerivation {
    key: [u8; BLOCK_SIZE],
    nonces: Vec<u8>,
    block: [u8; BLOCK_SIZE],
    counter: u8,
    offset: usize,
}

impl KeyDerivation {
    pub fn new(shared_secret: &[u8], pico_nonce: &Nonce, service_nonce: &Nonce) -> Self {
        let mut nonces = Vec::with_capacity(2 * common_types::NONCE_SIZE);
        nonces.extend_from_slice(pico_nonce.as_bytes());
        nonces.extend_from_slice(service_nonce.as_bytes());
        let key = crypto::generate_mac(&nonces, shared_secret);

        KeyDerivation {
            key,
            nonces,
            block: [0u8; BLOCK_SIZE],
            counter: 0,
            // forces the first extraction to produce B₁
            offset: BLOCK_SIZE,
        }
    }

    fn advance(&mut self) {
        let mut input = Vec::with_capacity(BLOCK_SIZE + 1 + self.nonces.len());
        if self.counter > 0 {
            input.extend_from_slice(&self.block);
        }
        self.counter = self.counter.wrapping_add(1);
        input.push(self.counter);
        input.extend_from_slice(&self.nonces);

        self.block = crypto::generate_mac(&self.key, &input);
        self.offset = 0;
    }

    /// The next `bits` bits of the stream, rounded up to whole bytes.
    pub fn next_bits(&mut self, bits: usize) -> Vec<u8> {
        let mut remaining = (bits + 7) / 8;
        let mut out = Vec::with_capacity(remaining);
        while remaining > 0 {
            if self.offset == BLOCK_SIZE {
                self.advance();
            }
            let take = remaining.min(BLOCK_SIZE - self.offset);
            out.extend_from_slice(&self.block[self.offset..self.offset + take]);
            self.offset += take;
            remaining -= take;
        }
        out
    }

    pub fn next_key_256(&mut self) -> [u8; 32] {
        let mut key = [0u8; 32];
        key.copy_from_slice(&self.next_bits(256));
        key
    }

    pub fn next_key_128(&mut self) -> [u8; 16] {
        let mut key = [0u8; 16];
        key.copy_from_slice(&self.next_bits(128));
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use hex_literal::hex;

    fn fixture() -> KeyDerivation {
        let shared_secret = hex!("2302384070234908230448203948027008");
        let pico_nonce = Nonce::from(hex!("0102030405060708"));
        let service_nonce = Nonce::from(hex!("0704090203070506"));
        KeyDerivation::new(&shared_secret, &pico_nonce, &service_nonce)
    }

    #[test]
    fn expansion_matches_the_reference_stream() {
        let mut kdf = fixture();
        let expected = [
            (128, "7iU6mLgArgvtO9HW0lvk/g=="),
            (256, "L0VyA6JS5ZMggVMvJB22s61K+9INGk3OqK0eyJLMnSs="),
            (128, "ynUis+NzmrGp5yC3nX0Gjw=="),
            (256, "J1mluN+sD9qrhdQ83vd/o7BKQvsq5l80t7CuTcs6A0A="),
            (128, "7HK9ZbFCzAiVXUnlzOGDVA=="),
        ];
        for (bits, encoded) in expected {
            assert_eq!(BASE64.encode(kdf.next_bits(bits)), encoded);
        }
    }

    #[test]
    fn both_sides_expand_identically() {
        let mut left = fixture();
        let mut right = fixture();
        for bits in [256, 128, 256, 128, 128] {
            assert_eq!(left.next_bits(bits), right.next_bits(bits));
        }
    }

    #[test]
    fn bit_counts_round_up_to_bytes() {
        let mut kdf = fixture();
        assert_eq!(kdf.next_bits(1).len(), 1);
        assert_eq!(kdf.next_bits(9).len(), 2);
        assert_eq!(kdf.next_bits(0).len(), 0);
    }

    #[test]
    fn extraction_is_a_single_contiguous_stream() {
        // pulling 5 × 128 bits in one go or in pieces yields the same bytes
        let mut whole = fixture();
        let stream = whole.next_bits(5 * 128);

        let mut pieces = fixture();
        let mut collected = Vec::new();
        for bits in [128, 128, 128, 128, 128] {
            collected.extend_from_slice(&pieces.next_bits(bits));
        }
        assert_eq!(collected, stream);
    }
}
