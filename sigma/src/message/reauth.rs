use byteorder::{BigEndian, ByteOrder};
use common_types::{read_length_prepended, Buffer, SequenceNumber, SEQUENCE_SIZE};
use json::Json;

use super::{decrypt_payload, encrypt_payload, parse_envelope};
use crate::SigmaError;

/// The state a side of the continuous loop announces with each of its
/// re-authentication messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReauthState {
    /// Keep the session alive on the active cadence.
    Continue,
    /// Keep the session alive on the slower paused cadence.
    Pause,
    /// End the session after the round in flight.
    Stop,
    /// Something went wrong; the peer should tear down.
    Error,
}

impl ReauthState {
    pub fn to_byte(self) -> u8 {
        match self {
            ReauthState::Continue => 0x00,
            ReauthState::Pause => 0x01,
            ReauthState::Stop => 0x02,
            ReauthState::Error => 0x03,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, SigmaError> {
        match byte {
            0x00 => Ok(ReauthState::Continue),
            0x01 => Ok(ReauthState::Pause),
            0x02 => Ok(ReauthState::Stop),
            0x03 => Ok(ReauthState::Error),
            other => Err(SigmaError::InvalidReauthState(other)),
        }
    }
}

/// Decoded contents of a pico re-authentication message.
#[derive(Debug)]
pub struct PicoReAuthContent {
    pub state: ReauthState,
    pub sequence: SequenceNumber,
    pub extra_data: Vec<u8>,
}

/// Decoded contents of a service re-authentication message.
#[derive(Debug)]
pub struct ServiceReAuthContent {
    pub state: ReauthState,
    pub timeout_ms: u32,
    pub sequence: SequenceNumber,
    pub extra_data: Vec<u8>,
}

/// The prover's half of a continuous round. Inner payload:
/// `state(1) ‖ sequence(32) ‖ extraData length-prepended`, encrypted
/// under the session's shared key with a fresh IV per message.
pub struct PicoReAuth;

impl PicoReAuth {
    pub fn encode(
        shared_key: &[u8],
        session_id: u32,
        state: ReauthState,
        sequence: &SequenceNumber,
        extra_data: &[u8],
    ) -> Result<Vec<u8>, SigmaError> {
        let mut inner = Buffer::new(64);
        inner.append(&[state.to_byte()]);
        inner.append(sequence.as_bytes());
        inner.append_length_prepended(extra_data);
        seal(shared_key, session_id, inner)
    }

    pub fn decode(data: &[u8], shared_key: &[u8]) -> Result<PicoReAuthContent, SigmaError> {
        let inner = open(data, shared_key)?;
        let (state, offset) = read_state(&inner)?;
        let (sequence, offset) = read_sequence(&inner, offset)?;
        let (extra_data, _) = read_length_prepended(&inner, offset)?;
        Ok(PicoReAuthContent {
            state,
            sequence,
            extra_data: extra_data.to_vec(),
        })
    }
}

/// The verifier's half of a continuous round. Inner payload:
/// `state(1) ‖ timeout(4, big-endian ms) ‖ sequence(32) ‖ extraData
/// length-prepended`; the extra-data block is always written, but peers
/// that omit it are accepted.
pub struct ServiceReAuth;

impl ServiceReAuth {
    pub fn encode(
        shared_key: &[u8],
        session_id: u32,
        state: ReauthState,
        timeout_ms: u32,
        sequence: &SequenceNumber,
        extra_data: &[u8],
    ) -> Result<Vec<u8>, SigmaError> {
        let mut timeout = [0u8; 4];
        BigEndian::write_u32(&mut timeout, timeout_ms);

        let mut inner = Buffer::new(64);
        inner.append(&[state.to_byte()]);
        inner.append(&timeout);
        inner.append(sequence.as_bytes());
        inner.append_length_prepended(extra_data);
        seal(shared_key, session_id, inner)
    }

    pub fn decode(data: &[u8], shared_key: &[u8]) -> Result<ServiceReAuthContent, SigmaError> {
        let inner = open(data, shared_key)?;
        let (state, offset) = read_state(&inner)?;
        if inner.len() < offset + 4 {
            return Err(SigmaError::Malformed("missing reauth timeout"));
        }
        let timeout_ms = BigEndian::read_u32(&inner[offset..offset + 4]);
        let (sequence, offset) = read_sequence(&inner, offset + 4)?;
        // older peers end the payload here
        let extra_data = if offset == inner.len() {
            Vec::new()
        } else {
            read_length_prepended(&inner, offset)?.0.to_vec()
        };
        Ok(ServiceReAuthContent {
            state,
            timeout_ms,
            sequence,
            extra_data,
        })
    }
}

fn seal(shared_key: &[u8], session_id: u32, inner: Buffer) -> Result<Vec<u8>, SigmaError> {
    let (iv, encrypted) = encrypt_payload(shared_key, inner.as_slice())?;
    let mut envelope = Json::new();
    envelope.set_integer("sessionId", session_id as i64);
    envelope.set_string("iv", &iv);
    envelope.set_string("encryptedData", &encrypted);
    Ok(envelope.serialize().into_bytes())
}

fn open(data: &[u8], shared_key: &[u8]) -> Result<Vec<u8>, SigmaError> {
    let envelope = parse_envelope(data)?;
    decrypt_payload(shared_key, &envelope)
}

fn read_state(inner: &[u8]) -> Result<(ReauthState, usize), SigmaError> {
    let byte = inner
        .first()
        .copied()
        .ok_or(SigmaError::Malformed("empty reauth payload"))?;
    Ok((ReauthState::from_byte(byte)?, 1))
}

fn read_sequence(inner: &[u8], offset: usize) -> Result<(SequenceNumber, usize), SigmaError> {
    let end = offset + SEQUENCE_SIZE;
    if inner.len() < end {
        return Err(SigmaError::Malformed("truncated sequence number"));
    }
    let sequence = SequenceNumber::from_bytes(&inner[offset..end])?;
    Ok((sequence, end))
}
