#![forbid(unsafe_code)]

//! The connection-oriented, message-oriented virtual channel the protocol
//! runs over, together with a framed implementation for byte streams, an
//! in-memory loopback pair for tests, and the address formats used to
//! name concrete transports.
//!
//! A channel carries whole logical messages. On byte streams each message
//! is framed as a 4-byte big-endian length followed by that many bytes of
//! payload; message-oriented transports carry the payload as-is.

use std::time::Duration;

mod loopback;
mod stream;
mod url;

pub use self::loopback::LoopChannel;
pub use self::stream::StreamChannel;
pub use self::url::{parse_bluetooth_url, parse_rendezvous_url, BluetoothAddress, RendezvousAddress};

/// MAX_INBOUND_FRAME is the default bound on the length prefix accepted
/// when reading a frame; transports with a tighter server-side limit set
/// their own.
pub const MAX_INBOUND_FRAME: usize = 5120;

/// DEFAULT_TIMEOUT is how long a read waits for a message before
/// reporting [`ChannelError::Timeout`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel is closed")]
    Closed,
    #[error("read timed out")]
    Timeout,
    #[error("frame of {length} bytes exceeds the {limit} byte limit")]
    FrameTooLong { length: usize, limit: usize },
    #[error("malformed channel url {0:?}")]
    InvalidUrl(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// The capability set a concrete transport provides. The protocol layers
/// above never inspect the implementation; they open, exchange whole
/// messages, and close. A channel outlives any state machine started on
/// it.
pub trait Channel {
    /// Makes the channel ready for reads and writes.
    fn open(&mut self) -> Result<(), ChannelError>;

    /// Tears the channel down; further reads and writes fail.
    fn close(&mut self) -> Result<(), ChannelError>;

    /// Reads one whole logical message, waiting up to the configured
    /// timeout. A timeout is reported as [`ChannelError::Timeout`] and
    /// leaves the channel usable.
    fn read(&mut self) -> Result<Vec<u8>, ChannelError>;

    /// Writes one logical message atomically.
    fn write(&mut self, message: &[u8]) -> Result<(), ChannelError>;

    /// The address this channel is reachable at, in the transport's url
    /// format.
    fn url(&self) -> &str;

    fn set_url(&mut self, url: &str);

    /// Replaces the read timeout.
    fn set_timeout(&mut self, timeout: Duration);
}
