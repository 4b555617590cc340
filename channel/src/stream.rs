use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};

use super::{Channel, ChannelError, DEFAULT_TIMEOUT, MAX_INBOUND_FRAME};

// LENGTH_HEADER_SIZE is the number of bytes used to prefix encode the
// length of a message on a byte stream.
const LENGTH_HEADER_SIZE: usize = 4;

/// A channel over any byte stream, framing each message with a 4-byte
/// big-endian length prefix. Bluetooth sockets and test pipes plug in
/// here; the frame bound defaults to the Bluetooth read limit.
///
/// Read timeouts are the stream's business (socket types carry their
/// own); a stream signalling `WouldBlock` or `TimedOut` surfaces as
/// [`ChannelError::Timeout`].
pub struct StreamChannel<S> {
    stream: S,
    url: String,
    timeout: Duration,
    max_frame: usize,
    open: bool,
}

impl<S: Read + Write> StreamChannel<S> {
    pub fn new(stream: S, url: &str) -> Self {
        StreamChannel {
            stream,
            url: url.to_owned(),
            timeout: DEFAULT_TIMEOUT,
            max_frame: MAX_INBOUND_FRAME,
            open: false,
        }
    }

    /// Replaces the inbound frame bound; writes are held to it too.
    pub fn set_max_frame(&mut self, max_frame: usize) {
        self.max_frame = max_frame;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The wrapped stream, for transports that need to push the timeout
    /// down to a socket.
    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    fn check_open(&self) -> Result<(), ChannelError> {
        if self.open {
            Ok(())
        } else {
            Err(ChannelError::Closed)
        }
    }
}

impl<S: Read + Write> Channel for StreamChannel<S> {
    fn open(&mut self) -> Result<(), ChannelError> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        self.open = false;
        Ok(())
    }

    fn read(&mut self) -> Result<Vec<u8>, ChannelError> {
        self.check_open()?;

        let mut header = [0u8; LENGTH_HEADER_SIZE];
        read_exact(&mut self.stream, &mut header)?;
        let length = BigEndian::read_u32(&header) as usize;
        if length > self.max_frame {
            return Err(ChannelError::FrameTooLong {
                length,
                limit: self.max_frame,
            });
        }

        let mut payload = vec![0u8; length];
        read_exact(&mut self.stream, &mut payload)?;
        log::trace!("read {} byte frame from {}", length, self.url);
        Ok(payload)
    }

    fn write(&mut self, message: &[u8]) -> Result<(), ChannelError> {
        self.check_open()?;

        if message.len() > self.max_frame {
            return Err(ChannelError::FrameTooLong {
                length: message.len(),
                limit: self.max_frame,
            });
        }
        let mut header = [0u8; LENGTH_HEADER_SIZE];
        BigEndian::write_u32(&mut header, message.len() as u32);
        self.stream.write_all(&header)?;
        self.stream.write_all(message)?;
        self.stream.flush()?;
        log::trace!("wrote {} byte frame to {}", message.len(), self.url);
        Ok(())
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn set_url(&mut self, url: &str) {
        self.url = url.to_owned();
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }
}

fn read_exact<S: Read>(stream: &mut S, buffer: &mut [u8]) -> Result<(), ChannelError> {
    stream.read_exact(buffer).map_err(|error| match error.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => ChannelError::Timeout,
        _ => ChannelError::Io(error),
    })
}
