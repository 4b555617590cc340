use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use super::{Channel, ChannelError, DEFAULT_TIMEOUT};

/// An in-memory message channel. [`LoopChannel::pair`] yields two
/// cross-wired ends, each usable from its own thread; what one end
/// writes the other reads. Backs the protocol tests and any in-process
/// prover/verifier pair.
pub struct LoopChannel {
    sender: Sender<Vec<u8>>,
    receiver: Receiver<Vec<u8>>,
    url: String,
    timeout: Duration,
    open: bool,
}

impl LoopChannel {
    pub fn pair() -> (LoopChannel, LoopChannel) {
        let (to_b, from_a) = unbounded();
        let (to_a, from_b) = unbounded();
        let a = LoopChannel {
            sender: to_b,
            receiver: from_b,
            url: "loop://a".to_owned(),
            timeout: DEFAULT_TIMEOUT,
            open: true,
        };
        let b = LoopChannel {
            sender: to_a,
            receiver: from_a,
            url: "loop://b".to_owned(),
            timeout: DEFAULT_TIMEOUT,
            open: true,
        };
        (a, b)
    }
}

impl Channel for LoopChannel {
    fn open(&mut self) -> Result<(), ChannelError> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        self.open = false;
        Ok(())
    }

    fn read(&mut self) -> Result<Vec<u8>, ChannelError> {
        if !self.open {
            return Err(ChannelError::Closed);
        }
        match self.receiver.recv_timeout(self.timeout) {
            Ok(message) => Ok(message),
            Err(RecvTimeoutError::Timeout) => Err(ChannelError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(ChannelError::Closed),
        }
    }

    fn write(&mut self, message: &[u8]) -> Result<(), ChannelError> {
        if !self.open {
            return Err(ChannelError::Closed);
        }
        self.sender
            .send(message.to_vec())
            .map_err(|_| ChannelError::Closed)
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
