//! Request/response correlation over a line oriented byte stream.
//!
//! The [`Channel`] owns the transport. Each call to [`Channel::send`] writes one
//! command line, then reads lines until one carries the tag the request is
//! answered with, or the deadline passes. Since `send` borrows the channel
//! mutably, a second transaction can't be started before the first resolves.

use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use snafu::{OptionExt, ResultExt, Snafu};

use crate::buffer::Buffer;
use crate::message::{RequestMessage, ResponseMessage, ResponseTag};

/// Default time to wait for the answer to a request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

/// Back-off between reads that returned no data.
const IDLE_WAIT: Duration = Duration::from_millis(1);

/// Error type for channel transactions
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// Reading from or writing to the transport failed.
    #[snafu(display("Transport error"))]
    Io { source: std::io::Error },
    /// No line with the expected tag arrived before the deadline.
    #[snafu(display("No '{tag}' response within {timeout:?}"))]
    Timeout { tag: ResponseTag, timeout: Duration },
    /// The request is never answered by the adapter, use [`Channel::write`].
    #[snafu(display("Command {command} has no response"))]
    NoResponse { command: String },
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Typed transaction channel over a `Read + Write` transport.
pub struct Channel<IO> {
    io: IO,
    buffer: Buffer,
    timeout: Duration,
}

impl<IO> Channel<IO>
where
    IO: Read + Write,
{
    pub fn new(io: IO) -> Self {
        Self::with_timeout(io, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(io: IO, timeout: Duration) -> Self {
        Self {
            io,
            buffer: Buffer::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Send `request` and wait for its answer using the default timeout.
    pub fn send(&mut self, request: &RequestMessage) -> Result<ResponseMessage, Error> {
        self.send_timeout(request, self.timeout)
    }

    /// Send `request` and wait at most `timeout` for the line answering it.
    ///
    /// Lines with other tags that arrive in the meantime are logged and
    /// dropped.
    pub fn send_timeout(
        &mut self,
        request: &RequestMessage,
        timeout: Duration,
    ) -> Result<ResponseMessage, Error> {
        let tag = request.expected_tag().with_context(|| NoResponseSnafu {
            command: request.to_string(),
        })?;
        self.write(request)?;

        let deadline = Instant::now() + timeout;
        while let Some(response) = self.next_response(deadline)? {
            if response.tag() == tag {
                debug!("{} -> {:?}", request, response);
                return Ok(response);
            }
            warn!("Dropping {:?} while waiting for '{}'", response, tag);
        }
        debug!("{} timed out after {:?}", request, timeout);
        TimeoutSnafu { tag, timeout }.fail()
    }

    /// Write `request` without waiting for an answer.
    ///
    /// Complete lines still sitting in the input buffer belong to earlier
    /// transactions and are discarded first.
    pub fn write(&mut self, request: &RequestMessage) -> Result<(), Error> {
        for line in self.buffer.discard_lines() {
            debug!("Discarding stale line {:?}", line);
        }
        trace!(">> {}", request);
        self.io
            .write_all(request.to_line().as_bytes())
            .context(IoSnafu)?;
        self.io.flush().context(IoSnafu)
    }

    /// Wait at most `timeout` for the next decodable line, whatever its tag.
    pub fn receive(&mut self, timeout: Duration) -> Result<Option<ResponseMessage>, Error> {
        self.next_response(Instant::now() + timeout)
    }

    pub fn get_mut(&mut self) -> &mut IO {
        &mut self.io
    }

    pub fn into_inner(self) -> IO {
        self.io
    }

    fn next_response(&mut self, deadline: Instant) -> Result<Option<ResponseMessage>, Error> {
        loop {
            while let Some(line) = self.buffer.take_line() {
                if line.is_empty() {
                    continue;
                }
                trace!("<< {}", line);
                match line.parse::<ResponseMessage>() {
                    Ok(response) => return Ok(Some(response)),
                    Err(err) => warn!("Skipping line: {}", err),
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            if !self.fill()? {
                thread::sleep(IDLE_WAIT);
            }
        }
    }

    /// Read whatever the transport has. Returns false if there was no data.
    fn fill(&mut self) -> Result<bool, Error> {
        let mut data = [0; 64];
        match self.io.read(&mut data) {
            Ok(0) => Ok(false),
            Ok(len) => {
                self.buffer.write(&data[..len]);
                Ok(true)
            }
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(false)
            }
            Err(err) => Err(err).context(IoSnafu),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Answer;
    use std::io::Cursor;

    /// Transport that replays `rx` and collects everything written.
    struct Replay {
        rx: Cursor<Vec<u8>>,
        tx: Vec<u8>,
    }

    impl Replay {
        fn new(rx: &[u8]) -> Self {
            Self {
                rx: Cursor::new(rx.to_vec()),
                tx: Vec::new(),
            }
        }
    }

    impl Read for Replay {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.rx.read(buf)
        }
    }

    impl Write for Replay {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.tx.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_send_matches_tag() {
        let mut channel = Channel::new(Replay::new(b"x,33,M\r\nm,ACK\r\n"));
        let response = channel
            .send(&RequestMessage::SetGenericMaster { enabled: true })
            .unwrap();
        assert_eq!(response, ResponseMessage::GenericMaster { success: true });
        assert_eq!(channel.into_inner().tx, b"M,1\n");
    }

    #[test]
    fn test_send_skips_garbage() {
        let mut channel = Channel::new(Replay::new(b"\r\nq,1\r\np,ZZ\r\np,0A0B\r\n"));
        let response = channel
            .send(&RequestMessage::CommandGroup {
                command: 0x33,
                data: vec![],
            })
            .unwrap();
        assert_eq!(
            response,
            ResponseMessage::CommandGroup(Answer::Data(vec![0x0A, 0x0B]))
        );
    }

    #[test]
    fn test_timeout() {
        let mut channel = Channel::with_timeout(Replay::new(b"p,ACK"), Duration::from_millis(20));
        let started = Instant::now();
        let err = channel.send(&RequestMessage::SoftwareVersion).unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_no_response_requests() {
        let mut channel = Channel::new(Replay::new(b""));
        assert!(matches!(
            channel.send(&RequestMessage::BusReset),
            Err(Error::NoResponse { .. })
        ));
        channel.write(&RequestMessage::BusReset).unwrap();
        assert_eq!(channel.into_inner().tx, b"R,RESET\n");
    }

    #[test]
    fn test_receive() {
        let mut channel = Channel::new(Replay::new(b"x,ACK\r\nx,30,1\r\n"));
        let timeout = Duration::from_millis(10);
        assert!(channel.receive(timeout).unwrap().is_some());
        assert!(channel.receive(timeout).unwrap().is_some());
        assert_eq!(channel.receive(timeout).unwrap(), None);
    }
}
