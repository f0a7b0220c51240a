use crate::error::AxError;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::info;

/// A byte-oriented duplex channel with a per-byte read timeout.
///
/// No protocol knowledge lives here; the codec and driver are written against
/// this trait so they can be exercised over a scripted channel as easily as
/// over a real port.
pub trait Transport {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), AxError>;

    /// Block for the next byte, up to the configured timeout.
    ///
    /// A channel that yields nothing within the window returns
    /// [`AxError::Timeout`]; there is no end-of-stream notion on a serial
    /// line.
    fn read_byte(&mut self) -> Result<u8, AxError>;

    fn flush_output(&mut self) -> Result<(), AxError>;
}

/// Transport over a real serial port.
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    /// Open `path` at `baud` with the given per-byte read timeout.
    pub fn open(path: &str, baud: u32, read_timeout: Duration) -> Result<Self, AxError> {
        let port = serialport::new(path, baud).timeout(read_timeout).open()?;
        info!(path, baud, ?read_timeout, "serial port open");
        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), AxError> {
        self.port.write_all(bytes)?;
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, AxError> {
        let mut buf = [0u8; 1];
        loop {
            match self.port.read(&mut buf) {
                Ok(1) => return Ok(buf[0]),
                // some platforms report an expired timeout as a zero-byte read
                Ok(_) => return Err(AxError::Timeout),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return Err(AxError::Timeout),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn flush_output(&mut self) -> Result<(), AxError> {
        self.port.flush()?;
        Ok(())
    }
}

/// Scripted in-memory transport for exercising the codec and driver without
/// hardware. Reads drain from `rx`; an empty `rx` behaves like a stalled line
/// and reports a timeout.
#[derive(Debug, Default)]
pub struct MockTransport {
    rx: VecDeque<u8>,
    /// Everything written through the transport, in order.
    pub tx: Vec<u8>,
    /// Number of output-flush requests observed.
    pub flushes: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes the next reads will return.
    pub fn queue_response(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    pub fn unread_len(&self) -> usize {
        self.rx.len()
    }
}

impl Transport for MockTransport {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), AxError> {
        self.tx.extend_from_slice(bytes);
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, AxError> {
        self.rx.pop_front().ok_or(AxError::Timeout)
    }

    fn flush_output(&mut self) -> Result<(), AxError> {
        self.flushes += 1;
        Ok(())
    }
}
