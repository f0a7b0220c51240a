use crate::constants::{
    BROADCAST_ID, CONTROLLER_ID, NO_ERROR, REG_GOAL_POSITION_L, REG_PRESENT_POSITION_L,
    REG_TORQUE_ENABLE,
};
use crate::error::AxError;
use crate::packet::{self, Instruction, Packet};
use crate::transport::{SerialTransport, Transport};
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, warn};

/// Value read back from a servo register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterValue {
    /// Single-byte register.
    Byte(u8),
    /// Two-byte register, already combined little-endian.
    Word(u16),
    /// Wider reads come back as the raw parameter bytes.
    Raw(Bytes),
}

/// One servo's slice of a synchronized write: the target ID and the 16-bit
/// values to store starting at the request's register address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncWriteEntry {
    pub id: u8,
    pub values: Vec<u16>,
}

/// A synchronized write: one broadcast frame updating the same register span
/// on several servos at once. Each 16-bit value is transmitted low byte
/// first; `width` is the byte count written per servo and every entry must
/// carry exactly that many.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncWriteRequest {
    pub start_addr: u8,
    pub width: u8,
    pub entries: Vec<SyncWriteEntry>,
}

/// Decoded response to a synchronized read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReadResult {
    /// Controller-local milliseconds at sampling time.
    pub timestamp_ms: u32,
    /// One present-position value per requested servo, in request order.
    pub positions: Vec<u16>,
}

/// Opt-in retry policy for request/response exchanges.
///
/// The default of one attempt preserves fail-fast behavior. Retries rewrite
/// the request frame; the operations this driver issues write absolute
/// register values, so a repeated request is safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 1 }
    }
}

/// Driver for a daisy-chained set of servos behind one serial port.
///
/// Strictly synchronous: every operation writes one request frame and, unless
/// the target is the broadcast address, blocks decoding exactly one response
/// frame. The driver owns its transport for its whole lifetime, and separate
/// drivers over separate transports are fully independent.
pub struct Driver<T: Transport> {
    transport: T,
    retry: RetryPolicy,
}

impl Driver<SerialTransport> {
    /// Open a serial port and drive the chain behind it.
    pub fn open(path: &str, baud: u32, read_timeout: Duration) -> Result<Self, AxError> {
        Ok(Self::new(SerialTransport::open(path, baud, read_timeout)?))
    }
}

impl<T: Transport> Driver<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Write one request frame and decode one response frame, retrying the
    /// whole exchange per the configured policy.
    fn exchange(&mut self, frame: &Bytes) -> Result<Packet, AxError> {
        let attempts = self.retry.attempts.max(1);
        let mut last = None;
        for attempt in 1..=attempts {
            if attempt > 1 {
                debug!(attempt, "retrying exchange");
            }
            self.transport.write_bytes(frame)?;
            match packet::read_packet(&mut self.transport) {
                Ok(response) => return Ok(response),
                Err(e) => last = Some(e),
            }
        }
        // attempts >= 1, so at least one error was recorded
        Err(last.unwrap_or(AxError::Timeout))
    }

    fn check_status(&self, command: u8) -> Result<(), AxError> {
        if command == NO_ERROR {
            Ok(())
        } else {
            Err(AxError::Device { status: command })
        }
    }

    /// Check that a servo is alive and fault-free.
    pub fn ping(&mut self, id: u8) -> Result<(), AxError> {
        let frame = packet::encode(id, Instruction::Ping, &[])?;
        let response = self.exchange(&frame)?;
        self.check_status(response.command)
    }

    /// Read `count` bytes starting at register `start`.
    ///
    /// One- and two-byte reads come back combined; anything wider is returned
    /// raw. A response with no parameter bytes means the servo rejected the
    /// read and surfaces as [`AxError::EmptyResponse`].
    pub fn read_register(&mut self, id: u8, start: u8, count: u8) -> Result<RegisterValue, AxError> {
        let frame = packet::encode(id, Instruction::ReadData, &[start, count])?;
        let response = self.exchange(&frame)?;
        match response.params.len() {
            0 => Err(AxError::EmptyResponse { id }),
            1 => Ok(RegisterValue::Byte(response.params[0])),
            2 => Ok(RegisterValue::Word(u16::from_le_bytes([
                response.params[0],
                response.params[1],
            ]))),
            _ => Ok(RegisterValue::Raw(response.params)),
        }
    }

    /// Write `values` starting at register `start` and confirm the status
    /// frame reports no fault.
    pub fn write_register(&mut self, id: u8, start: u8, values: &[u8]) -> Result<(), AxError> {
        self.transport.flush_output()?;
        let mut params = Vec::with_capacity(1 + values.len());
        params.push(start);
        params.extend_from_slice(values);
        let frame = packet::encode(id, Instruction::WriteData, &params)?;
        let response = self.exchange(&frame)?;
        self.check_status(response.command)
    }

    /// Update the same register span on several servos with one broadcast
    /// frame. Broadcast frames get no response, so success here means only
    /// that the frame was written.
    pub fn sync_write(&mut self, request: &SyncWriteRequest) -> Result<(), AxError> {
        let mut params = Vec::with_capacity(2 + request.entries.len() * (1 + request.width as usize));
        params.push(request.start_addr);
        params.push(request.width);
        for entry in &request.entries {
            let byte_count = entry.values.len() * 2;
            if byte_count != request.width as usize {
                return Err(AxError::InvalidRequest(format!(
                    "servo {} carries {} bytes, expected {}",
                    entry.id, byte_count, request.width
                )));
            }
            params.push(entry.id);
            for value in &entry.values {
                params.extend_from_slice(&value.to_le_bytes());
            }
        }
        let frame = packet::encode(BROADCAST_ID, Instruction::SyncWrite, &params)?;
        self.transport.write_bytes(&frame)?;
        Ok(())
    }

    /// Sample the present position of several servos in one exchange with the
    /// controller board.
    ///
    /// `group_width` is the byte count the controller firmware emits per
    /// servo after the 4-byte timestamp; deployed firmware variants disagree
    /// on it (2 or 3), so it is the caller's to supply. The position sits in
    /// the low two bytes of each group.
    pub fn sync_read(&mut self, ids: &[u8], group_width: usize) -> Result<SyncReadResult, AxError> {
        if group_width < 2 {
            return Err(AxError::InvalidRequest(format!(
                "group width {group_width} cannot hold a 2-byte position"
            )));
        }
        let frame = packet::encode(CONTROLLER_ID, Instruction::SyncRead, ids)?;
        let response = self.exchange(&frame)?;
        if response.command != NO_ERROR {
            return Err(AxError::Device {
                status: response.command,
            });
        }

        let params = &response.params;
        if params.len() < 4 {
            return Err(AxError::MalformedLength {
                remainder: params.len(),
                group_width,
            });
        }
        let timestamp_ms = u32::from_le_bytes([params[0], params[1], params[2], params[3]]);

        let body = &params[4..];
        if body.len() % group_width != 0 {
            return Err(AxError::MalformedLength {
                remainder: body.len(),
                group_width,
            });
        }
        let positions: Vec<u16> = body
            .chunks_exact(group_width)
            .map(|group| u16::from_le_bytes([group[0], group[1]]))
            .collect();
        if positions.len() != ids.len() {
            warn!(
                requested = ids.len(),
                received = positions.len(),
                "sync read returned a different servo count than requested"
            );
        }
        Ok(SyncReadResult {
            timestamp_ms,
            positions,
        })
    }

    pub fn torque_on(&mut self, id: u8) -> Result<(), AxError> {
        self.write_register(id, REG_TORQUE_ENABLE, &[1])
    }

    pub fn torque_off(&mut self, id: u8) -> Result<(), AxError> {
        self.write_register(id, REG_TORQUE_ENABLE, &[0])
    }

    /// Command a servo to move to `position`, transmitted low byte first.
    pub fn set_position(&mut self, id: u8, position: u16) -> Result<(), AxError> {
        self.write_register(id, REG_GOAL_POSITION_L, &position.to_le_bytes())
    }

    /// Read a servo's present position.
    pub fn read_position(&mut self, id: u8) -> Result<u16, AxError> {
        match self.read_register(id, REG_PRESENT_POSITION_L, 2)? {
            RegisterValue::Word(position) => Ok(position),
            other => Err(AxError::UnexpectedResponse(format!(
                "present position read returned {other:?} instead of a 2-byte value"
            ))),
        }
    }
}
