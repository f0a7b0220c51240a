use crate::constants::{FRAME_OVERHEAD, HEADER_BYTE, MAX_PARAMS};
use crate::error::AxError;
use crate::transport::Transport;
use bytes::{BufMut, Bytes, BytesMut};
use num_enum::{FromPrimitive, IntoPrimitive};

/// Instruction opcodes understood by the servos and the controller board.
///
/// `SyncRead` is a controller extension: the bridge firmware dispatches on
/// command 8 when a frame is addressed to [`CONTROLLER_ID`](crate::constants::CONTROLLER_ID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum Instruction {
    Ping = 0x01,
    ReadData = 0x02,
    WriteData = 0x03,
    SyncRead = 0x08,
    SyncWrite = 0x83,

    #[num_enum(catch_all)]
    Unknown(u8),
}

/// One complete protocol frame, header through checksum.
///
/// On request frames `command` is an [`Instruction`] value; on status frames
/// it is the device's error field, with 0 meaning no fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: u8,
    pub length: u8,
    pub command: u8,
    pub params: Bytes,
}

impl Packet {
    /// Build a packet with the length field derived from the parameter count.
    pub fn new(id: u8, command: u8, params: impl Into<Bytes>) -> Self {
        let params = params.into();
        Self {
            id,
            length: (2 + params.len()) as u8,
            command,
            params,
        }
    }

    /// Checksum over id, length, command and parameters: the low byte of the
    /// bitwise complement of their sum.
    pub fn checksum(&self) -> u8 {
        let mut sum = self
            .id
            .wrapping_add(self.length)
            .wrapping_add(self.command);
        for b in &self.params {
            sum = sum.wrapping_add(*b);
        }
        !sum
    }

    /// Serialize into a ready-to-transmit frame.
    pub fn to_bytes(&self) -> Bytes {
        let mut frame = BytesMut::with_capacity(FRAME_OVERHEAD + self.params.len());
        frame.put_u8(HEADER_BYTE);
        frame.put_u8(HEADER_BYTE);
        frame.put_u8(self.id);
        frame.put_u8(self.length);
        frame.put_u8(self.command);
        frame.put_slice(&self.params);
        frame.put_u8(self.checksum());
        frame.freeze()
    }
}

/// Build a request frame for `instruction` addressed to `id`.
pub fn encode(id: u8, instruction: Instruction, params: &[u8]) -> Result<Bytes, AxError> {
    if params.len() > MAX_PARAMS {
        return Err(AxError::InvalidRequest(format!(
            "{} parameter bytes exceed the {} byte frame limit",
            params.len(),
            MAX_PARAMS
        )));
    }
    Ok(Packet::new(id, instruction.into(), params.to_vec()).to_bytes())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Header1,
    Header2,
    Id,
    Length,
    Command,
    Params,
    Checksum,
}

/// Read exactly one frame from `source` and validate its checksum.
///
/// All decode state lives in this call; nothing is shared or reused across
/// invocations, and the source is left positioned at the first byte after the
/// frame. A source that stalls mid-frame surfaces as [`AxError::Timeout`],
/// a non-0xFF header byte as [`AxError::Framing`], and a checksum mismatch as
/// [`AxError::Checksum`]. A packet that fails validation is never returned.
pub fn read_packet<S: Transport + ?Sized>(source: &mut S) -> Result<Packet, AxError> {
    let mut state = DecodeState::Header1;
    let mut id = 0u8;
    let mut length = 0u8;
    let mut param_count = 0usize;
    let mut command = 0u8;
    let mut params = BytesMut::new();

    loop {
        let b = source.read_byte()?;

        state = match state {
            DecodeState::Header1 => {
                if b != HEADER_BYTE {
                    return Err(AxError::Framing { byte: b });
                }
                DecodeState::Header2
            }
            DecodeState::Header2 => {
                if b != HEADER_BYTE {
                    return Err(AxError::Framing { byte: b });
                }
                DecodeState::Id
            }
            DecodeState::Id => {
                id = b;
                DecodeState::Length
            }
            DecodeState::Length => {
                length = b;
                // a length below 2 cannot occur in a well-formed frame; treat
                // it as zero parameters and let checksum validation reject it
                param_count = length.saturating_sub(2) as usize;
                DecodeState::Command
            }
            DecodeState::Command => {
                command = b;
                if param_count == 0 {
                    DecodeState::Checksum
                } else {
                    DecodeState::Params
                }
            }
            DecodeState::Params => {
                params.put_u8(b);
                if params.len() == param_count {
                    DecodeState::Checksum
                } else {
                    DecodeState::Params
                }
            }
            DecodeState::Checksum => {
                let packet = Packet {
                    id,
                    length,
                    command,
                    params: params.freeze(),
                };
                let expected = packet.checksum();
                if b != expected {
                    return Err(AxError::Checksum {
                        expected,
                        actual: b,
                    });
                }
                return Ok(packet);
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    #[test]
    fn encode_known_checksum() {
        // write 0x0296 to register 0x1E on servo 1
        let frame = encode(1, Instruction::WriteData, &[0x1E, 0x96, 0x02]).unwrap();
        let expected_csum = 0xFF - ((1u16 + 5 + 3 + 0x1E + 0x96 + 0x02) % 256) as u8;
        assert_eq!(frame.as_ref(), &[0xFF, 0xFF, 0x01, 0x05, 0x03, 0x1E, 0x96, 0x02, expected_csum]);
    }

    #[test]
    fn decode_zero_param_status_frame() {
        let mut source = MockTransport::new();
        source.queue_response(&Packet::new(0xFD, 0x00, Bytes::new()).to_bytes());
        let packet = read_packet(&mut source).unwrap();
        assert_eq!(packet.id, 0xFD);
        assert_eq!(packet.length, 2);
        assert_eq!(packet.command, 0x00);
        assert!(packet.params.is_empty());
    }

    #[test]
    fn framing_error_on_second_header_byte() {
        let mut source = MockTransport::new();
        source.queue_response(&[0xFF, 0x55, 0x01, 0x02, 0x00, 0xFC]);
        assert!(matches!(
            read_packet(&mut source),
            Err(AxError::Framing { byte: 0x55 })
        ));
    }

    #[test]
    fn stall_mid_frame_is_timeout() {
        let mut source = MockTransport::new();
        source.queue_response(&[0xFF, 0xFF, 0x01, 0x04]);
        assert!(matches!(read_packet(&mut source), Err(AxError::Timeout)));
    }

    #[test]
    fn undersized_length_field_fails_checksum() {
        // length 0 never matches a frame that carries a command byte
        let mut source = MockTransport::new();
        source.queue_response(&[0xFF, 0xFF, 0x01, 0x00, 0x00, 0x00]);
        assert!(matches!(read_packet(&mut source), Err(AxError::Checksum { .. })));
    }
}
