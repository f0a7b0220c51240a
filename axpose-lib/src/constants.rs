// Protocol constants for the AX-12 half-duplex servo bus

use std::time::Duration;

/// Frame header byte, transmitted twice at the start of every frame.
pub const HEADER_BYTE: u8 = 0xFF;

/// Broadcast address: every servo on the chain acts, none responds.
pub const BROADCAST_ID: u8 = 0xFE;

/// Address of the controller board bridging USB to the servo bus.
/// Synchronized reads are sent here rather than to an individual servo.
pub const CONTROLLER_ID: u8 = 0xFD;

/// Highest ID assignable to a single servo.
pub const MAX_DEVICE_ID: u8 = 0xFC;

/// Status packet command value meaning the device reported no fault.
pub const NO_ERROR: u8 = 0x00;

/// Control table: torque enable flag (1 byte).
pub const REG_TORQUE_ENABLE: u8 = 0x18;

/// Control table: goal position, low byte of a 2-byte field.
pub const REG_GOAL_POSITION_L: u8 = 0x1E;

/// Control table: present position, low byte of a 2-byte field.
pub const REG_PRESENT_POSITION_L: u8 = 0x24;

/// Bytes in a frame outside the parameter block
/// (two header bytes, id, length, command, checksum).
pub const FRAME_OVERHEAD: usize = 6;

/// Maximum parameter bytes a single frame can carry; the length field
/// is `2 + parameter count` and must fit in one byte.
pub const MAX_PARAMS: usize = 0xFF - 2;

/// Default per-byte read timeout on the serial line.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Default baud rate of the controller's USB-serial link.
pub const DEFAULT_BAUD: u32 = 115_200;
