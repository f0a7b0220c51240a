use std::io;
use thiserror::Error;

/// The primary error type for the `axpose` library.
///
/// Every protocol failure surfaces immediately to the caller of the failing
/// operation; there is no local recovery or implicit retry below the
/// [`Driver`](crate::device::Driver) layer.
#[derive(Error, Debug)]
pub enum AxError {
    #[error("timeout waiting for a byte while a frame was pending")]
    Timeout,

    #[error("framing error: expected header byte 0xFF, got {byte:#04x}")]
    Framing { byte: u8 },

    #[error("checksum mismatch: computed {expected:#04x}, received {actual:#04x}")]
    Checksum { expected: u8, actual: u8 },

    #[error("read failed: servo {id} returned an empty response body")]
    EmptyResponse { id: u8 },

    #[error("sync read body of {remainder} bytes is not divisible by group width {group_width}")]
    MalformedLength { remainder: usize, group_width: usize },

    #[error("device reported error status {status:#04x}")]
    Device { status: u8 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("pose project error: {0}")]
    Project(String),

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("pose file error: {0}")]
    PoseFile(#[from] serde_json::Error),
}
