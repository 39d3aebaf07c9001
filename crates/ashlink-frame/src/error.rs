/// Errors detected while decoding or classifying a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The CRC over control and data did not match the received CRC.
    #[error("CRC mismatch")]
    BadCrc,

    /// The UART flagged a framing or overrun error inside the frame.
    #[error("serial communication error")]
    CommError,

    /// The frame ended before a control byte and CRC were received.
    #[error("frame too short ({len} bytes)")]
    TooShort { len: usize },

    /// The frame grew past the maximum frame length.
    #[error("frame too long (max {max} bytes)")]
    TooLong { max: usize },

    /// The control byte matches no known frame type.
    #[error("illegal control byte 0x{0:02X}")]
    BadControl(u8),

    /// The frame length does not fit its control byte.
    #[error("illegal length {len} for control byte 0x{control:02X}")]
    BadLength { control: u8, len: usize },

    /// The sender aborted the frame with a cancel byte.
    #[error("frame cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, FrameError>;
