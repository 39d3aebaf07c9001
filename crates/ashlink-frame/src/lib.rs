//! ASH frame model and wire codec.
//!
//! Every frame on the wire is:
//! - a control byte identifying the frame type and carrying sequence numbers
//! - an optional data field (DATA, RSTACK and ERROR frames)
//! - a 2-byte CRC-CCITT over control and data
//! - a flag byte terminating the frame
//!
//! Reserved bytes inside a frame are escaped, so a flag byte on the wire
//! always marks a frame boundary.

pub mod codec;
pub mod control;
pub mod crc;
pub mod error;
pub mod random;
pub mod reader;

pub use codec::{
    encode_frame, DecodeStatus, Decoded, FrameDecoder, FrameEncoder, CAN, ESC, FLAG, SUB,
};
pub use control::{
    classify, FrameHeader, FrameKind, Seq, ASH_VERSION, FRAME_LEN_ACK, FRAME_LEN_DATA_MIN,
    FRAME_LEN_ERROR, FRAME_LEN_NAK, FRAME_LEN_RST, FRAME_LEN_RSTACK, MAX_DATA_FIELD_LEN,
    MAX_FRAME_LEN, MIN_DATA_FIELD_LEN,
};
pub use error::{FrameError, Result};
pub use random::randomize;
pub use reader::FrameReader;
