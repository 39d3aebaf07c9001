//! Control byte layout and frame classification.
//!
//! ```text
//! DATA    0 f f f r a a a    f = frame number, r = retransmit, a = ack number
//! ACK     1 0 0 - n a a a    n = not ready
//! NAK     1 0 1 - n a a a
//! RST     1 1 0 0 0 0 0 0
//! RSTACK  1 1 0 0 0 0 0 1    data: version, reset reason
//! ERROR   1 1 0 0 0 0 1 0    data: reserved, error code
//! ```

use std::fmt;

use crate::error::{FrameError, Result};

/// ASH protocol version carried in RSTACK frames.
pub const ASH_VERSION: u8 = 2;

/// Smallest DATA frame data field.
pub const MIN_DATA_FIELD_LEN: usize = 3;
/// Largest DATA frame data field.
pub const MAX_DATA_FIELD_LEN: usize = 128;
/// Largest frame: control byte plus the largest data field.
pub const MAX_FRAME_LEN: usize = 1 + MAX_DATA_FIELD_LEN;

// Frame lengths count the control byte and data field, not the CRC.
pub const FRAME_LEN_RST: usize = 1;
pub const FRAME_LEN_RSTACK: usize = 3;
pub const FRAME_LEN_ERROR: usize = 3;
pub const FRAME_LEN_ACK: usize = 1;
pub const FRAME_LEN_NAK: usize = 1;
pub const FRAME_LEN_DATA_MIN: usize = 1 + MIN_DATA_FIELD_LEN;

const CONTROL_RST: u8 = 0xC0;
const CONTROL_RSTACK: u8 = 0xC1;
const CONTROL_ERROR: u8 = 0xC2;
const CONTROL_ACK: u8 = 0x80;
const CONTROL_NAK: u8 = 0xA0;
const CONTROL_DATA: u8 = 0x00;

const DFRAME_MASK: u8 = 0x80;
const SHFRAME_MASK: u8 = 0xE0;
const FRMNUM_SHIFT: u8 = 4;
const RFLAG_MASK: u8 = 0x08;
const NFLAG_MASK: u8 = 0x08;
const SEQ_MASK: u8 = 0x07;

/// A 3-bit sequence number that wraps modulo 8.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Seq(u8);

impl Seq {
    pub const ZERO: Seq = Seq(0);

    /// Build a sequence number from the low three bits of `value`.
    pub const fn new(value: u8) -> Self {
        Seq(value & SEQ_MASK)
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    /// The following sequence number.
    #[must_use]
    pub const fn next(self) -> Self {
        Seq::new(self.0.wrapping_add(1))
    }

    /// Advance by `n` positions.
    #[must_use]
    pub const fn add(self, n: u8) -> Self {
        Seq::new(self.0.wrapping_add(n))
    }

    /// Forward distance from `self` to `other`, in `0..8`.
    pub const fn distance_to(self, other: Seq) -> u8 {
        other.0.wrapping_sub(self.0) & SEQ_MASK
    }

    /// Whether `self` lies in the window `[lo, hi]`, walking forward from `lo`.
    pub const fn within(self, lo: Seq, hi: Seq) -> bool {
        lo.distance_to(self) <= lo.distance_to(hi)
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Frame type after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Data,
    Ack,
    Nak,
    Reset,
    ResetAck,
    Error,
    Invalid,
}

/// Decoded control byte with its fields split out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameHeader {
    Data {
        frame_num: Seq,
        ack_num: Seq,
        retransmit: bool,
    },
    Ack {
        ack_num: Seq,
        not_ready: bool,
    },
    Nak {
        ack_num: Seq,
        not_ready: bool,
    },
    Reset,
    ResetAck,
    Error,
}

impl FrameHeader {
    /// Parse a control byte. Returns `None` for a byte matching no frame type.
    pub fn decode(control: u8) -> Option<Self> {
        match control {
            CONTROL_RST => Some(Self::Reset),
            CONTROL_RSTACK => Some(Self::ResetAck),
            CONTROL_ERROR => Some(Self::Error),
            c if c & DFRAME_MASK == CONTROL_DATA => Some(Self::Data {
                frame_num: Seq::new(c >> FRMNUM_SHIFT),
                ack_num: Seq::new(c),
                retransmit: c & RFLAG_MASK != 0,
            }),
            c if c & SHFRAME_MASK == CONTROL_ACK => Some(Self::Ack {
                ack_num: Seq::new(c),
                not_ready: c & NFLAG_MASK != 0,
            }),
            c if c & SHFRAME_MASK == CONTROL_NAK => Some(Self::Nak {
                ack_num: Seq::new(c),
                not_ready: c & NFLAG_MASK != 0,
            }),
            _ => None,
        }
    }

    /// Encode into a control byte.
    pub fn encode(self) -> u8 {
        match self {
            Self::Data {
                frame_num,
                ack_num,
                retransmit,
            } => {
                let rflag = if retransmit { RFLAG_MASK } else { 0 };
                CONTROL_DATA | (frame_num.value() << FRMNUM_SHIFT) | rflag | ack_num.value()
            }
            Self::Ack { ack_num, not_ready } => CONTROL_ACK | nflag(not_ready) | ack_num.value(),
            Self::Nak { ack_num, not_ready } => CONTROL_NAK | nflag(not_ready) | ack_num.value(),
            Self::Reset => CONTROL_RST,
            Self::ResetAck => CONTROL_RSTACK,
            Self::Error => CONTROL_ERROR,
        }
    }

    pub fn kind(self) -> FrameKind {
        match self {
            Self::Data { .. } => FrameKind::Data,
            Self::Ack { .. } => FrameKind::Ack,
            Self::Nak { .. } => FrameKind::Nak,
            Self::Reset => FrameKind::Reset,
            Self::ResetAck => FrameKind::ResetAck,
            Self::Error => FrameKind::Error,
        }
    }

    /// The acknowledgement number carried by DATA, ACK and NAK frames.
    pub fn ack_num(self) -> Option<Seq> {
        match self {
            Self::Data { ack_num, .. } | Self::Ack { ack_num, .. } | Self::Nak { ack_num, .. } => {
                Some(ack_num)
            }
            _ => None,
        }
    }

    /// Whether a control byte is a DATA control, regardless of length.
    pub fn is_data_control(control: u8) -> bool {
        control & DFRAME_MASK == CONTROL_DATA
    }
}

fn nflag(not_ready: bool) -> u8 {
    if not_ready {
        NFLAG_MASK
    } else {
        0
    }
}

/// Determine a frame's type from its control byte, then validate its length.
///
/// `len` counts the control byte and data field.
pub fn classify(control: u8, len: usize) -> Result<FrameKind> {
    let Some(header) = FrameHeader::decode(control) else {
        return Err(FrameError::BadControl(control));
    };
    let kind = header.kind();
    let length_ok = match kind {
        FrameKind::Data => len >= FRAME_LEN_DATA_MIN,
        FrameKind::Ack => len == FRAME_LEN_ACK,
        FrameKind::Nak => len == FRAME_LEN_NAK,
        FrameKind::Reset => len == FRAME_LEN_RST,
        FrameKind::ResetAck => len == FRAME_LEN_RSTACK,
        FrameKind::Error => len == FRAME_LEN_ERROR,
        FrameKind::Invalid => false,
    };
    if length_ok {
        Ok(kind)
    } else {
        Err(FrameError::BadLength { control, len })
    }
}
