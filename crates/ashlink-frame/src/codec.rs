use bytes::{BufMut, BytesMut};
use tracing::trace;

use crate::control::MAX_FRAME_LEN;
use crate::crc::{crc_ccitt_update, CRC_INIT};
use crate::error::FrameError;

/// Flag byte: terminates every frame.
pub const FLAG: u8 = 0x7E;
/// Escape byte: the next byte is XORed with [`ESC_XOR`].
pub const ESC: u8 = 0x7D;
/// Substitute byte: inserted by the UART on a framing or overrun error.
pub const SUB: u8 = 0x18;
/// Cancel byte: aborts the frame in progress.
pub const CAN: u8 = 0x1A;

const XON: u8 = 0x11;
const XOFF: u8 = 0x13;
const ESC_XOR: u8 = 0x20;
const CRC_LEN: usize = 2;

/// Whether `byte` must be escaped inside a frame.
pub fn is_reserved(byte: u8) -> bool {
    matches!(byte, FLAG | ESC | XON | XOFF | SUB | CAN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncodePhase {
    Idle,
    Body,
    CrcHigh,
    CrcLow,
    Flag,
}

/// Byte-at-a-time frame encoder.
///
/// The encoder is a resumable cursor over one logical frame (control byte
/// followed by the data field). Each call to [`FrameEncoder::next_byte`]
/// yields exactly one wire byte, so a sender can stop whenever its output
/// buffer fills and pick up again on the next call.
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    phase: EncodePhase,
    len: usize,
    pos: usize,
    crc: u16,
    crc_mask: u16,
    escaped: Option<u8>,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self {
            phase: EncodePhase::Idle,
            len: 0,
            pos: 0,
            crc: CRC_INIT,
            crc_mask: 0,
            escaped: None,
        }
    }

    /// Start a frame of `len` logical bytes (control byte included).
    pub fn begin(&mut self, len: usize) {
        debug_assert!(len > 0, "a frame has at least a control byte");
        self.phase = EncodePhase::Body;
        self.len = len;
        self.pos = 0;
        self.crc = CRC_INIT;
        self.crc_mask = 0;
        self.escaped = None;
    }

    /// Send a wrong CRC for the frame begun last.
    pub fn corrupt_crc(&mut self) {
        self.crc_mask = 0x0001;
    }

    /// Index of the next logical byte the encoder will consume.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Whether no frame is being encoded.
    pub fn is_idle(&self) -> bool {
        self.phase == EncodePhase::Idle && self.escaped.is_none()
    }

    /// Abandon the current frame.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Produce the next wire byte, or `None` once the closing flag was sent.
    ///
    /// `frame_byte(i)` must return logical byte `i` of the frame; it is only
    /// called for `i < len`, once per index.
    pub fn next_byte(&mut self, frame_byte: impl FnOnce(usize) -> u8) -> Option<u8> {
        if let Some(second) = self.escaped.take() {
            return Some(second);
        }
        let raw = match self.phase {
            EncodePhase::Idle => return None,
            EncodePhase::Body => {
                let byte = frame_byte(self.pos);
                self.crc = crc_ccitt_update(self.crc, byte);
                self.pos += 1;
                if self.pos == self.len {
                    self.phase = EncodePhase::CrcHigh;
                }
                byte
            }
            EncodePhase::CrcHigh => {
                self.phase = EncodePhase::CrcLow;
                self.crc ^= self.crc_mask;
                (self.crc >> 8) as u8
            }
            EncodePhase::CrcLow => {
                self.phase = EncodePhase::Flag;
                self.crc as u8
            }
            EncodePhase::Flag => {
                self.phase = EncodePhase::Idle;
                return Some(FLAG);
            }
        };
        if is_reserved(raw) {
            self.escaped = Some(raw ^ ESC_XOR);
            Some(ESC)
        } else {
            Some(raw)
        }
    }
}

/// Encode a whole logical frame (control byte + data field) into `dst`.
pub fn encode_frame(frame: &[u8], dst: &mut BytesMut) {
    let mut encoder = FrameEncoder::new();
    encoder.begin(frame.len());
    dst.reserve(2 * (frame.len() + CRC_LEN) + 1);
    while let Some(byte) = encoder.next_byte(|i| frame[i]) {
        dst.put_u8(byte);
    }
}

/// Outcome of feeding one wire byte to the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeStatus {
    /// More bytes are needed.
    InProgress,
    /// A flag closed a frame whose CRC checked out.
    Complete,
    /// The sender cancelled the frame in progress.
    Cancelled,
    /// The frame is corrupt and has been discarded.
    Error(FrameError),
}

/// Result of [`FrameDecoder::decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// A logical frame byte released by this wire byte, if any.
    pub byte: Option<u8>,
    pub status: DecodeStatus,
}

impl Decoded {
    fn pending() -> Self {
        Self {
            byte: None,
            status: DecodeStatus::InProgress,
        }
    }

    fn status(status: DecodeStatus) -> Self {
        Self { byte: None, status }
    }
}

/// Byte-at-a-time frame decoder.
///
/// Logical bytes are released two wire bytes late, because the last two
/// bytes before a flag are the CRC and never reach the caller.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    max_len: usize,
    hold: [u8; CRC_LEN],
    held: usize,
    len: usize,
    crc: u16,
    escaped: bool,
    discarding: bool,
    comm_error: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(MAX_FRAME_LEN)
    }
}

impl FrameDecoder {
    /// Create a decoder accepting frames of up to `max_len` logical bytes.
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            hold: [0; CRC_LEN],
            held: 0,
            len: 0,
            crc: CRC_INIT,
            escaped: false,
            discarding: false,
            comm_error: false,
        }
    }

    /// Whether any byte of a frame has been received since the last boundary.
    pub fn in_frame(&self) -> bool {
        self.len + self.held > 0 || self.escaped || self.discarding || self.comm_error
    }

    /// Forget the frame in progress.
    pub fn reset(&mut self) {
        let max_len = self.max_len;
        *self = Self::new(max_len);
    }

    /// Feed one wire byte.
    pub fn decode(&mut self, wire: u8) -> Decoded {
        match wire {
            FLAG => self.end_frame(),
            CAN => {
                let was_in_frame = self.in_frame();
                self.reset();
                if was_in_frame {
                    Decoded::status(DecodeStatus::Cancelled)
                } else {
                    Decoded::pending()
                }
            }
            SUB => {
                self.comm_error = true;
                self.discarding = true;
                Decoded::pending()
            }
            XON | XOFF => Decoded::pending(),
            _ if self.discarding => Decoded::pending(),
            ESC => {
                self.escaped = true;
                Decoded::pending()
            }
            byte => {
                let byte = if std::mem::take(&mut self.escaped) {
                    byte ^ ESC_XOR
                } else {
                    byte
                };
                self.push(byte)
            }
        }
    }

    fn push(&mut self, byte: u8) -> Decoded {
        if self.len + self.held >= self.max_len + CRC_LEN {
            trace!(max = self.max_len, "frame too long, discarding until flag");
            self.reset();
            self.discarding = true;
            return Decoded::status(DecodeStatus::Error(FrameError::TooLong {
                max: self.max_len,
            }));
        }
        if self.held < CRC_LEN {
            self.hold[self.held] = byte;
            self.held += 1;
            return Decoded::pending();
        }
        let out = self.hold[0];
        self.hold[0] = self.hold[1];
        self.hold[1] = byte;
        self.crc = crc_ccitt_update(self.crc, out);
        self.len += 1;
        Decoded {
            byte: Some(out),
            status: DecodeStatus::InProgress,
        }
    }

    fn end_frame(&mut self) -> Decoded {
        let total = self.len + self.held;
        let discarding = self.discarding;
        let comm_error = self.comm_error;
        let received_crc = u16::from_be_bytes(self.hold);
        let computed_crc = self.crc;
        self.reset();

        if comm_error {
            return Decoded::status(DecodeStatus::Error(FrameError::CommError));
        }
        if discarding || total == 0 {
            return Decoded::pending();
        }
        if total < 1 + CRC_LEN {
            return Decoded::status(DecodeStatus::Error(FrameError::TooShort { len: total }));
        }
        if received_crc != computed_crc {
            return Decoded::status(DecodeStatus::Error(FrameError::BadCrc));
        }
        Decoded::status(DecodeStatus::Complete)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::crc::crc_ccitt;

    /// Decode a byte stream, returning released bytes and every non-pending status.
    fn run(decoder: &mut FrameDecoder, wire: &[u8]) -> (Vec<u8>, Vec<DecodeStatus>) {
        let mut bytes = Vec::new();
        let mut statuses = Vec::new();
        for &b in wire {
            let decoded = decoder.decode(b);
            bytes.extend(decoded.byte);
            if decoded.status != DecodeStatus::InProgress {
                statuses.push(decoded.status);
            }
        }
        (bytes, statuses)
    }

    fn encoded(frame: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_frame(frame, &mut buf);
        buf.to_vec()
    }

    #[test]
    fn rst_frame_wire_format() {
        let crc = crc_ccitt(&[0xC0]).to_be_bytes();
        let wire = encoded(&[0xC0]);
        assert_eq!(wire.last(), Some(&FLAG));
        assert_eq!(wire[0], 0xC0);
        // RST's CRC contains no reserved byte, so the frame is exactly 4 bytes.
        assert_eq!(wire, vec![0xC0, crc[0], crc[1], FLAG]);
    }

    #[test]
    fn corrupted_crc_is_rejected_by_decoder() {
        let frame = [0x00, 0x10, 0x12, 0x7C, 0x19];
        let mut encoder = FrameEncoder::new();
        encoder.begin(frame.len());
        encoder.corrupt_crc();
        let mut wire = Vec::new();
        while let Some(byte) = encoder.next_byte(|i| frame[i]) {
            wire.push(byte);
        }
        assert!(encoder.is_idle());
        assert_eq!(wire.iter().filter(|&&b| b == FLAG).count(), 1);

        let mut decoder = FrameDecoder::default();
        let (_, statuses) = run(&mut decoder, &wire);
        assert_eq!(statuses, vec![DecodeStatus::Error(FrameError::BadCrc)]);

        // The next frame is encoded with a good CRC again.
        encoder.begin(frame.len());
        let mut wire = Vec::new();
        while let Some(byte) = encoder.next_byte(|i| frame[i]) {
            wire.push(byte);
        }
        assert_eq!(wire, encoded(&frame));
    }

    #[test]
    fn reserved_bytes_are_escaped() {
        let frame = [0x25, FLAG, ESC, 0x11, 0x13, SUB, CAN, 0x00];
        let wire = encoded(&frame);
        let body = &wire[..wire.len() - 1];
        assert!(!body.contains(&FLAG));
        assert!(!body.contains(&CAN));
        assert!(!body.contains(&SUB));
        assert_eq!(&wire[1..3], &[ESC, FLAG ^ ESC_XOR]);
    }

    #[test]
    fn decode_releases_logical_bytes() {
        let frame = [0x01, 0x7E, 0x02, 0x03];
        let mut decoder = FrameDecoder::default();
        let (bytes, statuses) = run(&mut decoder, &encoded(&frame));
        assert_eq!(bytes, frame);
        assert_eq!(statuses, vec![DecodeStatus::Complete]);
        assert!(!decoder.in_frame());
    }

    #[test]
    fn bad_crc_is_reported_at_flag() {
        let mut wire = encoded(&[0x01, 0x02, 0x03, 0x04]);
        wire[2] ^= 0x01;
        let mut decoder = FrameDecoder::default();
        let (_, statuses) = run(&mut decoder, &wire);
        assert_eq!(statuses, vec![DecodeStatus::Error(FrameError::BadCrc)]);
    }

    #[test]
    fn short_frame_is_rejected() {
        let mut decoder = FrameDecoder::default();
        let (_, statuses) = run(&mut decoder, &[0x81, 0x00, FLAG]);
        assert_eq!(
            statuses,
            vec![DecodeStatus::Error(FrameError::TooShort { len: 2 })]
        );
    }

    #[test]
    fn consecutive_flags_are_ignored() {
        let mut decoder = FrameDecoder::default();
        let (bytes, statuses) = run(&mut decoder, &[FLAG, FLAG, FLAG]);
        assert!(bytes.is_empty());
        assert!(statuses.is_empty());
    }

    #[test]
    fn cancel_discards_partial_frame() {
        let mut wire = vec![0x01, 0x02, 0x03, 0x04, CAN];
        wire.extend(encoded(&[0xC0]));
        let mut decoder = FrameDecoder::default();
        let (_, statuses) = run(&mut decoder, &wire);
        assert_eq!(
            statuses,
            vec![DecodeStatus::Cancelled, DecodeStatus::Complete]
        );
    }

    #[test]
    fn cancel_between_frames_is_silent() {
        let mut decoder = FrameDecoder::default();
        let (_, statuses) = run(&mut decoder, &[CAN]);
        assert!(statuses.is_empty());
    }

    #[test]
    fn substitute_byte_reports_comm_error() {
        let mut wire = encoded(&[0x01, 0x02, 0x03, 0x04]);
        wire.insert(2, SUB);
        let mut decoder = FrameDecoder::default();
        let (_, statuses) = run(&mut decoder, &wire);
        assert_eq!(statuses, vec![DecodeStatus::Error(FrameError::CommError)]);
    }

    #[test]
    fn oversized_frame_reports_once_and_recovers() {
        let mut decoder = FrameDecoder::new(4);
        let mut wire = encoded(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]);
        wire.extend(encoded(&[0x81]));
        let (bytes, statuses) = run(&mut decoder, &wire);
        assert_eq!(
            statuses,
            vec![
                DecodeStatus::Error(FrameError::TooLong { max: 4 }),
                DecodeStatus::Complete
            ]
        );
        assert_eq!(bytes.last(), Some(&0x81));
    }

    #[test]
    fn in_band_flow_control_bytes_are_ignored() {
        let frame = [0x81];
        let mut wire = encoded(&frame);
        wire.insert(1, XOFF);
        wire.insert(0, XON);
        let mut decoder = FrameDecoder::default();
        let (bytes, statuses) = run(&mut decoder, &wire);
        assert_eq!(bytes, frame);
        assert_eq!(statuses, vec![DecodeStatus::Complete]);
    }

    #[test]
    fn encoder_resumes_mid_escape() {
        let frame = [0x7E, 0x7D];
        let mut encoder = FrameEncoder::new();
        encoder.begin(frame.len());
        assert_eq!(encoder.next_byte(|i| frame[i]), Some(ESC));
        assert_eq!(encoder.position(), 1);
        assert_eq!(encoder.next_byte(|_| unreachable!()), Some(0x5E));
        assert_eq!(encoder.next_byte(|i| frame[i]), Some(ESC));
        assert_eq!(encoder.next_byte(|_| unreachable!()), Some(0x5D));
    }

    proptest! {
        #[test]
        fn any_frame_survives_the_wire(frame in proptest::collection::vec(any::<u8>(), 1..=MAX_FRAME_LEN)) {
            let mut decoder = FrameDecoder::default();
            let (bytes, statuses) = run(&mut decoder, &encoded(&frame));
            prop_assert_eq!(bytes, frame);
            prop_assert_eq!(statuses, vec![DecodeStatus::Complete]);
        }
    }
}
