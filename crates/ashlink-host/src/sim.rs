//! An in-process NCP for tests and loopback runs.

use std::collections::VecDeque;

use ashlink_frame::{
    encode_frame, randomize, FrameEncoder, FrameError, FrameHeader, FrameReader, Seq, ASH_VERSION,
};
use ashlink_transport::{Result, SerialPort};
use bytes::BytesMut;
use tracing::trace;

use crate::lifecycle::reset_reason;

const NCP_WINDOW: usize = 3;

/// A frame the host sent, as the simulated NCP saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFrame {
    pub header: FrameHeader,
    /// DATA field, de-randomized when randomization is on.
    pub data: Vec<u8>,
}

impl HostFrame {
    pub fn is_data(&self) -> bool {
        matches!(self.header, FrameHeader::Data { .. })
    }

    pub fn is_retransmit(&self) -> bool {
        matches!(
            self.header,
            FrameHeader::Data {
                retransmit: true,
                ..
            }
        )
    }
}

/// Simulated NCP speaking ASH over an in-memory [`SerialPort`].
///
/// Bytes the host writes are decoded immediately and any response is queued
/// for the host to read. By default the NCP answers RST with RSTACK and
/// acknowledges every in-sequence DATA frame. With echo enabled it sends
/// each accepted payload back as its own DATA frame, holding them while the
/// host reports not-ready. A scripted NCP never responds on its own; the
/// test drives it through the `inject_*` methods.
#[derive(Debug)]
pub struct SimulatedNcp {
    reader: FrameReader,
    to_host: VecDeque<u8>,
    randomize: bool,
    version: u8,
    reset_reason: u8,
    answer_reset: bool,
    auto_ack: bool,
    echo: bool,
    silent: bool,
    not_ready: bool,
    drop_data: usize,
    corrupt_next: bool,
    announce_pending: bool,
    frm_rx: Seq,
    frm_tx: Seq,
    ack_rx: Seq,
    rejecting: bool,
    unacked: VecDeque<Vec<u8>>,
    pending_echo: VecDeque<Vec<u8>>,
    host_not_ready: bool,
    host_frames: Vec<HostFrame>,
    received: Vec<Vec<u8>>,
    frame_errors: Vec<FrameError>,
    resets: usize,
}

impl SimulatedNcp {
    /// An NCP that answers resets and acknowledges DATA frames.
    pub fn new(randomize: bool) -> Self {
        Self {
            reader: FrameReader::default(),
            to_host: VecDeque::new(),
            randomize,
            version: ASH_VERSION,
            reset_reason: reset_reason::SOFTWARE,
            answer_reset: true,
            auto_ack: true,
            echo: false,
            silent: false,
            not_ready: false,
            drop_data: 0,
            corrupt_next: false,
            announce_pending: false,
            frm_rx: Seq::ZERO,
            frm_tx: Seq::ZERO,
            ack_rx: Seq::ZERO,
            rejecting: false,
            unacked: VecDeque::new(),
            pending_echo: VecDeque::new(),
            host_not_ready: false,
            host_frames: Vec::new(),
            received: Vec::new(),
            frame_errors: Vec::new(),
            resets: 0,
        }
    }

    /// An NCP that only records what the host sends.
    pub fn scripted(randomize: bool) -> Self {
        Self {
            answer_reset: false,
            auto_ack: false,
            ..Self::new(randomize)
        }
    }

    /// Echo every accepted payload back to the host.
    pub fn with_echo(mut self) -> Self {
        self.echo = true;
        self
    }

    pub fn with_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    pub fn with_reset_reason(mut self, reason: u8) -> Self {
        self.reset_reason = reason;
        self
    }

    /// Ignore every frame from now on, as if the NCP hung.
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    /// Lose the next `count` DATA frames from the host.
    pub fn drop_data_frames(&mut self, count: usize) {
        self.drop_data = count;
    }

    /// Send the next frame to the host with a bad CRC.
    pub fn corrupt_next_frame(&mut self) {
        self.corrupt_next = true;
    }

    /// Set the not-ready bit in this NCP's ACK and NAK frames.
    pub fn set_not_ready(&mut self, not_ready: bool) {
        self.not_ready = not_ready;
    }

    /// Queue an unsolicited RSTACK, as after a line reset, once the host
    /// next reads. Survives the input flush done by [`crate::Host::start`].
    pub fn schedule_reset_announcement(&mut self) {
        self.announce_pending = true;
    }

    /// Queue an RSTACK frame now.
    pub fn inject_reset_ack(&mut self, version: u8, reason: u8) {
        self.queue_frame(&[FrameHeader::ResetAck.encode(), version, reason]);
    }

    /// Queue an ERROR frame.
    pub fn inject_error(&mut self, code: u8) {
        self.queue_frame(&[FrameHeader::Error.encode(), 0x00, code]);
    }

    pub fn inject_ack(&mut self, ack_num: Seq, not_ready: bool) {
        self.queue_frame(&[FrameHeader::Ack { ack_num, not_ready }.encode()]);
    }

    pub fn inject_nak(&mut self, ack_num: Seq, not_ready: bool) {
        self.queue_frame(&[FrameHeader::Nak { ack_num, not_ready }.encode()]);
    }

    /// Queue a DATA frame with explicit sequence numbers. The payload is
    /// randomized when randomization is on.
    pub fn inject_data(&mut self, frame_num: Seq, ack_num: Seq, retransmit: bool, payload: &[u8]) {
        let header = FrameHeader::Data {
            frame_num,
            ack_num,
            retransmit,
        };
        let mut frame = Vec::with_capacity(1 + payload.len());
        frame.push(header.encode());
        frame.extend_from_slice(payload);
        if self.randomize {
            randomize(&mut frame[1..]);
        }
        self.queue_frame(&frame);
    }

    /// Queue a logical frame (control byte and data field) as-is.
    pub fn inject_frame(&mut self, frame: &[u8]) {
        self.queue_frame(frame);
    }

    /// Queue raw wire bytes.
    pub fn inject_raw(&mut self, wire: &[u8]) {
        self.to_host.extend(wire);
    }

    /// Send `payload` to the host as the NCP's next DATA frame, subject to
    /// the host's not-ready state and this NCP's window.
    pub fn send_data(&mut self, payload: &[u8]) {
        self.pending_echo.push_back(payload.to_vec());
        self.pump();
    }

    /// Every frame received from the host, oldest first.
    pub fn host_frames(&self) -> &[HostFrame] {
        &self.host_frames
    }

    pub fn take_host_frames(&mut self) -> Vec<HostFrame> {
        std::mem::take(&mut self.host_frames)
    }

    /// DATA frames received from the host.
    pub fn host_data_frames(&self) -> impl Iterator<Item = &HostFrame> {
        self.host_frames.iter().filter(|f| f.is_data())
    }

    /// Payloads accepted in sequence, oldest first.
    pub fn received(&self) -> &[Vec<u8>] {
        &self.received
    }

    /// Decode errors seen on frames from the host.
    pub fn frame_errors(&self) -> &[FrameError] {
        &self.frame_errors
    }

    /// Not-ready bit from the host's most recent ACK or NAK.
    pub fn host_not_ready(&self) -> bool {
        self.host_not_ready
    }

    /// Number of RST frames received.
    pub fn resets(&self) -> usize {
        self.resets
    }

    /// Bytes queued for the host to read.
    pub fn pending_output(&self) -> usize {
        self.to_host.len()
    }

    /// DATA frames sent to the host and not yet acknowledged.
    pub fn unacked(&self) -> usize {
        self.unacked.len()
    }

    fn handle_frame(&mut self, frame: &[u8]) {
        let Some((&control, data)) = frame.split_first() else {
            return;
        };
        let Some(header) = FrameHeader::decode(control) else {
            return;
        };
        let mut data = data.to_vec();
        if self.randomize && header.kind() == ashlink_frame::FrameKind::Data {
            randomize(&mut data);
        }
        trace!(?header, len = data.len(), "ncp received frame");
        self.host_frames.push(HostFrame {
            header,
            data: data.clone(),
        });
        if self.silent {
            return;
        }

        match header {
            FrameHeader::Reset => {
                self.resets += 1;
                self.restart();
                if self.answer_reset {
                    self.inject_reset_ack(self.version, self.reset_reason);
                }
            }
            FrameHeader::Data {
                frame_num,
                ack_num,
                retransmit,
            } => {
                self.process_ack(ack_num);
                if self.drop_data > 0 {
                    self.drop_data -= 1;
                    return;
                }
                if frame_num == self.frm_rx {
                    self.frm_rx = self.frm_rx.next();
                    self.rejecting = false;
                    if self.echo {
                        self.pending_echo.push_back(data.clone());
                    }
                    self.received.push(data);
                    if self.auto_ack {
                        self.queue_ack();
                    }
                } else if retransmit {
                    if self.auto_ack {
                        self.queue_ack();
                    }
                } else if self.auto_ack && !self.rejecting {
                    self.rejecting = true;
                    let nak = FrameHeader::Nak {
                        ack_num: self.frm_rx,
                        not_ready: self.not_ready,
                    };
                    self.queue_frame(&[nak.encode()]);
                }
            }
            FrameHeader::Ack { ack_num, not_ready } => {
                self.host_not_ready = not_ready;
                self.process_ack(ack_num);
            }
            FrameHeader::Nak { ack_num, not_ready } => {
                self.host_not_ready = not_ready;
                self.process_ack(ack_num);
                if self.auto_ack {
                    self.resend_unacked();
                }
            }
            FrameHeader::ResetAck | FrameHeader::Error => {}
        }
        if self.auto_ack {
            self.pump();
        }
    }

    fn restart(&mut self) {
        self.frm_rx = Seq::ZERO;
        self.frm_tx = Seq::ZERO;
        self.ack_rx = Seq::ZERO;
        self.rejecting = false;
        self.unacked.clear();
        self.pending_echo.clear();
        self.host_not_ready = false;
    }

    fn process_ack(&mut self, ack_num: Seq) {
        if !ack_num.within(self.ack_rx, self.frm_tx) {
            return;
        }
        while self.ack_rx != ack_num {
            self.unacked.pop_front();
            self.ack_rx = self.ack_rx.next();
        }
    }

    fn queue_ack(&mut self) {
        let ack = FrameHeader::Ack {
            ack_num: self.frm_rx,
            not_ready: self.not_ready,
        };
        self.queue_frame(&[ack.encode()]);
    }

    fn resend_unacked(&mut self) {
        let frames: Vec<Vec<u8>> = self.unacked.iter().cloned().collect();
        for (offset, payload) in (0u8..).zip(frames) {
            self.inject_data(self.ack_rx.add(offset), self.frm_rx, true, &payload);
        }
    }

    fn pump(&mut self) {
        while !self.host_not_ready && self.unacked.len() < NCP_WINDOW {
            let Some(payload) = self.pending_echo.pop_front() else {
                break;
            };
            self.inject_data(self.frm_tx, self.frm_rx, false, &payload);
            self.frm_tx = self.frm_tx.next();
            self.unacked.push_back(payload);
        }
    }

    fn queue_frame(&mut self, frame: &[u8]) {
        if std::mem::take(&mut self.corrupt_next) {
            let mut encoder = FrameEncoder::new();
            encoder.begin(frame.len());
            encoder.corrupt_crc();
            while let Some(byte) = encoder.next_byte(|i| frame[i]) {
                self.to_host.push_back(byte);
            }
            return;
        }
        let mut wire = BytesMut::new();
        encode_frame(frame, &mut wire);
        self.to_host.extend(wire.iter());
    }
}

impl SerialPort for SimulatedNcp {
    fn read_byte(&mut self) -> Result<Option<u8>> {
        if std::mem::take(&mut self.announce_pending) {
            self.inject_reset_ack(self.version, self.reset_reason);
        }
        Ok(self.to_host.pop_front())
    }

    fn write_available(&mut self) -> bool {
        true
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        match self.reader.push(byte) {
            Some(Ok(frame)) => self.handle_frame(&frame),
            Some(Err(err)) => self.frame_errors.push(err),
            None => {}
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn discard_input(&mut self) -> Result<()> {
        self.to_host.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_frame(ncp: &mut SimulatedNcp, frame: &[u8]) {
        let mut wire = BytesMut::new();
        encode_frame(frame, &mut wire);
        for &byte in wire.iter() {
            ncp.write_byte(byte).unwrap();
        }
    }

    fn read_frames(ncp: &mut SimulatedNcp) -> Vec<Vec<u8>> {
        let mut reader = FrameReader::default();
        let mut frames = Vec::new();
        while let Some(byte) = ncp.read_byte().unwrap() {
            if let Some(frame) = reader.push(byte) {
                frames.push(frame.map(|f| f.to_vec()).unwrap_or_default());
            }
        }
        frames
    }

    #[test]
    fn answers_reset_with_software_reason() {
        let mut ncp = SimulatedNcp::new(false);
        write_frame(&mut ncp, &[0xC0]);
        assert_eq!(read_frames(&mut ncp), vec![vec![0xC1, ASH_VERSION, 0x0B]]);
        assert_eq!(ncp.resets(), 1);
    }

    #[test]
    fn acknowledges_and_records_data() {
        let mut ncp = SimulatedNcp::new(true);
        let mut payload = vec![1, 2, 3, 4];
        randomize(&mut payload);
        let mut frame = vec![0x00];
        frame.extend_from_slice(&payload);
        write_frame(&mut ncp, &frame);

        assert_eq!(ncp.received(), &[vec![1, 2, 3, 4]]);
        assert_eq!(read_frames(&mut ncp), vec![vec![0x81]]);
    }

    #[test]
    fn echo_waits_while_host_not_ready() {
        let mut ncp = SimulatedNcp::new(false).with_echo();
        write_frame(&mut ncp, &[0x89]);
        assert!(ncp.host_not_ready());

        write_frame(&mut ncp, &[0x00, 9, 9, 9]);
        assert_eq!(read_frames(&mut ncp), vec![vec![0x81]]);

        write_frame(&mut ncp, &[0x80]);
        assert_eq!(read_frames(&mut ncp), vec![vec![0x01, 9, 9, 9]]);
        assert_eq!(ncp.unacked(), 1);
    }

    #[test]
    fn corrupted_frame_fails_crc() {
        let mut ncp = SimulatedNcp::scripted(false);
        ncp.corrupt_next_frame();
        ncp.inject_ack(Seq::new(1), false);
        ncp.inject_ack(Seq::new(1), false);

        let mut reader = FrameReader::default();
        let mut results = Vec::new();
        while let Some(byte) = ncp.read_byte().unwrap() {
            results.extend(reader.push(byte));
        }
        assert_eq!(results[0], Err(FrameError::BadCrc));
        assert_eq!(results[1].as_ref().unwrap().as_ref(), &[0x81]);
    }

    #[test]
    fn dropped_frames_are_not_acknowledged() {
        let mut ncp = SimulatedNcp::new(false);
        ncp.drop_data_frames(1);
        write_frame(&mut ncp, &[0x00, 1, 2, 3]);
        assert!(read_frames(&mut ncp).is_empty());
        assert!(ncp.received().is_empty());

        write_frame(&mut ncp, &[0x08, 1, 2, 3]);
        assert_eq!(ncp.received().len(), 1);
        assert_eq!(ncp.host_data_frames().count(), 2);
    }
}
