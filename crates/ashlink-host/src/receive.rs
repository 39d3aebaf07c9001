//! Receive engine: frame assembly and processing of complete frames.

use ashlink_frame::{classify, randomize, DecodeStatus, FrameError, FrameHeader, FrameKind, Seq};
use ashlink_transport::{SerialPort, TransportError};
use tracing::{debug, trace};

use crate::error::{DisconnectReason, HostFault};
use crate::pool::Direction;
use crate::session::{Flags, Session, SHORT_FRAME_LEN};

/// Result of one pass of the receive engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RxOutcome {
    /// Input is exhausted.
    NoData,
    /// A frame was handled; there may be more input.
    InProgress,
    /// A DATA frame was added to the ready queue.
    Data,
    /// An in-sequence DATA frame was dropped for lack of a buffer.
    NoRxSpace,
}

enum Assembled {
    NoData,
    Frame,
    Cancelled,
    Error(FrameError),
    Fatal,
}

impl Session {
    /// Read input until one frame completes, fails, or input runs out, then
    /// act on the frame.
    pub(crate) fn receive_frame<P: SerialPort + ?Sized>(
        &mut self,
        port: &mut P,
        now: u64,
    ) -> RxOutcome {
        match self.assemble_frame(port) {
            Assembled::NoData => return RxOutcome::NoData,
            Assembled::Fatal => return RxOutcome::InProgress,
            Assembled::Cancelled => {
                if self.is_connected() {
                    self.counters.rx_cancelled += 1;
                    debug!("received frame cancelled");
                }
                return RxOutcome::InProgress;
            }
            Assembled::Error(err) => {
                match err {
                    FrameError::BadCrc => self.counters.rx_crc_errors += 1,
                    FrameError::CommError => self.counters.rx_comm_errors += 1,
                    FrameError::TooShort { .. } => self.counters.rx_too_short += 1,
                    FrameError::TooLong { .. } => self.counters.rx_too_long += 1,
                    _ => {}
                }
                debug!(error = %err, "received bad frame");
                self.reject();
                return RxOutcome::InProgress;
            }
            Assembled::Frame => {}
        }

        let outcome = self.process_frame(now);
        // Any buffer not handed to the ready queue goes back to the pool.
        self.discard_partial_frame();
        outcome
    }

    fn assemble_frame<P: SerialPort + ?Sized>(&mut self, port: &mut P) -> Assembled {
        loop {
            let wire = match port.read_byte() {
                Ok(Some(byte)) => byte,
                Ok(None) => return Assembled::NoData,
                Err(TransportError::FlowControl(what)) => {
                    debug!(what, "flow control violation");
                    self.disconnect(DisconnectReason::Host(HostFault::FlowControl));
                    return Assembled::Fatal;
                }
                Err(TransportError::Io(err)) => {
                    debug!(error = %err, "serial read failed");
                    self.rx.decoder.reset();
                    self.discard_partial_frame();
                    return Assembled::Error(FrameError::CommError);
                }
                Err(err) => {
                    debug!(error = %err, "serial port lost");
                    self.disconnect(DisconnectReason::Host(HostFault::Serial));
                    return Assembled::Fatal;
                }
            };
            self.counters.rx_bytes += 1;

            let decoded = self.rx.decoder.decode(wire);
            if let Some(byte) = decoded.byte {
                let index = self.rx.len;
                if index < SHORT_FRAME_LEN {
                    self.rx.short[index] = byte;
                } else {
                    if index == SHORT_FRAME_LEN {
                        // Long enough to be a DATA frame: move it into a pool buffer.
                        self.rx.data = self.pool.alloc(Direction::Rx);
                        if let Some(id) = &self.rx.data {
                            self.pool
                                .get_mut(id)
                                .extend_from_slice(&self.rx.short[1..]);
                        }
                    }
                    if let Some(id) = &self.rx.data {
                        self.pool.get_mut(id).push(byte);
                    }
                }
                self.rx.len = index + 1;
            }

            match decoded.status {
                DecodeStatus::InProgress => {}
                DecodeStatus::Complete => return Assembled::Frame,
                DecodeStatus::Cancelled => {
                    self.discard_partial_frame();
                    return Assembled::Cancelled;
                }
                DecodeStatus::Error(err) => {
                    self.discard_partial_frame();
                    return Assembled::Error(err);
                }
            }
        }
    }

    fn process_frame(&mut self, now: u64) -> RxOutcome {
        let control = self.rx.control();
        let len = self.rx.len;
        let mut kind = match classify(control, len) {
            Ok(kind) => kind,
            Err(err) => {
                match err {
                    FrameError::BadControl(_) => self.counters.rx_bad_control += 1,
                    _ => self.counters.rx_bad_length += 1,
                }
                debug!(error = %err, "received invalid frame");
                FrameKind::Invalid
            }
        };
        let header = FrameHeader::decode(control);
        if self.trace_frames {
            debug!(?header, len, "rx frame");
        } else {
            trace!(?header, len, "rx frame");
        }

        if !self.is_connected() {
            self.handle_unconnected(kind, [self.rx.short[1], self.rx.short[2]]);
            return RxOutcome::InProgress;
        }

        if let (FrameKind::Data | FrameKind::Ack | FrameKind::Nak, Some(ack)) =
            (kind, header.and_then(FrameHeader::ack_num))
        {
            if !self.window.ack_in_range(ack) {
                self.counters.rx_bad_ack_number += 1;
                debug!(
                    %ack,
                    ack_received = %self.window.ack_received,
                    seq_sent = %self.window.seq_sent,
                    "bad ack number"
                );
                kind = FrameKind::Invalid;
            } else if ack != self.window.ack_received {
                self.acknowledge(ack, now);
            }
        }

        match (kind, header) {
            (
                FrameKind::Data,
                Some(FrameHeader::Data {
                    frame_num,
                    retransmit,
                    ..
                }),
            ) => {
                if frame_num == self.window.seq_recv {
                    return self.accept_data(retransmit);
                }
                if retransmit {
                    self.counters.rx_duplicates += 1;
                    self.flags.insert(Flags::ACK);
                } else {
                    if !self.flags.contains(Flags::REJ) {
                        self.counters.rx_out_of_sequence += 1;
                        debug!(%frame_num, expected = %self.window.seq_recv, "out of sequence");
                    }
                    self.reject();
                }
            }
            (FrameKind::Ack, _) => self.counters.rx_ack_frames += 1,
            (FrameKind::Nak, _) => {
                self.counters.rx_nak_frames += 1;
                self.start_retransmission();
            }
            (FrameKind::ResetAck, _) => {
                let reason = self.rx.short[2];
                self.disconnect(DisconnectReason::Host(HostFault::NcpReset { reason }));
            }
            (FrameKind::Error, _) => {
                let code = self.rx.short[2];
                self.disconnect(DisconnectReason::Ncp(code));
            }
            _ => self.reject(),
        }
        RxOutcome::InProgress
    }

    /// Move `ack_received` forward to `ack` and release what it acknowledges.
    fn acknowledge(&mut self, ack: Seq, now: u64) {
        self.window.ack_received = ack;
        self.timeouts = 0;
        if self.flags.contains(Flags::RETX) {
            self.ack_timer.stop();
            if ack != self.window.seq_resend {
                self.ack_timer.start(now);
            }
        } else {
            self.ack_timer.adjust(false, now);
            if ack != self.window.seq_sent {
                self.ack_timer.start(now);
            } else {
                self.ack_timer.stop();
            }
            self.scrub_retx_queue();
        }
    }

    fn accept_data(&mut self, retransmit: bool) -> RxOutcome {
        let Some(id) = self.rx.data.take() else {
            self.counters.rx_no_buffer += 1;
            debug!("no receive buffer for DATA frame");
            self.reject();
            return RxOutcome::NoRxSpace;
        };
        if retransmit {
            self.flags.insert(Flags::ACK);
        }
        self.flags.remove(Flags::REJ | Flags::NAK);
        self.window.seq_recv = self.window.seq_recv.next();

        let data = self.pool.get_mut(&id);
        if self.config.randomize {
            randomize(data);
        }
        self.counters.rx_data_frames += 1;
        self.counters.rx_data_bytes += data.len() as u64;
        self.rx_queue.push_back(id);
        RxOutcome::Data
    }
}
