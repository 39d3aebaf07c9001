//! Send engine: timer checks, frame selection and byte-at-a-time output.

use ashlink_frame::{FrameHeader, CAN};
use ashlink_transport::SerialPort;
use tracing::{debug, trace, warn};

use crate::error::{DisconnectReason, HostFault};
use crate::pool::Direction;
use crate::session::{Flags, SendState, Session};

/// What the idle state decided.
enum Next {
    /// A frame was started.
    Frame,
    /// Flags changed; decide again.
    Again,
    /// Nothing to send.
    Done,
}

impl Session {
    /// Run the send engine until output is full or there is nothing to send.
    pub(crate) fn send_exec<P: SerialPort + ?Sized>(&mut self, port: &mut P, now: u64) {
        if self.fault().is_some() {
            return;
        }
        if self.ack_timer.has_expired(now) {
            self.ack_timer_expired(now);
            if self.fault().is_some() {
                return;
            }
        }

        while port.write_available() {
            if self.flags.contains(Flags::CAN) {
                if self.tx.state == SendState::SendingData {
                    self.counters.tx_cancelled += 1;
                    debug!("cancelling DATA frame in progress");
                    if !self.write(port, CAN) {
                        return;
                    }
                    self.ack_timer.stop();
                    self.tx.state = SendState::Idle;
                    self.tx.encoder.reset();
                }
                self.flags.remove(Flags::CAN);
                continue;
            }

            if self.tx.state == SendState::Idle {
                match self.select_frame(now) {
                    Next::Frame => {}
                    Next::Again => continue,
                    Next::Done => break,
                }
            }

            match self.next_wire_byte() {
                Some(byte) => {
                    if !self.write(port, byte) {
                        return;
                    }
                }
                None => self.finish_frame(now),
            }
        }

        if let Err(err) = port.flush() {
            warn!(error = %err, "serial flush failed");
            self.disconnect(DisconnectReason::Host(HostFault::Serial));
        }
    }

    fn ack_timer_expired(&mut self, now: u64) {
        if !self.is_connected() {
            self.disconnect(DisconnectReason::Host(HostFault::ResetFailed));
            return;
        }
        let target = if self.flags.contains(Flags::RETX) {
            self.window.seq_resend
        } else {
            self.window.seq_sent
        };
        if self.window.ack_received == target {
            self.ack_timer.stop();
            return;
        }
        self.counters.rx_ack_timeouts += 1;
        self.ack_timer.adjust(true, now);
        self.timeouts += 1;
        warn!(
            timeouts = self.timeouts,
            period_ms = self.ack_timer.period(),
            "timed out waiting for ACK"
        );
        if self.timeouts >= self.config.max_timeouts {
            self.disconnect(DisconnectReason::Host(HostFault::Timeouts));
            return;
        }
        self.start_retransmission();
    }

    fn write<P: SerialPort + ?Sized>(&mut self, port: &mut P, byte: u8) -> bool {
        match port.write_byte(byte) {
            Ok(()) => {
                self.counters.tx_bytes += 1;
                true
            }
            Err(err) => {
                warn!(error = %err, "serial write failed");
                self.disconnect(DisconnectReason::Host(HostFault::Serial));
                false
            }
        }
    }

    /// Pick the next frame by priority: RST, NAK/ACK, retransmission,
    /// pending ACK, then new DATA within the window.
    fn select_frame(&mut self, now: u64) -> Next {
        if self.flags.contains(Flags::RETX) {
            if self
                .window
                .ack_received
                .within(self.window.seq_resend, self.window.seq_sent)
            {
                self.window.seq_resend = self.window.ack_received;
            }
            if self.window.seq_resend == self.window.seq_sent {
                self.flags.remove(Flags::RETX);
                self.scrub_retx_queue();
            }
        }

        self.data_frame_flow_control(now);

        let (header, len) = if self.flags.contains(Flags::RST) {
            self.ack_timer.set_and_start(now, self.config.reset_time_ms);
            self.flags.remove(Flags::RST | Flags::NAK | Flags::ACK);
            self.tx.state = SendState::SendingControl;
            (FrameHeader::Reset, 1)
        } else if self.flags.intersects(Flags::NAK | Flags::ACK) {
            let ack_num = self.window.seq_recv;
            let not_ready = self.flags.contains(Flags::NR);
            let header = if self.flags.contains(Flags::NAK) {
                self.flags.remove(Flags::NRTX | Flags::NAK | Flags::ACK);
                self.counters.tx_nak_frames += 1;
                FrameHeader::Nak { ack_num, not_ready }
            } else {
                self.flags.remove(Flags::NRTX | Flags::ACK);
                self.counters.tx_ack_frames += 1;
                FrameHeader::Ack { ack_num, not_ready }
            };
            if not_ready {
                self.flags.insert(Flags::NRTX);
                self.nr_timer.start(now, self.config.nr_time_ms);
            }
            self.window.ack_sent = ack_num;
            self.tx.state = SendState::SendingControl;
            (header, 1)
        } else if self.flags.contains(Flags::RETX) {
            let index = usize::from(
                self.window
                    .retransmit_base
                    .distance_to(self.window.seq_resend),
            );
            let Some(id) = self.retx_queue.get(index) else {
                // Nothing left to resend.
                self.flags.remove(Flags::RETX);
                return Next::Again;
            };
            let len = 1 + self.pool.get(id).len();
            self.counters.tx_retransmitted += 1;
            self.tx.state = SendState::ResendingData { index };
            let header = FrameHeader::Data {
                frame_num: self.window.seq_resend,
                ack_num: self.window.seq_recv,
                retransmit: true,
            };
            (header, len)
        } else if self.window.ack_sent != self.window.seq_recv {
            self.flags.insert(Flags::ACK);
            return Next::Again;
        } else if !self.tx_queue.is_empty() && self.window.can_send(self.config.window_size) {
            let Some(id) = self.tx_queue.front() else {
                return Next::Done;
            };
            let data_len = self.pool.get(id).len();
            self.counters.tx_data_frames += 1;
            self.counters.tx_data_bytes += data_len as u64;
            self.tx.state = SendState::SendingData;
            let header = FrameHeader::Data {
                frame_num: self.window.seq_sent,
                ack_num: self.window.seq_recv,
                retransmit: false,
            };
            (header, 1 + data_len)
        } else {
            return Next::Done;
        };

        if self.trace_frames {
            debug!(?header, len, "tx frame");
        } else {
            trace!(?header, len, "tx frame");
        }
        self.tx.control = header.encode();
        self.tx.encoder.begin(len);
        Next::Frame
    }

    fn next_wire_byte(&mut self) -> Option<u8> {
        let control = self.tx.control;
        let data = match self.tx.state {
            SendState::Idle => return None,
            SendState::SendingControl => {
                return self.tx.encoder.next_byte(|_| control);
            }
            SendState::SendingData => self.tx_queue.front(),
            SendState::ResendingData { index } => self.retx_queue.get(index),
        };
        let data = data.map(|id| self.pool.get(id)).unwrap_or_default();
        self.tx.encoder.next_byte(|i| if i == 0 { control } else { data[i - 1] })
    }

    fn finish_frame(&mut self, now: u64) {
        match self.tx.state {
            SendState::SendingData => {
                self.window.seq_sent = self.window.seq_sent.next();
                if let Some(id) = self.tx_queue.pop_front() {
                    self.retx_queue.push_back(id);
                }
            }
            SendState::ResendingData { .. } => {
                self.window.seq_resend = self.window.seq_resend.next();
            }
            SendState::SendingControl | SendState::Idle => {
                self.tx.state = SendState::Idle;
                return;
            }
        }
        if !self.ack_timer.is_running() {
            self.ack_timer.start(now);
        }
        self.window.ack_sent = self.window.seq_recv;
        self.tx.state = SendState::Idle;
    }

    /// Tell the NCP to hold DATA frames while receive buffers run low.
    fn data_frame_flow_control(&mut self, now: u64) {
        if !self.is_connected() {
            self.nr_timer.stop();
            self.flags.remove(Flags::NRTX | Flags::NR);
            return;
        }
        let free = self.pool.free_count(Direction::Rx);
        if free < self.config.nr_low_limit {
            if !self.flags.contains(Flags::NR) {
                debug!(free, "receive buffers low, not ready");
            }
            self.flags.insert(Flags::NR);
        } else if free > self.config.nr_high_limit {
            if self.flags.contains(Flags::NR) {
                debug!(free, "receive buffers recovered, ready");
            }
            self.flags.remove(Flags::NR);
            self.nr_timer.stop();
        }

        if self.flags.contains(Flags::NR) {
            if !self.flags.contains(Flags::NRTX) || self.nr_timer.has_expired(now) {
                self.flags.insert(Flags::ACK);
                self.nr_timer.start(now, self.config.nr_time_ms);
            }
        } else if self.flags.contains(Flags::NRTX) {
            self.flags.insert(Flags::ACK);
            self.nr_timer.stop();
        }
    }
}
