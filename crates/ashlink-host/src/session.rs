use ashlink_frame::{FrameDecoder, FrameEncoder, FrameHeader, MAX_FRAME_LEN};
use tracing::{info, warn};

use crate::config::HostConfig;
use crate::counters::Counters;
use crate::error::DisconnectReason;
use crate::lifecycle::ConnectionState;
use crate::pool::{BufferId, BufferPool, FrameQueue};
use crate::timer::{AckTimer, Timer};
use crate::window::Window;

/// Frames up to this many bytes are assembled without a pool buffer.
pub(crate) const SHORT_FRAME_LEN: usize = 3;

/// Session flag bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Flags(u16);

impl Flags {
    /// Reject condition: an out-of-sequence or bad frame was NAKed.
    pub const REJ: Flags = Flags(0x001);
    /// Retransmitting unacknowledged DATA frames.
    pub const RETX: Flags = Flags(0x002);
    pub const NAK: Flags = Flags(0x004);
    pub const ACK: Flags = Flags(0x008);
    pub const RST: Flags = Flags(0x010);
    /// Cancel the DATA frame being sent.
    pub const CAN: Flags = Flags(0x020);
    pub const CONNECTED: Flags = Flags(0x040);
    /// Host is not ready to receive DATA frames.
    pub const NR: Flags = Flags(0x100);
    /// The not-ready state has been sent to the NCP.
    pub const NRTX: Flags = Flags(0x200);

    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Flags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Flags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Flags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

/// Send engine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendState {
    Idle,
    /// Sending a control-only frame (RST, ACK, NAK).
    SendingControl,
    /// Sending the head of the transmit queue.
    SendingData,
    /// Resending entry `index` of the retransmit queue.
    ResendingData { index: usize },
}

#[derive(Debug)]
pub(crate) struct TxCursor {
    pub state: SendState,
    pub control: u8,
    pub encoder: FrameEncoder,
}

#[derive(Debug)]
pub(crate) struct RxAssembly {
    pub decoder: FrameDecoder,
    /// First bytes of the current frame; byte 0 is kept as the last control byte.
    pub short: [u8; SHORT_FRAME_LEN],
    pub len: usize,
    pub data: Option<BufferId>,
}

impl RxAssembly {
    pub fn control(&self) -> u8 {
        self.short[0]
    }
}

/// All protocol state of one host session.
#[derive(Debug)]
pub(crate) struct Session {
    pub config: HostConfig,
    pub state: ConnectionState,
    pub flags: Flags,
    pub window: Window,
    pub timeouts: u8,
    pub pool: BufferPool,
    pub tx_queue: FrameQueue,
    pub retx_queue: FrameQueue,
    pub rx_queue: FrameQueue,
    pub ack_timer: AckTimer,
    pub nr_timer: Timer,
    pub counters: Counters,
    pub tx: TxCursor,
    pub rx: RxAssembly,
    pub trace_frames: bool,
}

impl Session {
    pub fn new(config: HostConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            flags: Flags::default(),
            window: Window::default(),
            timeouts: 0,
            pool: BufferPool::new(config.tx_buffers, config.rx_buffers),
            tx_queue: FrameQueue::new(),
            retx_queue: FrameQueue::new(),
            rx_queue: FrameQueue::new(),
            ack_timer: AckTimer::new(
                config.ack_time_init_ms,
                config.ack_time_min_ms,
                config.ack_time_max_ms,
            ),
            nr_timer: Timer::default(),
            counters: Counters::default(),
            tx: TxCursor {
                state: SendState::Idle,
                control: 0,
                encoder: FrameEncoder::new(),
            },
            rx: RxAssembly {
                decoder: FrameDecoder::new(MAX_FRAME_LEN),
                short: [0; SHORT_FRAME_LEN],
                len: 0,
                data: None,
            },
            trace_frames: config.trace_flags != 0,
            config,
        }
    }

    /// Return every buffer, zero the sequence state, stop timers and clear counters.
    pub fn clear(&mut self) {
        self.flags = Flags::default();
        self.window = Window::default();
        self.timeouts = 0;
        self.state = ConnectionState::Disconnected;
        self.tx_queue.release_all(&mut self.pool);
        self.retx_queue.release_all(&mut self.pool);
        self.rx_queue.release_all(&mut self.pool);
        self.discard_partial_frame();
        self.rx.short = [0; SHORT_FRAME_LEN];
        self.ack_timer.stop();
        self.ack_timer.reset_period();
        self.nr_timer.stop();
        self.tx.state = SendState::Idle;
        self.tx.encoder.reset();
        self.counters = Counters::default();
    }

    pub fn is_connected(&self) -> bool {
        self.flags.contains(Flags::CONNECTED)
    }

    /// Why the session ended, if it has.
    pub fn fault(&self) -> Option<DisconnectReason> {
        self.state.disconnect_reason()
    }

    /// End the session. Engines stop servicing traffic until the next reset.
    pub fn disconnect(&mut self, reason: DisconnectReason) {
        self.flags = Flags::default();
        self.ack_timer.stop();
        self.nr_timer.stop();
        self.state = match reason {
            DisconnectReason::Host(fault) => ConnectionState::HostFatal(fault),
            DisconnectReason::Ncp(code) => ConnectionState::NcpFatal(code),
        };
        warn!(%reason, "ASH disconnected");
    }

    /// Enter the connected state after an accepted RSTACK.
    pub fn connected(&mut self) {
        self.ack_timer.stop();
        self.timeouts = 0;
        self.ack_timer.reset_period();
        self.flags = Flags::CONNECTED | Flags::ACK;
        self.state = ConnectionState::Connected;
        info!("ASH connected");
    }

    /// Resend every unacknowledged frame, starting with the oldest.
    pub fn start_retransmission(&mut self) {
        if !self.flags.contains(Flags::RETX) && self.window.unacked() > 0 {
            self.ack_timer.stop();
            self.window.seq_resend = self.window.ack_received;
            self.flags.insert(Flags::RETX | Flags::CAN);
        }
    }

    /// NAK the current frame if it was a DATA frame and no NAK is outstanding.
    pub fn reject(&mut self) {
        if FrameHeader::is_data_control(self.rx.control())
            && self.is_connected()
            && !self.flags.contains(Flags::REJ)
        {
            self.flags.insert(Flags::REJ | Flags::NAK);
        }
    }

    /// Free retransmit buffers for every frame the NCP has acknowledged.
    pub fn scrub_retx_queue(&mut self) {
        while self.window.retransmit_base != self.window.ack_received {
            if let Some(id) = self.retx_queue.pop_front() {
                self.pool.free(id);
            }
            self.window.retransmit_base = self.window.retransmit_base.next();
        }
    }

    /// Drop the frame being assembled, returning its buffer.
    pub fn discard_partial_frame(&mut self) {
        if let Some(id) = self.rx.data.take() {
            self.pool.free(id);
        }
        self.rx.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use ashlink_frame::Seq;

    use super::*;
    use crate::pool::Direction;

    fn connected_session() -> Session {
        let mut session = Session::new(HostConfig::default());
        session.connected();
        session
    }

    #[test]
    fn flags_set_operations() {
        let mut flags = Flags::CONNECTED | Flags::ACK;
        assert!(flags.contains(Flags::ACK));
        assert!(!flags.contains(Flags::ACK | Flags::NAK));
        assert!(flags.intersects(Flags::ACK | Flags::NAK));
        flags.remove(Flags::ACK);
        assert!(!flags.intersects(Flags::ACK | Flags::NAK));
    }

    #[test]
    fn retransmission_needs_unacked_frames() {
        let mut session = connected_session();
        session.start_retransmission();
        assert!(!session.flags.contains(Flags::RETX));

        session.window.seq_sent = Seq::new(2);
        session.window.ack_received = Seq::new(1);
        session.start_retransmission();
        assert!(session.flags.contains(Flags::RETX | Flags::CAN));
        assert_eq!(session.window.seq_resend, Seq::new(1));
    }

    #[test]
    fn reject_only_after_data_control() {
        let mut session = connected_session();
        session.rx.short[0] = 0x81;
        session.reject();
        assert!(!session.flags.contains(Flags::NAK));

        session.rx.short[0] = 0x25;
        session.reject();
        assert!(session.flags.contains(Flags::REJ | Flags::NAK));
    }

    #[test]
    fn scrub_frees_acknowledged_buffers() {
        let mut session = connected_session();
        for _ in 0..3 {
            let id = session.pool.alloc(Direction::Tx).unwrap();
            session.retx_queue.push_back(id);
        }
        session.window.seq_sent = Seq::new(3);
        session.window.ack_received = Seq::new(2);
        session.scrub_retx_queue();

        assert_eq!(session.retx_queue.len(), 1);
        assert_eq!(session.window.retransmit_base, Seq::new(2));
        assert_eq!(
            session.pool.free_count(Direction::Tx),
            session.config.tx_buffers - 1
        );
    }

    #[test]
    fn clear_returns_every_buffer() {
        let mut session = connected_session();
        let tx = session.pool.alloc(Direction::Tx).unwrap();
        session.tx_queue.push_back(tx);
        let rx = session.pool.alloc(Direction::Rx).unwrap();
        session.rx_queue.push_back(rx);
        session.rx.data = session.pool.alloc(Direction::Rx);

        session.clear();
        assert_eq!(session.pool.free_count(Direction::Tx), session.config.tx_buffers);
        assert_eq!(session.pool.free_count(Direction::Rx), session.config.rx_buffers);
        assert_eq!(session.state, ConnectionState::Disconnected);
        assert!(!session.is_connected());
    }
}
