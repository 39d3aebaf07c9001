use ashlink_frame::Seq;

/// Sequence state of a session.
///
/// `seq_sent` is the next new frame number, `seq_resend` the next frame to
/// retransmit, `seq_recv` the next frame expected from the NCP,
/// `ack_received` the last ack number from the NCP, `ack_sent` the last
/// ack number sent to it, and `retransmit_base` the frame number of the
/// oldest buffer still held for retransmission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    pub seq_sent: Seq,
    pub seq_resend: Seq,
    pub seq_recv: Seq,
    pub ack_received: Seq,
    pub ack_sent: Seq,
    pub retransmit_base: Seq,
}

impl Window {
    /// Whether an incoming ack number is plausible: it may not move
    /// backwards and may not acknowledge a frame never sent.
    pub fn ack_in_range(&self, ack: Seq) -> bool {
        ack.within(self.ack_received, self.seq_sent)
    }

    /// Whether a new DATA frame fits within `window_size` unacknowledged frames.
    pub fn can_send(&self, window_size: u8) -> bool {
        let last = self
            .ack_received
            .add(window_size.saturating_sub(1));
        self.seq_sent.within(self.ack_received, last)
    }

    /// Number of frames sent but not yet acknowledged.
    pub fn unacked(&self) -> u8 {
        self.ack_received.distance_to(self.seq_sent)
    }

    /// Number of frames held for retransmission.
    pub fn held(&self) -> u8 {
        self.retransmit_base.distance_to(self.seq_sent)
    }
}
