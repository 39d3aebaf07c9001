//! Polled timers and the adaptive acknowledgement timeout.

use tracing::trace;

/// A one-shot timer checked by polling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timer {
    deadline: Option<u64>,
}

impl Timer {
    pub fn start(&mut self, now: u64, period_ms: u64) {
        self.deadline = Some(now.saturating_add(period_ms));
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    /// Whether the timer is running and its deadline has passed.
    pub fn has_expired(&self, now: u64) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }
}

/// Acknowledgement timer whose period tracks the observed ACK latency.
///
/// The period starts at `init`. Each acknowledgement that arrives while
/// the timer runs blends the elapsed time in as
/// `period = (7 * period + 2 * elapsed) / 8`; each expiry doubles it. The
/// result is always clamped to `[min, max]`. The same timer doubles as the
/// reset timer while connecting, with an unclamped period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckTimer {
    started: Option<u64>,
    period: u64,
    init: u64,
    min: u64,
    max: u64,
}

impl AckTimer {
    pub fn new(init: u64, min: u64, max: u64) -> Self {
        Self {
            started: None,
            period: init,
            init,
            min,
            max,
        }
    }

    /// Current timeout period in milliseconds.
    pub fn period(&self) -> u64 {
        self.period
    }

    /// Return the period to its initial value.
    pub fn reset_period(&mut self) {
        self.period = self.init;
    }

    /// Use `period_ms` as-is and start the timer.
    pub fn set_and_start(&mut self, now: u64, period_ms: u64) {
        self.period = period_ms;
        self.start(now);
    }

    pub fn start(&mut self, now: u64) {
        self.started = Some(now);
    }

    pub fn stop(&mut self) {
        self.started = None;
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    pub fn has_expired(&self, now: u64) -> bool {
        self.started
            .is_some_and(|started| now.saturating_sub(started) >= self.period)
    }

    /// Adapt the period after an expiry or a timely acknowledgement.
    pub fn adjust(&mut self, expired: bool, now: u64) {
        if expired {
            self.period = self.period.saturating_mul(2);
        } else if let Some(started) = self.started {
            let elapsed = now.saturating_sub(started);
            self.period = (7 * self.period + 2 * elapsed) / 8;
        }
        self.period = self.period.clamp(self.min, self.max);
        trace!(period_ms = self.period, expired, "ack period adjusted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_expires_at_deadline() {
        let mut timer = Timer::default();
        assert!(!timer.has_expired(100));
        timer.start(100, 50);
        assert!(timer.is_running());
        assert!(!timer.has_expired(149));
        assert!(timer.has_expired(150));
        timer.stop();
        assert!(!timer.has_expired(1000));
    }

    #[test]
    fn expiry_doubles_period_up_to_max() {
        let mut ack = AckTimer::new(800, 400, 2400);
        ack.adjust(true, 0);
        assert_eq!(ack.period(), 1600);
        ack.adjust(true, 0);
        assert_eq!(ack.period(), 2400);
    }

    #[test]
    fn fast_acks_shrink_period_down_to_min() {
        let mut ack = AckTimer::new(800, 400, 2400);
        ack.start(1000);
        ack.adjust(false, 1100);
        // (7 * 800 + 2 * 100) / 8
        assert_eq!(ack.period(), 725);
        for _ in 0..50 {
            ack.start(0);
            ack.adjust(false, 0);
        }
        assert_eq!(ack.period(), 400);
    }

    #[test]
    fn adjust_without_running_timer_only_clamps() {
        let mut ack = AckTimer::new(800, 400, 2400);
        ack.adjust(false, 5000);
        assert_eq!(ack.period(), 800);
    }

    #[test]
    fn reset_period_is_not_clamped() {
        let mut ack = AckTimer::new(800, 400, 2400);
        ack.set_and_start(0, 2500);
        assert!(!ack.has_expired(2499));
        assert!(ack.has_expired(2500));
        ack.reset_period();
        assert_eq!(ack.period(), 800);
    }
}
