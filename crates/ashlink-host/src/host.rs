use std::fmt;

use ashlink_frame::{randomize, CAN, MAX_DATA_FIELD_LEN, MIN_DATA_FIELD_LEN};
use ashlink_transport::SerialPort;
use bytes::Bytes;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::config::{HostConfig, ResetMethod};
use crate::counters::Counters;
use crate::error::{HostError, Result};
use crate::lifecycle::ConnectionState;
use crate::pool::Direction;
use crate::receive::RxOutcome;
use crate::session::{Flags, Session};
use crate::window::Window;

/// Resets the NCP by means outside the serial data stream.
///
/// Used by [`ResetMethod::Dtr`] and [`ResetMethod::Custom`].
pub trait ResetHook {
    fn reset_ncp(&mut self, method: ResetMethod) -> Result<()>;
}

impl<F> ResetHook for F
where
    F: FnMut(ResetMethod) -> Result<()>,
{
    fn reset_ncp(&mut self, method: ResetMethod) -> Result<()> {
        self(method)
    }
}

/// Outcome of [`Host::receive_exec`] and [`Host::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveStatus {
    /// All available input was processed.
    NoData,
    /// A DATA frame is ready for [`Host::try_receive`].
    Data,
    /// A DATA frame was dropped for lack of a receive buffer; the NCP will resend it.
    NoRxSpace,
}

/// One end of an ASH link.
pub struct Host<P, C = SystemClock> {
    session: Session,
    port: P,
    clock: C,
    reset_hook: Option<Box<dyn ResetHook + Send>>,
}

impl<P: SerialPort, C: Clock> Host<P, C> {
    /// Create a disconnected host. The configuration is validated here.
    pub fn new(config: HostConfig, port: P, clock: C) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            session: Session::new(config),
            port,
            clock,
            reset_hook: None,
        })
    }

    /// Install the hook used by the DTR and custom reset methods.
    pub fn with_reset_hook(mut self, hook: impl ResetHook + Send + 'static) -> Self {
        self.reset_hook = Some(Box::new(hook));
        self
    }

    /// Reset the NCP and wait until it connects or the attempt fails.
    pub fn connect(&mut self) -> Result<()> {
        self.reset()?;
        self.start()
    }

    /// Clear all protocol state and reset the NCP using the configured method.
    pub fn reset(&mut self) -> Result<()> {
        self.session.clear();
        let method = self.session.config.reset_method;
        info!(%method, "resetting NCP");
        match method {
            ResetMethod::Rst => {
                self.session.flags.insert(Flags::RST);
                // Flush whatever the NCP has started to assemble.
                if self.port.write_available() {
                    self.port.write_byte(CAN)?;
                    self.port.flush()?;
                }
            }
            ResetMethod::Dtr | ResetMethod::Custom => match self.reset_hook.as_mut() {
                Some(hook) => hook.reset_ncp(method)?,
                None => debug!(%method, "no reset hook installed"),
            },
            ResetMethod::None => {}
        }
        let now = self.clock.now_ms();
        self.session
            .ack_timer
            .set_and_start(now, self.session.config.reset_time_ms);
        self.session.state = ConnectionState::Connecting;
        Ok(())
    }

    /// Drive the handshake begun by [`Host::reset`] until the NCP connects.
    pub fn start(&mut self) -> Result<()> {
        match self.session.state {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Disconnected => return Err(HostError::NotConnected),
            _ => {}
        }
        if self.session.config.reset_method != ResetMethod::None {
            self.port.discard_input()?;
        }
        let now = self.clock.now_ms();
        self.session
            .ack_timer
            .set_and_start(now, self.session.config.reset_time_ms);
        while !self.session.is_connected() {
            self.send_exec()?;
            self.receive_exec()?;
            self.clock.idle();
        }
        self.session.ack_timer.stop();
        Ok(())
    }

    /// Stop the session and release every buffer.
    pub fn disconnect(&mut self) {
        if self.session.state != ConnectionState::Disconnected {
            info!("ASH stopped");
        }
        self.session.clear();
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state
    }

    /// Queue a DATA frame and start sending it.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() < MIN_DATA_FIELD_LEN {
            return Err(HostError::DataTooShort {
                len: payload.len(),
                min: MIN_DATA_FIELD_LEN,
            });
        }
        if payload.len() > MAX_DATA_FIELD_LEN {
            return Err(HostError::DataTooLong {
                len: payload.len(),
                max: MAX_DATA_FIELD_LEN,
            });
        }
        self.check_connected()?;
        let session = &mut self.session;
        let Some(id) = session.pool.alloc(Direction::Tx) else {
            return Err(HostError::NoTxSpace);
        };
        let data = session.pool.get_mut(&id);
        data.extend_from_slice(payload);
        if session.config.randomize {
            randomize(data);
        }
        session.tx_queue.push_back(id);
        self.send_exec()
    }

    /// Take the oldest received DATA payload, if any.
    pub fn try_receive(&mut self) -> Result<Option<Bytes>> {
        self.check_connected()?;
        let session = &mut self.session;
        let Some(id) = session.rx_queue.pop_front() else {
            return Ok(None);
        };
        let payload = Bytes::copy_from_slice(session.pool.get(&id));
        session.pool.free(id);
        Ok(Some(payload))
    }

    /// Run the send engine once.
    pub fn send_exec(&mut self) -> Result<()> {
        self.check_active()?;
        let now = self.clock.now_ms();
        self.session.send_exec(&mut self.port, now);
        self.check_active()
    }

    /// Process input until it runs out, a DATA frame arrives, or the session fails.
    pub fn receive_exec(&mut self) -> Result<ReceiveStatus> {
        loop {
            self.check_active()?;
            let now = self.clock.now_ms();
            match self.session.receive_frame(&mut self.port, now) {
                RxOutcome::InProgress => continue,
                RxOutcome::NoData => return Ok(ReceiveStatus::NoData),
                RxOutcome::Data => return Ok(ReceiveStatus::Data),
                RxOutcome::NoRxSpace => return Ok(ReceiveStatus::NoRxSpace),
            }
        }
    }

    /// One pass of the send engine followed by one of the receive engine.
    pub fn poll(&mut self) -> Result<ReceiveStatus> {
        self.send_exec()?;
        self.receive_exec()
    }

    pub fn counters(&self) -> &Counters {
        &self.session.counters
    }

    pub fn config(&self) -> &HostConfig {
        &self.session.config
    }

    /// Sequence state, for diagnostics.
    pub fn window(&self) -> Window {
        self.session.window
    }

    /// Current acknowledgement timeout in milliseconds.
    pub fn ack_period_ms(&self) -> u64 {
        self.session.ack_timer.period()
    }

    /// Whether the host is telling the NCP to hold DATA frames.
    pub fn is_not_ready(&self) -> bool {
        self.session.flags.contains(Flags::NR)
    }

    /// Frames queued but not yet sent.
    pub fn pending_frames(&self) -> usize {
        self.session.tx_queue.len()
    }

    /// Received frames waiting for [`Host::try_receive`].
    pub fn ready_frames(&self) -> usize {
        self.session.rx_queue.len()
    }

    pub fn free_tx_buffers(&self) -> usize {
        self.session.pool.free_count(Direction::Tx)
    }

    pub fn free_rx_buffers(&self) -> usize {
        self.session.pool.free_count(Direction::Rx)
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Consume the host and return its port.
    pub fn into_port(self) -> P {
        self.port
    }

    fn check_active(&self) -> Result<()> {
        if let Some(reason) = self.session.fault() {
            return Err(HostError::Disconnected(reason));
        }
        if self.session.state == ConnectionState::Disconnected {
            return Err(HostError::NotConnected);
        }
        Ok(())
    }

    fn check_connected(&self) -> Result<()> {
        self.check_active()?;
        if self.session.is_connected() {
            Ok(())
        } else {
            Err(HostError::NotConnected)
        }
    }
}

impl<P, C> fmt::Debug for Host<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("state", &self.session.state)
            .field("window", &self.session.window)
            .field("pending", &self.session.tx_queue.len())
            .field("ready", &self.session.rx_queue.len())
            .finish_non_exhaustive()
    }
}
