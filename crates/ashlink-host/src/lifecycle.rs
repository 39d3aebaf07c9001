//! Connection states and the reset handshake.

use std::fmt;

use ashlink_frame::{FrameKind, ASH_VERSION};
use tracing::{debug, info};

use crate::config::{NcpType, ResetMethod};
use crate::error::{DisconnectReason, HostFault};
use crate::session::Session;

/// Reset reason codes carried in the second byte of an RSTACK frame.
pub mod reset_reason {
    pub const UNKNOWN: u8 = 0x00;
    pub const EXTERNAL: u8 = 0x01;
    pub const POWER_ON: u8 = 0x02;
    pub const WATCHDOG: u8 = 0x03;
    pub const ASSERT: u8 = 0x06;
    pub const BOOTLOADER: u8 = 0x09;
    pub const SOFTWARE: u8 = 0x0B;
}

/// Where a session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never reset, or stopped with [`crate::Host::disconnect`].
    Disconnected,
    /// Reset issued, waiting for the NCP's RSTACK.
    Connecting,
    Connected,
    /// The host ended the session.
    HostFatal(HostFault),
    /// The NCP ended the session with this error code.
    NcpFatal(u8),
}

impl ConnectionState {
    pub fn disconnect_reason(self) -> Option<DisconnectReason> {
        match self {
            Self::HostFatal(fault) => Some(DisconnectReason::Host(fault)),
            Self::NcpFatal(code) => Some(DisconnectReason::Ncp(code)),
            _ => None,
        }
    }

    pub fn is_fatal(self) -> bool {
        self.disconnect_reason().is_some()
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::HostFatal(fault) => write!(f, "host fatal: {fault}"),
            Self::NcpFatal(code) => write!(f, "NCP fatal: error 0x{code:02X}"),
        }
    }
}

/// Whether an RSTACK reset reason is the one `method` produces.
///
/// A line or custom reset shows up as an external reset on AVR NCPs and as
/// a power-on reset on EM2xx NCPs.
pub fn reset_reason_matches(method: ResetMethod, ncp: NcpType, reason: u8) -> bool {
    match method {
        ResetMethod::Rst => reason == reset_reason::SOFTWARE,
        ResetMethod::Dtr | ResetMethod::Custom | ResetMethod::None => matches!(
            (ncp, reason),
            (NcpType::Avr, reset_reason::EXTERNAL) | (NcpType::Em2xx, reset_reason::POWER_ON)
        ),
    }
}

impl Session {
    /// Handle a frame that arrived before the session connected.
    ///
    /// Only RSTACK and ERROR frames matter here; `data` is the frame's
    /// data field.
    pub(crate) fn handle_unconnected(&mut self, kind: FrameKind, data: [u8; 2]) {
        match kind {
            FrameKind::ResetAck => {
                let [version, reason] = data;
                if version != ASH_VERSION {
                    self.disconnect(DisconnectReason::Host(HostFault::Version {
                        got: version,
                        expected: ASH_VERSION,
                    }));
                    return;
                }
                if !reset_reason_matches(self.config.reset_method, self.config.ncp_type, reason) {
                    debug!(
                        reason = format_args!("0x{reason:02X}"),
                        method = %self.config.reset_method,
                        "ignoring RSTACK with unexpected reset reason"
                    );
                    return;
                }
                info!(
                    version,
                    reason = format_args!("0x{reason:02X}"),
                    "NCP acknowledged reset"
                );
                self.connected();
            }
            FrameKind::Error => self.disconnect(DisconnectReason::Ncp(data[1])),
            _ => {}
        }
    }
}
