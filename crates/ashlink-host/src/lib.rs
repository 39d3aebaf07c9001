//! Host side of the ASH reliable serial protocol.
//!
//! [`Host`] runs the whole protocol over a [`SerialPort`]: the NCP reset
//! handshake, DATA frame sequencing within a sliding window of up to seven
//! frames, acknowledgements with an adaptive timeout, retransmission, and
//! not-ready flow control. Nothing blocks; the application calls
//! [`Host::poll`] (or [`Host::send_exec`] / [`Host::receive_exec`]) from its
//! own loop.
//!
//! ```no_run
//! use ashlink_host::{Host, HostConfig, SystemClock};
//! use ashlink_transport::MemoryPort;
//!
//! let (port, _ncp_side) = MemoryPort::pair(256);
//! let mut host = Host::new(HostConfig::default(), port, SystemClock::new())?;
//! host.connect()?;
//! host.send(&[0x00, 0x00, 0x00, 0x04])?;
//! loop {
//!     host.poll()?;
//!     if let Some(response) = host.try_receive()? {
//!         println!("{response:?}");
//!         break;
//!     }
//! }
//! # Ok::<(), ashlink_host::HostError>(())
//! ```

pub mod clock;
pub mod config;
pub mod counters;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod pool;
pub mod sim;
pub mod timer;
pub mod window;

mod receive;
mod send;
mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{HostConfig, NcpType, ResetMethod, PRESETS};
pub use counters::Counters;
pub use error::{DisconnectReason, HostError, HostFault, Result};
pub use host::{Host, ReceiveStatus, ResetHook};
pub use lifecycle::{reset_reason, ConnectionState};
pub use pool::{BufferId, BufferPool, Direction, FrameQueue};
pub use sim::{HostFrame, SimulatedNcp};
pub use timer::{AckTimer, Timer};
pub use window::Window;

pub use ashlink_transport::SerialPort;
