//! Host side of the ASH serial link protocol.
//!
//! ASH carries EmberZNet Serial Protocol traffic between a host and a
//! network co-processor (NCP) over a UART. It provides byte stuffing,
//! CRC-checked framing, a sliding window of up to seven unacknowledged
//! frames, adaptive retransmission and a reset handshake.
//!
//! # Crate Structure
//!
//! - [`transport`]: The non-blocking serial port abstraction
//! - [`frame`]: Control bytes, byte stuffing, CRC and data randomization
//! - [`host`]: The host session: connection lifecycle, send and receive engines
//!
//! # Example
//!
//! ```
//! use ashlink::host::{Host, HostConfig, ManualClock, SimulatedNcp};
//!
//! let clock = ManualClock::new();
//! clock.set_idle_step(10);
//! let ncp = SimulatedNcp::new(true).with_echo();
//! let mut host = Host::new(HostConfig::default(), ncp, clock).unwrap();
//!
//! host.connect().unwrap();
//! host.send(b"ping").unwrap();
//! let reply = loop {
//!     host.poll().unwrap();
//!     if let Some(reply) = host.try_receive().unwrap() {
//!         break reply;
//!     }
//! };
//! assert_eq!(reply.as_ref(), b"ping");
//! ```

/// Re-export transport types.
pub mod transport {
    pub use ashlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use ashlink_frame::*;
}

/// Re-export host types.
pub mod host {
    pub use ashlink_host::*;
}
