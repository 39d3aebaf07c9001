//! Non-blocking byte-serial port abstraction.
//!
//! The protocol engine never blocks on I/O. A port reports whether an input
//! byte is pending and whether output has room for one more byte.
//!
//! - [`StreamPort`] adapts any non-blocking `Read + Write` stream (a tty
//!   opened with `O_NONBLOCK`, a socket, a pipe).
//! - [`MemoryPort`] is an in-process port pair for tests and loopback use.

pub mod error;
pub mod memory;
pub mod stream;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::MemoryPort;
pub use stream::{FlowControl, StreamPort, XOFF, XON};
pub use traits::SerialPort;
