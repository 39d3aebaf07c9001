use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};

use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::traits::SerialPort;

/// XON flow-control byte (DC1).
pub const XON: u8 = 0x11;
/// XOFF flow-control byte (DC3).
pub const XOFF: u8 = 0x13;

const DEFAULT_BLOCK_LEN: usize = 256;

/// Flow control used on the serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    /// RTS/CTS handled by the UART; in-band XON/XOFF is a protocol violation.
    Hardware,
    /// In-band XON/XOFF bytes pause and resume output.
    Software,
}

/// A [`SerialPort`] over any non-blocking `Read + Write` stream.
///
/// Output is collected into a block of up to `out_block_len` bytes and
/// written on [`SerialPort::flush`] or when the block fills. Input is read
/// ahead in chunks of `in_block_len` bytes. `WouldBlock` from the stream is
/// reported as "no data" / "output full", never as an error; end of stream
/// is [`TransportError::Closed`].
pub struct StreamPort<T> {
    inner: T,
    flow_control: FlowControl,
    in_buf: VecDeque<u8>,
    chunk: Vec<u8>,
    out_buf: Vec<u8>,
    out_block_len: usize,
    paused: bool,
}

impl<T: Read + Write> StreamPort<T> {
    /// Create a port with default 256-byte blocks and hardware flow control.
    pub fn new(inner: T) -> Self {
        Self::with_blocks(inner, FlowControl::Hardware, DEFAULT_BLOCK_LEN, DEFAULT_BLOCK_LEN)
    }

    /// Create a port with explicit flow control and block sizes.
    pub fn with_blocks(
        inner: T,
        flow_control: FlowControl,
        out_block_len: usize,
        in_block_len: usize,
    ) -> Self {
        let out_block_len = out_block_len.max(1);
        let in_block_len = in_block_len.max(1);
        Self {
            inner,
            flow_control,
            in_buf: VecDeque::with_capacity(in_block_len),
            chunk: vec![0u8; in_block_len],
            out_buf: Vec::with_capacity(out_block_len),
            out_block_len,
            paused: false,
        }
    }

    /// Whether output is currently held back by an XOFF from the peer.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the port and return the inner stream. Unflushed output is lost.
    pub fn into_inner(self) -> T {
        self.inner
    }

    fn fill(&mut self) -> Result<()> {
        loop {
            match self.inner.read(&mut self.chunk) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => {
                    trace!(bytes = n, "serial read");
                    self.in_buf.extend(&self.chunk[..n]);
                    return Ok(());
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn drain_output(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.out_buf.len() {
            match self.inner.write(&self.out_buf[offset..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        self.out_buf.drain(..offset);
        Ok(())
    }
}

impl<T: Read + Write> SerialPort for StreamPort<T> {
    fn read_byte(&mut self) -> Result<Option<u8>> {
        loop {
            if self.in_buf.is_empty() {
                self.fill()?;
            }
            let Some(byte) = self.in_buf.pop_front() else {
                return Ok(None);
            };
            match (byte, self.flow_control) {
                (XON | XOFF, FlowControl::Hardware) => {
                    return Err(TransportError::FlowControl(
                        "received XON/XOFF with RTS/CTS flow control",
                    ));
                }
                (XOFF, FlowControl::Software) => {
                    debug!("output paused by XOFF");
                    self.paused = true;
                }
                (XON, FlowControl::Software) => {
                    debug!("output resumed by XON");
                    self.paused = false;
                }
                _ => return Ok(Some(byte)),
            }
        }
    }

    fn write_available(&mut self) -> bool {
        if self.paused {
            return false;
        }
        if self.out_buf.len() >= self.out_block_len {
            // A failed drain leaves the block full; the error resurfaces on flush.
            let _ = self.drain_output();
        }
        self.out_buf.len() < self.out_block_len
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        if self.paused || self.out_buf.len() >= self.out_block_len {
            return Err(TransportError::OutputFull);
        }
        self.out_buf.push(byte);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.drain_output()?;
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn discard_input(&mut self) -> Result<()> {
        self.in_buf.clear();
        loop {
            let before = self.in_buf.len();
            self.fill()?;
            if self.in_buf.len() == before {
                break;
            }
            self.in_buf.clear();
        }
        Ok(())
    }
}

impl<T> std::fmt::Debug for StreamPort<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamPort")
            .field("flow_control", &self.flow_control)
            .field("pending_in", &self.in_buf.len())
            .field("pending_out", &self.out_buf.len())
            .field("paused", &self.paused)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// Read/write stream that never blocks and records everything written.
    #[derive(Default)]
    struct Loop {
        input: Cursor<Vec<u8>>,
        written: Vec<u8>,
        flushed: bool,
    }

    impl Read for Loop {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.input.read(buf)? {
                0 => Err(ErrorKind::WouldBlock.into()),
                n => Ok(n),
            }
        }
    }

    impl Write for Loop {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed = true;
            Ok(())
        }
    }

    fn with_input(bytes: &[u8]) -> Loop {
        Loop {
            input: Cursor::new(bytes.to_vec()),
            ..Loop::default()
        }
    }

    #[test]
    fn reads_bytes_then_reports_no_data() {
        let mut port = StreamPort::new(with_input(b"ab"));
        assert_eq!(port.read_byte().unwrap(), Some(b'a'));
        assert_eq!(port.read_byte().unwrap(), Some(b'b'));
        assert_eq!(port.read_byte().unwrap(), None);
    }

    #[test]
    fn output_is_held_until_flush() {
        let mut port = StreamPort::new(Loop::default());
        port.write_byte(1).unwrap();
        port.write_byte(2).unwrap();
        assert!(port.get_ref().written.is_empty());

        port.flush().unwrap();
        assert_eq!(port.get_ref().written, vec![1, 2]);
        assert!(port.get_ref().flushed);
    }

    #[test]
    fn full_block_is_drained_when_checking_availability() {
        let mut port = StreamPort::with_blocks(Loop::default(), FlowControl::Hardware, 2, 8);
        port.write_byte(1).unwrap();
        port.write_byte(2).unwrap();
        assert!(matches!(port.write_byte(3), Err(TransportError::OutputFull)));

        assert!(port.write_available());
        assert_eq!(port.get_ref().written, vec![1, 2]);
        port.write_byte(3).unwrap();
    }

    #[test]
    fn software_flow_control_pauses_output() {
        let mut port =
            StreamPort::with_blocks(with_input(&[XOFF, 7, XON]), FlowControl::Software, 8, 8);
        assert!(port.write_available());

        assert_eq!(port.read_byte().unwrap(), Some(7));
        assert!(port.is_paused());
        assert!(!port.write_available());

        assert_eq!(port.read_byte().unwrap(), None);
        assert!(!port.is_paused());
        assert!(port.write_available());
    }

    #[test]
    fn xoff_with_hardware_flow_control_is_a_violation() {
        let mut port = StreamPort::new(with_input(&[XOFF]));
        assert!(matches!(
            port.read_byte(),
            Err(TransportError::FlowControl(_))
        ));
    }

    #[test]
    fn would_block_is_reported_as_no_data() {
        struct Blocked;
        impl Read for Blocked {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(ErrorKind::WouldBlock.into())
            }
        }
        impl Write for Blocked {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(ErrorKind::WouldBlock.into())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut port = StreamPort::with_blocks(Blocked, FlowControl::Hardware, 1, 1);
        assert_eq!(port.read_byte().unwrap(), None);
        port.write_byte(9).unwrap();
        assert!(!port.write_available());
        port.flush().unwrap();
    }

    #[test]
    fn end_of_stream_is_closed() {
        struct Eof;
        impl Read for Eof {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Ok(0)
            }
        }
        impl Write for Eof {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut port = StreamPort::new(Eof);
        assert!(matches!(port.read_byte(), Err(TransportError::Closed)));
        assert!(matches!(port.discard_input(), Err(TransportError::Closed)));
    }

    #[test]
    fn discard_input_drops_pending_bytes() {
        let mut port = StreamPort::with_blocks(with_input(b"noise"), FlowControl::Hardware, 8, 2);
        assert_eq!(port.read_byte().unwrap(), Some(b'n'));
        port.discard_input().unwrap();
        assert_eq!(port.read_byte().unwrap(), None);
    }
}
