use crate::error::Result;

/// A non-blocking, byte-oriented serial link.
///
/// Implementations never wait for the device: reads report "no data" with
/// `Ok(None)` and writers expose [`SerialPort::write_available`] so that
/// callers can stop before the output buffer overflows.
pub trait SerialPort {
    /// Read the next available input byte, or `Ok(None)` if none is pending.
    fn read_byte(&mut self) -> Result<Option<u8>>;

    /// Returns `true` if at least one more byte can be queued for output.
    fn write_available(&mut self) -> bool;

    /// Queue one byte for output.
    ///
    /// Returns [`TransportError::OutputFull`](crate::TransportError::OutputFull)
    /// if called while [`SerialPort::write_available`] is `false`.
    fn write_byte(&mut self, byte: u8) -> Result<()>;

    /// Push any queued output bytes towards the device.
    fn flush(&mut self) -> Result<()>;

    /// Drop all input received so far.
    fn discard_input(&mut self) -> Result<()> {
        while self.read_byte()?.is_some() {}
        Ok(())
    }
}

impl<T: SerialPort + ?Sized> SerialPort for &mut T {
    fn read_byte(&mut self) -> Result<Option<u8>> {
        (**self).read_byte()
    }

    fn write_available(&mut self) -> bool {
        (**self).write_available()
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        (**self).write_byte(byte)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn discard_input(&mut self) -> Result<()> {
        (**self).discard_input()
    }
}

impl<T: SerialPort + ?Sized> SerialPort for Box<T> {
    fn read_byte(&mut self) -> Result<Option<u8>> {
        (**self).read_byte()
    }

    fn write_available(&mut self) -> bool {
        (**self).write_available()
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        (**self).write_byte(byte)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn discard_input(&mut self) -> Result<()> {
        (**self).discard_input()
    }
}
