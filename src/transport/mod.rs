//! Abstract byte-stream link to the device.
use crate::error::Result;

pub use self::serial::{Baudrate, SerialTransport};
pub use self::sim::SimDevice;

mod serial;
mod sim;

/// Abstraction of the transport layer.
/// A serial port in practice, or an in-memory device for testing.
pub trait Transport {
    /// Transmit `raw` in order.
    fn send(&mut self, raw: &[u8]) -> Result<()>;
    /// Number of received bytes buffered and ready to read.
    fn bytes_available(&mut self) -> Result<usize>;
    /// Read `n` bytes. Only called once at least `n` bytes are available.
    fn receive(&mut self, n: usize) -> Result<Vec<u8>>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, raw: &[u8]) -> Result<()> {
        (**self).send(raw)
    }

    fn bytes_available(&mut self) -> Result<usize> {
        (**self).bytes_available()
    }

    fn receive(&mut self, n: usize) -> Result<Vec<u8>> {
        (**self).receive(n)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, raw: &[u8]) -> Result<()> {
        (**self).send(raw)
    }

    fn bytes_available(&mut self) -> Result<usize> {
        (**self).bytes_available()
    }

    fn receive(&mut self, n: usize) -> Result<Vec<u8>> {
        (**self).receive(n)
    }
}
