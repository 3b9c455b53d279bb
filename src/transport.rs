use crate::{FtdiError, Interface, list::DeviceLocator};

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BitMode {
    Reset = 0,
    Bitbang = 1,
    Mpsse = 2,
    SyncBb = 4,
    Mcu = 8,
    Opto = 16,
    Cbus = 32,
    SyncFf = 64,
    Ft1284 = 128,
}

/// Byte stream channel to one interface of an FTDI chip.
///
/// Dropping the transport releases (deinitializes) it.
pub trait Transport {
    /// Resets the SIO state of the chip.
    fn usb_reset(&mut self) -> Result<(), FtdiError>;
    /// Clears both the chip's RX and TX buffers.
    fn purge_buffers(&mut self) -> Result<(), FtdiError>;
    /// Writes `data` and returns how many bytes the device accepted.
    fn write_data(&mut self, data: &[u8]) -> Result<usize, FtdiError>;
    /// Reads whatever is available into `buf`.
    ///
    /// Returns `Ok(0)` when nothing is pending; never waits for more data.
    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize, FtdiError>;
    /// Writes `data` while collecting its reply into `buf`.
    ///
    /// Returns `(written, received)`. The caller polls [`read_data`](Self::read_data)
    /// for whatever of `buf` is still missing. Devices that stall their command
    /// input once the reply buffer is full must read concurrently here.
    fn write_read(&mut self, data: &[u8], _buf: &mut [u8]) -> Result<(usize, usize), FtdiError> {
        Ok((self.write_data(data)?, 0))
    }
    fn latency_timer(&mut self) -> Result<u8, FtdiError>;
    fn set_latency_timer(&mut self, value: u8) -> Result<(), FtdiError>;
    fn set_bitmode(&mut self, mask: u8, mode: BitMode) -> Result<(), FtdiError>;
    /// Closes the USB connection. Further calls fail with [`FtdiError::NotOpen`].
    fn close(&mut self);
}

/// Opens [`Transport`]s.
pub trait Connector {
    type Transport: Transport;

    /// Opens the first device matching `vendor_id:product_id`.
    fn open(
        &mut self,
        vendor_id: u16,
        product_id: u16,
        interface: Interface,
    ) -> Result<Self::Transport, FtdiError>;

    /// Opens the device described by `locator`.
    fn open_locator(
        &mut self,
        locator: &DeviceLocator,
        interface: Interface,
    ) -> Result<Self::Transport, FtdiError>;
}
