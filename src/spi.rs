use crate::{
    FtdiError, FtdiMpsse,
    mpsse_cmd::{MAX_BITS_SHIFT, MpsseCmdBuilder},
    transport::Transport,
};
use eh1::{
    delay::DelayNs,
    spi::{Error, ErrorKind, ErrorType, SpiBus},
};

// SPI mode 0 only: data changes on the falling edge of SCK(AD0) and is
// sampled on the rising edge, MSB first. According to AN108-2.2.
// https://ftdichip.com/Support/Documents/AppNotes/AN_108_Command_Processor_for_MPSSE_and_MCU_Host_Bus_Emulation_Modes.pdf

impl<T: Transport, D: DelayNs> FtdiMpsse<T, D> {
    /// Clocks `data` out on MOSI. Nothing is read back.
    pub fn send_spi(&mut self, data: &[u8]) -> Result<(), FtdiError> {
        if data.is_empty() {
            return Ok(());
        }
        let mut cmd = MpsseCmdBuilder::new();
        cmd.shift_bytes_out(data);
        self.exec(cmd)?;
        Ok(())
    }

    /// Full duplex transfer. `data` is replaced by the bytes read from MISO.
    pub fn xfer_spi(&mut self, data: &mut [u8]) -> Result<(), FtdiError> {
        if data.is_empty() {
            return Ok(());
        }
        let mut cmd = MpsseCmdBuilder::new();
        cmd.shift_bytes(data);
        let response = self.exec(cmd)?;
        data.copy_from_slice(&response);
        Ok(())
    }

    /// Transfers the top `bits` bits of `data` and returns the byte read back.
    ///
    /// Zero bits is a no-op returning 0.
    pub fn xfer_spi_bits(&mut self, data: u8, bits: usize) -> Result<u8, FtdiError> {
        if bits == 0 {
            return Ok(0);
        }
        if bits > MAX_BITS_SHIFT {
            return Err(FtdiError::InvalidArgument("at most 8 bits per bit transfer"));
        }
        let mut cmd = MpsseCmdBuilder::new();
        cmd.shift_bits(data, bits);
        Ok(self.exec(cmd)?[0])
    }

    /// Pulses SCK for `bytes` * 8 cycles without transferring data.
    pub fn send_dummy_bytes(&mut self, bytes: usize) -> Result<(), FtdiError> {
        let mut cmd = MpsseCmdBuilder::new();
        cmd.clock_bytes_no_data(bytes);
        self.exec(cmd)?;
        Ok(())
    }

    /// Pulses SCK once without transferring data.
    pub fn send_dummy_bit(&mut self) -> Result<(), FtdiError> {
        self.send_dummy_bits(1)
    }

    pub fn send_dummy_bits(&mut self, bits: usize) -> Result<(), FtdiError> {
        if bits > MAX_BITS_SHIFT {
            return Err(FtdiError::InvalidArgument("at most 8 dummy bits"));
        }
        let mut cmd = MpsseCmdBuilder::new();
        cmd.clock_bits_no_data(bits);
        self.exec(cmd)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FtdiSpiError {
    #[error(transparent)]
    FtdiInner(#[from] FtdiError),
    #[error("embedded-hal::spi::SpiBus transfer with different lengths is not supported.")]
    LengthMismatch,
}
impl Error for FtdiSpiError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// [`SpiBus`] view of a session.
///
/// Chip select is not touched; drive it with [`FtdiMpsse::set_gpio`] or
/// [`FtdiMpsse::set_cs_creset`].
pub struct FtdiSpi<'a, T: Transport, D: DelayNs> {
    mpsse: &'a mut FtdiMpsse<T, D>,
}

impl<'a, T: Transport, D: DelayNs> FtdiSpi<'a, T, D> {
    pub fn new(mpsse: &'a mut FtdiMpsse<T, D>) -> Self {
        Self { mpsse }
    }
}

impl<T: Transport, D: DelayNs> ErrorType for FtdiSpi<'_, T, D> {
    type Error = FtdiSpiError;
}

impl<T: Transport, D: DelayNs> SpiBus<u8> for FtdiSpi<'_, T, D> {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        words.fill(0);
        Ok(self.mpsse.xfer_spi(words)?)
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        Ok(self.mpsse.send_spi(words)?)
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        if read.len() != write.len() {
            return Err(FtdiSpiError::LengthMismatch);
        }
        read.copy_from_slice(write);
        Ok(self.mpsse.xfer_spi(read)?)
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        Ok(self.mpsse.xfer_spi(words)?)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{FtdiSpi, FtdiSpiError};
    use crate::{
        FtdiError, SessionConfig,
        mock::{Call, configured},
    };
    use eh1::spi::SpiBus;

    #[test]
    fn send_writes_header_then_data() {
        let (mut mpsse, state) = configured(SessionConfig::default());
        mpsse.send_spi(&[0x7e, 0xaa, 0x99, 0x7e]).unwrap();
        let state = state.borrow();
        assert_eq!(state.written(), [0x11, 0x03, 0x00, 0x7e, 0xaa, 0x99, 0x7e]);
        assert_eq!(state.bytes_read(), 0);
    }

    #[test]
    fn xfer_reads_back_exactly_n_bytes() {
        for n in [1usize, 2, 17, 256, 1000] {
            let (mut mpsse, state) = configured(SessionConfig::default());
            let sent: Vec<u8> = (0..n).map(|x| (x * 7 + 3) as u8).collect();
            let mut data = sent.clone();
            mpsse.xfer_spi(&mut data).unwrap();
            assert_eq!(data, sent);
            let state = state.borrow();
            let written = state.written();
            assert_eq!(written.len(), 3 + n);
            assert_eq!(written[0], 0x31);
            assert_eq!(u16::from_le_bytes([written[1], written[2]]) as usize, n - 1);
            assert_eq!(state.bytes_read(), n);
            assert!(state.rx.is_empty());
        }
    }

    #[test]
    fn xfer_overwrites_buffer_with_reply() {
        let (mut mpsse, state) = configured(SessionConfig::default());
        {
            let mut state = state.borrow_mut();
            state.loopback = false;
            state.rx.extend([0xde, 0xad]);
        }
        let mut data = [0x01, 0x02];
        mpsse.xfer_spi(&mut data).unwrap();
        assert_eq!(data, [0xde, 0xad]);
    }

    #[test]
    fn empty_transfers_do_no_io() {
        let (mut mpsse, state) = configured(SessionConfig::default());
        mpsse.send_spi(&[]).unwrap();
        mpsse.xfer_spi(&mut []).unwrap();
        assert_eq!(mpsse.xfer_spi_bits(0xff, 0).unwrap(), 0);
        mpsse.send_dummy_bytes(0).unwrap();
        assert!(state.borrow().calls.is_empty());
        assert_eq!(state.borrow().polls, 0);
    }

    #[test]
    fn bit_transfer() {
        let (mut mpsse, state) = configured(SessionConfig::default());
        assert_eq!(mpsse.xfer_spi_bits(0xc0, 2).unwrap(), 0xc0);
        assert_eq!(state.borrow().written(), [0x33, 0x01, 0xc0]);
        assert!(matches!(
            mpsse.xfer_spi_bits(0, 9),
            Err(FtdiError::InvalidArgument(_))
        ));
    }

    #[test]
    fn dummy_clocks() {
        let (mut mpsse, state) = configured(SessionConfig::default());
        mpsse.send_dummy_bytes(7).unwrap();
        mpsse.send_dummy_bit().unwrap();
        assert_eq!(
            state.borrow().calls,
            [Call::Write(vec![0x8f, 0x06, 0x00]), Call::Write(vec![0x8e, 0x00])]
        );
    }

    #[test]
    fn spi_bus_adapter() {
        let (mut mpsse, state) = configured(SessionConfig::default());
        let mut spi = FtdiSpi::new(&mut mpsse);
        let mut read = [0u8; 3];
        spi.transfer(&mut read, &[1, 2, 3]).unwrap();
        assert_eq!(read, [1, 2, 3]);
        spi.write(&[0x55]).unwrap();
        let mut zeros = [0xffu8; 2];
        spi.read(&mut zeros).unwrap();
        assert_eq!(zeros, [0, 0]);
        assert!(matches!(
            spi.transfer(&mut [0; 2], &[1]),
            Err(FtdiSpiError::LengthMismatch)
        ));
        assert_eq!(state.borrow().bytes_read(), 5);
    }
}
