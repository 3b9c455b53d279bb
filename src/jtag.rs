use eh1::delay::DelayNs;

use crate::{
    FtdiError, FtdiMpsse, Pin,
    mpsse_cmd::{MAX_TMS_SHIFT, MpsseCmdBuilder},
    transport::Transport,
};

const TCK_MASK: u8 = Pin::Lower(0).mask();
const TDI_MASK: u8 = Pin::Lower(1).mask();
const TMS_MASK: u8 = Pin::Lower(3).mask();

impl<T: Transport, D: DelayNs> FtdiMpsse<T, D> {
    /// Prepares the lower bank for JTAG and resets the TAP to Test-Logic-Reset.
    ///
    /// TCK, TDI and TMS are outputs with TMS high; TDO(AD2) is an input.
    pub fn jtag_init(&mut self) -> Result<(), FtdiError> {
        self.set_gpio(TMS_MASK, TCK_MASK | TDI_MASK | TMS_MASK)?;
        // five TMS high reach Test-Logic-Reset from any state
        self.jtag_tms(5, 0b1_1111)
    }

    /// Clocks `bits` bits of `pattern` out on TMS, LSB first.
    pub fn jtag_tms(&mut self, bits: usize, pattern: u8) -> Result<(), FtdiError> {
        if bits > MAX_TMS_SHIFT {
            return Err(FtdiError::InvalidArgument("at most 7 TMS bits per shift"));
        }
        let mut cmd = MpsseCmdBuilder::new();
        cmd.clock_tms_out(false, pattern, bits);
        self.exec(cmd)?;
        Ok(())
    }
}
