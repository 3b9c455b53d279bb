//! GPIO bank access and the iCE40 programmer pinout.
//!
//! | BUS IO | Signal | Control |
//! |--------|--------|---------|
//! | xDBUS0 | SCK    | MPSSE   |
//! | xDBUS1 | MOSI   | MPSSE   |
//! | xDBUS2 | MISO   | MPSSE   |
//! | xDBUS3 | nc     |         |
//! | xDBUS4 | CS     | GPIO    |
//! | xDBUS5 | nc     |         |
//! | xDBUS6 | CDONE  | GPIO    |
//! | xDBUS7 | CRESET | GPIO    |
//!
//! Pin levels are never cached: every read asks the device.

use eh1::delay::DelayNs;

use crate::{FtdiError, FtdiMpsse, Pin, mpsse_cmd::MpsseCmdBuilder, transport::Transport};

pub const SCK_MASK: u8 = Pin::Lower(0).mask();
pub const MOSI_MASK: u8 = Pin::Lower(1).mask();
pub const MISO_MASK: u8 = Pin::Lower(2).mask();
pub const CS_MASK: u8 = Pin::Lower(4).mask();
pub const CDONE_MASK: u8 = Pin::Lower(6).mask();
pub const CRESET_MASK: u8 = Pin::Lower(7).mask();

/// Outputs while programming: SCK, MOSI, CS and CRESET.
pub const ICE_DIRECTION: u8 = SCK_MASK | MOSI_MASK | CS_MASK | CRESET_MASK;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioBank {
    /// Pins 0-7 (ADBUS / BDBUS)
    Low,
    /// Pins 8-15 (ACBUS / BCBUS)
    High,
}

impl<T: Transport, D: DelayNs> FtdiMpsse<T, D> {
    /// Drives a GPIO bank. `direction` bits set to 1 are outputs.
    pub fn set_gpio_bank(
        &mut self,
        bank: GpioBank,
        value: u8,
        direction: u8,
    ) -> Result<(), FtdiError> {
        let mut cmd = MpsseCmdBuilder::new();
        match bank {
            GpioBank::Low => cmd.set_gpio_lower(value, direction),
            GpioBank::High => cmd.set_gpio_upper(value, direction),
        };
        self.exec(cmd)?;
        Ok(())
    }

    /// Samples the pins of a GPIO bank.
    pub fn read_gpio(&mut self, bank: GpioBank) -> Result<u8, FtdiError> {
        let mut cmd = MpsseCmdBuilder::new();
        match bank {
            GpioBank::Low => cmd.gpio_lower(),
            GpioBank::High => cmd.gpio_upper(),
        };
        Ok(self.exec(cmd)?[0])
    }

    pub fn set_gpio(&mut self, value: u8, direction: u8) -> Result<(), FtdiError> {
        self.set_gpio_bank(GpioBank::Low, value, direction)
    }

    pub fn read_gpio_low(&mut self) -> Result<u8, FtdiError> {
        self.read_gpio(GpioBank::Low)
    }

    pub fn read_gpio_high(&mut self) -> Result<u8, FtdiError> {
        self.read_gpio(GpioBank::High)
    }

    /// Sets the CS and CRESET lines, everything else low.
    pub fn set_cs_creset(&mut self, cs: bool, creset: bool) -> Result<(), FtdiError> {
        let mut value = 0;
        if cs {
            value |= CS_MASK;
        }
        if creset {
            value |= CRESET_MASK;
        }
        self.set_gpio(value, ICE_DIRECTION)
    }

    /// Whether the FPGA reports configuration done.
    pub fn cdone(&mut self) -> Result<bool, FtdiError> {
        Ok(self.read_gpio_low()? & CDONE_MASK != 0)
    }
}
