//! Multi-protocol synchronous serial engine command encoding.
//!
//! AN108: <https://ftdichip.com/Support/Documents/AppNotes/AN_108_Command_Processor_for_MPSSE_and_MCU_Host_Bus_Emulation_Modes.pdf>

/// MPSSE opcodes.
///
/// Data clocking MPSSE commands are built by [`MpsseShiftCmd`].
#[repr(u8)]
#[derive(Debug, Copy, Clone)]
enum MpsseCmd {
    /// Used by [`MpsseCmdBuilder::set_gpio_lower`].
    SetDataBitsLowbyte = 0x80,
    /// Used by [`MpsseCmdBuilder::gpio_lower`].
    GetDataBitsLowbyte = 0x81,
    /// Used by [`MpsseCmdBuilder::set_gpio_upper`].
    SetDataBitsHighbyte = 0x82,
    /// Used by [`MpsseCmdBuilder::gpio_upper`].
    GetDataBitsHighbyte = 0x83,
    /// Used by [`MpsseCmdBuilder::set_clock`].
    SetClockFrequency = 0x86,
    /// Used by [`MpsseCmdBuilder::set_clock`].
    DisableClockDivideBy5 = 0x8A,
    /// Used by [`MpsseCmdBuilder::set_clock`].
    EnableClockDivideBy5 = 0x8B,
    /// Used by [`MpsseCmdBuilder::clock_bits_no_data`].
    ClockBitsNoData = 0x8E,
    /// Used by [`MpsseCmdBuilder::clock_bytes_no_data`].
    ClockBytesNoData = 0x8F,
}

/// Command for data shift of the FTDI device.
///
/// All the command it constructed are vaild. According to two following test function.
///
/// When tms_write is false:
///
/// TDI(AD1) can only can output on second edge.
///
/// TDO(AD2) can only can sample on first edge.
///
/// When tms_write is true:
///
/// Only the LSB and bit mode flags are set, plus tdo_read when sampling TDO.
#[bitfield_struct::bitfield(u8, order = Lsb)]
struct MpsseShiftCmd {
    is_tdi_neg_write: bool,
    #[bits(default = true)] // when tms enable, this const true
    is_bit_mode: bool,
    is_tdo_neg_read: bool,
    #[bits(default = true)] // when tms enable, this const true
    is_lsb: bool,
    is_tdi_write: bool,
    is_tdo_read: bool,
    #[bits(default = false)]
    is_tms_write: bool,
    #[bits(default = false)]
    _const_0: bool,
}
impl MpsseShiftCmd {
    fn shift(
        tck_init_value: bool,
        is_bit_mode: bool,
        is_lsb: bool,
        is_tdi_write: bool,
        is_tdo_read: bool,
    ) -> u8 {
        assert!(
            is_tdi_write | is_tdo_read,
            "tdi_write and tdo_read can not both be false"
        );
        MpsseShiftCmd::new()
            .with_is_tdi_neg_write((!tck_init_value) && is_tdi_write)
            .with_is_bit_mode(is_bit_mode)
            .with_is_tdo_neg_read(tck_init_value && is_tdo_read)
            .with_is_lsb(is_lsb)
            .with_is_tdi_write(is_tdi_write)
            .with_is_tdo_read(is_tdo_read)
            .into()
    }
    fn tms_shift(tdo_read: bool) -> u8 {
        // TMS, LSB first, bit mode; no edge flags.
        MpsseShiftCmd::new()
            .with_is_tdo_read(tdo_read)
            .with_is_tms_write(true)
            .into()
    }
}

/// SPI mode 0: SCK idles low, data changes on the falling edge.
const TCK_INIT_VALUE: bool = false;
const IS_LSB: bool = false;

pub(crate) const MAX_BYTES_SHIFT: usize = 65536;
pub(crate) const MAX_BITS_SHIFT: usize = 8;
pub(crate) const MAX_TMS_SHIFT: usize = 7;

/// FTDI Multi-Protocol Synchronous Serial Engine (MPSSE) command builder.
///
/// This structure is a `Vec<u8>` that the methods push bytewise commands onto,
/// together with the number of reply bytes the commands will produce.
/// Every length field is emitted as `count - 1`; a count of zero emits nothing.
#[derive(Default, Debug)]
pub(crate) struct MpsseCmdBuilder {
    cmd: Vec<u8>,
    read_len: usize,
}
impl MpsseCmdBuilder {
    /// Create a new command builder.
    pub(crate) fn new() -> MpsseCmdBuilder {
        Default::default()
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.cmd
    }

    /// Number of reply bytes the device sends for these commands.
    pub(crate) fn read_len(&self) -> usize {
        self.read_len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.cmd.is_empty()
    }

    /// Set the MPSSE clock frequency using provided
    /// divisor value and clock divider configuration.
    pub(crate) fn set_clock(&mut self, divisor: u16, clk_div_by5: Option<bool>) -> &mut Self {
        match clk_div_by5 {
            Some(true) => self.cmd.push(MpsseCmd::EnableClockDivideBy5 as u8),
            Some(false) => self.cmd.push(MpsseCmd::DisableClockDivideBy5 as u8),
            None => {}
        };
        self.cmd.push(MpsseCmd::SetClockFrequency as u8);
        self.cmd.extend_from_slice(&divisor.to_le_bytes());
        self
    }

    /// Set the pin direction and state of the lower byte (0-7) GPIO pins on the
    /// MPSSE interface.
    ///
    /// # Arguments
    ///
    /// * `state` - GPIO state mask, `0` is low (or input pin), `1` is high.
    /// * `direction` - GPIO direction mask, `0` is input, `1` is output.
    pub(crate) fn set_gpio_lower(&mut self, state: u8, direction: u8) -> &mut Self {
        self.cmd
            .extend_from_slice(&[MpsseCmd::SetDataBitsLowbyte as u8, state, direction]);
        self
    }

    /// Set the pin direction and state of the upper byte (8-15) GPIO pins on
    /// the MPSSE interface.
    ///
    /// The FT4232H has no upper pins; the command is accepted and ignored.
    pub(crate) fn set_gpio_upper(&mut self, state: u8, direction: u8) -> &mut Self {
        self.cmd
            .extend_from_slice(&[MpsseCmd::SetDataBitsHighbyte as u8, state, direction]);
        self
    }

    /// Get the pin state of the lower byte (0-7) GPIO pins.
    pub(crate) fn gpio_lower(&mut self) -> &mut Self {
        self.read_len += 1;
        self.cmd.push(MpsseCmd::GetDataBitsLowbyte as u8);
        self
    }

    /// Get the pin state of the upper byte (8-15) GPIO pins.
    pub(crate) fn gpio_upper(&mut self) -> &mut Self {
        self.read_len += 1;
        self.cmd.push(MpsseCmd::GetDataBitsHighbyte as u8);
        self
    }

    fn push_len16(&mut self, len: usize) {
        let len = (len - 1) as u16;
        self.cmd.extend_from_slice(&len.to_le_bytes());
    }

    /// Clock bytes out MSB first on the falling edge. Nothing is read.
    ///
    /// Data longer than 65536 bytes is split over several commands.
    pub(crate) fn shift_bytes_out(&mut self, data: &[u8]) -> &mut Self {
        for slice in data.chunks(MAX_BYTES_SHIFT) {
            self.cmd
                .push(MpsseShiftCmd::shift(TCK_INIT_VALUE, false, IS_LSB, true, false));
            self.push_len16(slice.len());
            self.cmd.extend_from_slice(slice);
        }
        self
    }

    /// Clock bytes out and in simultaneously, one reply byte per byte sent.
    pub(crate) fn shift_bytes(&mut self, data: &[u8]) -> &mut Self {
        for slice in data.chunks(MAX_BYTES_SHIFT) {
            self.read_len += slice.len();
            self.cmd
                .push(MpsseShiftCmd::shift(TCK_INIT_VALUE, false, IS_LSB, true, true));
            self.push_len16(slice.len());
            self.cmd.extend_from_slice(slice);
        }
        self
    }

    /// Clock `len` bits of `data` out and in. The bits are left justified.
    ///
    /// This will panic for values greater than 8.
    pub(crate) fn shift_bits(&mut self, data: u8, len: usize) -> &mut Self {
        if len == 0 {
            return self;
        }
        assert!(
            len <= MAX_BITS_SHIFT,
            "data length should be less than {MAX_BITS_SHIFT}"
        );
        self.read_len += 1;
        self.cmd.extend_from_slice(&[
            MpsseShiftCmd::shift(TCK_INIT_VALUE, true, IS_LSB, true, true),
            (len - 1) as u8,
            data,
        ]);
        self
    }

    /// Clock TMS bits out, LSB first.
    ///
    /// * `tdi` - Value to place on TDI while clocking (bit 7 of the data byte).
    ///
    /// This will panic for values greater than 7.
    pub(crate) fn clock_tms_out(&mut self, tdi: bool, data: u8, len: usize) -> &mut Self {
        if len == 0 {
            return self;
        }
        assert!(
            len <= MAX_TMS_SHIFT,
            "data length should be less than {MAX_TMS_SHIFT}"
        );
        let data = if tdi { data | 0x80 } else { data };
        self.cmd
            .extend_from_slice(&[MpsseShiftCmd::tms_shift(false), (len - 1) as u8, data]);
        self
    }

    /// Pulse the clock for `len` bytes (8 * `len` edges) without moving data.
    pub(crate) fn clock_bytes_no_data(&mut self, mut len: usize) -> &mut Self {
        while len > 0 {
            let chunk = len.min(MAX_BYTES_SHIFT);
            self.cmd.push(MpsseCmd::ClockBytesNoData as u8);
            self.push_len16(chunk);
            len -= chunk;
        }
        self
    }

    /// Pulse the clock for `len` bits without moving data.
    ///
    /// This will panic for values greater than 8.
    pub(crate) fn clock_bits_no_data(&mut self, len: usize) -> &mut Self {
        if len == 0 {
            return self;
        }
        assert!(
            len <= MAX_BITS_SHIFT,
            "data length should be less than {MAX_BITS_SHIFT}"
        );
        self.cmd
            .extend_from_slice(&[MpsseCmd::ClockBitsNoData as u8, (len - 1) as u8]);
        self
    }
}
