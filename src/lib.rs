//! MPSSE transport layer for FTDI based iCE40 / FPGA programmers.
//!
//! Translates SPI, JTAG TMS and GPIO requests into the exact byte stream the
//! FTDI Multi-Protocol Synchronous Serial Engine expects and reads the replies
//! back synchronously, so the command channel never falls out of step.
//!
//! Everything goes through one [`FtdiMpsse`] session. Operations return
//! [`FtdiError`]; the session's [`abort`](FtdiMpsse::abort) drains the channel,
//! restores the device and hands back an [`Abort`] which terminates the process
//! with [`EXIT_FATAL`].
//!
//! # Quickstart
//!
//! ```no_run
//! use ice_mpsse::{FtdiMpsse, NusbConnector, SessionConfig};
//!
//! let cdone = FtdiMpsse::new(SessionConfig::default())
//!     .run(&mut NusbConnector, |mpsse| mpsse.cdone())
//!     .unwrap_or_else(|abort| abort.exit());
//! println!("CDONE: {cdone}");
//! ```
//!
//! # Limitations
//!
//! * Linux users only: Add udev rules for the FTDI device.
//! * Supported devices: FT2232H, FT4232H, FT232H (and FT2232D at reduced speed).

#![forbid(unsafe_code)]

mod abort;
mod config;
pub mod delay;
mod ftdaye;
pub mod gpio;
mod jtag;
mod list;
#[cfg(test)]
mod mock;
mod mpsse;
mod mpsse_cmd;
pub mod spi;
mod transport;

pub use abort::Abort;
pub use config::{ClockSpeed, SessionConfig};
pub use ftdaye::{FtdiContext, NusbConnector};
pub use list::{DEFAULT_DEVICE_IDS, DeviceLocator, FtdiDeviceInfo, list_all_device};
pub use mpsse::{FtdiMpsse, SessionState};
pub use transport::{BitMode, Connector, Transport};

/// Process exit status used for every transport or protocol failure.
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipType {
    Am,
    Bm,
    FT2232D,
    R,
    FT2232H,
    FT4232H,
    FT232H,
    FT230X,
}
impl ChipType {
    pub(crate) const fn interface_list(self) -> &'static [Interface] {
        match self {
            ChipType::FT232H => &[Interface::A],
            ChipType::FT2232H | ChipType::FT2232D => &[Interface::A, Interface::B],
            ChipType::FT4232H => &[Interface::A, Interface::B, Interface::C, Interface::D],
            _ => &[],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Interface {
    #[default]
    A = 1,
    B = 2,
    C = 3,
    D = 4,
}

impl Interface {
    /// Maps a zero based interface number to an interface.
    ///
    /// Anything outside `0..=3` selects [`Interface::A`].
    pub const fn from_index(index: usize) -> Self {
        match index {
            1 => Interface::B,
            2 => Interface::C,
            3 => Interface::D,
            _ => Interface::A,
        }
    }

    pub(crate) const fn read_ep(self) -> u8 {
        match self {
            Interface::A => 0x81,
            Interface::B => 0x83,
            Interface::C => 0x85,
            Interface::D => 0x87,
        }
    }

    pub(crate) const fn write_ep(self) -> u8 {
        match self {
            Interface::A => 0x02,
            Interface::B => 0x04,
            Interface::C => 0x06,
            Interface::D => 0x08,
        }
    }

    pub(crate) const fn index(self) -> u16 {
        self as u16
    }

    pub(crate) const fn interface_number(self) -> u8 {
        (self as u8) - 1
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Pin {
    Lower(usize),
    Upper(usize),
}
impl Pin {
    pub const fn mask(self) -> u8 {
        match self {
            Pin::Lower(idx) => 1 << idx,
            Pin::Upper(idx) => 1 << idx,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FtdiError {
    #[error("A USB transport error occurred: {0}")]
    Usb(#[from] std::io::Error),

    #[error("Open failed: {0}")]
    /// No matching device could be opened.
    OpenFailed(String),

    #[error("Unsupported chip type: {0:?}")]
    /// The connected device is not supported by the driver.
    UnsupportedChip(ChipType),

    #[error("Write error (rc={written}, expected {expected})")]
    ShortWrite { written: usize, expected: usize },

    #[error("Read timed out ({received} of {expected} bytes)")]
    /// Only produced when a read timeout is configured.
    Timeout { expected: usize, received: usize },

    #[error("Device is not open")]
    NotOpen,

    #[error("Operation not allowed in session state {0:?}")]
    InvalidState(SessionState),

    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("Bad device locator: {0}")]
    BadLocator(String),
}
