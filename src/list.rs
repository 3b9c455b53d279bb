use std::{fmt, str::FromStr};

use nusb::DeviceInfo;

use crate::{ChipType, FtdiError, Interface};

/// (VID, PID) pairs probed, in order, when no locator is given.
pub const DEFAULT_DEVICE_IDS: [(u16, u16); 2] = [
    // FT2232C/D/H Dual UART/FIFO IC
    (0x0403, 0x6010),
    // FT232H Single HS USB-UART/FIFO IC
    (0x0403, 0x6014),
];

/// Known properties associated to particular FTDI chip types.
#[derive(Debug, Clone, Copy)]
struct FtdiDevice {
    /// The (VID, PID) pair of this device.
    id: (u16, u16),
    /// FTDI chip type assumed when listing.
    fallback_chip_type: ChipType,
}

static FTDI_COMPAT_DEVICES: &[FtdiDevice] = &[
    FtdiDevice {
        id: (0x0403, 0x6010),
        fallback_chip_type: ChipType::FT2232H,
    },
    FtdiDevice {
        id: (0x0403, 0x6011),
        fallback_chip_type: ChipType::FT4232H,
    },
    FtdiDevice {
        id: (0x0403, 0x6014),
        fallback_chip_type: ChipType::FT232H,
    },
];

pub struct FtdiDeviceInfo {
    pub usb_device: DeviceInfo,
    pub chip_type: ChipType,
    pub interface: &'static [Interface],
}

/// Lists every attached device with a known FTDI VID/PID.
pub fn list_all_device() -> Result<Vec<FtdiDeviceInfo>, FtdiError> {
    fn filter_map(info: DeviceInfo) -> Option<FtdiDeviceInfo> {
        let device = FTDI_COMPAT_DEVICES
            .iter()
            .find(|device| (info.vendor_id(), info.product_id()) == device.id)?;
        log::info!(
            "Find {:?}:[{:#06x?},{:#06x?}]",
            device.fallback_chip_type,
            device.id.0,
            device.id.1
        );
        Some(FtdiDeviceInfo {
            usb_device: info,
            chip_type: device.fallback_chip_type,
            interface: device.fallback_chip_type.interface_list(),
        })
    }
    Ok(nusb::list_devices()?.filter_map(filter_map).collect())
}

/// Selects one physical device, in libftdi's device string syntax.
///
/// * `d:<bus>/<address>`
/// * `i:<vendor>:<product>` or `i:<vendor>:<product>:<index>`
/// * `s:<vendor>:<product>:<serial>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceLocator {
    BusAddress {
        bus: u8,
        address: u8,
    },
    Id {
        vendor_id: u16,
        product_id: u16,
        index: usize,
    },
    Serial {
        vendor_id: u16,
        product_id: u16,
        serial: String,
    },
}

impl DeviceLocator {
    /// Finds the device this locator refers to.
    pub(crate) fn find(&self) -> Result<DeviceInfo, FtdiError> {
        let mut devices = nusb::list_devices()?;
        let found = match self {
            DeviceLocator::BusAddress { bus, address } => {
                devices.find(|info| info.bus_number() == *bus && info.device_address() == *address)
            }
            DeviceLocator::Id {
                vendor_id,
                product_id,
                index,
            } => devices
                .filter(|info| info.vendor_id() == *vendor_id && info.product_id() == *product_id)
                .nth(*index),
            DeviceLocator::Serial {
                vendor_id,
                product_id,
                serial,
            } => devices.find(|info| {
                info.vendor_id() == *vendor_id
                    && info.product_id() == *product_id
                    && info.serial_number() == Some(serial.as_str())
            }),
        };
        found.ok_or_else(|| {
            FtdiError::OpenFailed(format!("Can't find iCE FTDI USB device (device string {self})"))
        })
    }
}

fn parse_number<T: TryFrom<u32>>(s: &str, what: &str, whole: &str) -> Result<T, FtdiError> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed
        .ok()
        .and_then(|value| T::try_from(value).ok())
        .ok_or_else(|| FtdiError::BadLocator(format!("{whole}: bad {what} `{s}`")))
}

impl FromStr for DeviceLocator {
    type Err = FtdiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || FtdiError::BadLocator(s.to_string());
        let (kind, rest) = s.split_once(':').ok_or_else(bad)?;
        match kind {
            "d" => {
                let (bus, address) = rest.split_once('/').ok_or_else(bad)?;
                Ok(DeviceLocator::BusAddress {
                    bus: parse_number(bus, "bus", s)?,
                    address: parse_number(address, "address", s)?,
                })
            }
            "i" => {
                let mut fields = rest.split(':');
                let vendor_id = parse_number(fields.next().ok_or_else(bad)?, "vendor", s)?;
                let product_id = parse_number(fields.next().ok_or_else(bad)?, "product", s)?;
                let index = match fields.next() {
                    Some(index) => parse_number::<u32>(index, "index", s)? as usize,
                    None => 0,
                };
                if fields.next().is_some() {
                    return Err(bad());
                }
                Ok(DeviceLocator::Id {
                    vendor_id,
                    product_id,
                    index,
                })
            }
            "s" => {
                let mut fields = rest.splitn(3, ':');
                let vendor_id = parse_number(fields.next().ok_or_else(bad)?, "vendor", s)?;
                let product_id = parse_number(fields.next().ok_or_else(bad)?, "product", s)?;
                let serial = fields.next().filter(|serial| !serial.is_empty());
                Ok(DeviceLocator::Serial {
                    vendor_id,
                    product_id,
                    serial: serial.ok_or_else(bad)?.to_string(),
                })
            }
            _ => Err(bad()),
        }
    }
}

impl fmt::Display for DeviceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceLocator::BusAddress { bus, address } => write!(f, "d:{bus:03}/{address:03}"),
            DeviceLocator::Id {
                vendor_id,
                product_id,
                index,
            } => write!(f, "i:{vendor_id:#06x}:{product_id:#06x}:{index}"),
            DeviceLocator::Serial {
                vendor_id,
                product_id,
                serial,
            } => write!(f, "s:{vendor_id:#06x}:{product_id:#06x}:{serial}"),
        }
    }
}
