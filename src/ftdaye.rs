use futures_lite::future::{block_on, zip};
use nusb::transfer::{Control, ControlType, Recipient, RequestBuffer};
use std::{cell::Cell, collections::VecDeque, time::Duration};

use crate::{
    ChipType, FtdiError, Interface,
    list::DeviceLocator,
    transport::{BitMode, Connector, Transport},
};

const SIO_RESET_REQUEST: u8 = 0x00;
const SIO_SET_LATENCY_TIMER_REQUEST: u8 = 0x09;
const SIO_GET_LATENCY_TIMER_REQUEST: u8 = 0x0A;
const SIO_SET_BITMODE_REQUEST: u8 = 0x0B;

const SIO_RESET_SIO: u16 = 0;
const SIO_RESET_PURGE_RX: u16 = 1;
const SIO_RESET_PURGE_TX: u16 = 2;

/// Every bulk-in packet starts with two modem status bytes.
const MODEM_STATUS_LEN: usize = 2;

const CONTROL_TIMEOUT: Duration = Duration::from_secs(1);

/// [`Transport`] over one claimed interface of an FTDI chip, driven through nusb.
pub struct FtdiContext {
    /// USB interface handle, `None` once closed
    handle: Option<nusb::Interface>,
    /// FTDI device interface
    interface: Interface,
    chip_type: ChipType,
    write_ep: u8,
    read_ep: u8,
    max_packet_size: usize,
    /// Payload received beyond what the last read asked for
    pending: VecDeque<u8>,
}

impl FtdiContext {
    /// Opens `usb_device` and claims `interface`.
    pub fn open(usb_device: &nusb::DeviceInfo, interface: Interface) -> Result<Self, FtdiError> {
        let handle = usb_device.open()?;
        let max_packet_size = handle
            .active_configuration()
            .map_err(|e| FtdiError::Usb(e.into()))?
            .interface_alt_settings()
            .next()
            .ok_or(FtdiError::OpenFailed(
                "Failed to get interface info".to_string(),
            ))?
            .endpoints()
            .next()
            .ok_or(FtdiError::OpenFailed(
                "Failed to get endpoint info".to_string(),
            ))?
            .max_packet_size();
        let chip_type = match (
            usb_device.device_version(),
            usb_device.serial_number().unwrap_or(""),
        ) {
            (0x400, _) | (0x200, "") => return Err(FtdiError::UnsupportedChip(ChipType::Bm)),
            (0x200, _) => return Err(FtdiError::UnsupportedChip(ChipType::Am)),
            (0x500, _) => ChipType::FT2232D,
            (0x600, _) => return Err(FtdiError::UnsupportedChip(ChipType::R)),
            (0x700, _) => ChipType::FT2232H,
            (0x800, _) => ChipType::FT4232H,
            (0x900, _) => ChipType::FT232H,
            (0x1000, _) => return Err(FtdiError::UnsupportedChip(ChipType::FT230X)),
            (version, _) => {
                return Err(FtdiError::OpenFailed(format!(
                    "Unknown ChipType version:0x{version:x}"
                )));
            }
        };
        if !chip_type.interface_list().contains(&interface) {
            return Err(FtdiError::OpenFailed(format!(
                "{chip_type:?} do not support Interface::{interface:?}"
            )));
        }
        log::info!(
            "Opened {chip_type:?} [{:#06x}:{:#06x}] on bus {} address {}, Interface::{interface:?}",
            usb_device.vendor_id(),
            usb_device.product_id(),
            usb_device.bus_number(),
            usb_device.device_address()
        );

        let handle = handle.detach_and_claim_interface(interface.interface_number())?;
        Ok(Self {
            handle: Some(handle),
            interface,
            chip_type,
            write_ep: interface.write_ep(),
            read_ep: interface.read_ep(),
            max_packet_size,
            pending: VecDeque::new(),
        })
    }

    pub fn chip_type(&self) -> ChipType {
        self.chip_type
    }

    fn handle(&self) -> Result<&nusb::Interface, FtdiError> {
        self.handle.as_ref().ok_or(FtdiError::NotOpen)
    }

    fn sio_write(&mut self, request: u8, value: u16) -> Result<(), FtdiError> {
        self.handle()?
            .control_out_blocking(
                Control {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request,
                    value,
                    index: self.interface.index(),
                },
                &[],
                CONTROL_TIMEOUT,
            )
            .map_err(std::io::Error::from)?;

        Ok(())
    }

    fn sio_read(&mut self, request: u8, buf: &mut [u8]) -> Result<usize, FtdiError> {
        let len = self
            .handle()?
            .control_in_blocking(
                Control {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request,
                    value: 0,
                    index: self.interface.index(),
                },
                buf,
                CONTROL_TIMEOUT,
            )
            .map_err(std::io::Error::from)?;

        Ok(len)
    }

    /// Issues one bulk-in transfer and queues its payload.
    fn fill_pending(&mut self) -> Result<(), FtdiError> {
        let packet = block_on(
            self.handle()?
                .bulk_in(self.read_ep, RequestBuffer::new(self.max_packet_size)),
        )
        .into_result()
        .map_err(std::io::Error::from)?;
        strip_status(&packet, self.max_packet_size, &mut self.pending);
        Ok(())
    }
}

/// Queues the payload of a bulk-in buffer, dropping the modem status bytes
/// heading every `max_packet_size` chunk.
fn strip_status(packet: &[u8], max_packet_size: usize, pending: &mut VecDeque<u8>) {
    for chunk in packet.chunks(max_packet_size) {
        if chunk.len() > MODEM_STATUS_LEN {
            pending.extend(&chunk[MODEM_STATUS_LEN..]);
        }
    }
}

/// Moves as many queued bytes as fit into `buf`.
fn drain_pending(pending: &mut VecDeque<u8>, buf: &mut [u8]) -> usize {
    let len = buf.len().min(pending.len());
    for (dst, src) in buf.iter_mut().zip(pending.drain(..len)) {
        *dst = src;
    }
    len
}

/// Bulk-out `data` in max-packet batches, stopping at the first short batch.
async fn bulk_write(
    handle: &nusb::Interface,
    endpoint: u8,
    max_packet_size: usize,
    data: &[u8],
) -> Result<usize, FtdiError> {
    let mut written = 0;
    for batch in data.chunks(max_packet_size) {
        let response = handle
            .bulk_out(endpoint, Vec::from(batch))
            .await
            .into_result()
            .map_err(std::io::Error::from)?;
        written += response.actual_length();
        if response.actual_length() < batch.len() {
            break;
        }
    }
    Ok(written)
}

impl Transport for FtdiContext {
    fn usb_reset(&mut self) -> Result<(), FtdiError> {
        self.sio_write(SIO_RESET_REQUEST, SIO_RESET_SIO)
    }

    fn purge_buffers(&mut self) -> Result<(), FtdiError> {
        self.sio_write(SIO_RESET_REQUEST, SIO_RESET_PURGE_RX)?;
        self.sio_write(SIO_RESET_REQUEST, SIO_RESET_PURGE_TX)?;
        self.pending.clear();

        Ok(())
    }

    fn write_data(&mut self, data: &[u8]) -> Result<usize, FtdiError> {
        let handle = self.handle()?;
        block_on(bulk_write(handle, self.write_ep, self.max_packet_size, data))
    }

    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize, FtdiError> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pending.is_empty() {
            self.fill_pending()?;
        }
        Ok(drain_pending(&mut self.pending, buf))
    }

    /// The chip stops taking commands while its reply buffer is full, so the
    /// reply is read while the command is still being written.
    fn write_read(&mut self, data: &[u8], buf: &mut [u8]) -> Result<(usize, usize), FtdiError> {
        let handle = self.handle()?.clone();
        let (write_ep, read_ep, max_packet_size) =
            (self.write_ep, self.read_ep, self.max_packet_size);
        let pending = &mut self.pending;
        let write_stopped = Cell::new(false);

        let write = async {
            let result = bulk_write(&handle, write_ep, max_packet_size, data).await;
            if !matches!(result, Ok(written) if written == data.len()) {
                write_stopped.set(true);
            }
            result
        };
        let read = async {
            let mut received = drain_pending(pending, buf);
            // status packets keep arriving every latency period
            while received < buf.len() && !write_stopped.get() {
                let packet = handle
                    .bulk_in(read_ep, RequestBuffer::new(max_packet_size))
                    .await
                    .into_result()
                    .map_err(std::io::Error::from)?;
                strip_status(&packet, max_packet_size, pending);
                received += drain_pending(pending, &mut buf[received..]);
            }
            Result::<usize, FtdiError>::Ok(received)
        };
        let (written, received) = block_on(zip(write, read));
        Ok((written?, received?))
    }

    fn latency_timer(&mut self) -> Result<u8, FtdiError> {
        let mut value = [0u8; 1];
        if self.sio_read(SIO_GET_LATENCY_TIMER_REQUEST, &mut value)? != 1 {
            return Err(FtdiError::Usb(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "latency timer read returned no data",
            )));
        }
        Ok(value[0])
    }

    fn set_latency_timer(&mut self, value: u8) -> Result<(), FtdiError> {
        if value < 1 {
            return Err(FtdiError::InvalidArgument(
                "latency must be between 1 and 255",
            ));
        }
        self.sio_write(SIO_SET_LATENCY_TIMER_REQUEST, value as u16)
    }

    fn set_bitmode(&mut self, mask: u8, mode: BitMode) -> Result<(), FtdiError> {
        self.sio_write(
            SIO_SET_BITMODE_REQUEST,
            u16::from_le_bytes([mask, mode as u8]),
        )
    }

    fn close(&mut self) {
        if self.handle.take().is_some() {
            log::debug!("Closed Interface::{:?}", self.interface);
        }
        self.pending.clear();
    }
}

/// Opens [`FtdiContext`]s from the USB bus.
#[derive(Debug, Default, Clone, Copy)]
pub struct NusbConnector;

impl Connector for NusbConnector {
    type Transport = FtdiContext;

    fn open(
        &mut self,
        vendor_id: u16,
        product_id: u16,
        interface: Interface,
    ) -> Result<FtdiContext, FtdiError> {
        let usb_device = nusb::list_devices()?
            .find(|info| info.vendor_id() == vendor_id && info.product_id() == product_id)
            .ok_or_else(|| {
                FtdiError::OpenFailed(format!("no device {vendor_id:#06x}:{product_id:#06x}"))
            })?;
        FtdiContext::open(&usb_device, interface)
    }

    fn open_locator(
        &mut self,
        locator: &DeviceLocator,
        interface: Interface,
    ) -> Result<FtdiContext, FtdiError> {
        FtdiContext::open(&locator.find()?, interface)
    }
}
