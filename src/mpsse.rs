use eh1::delay::DelayNs;
use std::time::Instant;

use crate::{
    EXIT_FATAL, FtdiError,
    abort::Abort,
    config::SessionConfig,
    delay::Delay,
    list::DEFAULT_DEVICE_IDS,
    mpsse_cmd::MpsseCmdBuilder,
    transport::{BitMode, Connector, Transport},
};

/// Base MPSSE clock with divide-by-5 enabled (60 MHz / 5 / 2).
const BASE_FREQUENCY: usize = 6_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Opened,
    Configured,
    Closed,
}

/// One live connection to an FTDI interface running in MPSSE mode.
///
/// The session owns the transport together with the latency timer value it
/// replaced, so both a normal [`close`](Self::close) and an
/// [`abort`](Self::abort) can put the device back the way it was found.
/// A session is used for one run only; create a new one to reconnect.
pub struct FtdiMpsse<T: Transport, D: DelayNs = Delay> {
    /// Device handle, `None` before open and after teardown
    pub(crate) transport: Option<T>,
    pub(crate) state: SessionState,
    pub(crate) config: SessionConfig,
    /// Latency timer found on the device, set once ours is in place
    pub(crate) saved_latency: Option<u8>,
    /// Backoff between polls for reply bytes
    delay: D,
}

impl<T: Transport> FtdiMpsse<T> {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_delay(config, Delay)
    }
}

impl<T: Transport, D: DelayNs> FtdiMpsse<T, D> {
    pub fn with_delay(config: SessionConfig, delay: D) -> Self {
        Self {
            transport: None,
            state: SessionState::Uninitialized,
            config,
            saved_latency: None,
            delay,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Opens the device named by the configured locator, or else the first
    /// of [`DEFAULT_DEVICE_IDS`] that can be opened.
    pub fn open<C>(&mut self, connector: &mut C) -> Result<(), FtdiError>
    where
        C: Connector<Transport = T>,
    {
        if self.state != SessionState::Uninitialized {
            return Err(FtdiError::InvalidState(self.state));
        }
        let interface = self.config.interface;
        let transport = match &self.config.locator {
            Some(locator) => connector.open_locator(locator, interface).inspect_err(|e| {
                log::error!("Can't find iCE FTDI USB device (device string {locator}): {e}")
            })?,
            None => DEFAULT_DEVICE_IDS
                .iter()
                .find_map(|&(vendor_id, product_id)| {
                    connector
                        .open(vendor_id, product_id, interface)
                        .inspect_err(|e| {
                            log::debug!("{vendor_id:#06x}:{product_id:#06x} not opened: {e}")
                        })
                        .ok()
                })
                .ok_or_else(|| {
                    FtdiError::OpenFailed(
                        "Can't find iCE FTDI USB device (vendor_id 0x0403, device_id 0x6010 or 0x6014)"
                            .to_string(),
                    )
                })?,
        };
        self.transport = Some(transport);
        self.state = SessionState::Opened;
        Ok(())
    }

    /// Puts an opened device into MPSSE mode at the configured clock.
    pub fn configure(&mut self) -> Result<(), FtdiError> {
        if self.state != SessionState::Opened {
            return Err(FtdiError::InvalidState(self.state));
        }
        let latency_timer = self.config.latency_timer;
        let transport = self.transport.as_mut().ok_or(FtdiError::NotOpen)?;
        transport
            .usb_reset()
            .inspect_err(|e| log::error!("Failed to reset iCE FTDI USB device: {e}"))?;
        transport
            .purge_buffers()
            .inspect_err(|e| log::error!("Failed to purge buffers on iCE FTDI USB device: {e}"))?;
        let saved = transport
            .latency_timer()
            .inspect_err(|e| log::error!("Failed to get latency timer: {e}"))?;
        transport
            .set_latency_timer(latency_timer)
            .inspect_err(|e| log::error!("Failed to set latency timer: {e}"))?;
        self.saved_latency = Some(saved);
        log::debug!("Latency timer {saved}ms -> {latency_timer}ms");
        // all pins output
        transport
            .set_bitmode(0xff, BitMode::Mpsse)
            .inspect_err(|e| log::error!("Failed to set BITMODE_MPSSE on iCE FTDI USB device: {e}"))?;

        self.set_frequency(self.config.clock.frequency_hz())?;
        self.state = SessionState::Configured;
        Ok(())
    }

    /// [`open`](Self::open) followed by [`configure`](Self::configure).
    pub fn init<C>(&mut self, connector: &mut C) -> Result<(), FtdiError>
    where
        C: Connector<Transport = T>,
    {
        self.open(connector)?;
        self.configure()
    }

    /// Sets the MPSSE clock frequency
    ///
    /// # Returns
    /// The frequency actually set
    ///
    /// # Notes
    /// Divide-by-5 is always enabled, which limits the range to 92Hz - 6MHz.
    /// Out of range requests are clamped.
    pub fn set_frequency(&mut self, frequency_hz: u32) -> Result<u32, FtdiError> {
        let frequency_hz = frequency_hz as usize;
        if frequency_hz == 0 {
            return Err(FtdiError::InvalidArgument("frequency must be > 0"));
        }
        let max_frequency = BASE_FREQUENCY;
        let min_frequency = max_frequency / (u16::MAX as usize + 1) + 1;

        let divisor = if frequency_hz > max_frequency {
            log::warn!("frequency has out of range[{min_frequency}-{max_frequency}Hz]");
            log::warn!("frequency set to {max_frequency}Hz");
            1
        } else if frequency_hz < min_frequency {
            log::warn!("frequency has out of range[{min_frequency}-{max_frequency}Hz]");
            log::warn!("frequency set to {}Hz", max_frequency / (u16::MAX as usize + 1));
            u16::MAX as usize + 1
        } else if max_frequency % frequency_hz != 0 {
            max_frequency / frequency_hz + 1
        } else {
            max_frequency / frequency_hz
        };

        let mut cmd = MpsseCmdBuilder::new();
        cmd.set_clock((divisor - 1) as u16, Some(true));
        self.exec(cmd)?;
        log::info!("Frequency set to {}Hz", max_frequency / divisor);
        Ok((max_frequency / divisor) as u32)
    }

    /// Write mpsse command and read exactly the reply it produces
    pub(crate) fn exec(&mut self, cmd: MpsseCmdBuilder) -> Result<Vec<u8>, FtdiError> {
        if cmd.is_empty() {
            return Ok(Vec::new());
        }
        let transport = self.transport.as_mut().ok_or(FtdiError::NotOpen)?;
        log::trace!("mpsse write {} bytes, expect {}", cmd.as_slice().len(), cmd.read_len());
        let mut response = vec![0; cmd.read_len()];
        let (written, received) = if response.is_empty() {
            (transport.write_data(cmd.as_slice())?, 0)
        } else {
            transport.write_read(cmd.as_slice(), &mut response)?
        };
        if written != cmd.as_slice().len() {
            return Err(FtdiError::ShortWrite {
                written,
                expected: cmd.as_slice().len(),
            });
        }
        self.recv(&mut response, received)?;
        Ok(response)
    }

    /// Blocks until `buf` is filled past `received`, polling with the configured backoff.
    fn recv(&mut self, buf: &mut [u8], mut received: usize) -> Result<(), FtdiError> {
        let transport = self.transport.as_mut().ok_or(FtdiError::NotOpen)?;
        let poll_us = u32::try_from(self.config.poll_interval.as_micros()).unwrap_or(u32::MAX);
        let start = Instant::now();
        while received < buf.len() {
            let len = transport
                .read_data(&mut buf[received..])
                .inspect_err(|e| log::error!("Read error: {e}"))?;
            if len > 0 {
                received += len;
                continue;
            }
            if let Some(timeout) = self.config.read_timeout {
                if start.elapsed() >= timeout {
                    return Err(FtdiError::Timeout {
                        expected: buf.len(),
                        received,
                    });
                }
            }
            self.delay.delay_us(poll_us);
        }
        Ok(())
    }

    /// Restores the latency timer, leaves MPSSE mode and releases the device.
    ///
    /// Teardown failures are logged, never returned.
    pub fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Some(latency) = self.saved_latency.take() {
                if let Err(e) = transport.set_latency_timer(latency) {
                    log::warn!("Failed to restore latency timer: {e}");
                }
            }
            if let Err(e) = transport.set_bitmode(0, BitMode::Reset) {
                log::warn!("Failed to disable MPSSE mode: {e}");
            }
            transport.close();
        }
        self.state = SessionState::Closed;
    }

    /// Runs `body` on a freshly initialized session.
    ///
    /// On success the session is closed and the body's value returned. Any
    /// error, from initialization or the body, is logged and the session
    /// aborted with [`EXIT_FATAL`].
    pub fn run<C, R>(
        mut self,
        connector: &mut C,
        body: impl FnOnce(&mut Self) -> Result<R, FtdiError>,
    ) -> Result<R, Abort>
    where
        C: Connector<Transport = T>,
    {
        match self.init(connector).and_then(|()| body(&mut self)) {
            Ok(value) => {
                self.close();
                Ok(value)
            }
            Err(e) => {
                log::error!("{e}");
                Err(self.abort(EXIT_FATAL))
            }
        }
    }
}

impl<T: Transport, D: DelayNs> Drop for FtdiMpsse<T, D> {
    fn drop(&mut self) {
        if self.transport.is_some() {
            log::debug!("Session dropped while open, closing");
            self.close();
        }
    }
}
