use std::time::Duration;

use crate::{Interface, list::DeviceLocator};

/// MPSSE bit clock selection.
///
/// Divide-by-5 is always enabled, so the base clock is 6 MHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockSpeed {
    /// 50 kHz, divisor 119.
    Slow,
    /// 6 MHz, divisor 0.
    #[default]
    Fast,
    /// Nearest achievable frequency not above the given one.
    Hz(u32),
}

impl ClockSpeed {
    pub fn from_slow_clock(slow_clock: bool) -> Self {
        if slow_clock {
            ClockSpeed::Slow
        } else {
            ClockSpeed::Fast
        }
    }

    pub const fn frequency_hz(self) -> u32 {
        match self {
            ClockSpeed::Slow => 50_000,
            ClockSpeed::Fast => 6_000_000,
            ClockSpeed::Hz(hz) => hz,
        }
    }
}

/// How a [`FtdiMpsse`](crate::FtdiMpsse) session opens and drives its device.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub interface: Interface,
    /// Explicit device; `None` probes [`DEFAULT_DEVICE_IDS`](crate::DEFAULT_DEVICE_IDS).
    pub locator: Option<DeviceLocator>,
    pub clock: ClockSpeed,
    /// Latency timer used while the session is configured, in milliseconds.
    pub latency_timer: u8,
    /// Sleep between polls while waiting for a reply byte.
    pub poll_interval: Duration,
    /// Give up waiting for a reply after this long. `None` waits forever.
    pub read_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            interface: Interface::A,
            locator: None,
            clock: ClockSpeed::Fast,
            // 1 ms is the fastest polling the chip supports
            latency_timer: 1,
            poll_interval: Duration::from_micros(100),
            read_timeout: None,
        }
    }
}

impl SessionConfig {
    pub fn with_interface(mut self, interface: Interface) -> Self {
        self.interface = interface;
        self
    }

    pub fn with_locator(mut self, locator: DeviceLocator) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn with_clock(mut self, clock: ClockSpeed) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_latency_timer(mut self, latency_timer: u8) -> Self {
        self.latency_timer = latency_timer;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = Some(read_timeout);
        self
    }
}
