use eh1::delay::DelayNs;
use std::time::Duration;

/// Thread sleeping delay, the default backoff between reply polls.
#[derive(Debug, Default, Clone, Copy)]
pub struct Delay;
impl DelayNs for Delay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(ns as u64));
    }
    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(us as u64));
    }
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }
}

/// Returns immediately. For simulated transports that never lag.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelay;
impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}
