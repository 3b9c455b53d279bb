//! Recording transport for unit tests.
//!
//! With `loopback` set, the transport interprets the MPSSE stream like a board
//! with MISO wired to MOSI: transferred bytes come back and GPIO reads return
//! the last value written to that bank.

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use crate::{
    FtdiError, FtdiMpsse, Interface, SessionConfig,
    delay::NoDelay,
    list::DeviceLocator,
    transport::{BitMode, Connector, Transport},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Reset,
    Purge,
    GetLatency,
    SetLatency(u8),
    SetBitmode(u8, BitMode),
    Write(Vec<u8>),
    Read(usize),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fail {
    Reset,
    Purge,
    GetLatency,
    SetLatency,
    Bitmode,
    Write,
    ShortWrite,
    Read,
}

#[derive(Debug)]
pub(crate) struct MockState {
    pub(crate) calls: Vec<Call>,
    pub(crate) rx: VecDeque<u8>,
    pub(crate) latency: u8,
    pub(crate) loopback: bool,
    pub(crate) gpio: [u8; 2],
    pub(crate) fail: Option<Fail>,
    /// Reply bytes handed back by `write_read` itself, at most
    pub(crate) concurrent: usize,
    /// Reads that come back empty before queued bytes are delivered
    pub(crate) empty_polls: usize,
    pub(crate) polls: usize,
    pub(crate) dropped: bool,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            rx: VecDeque::new(),
            latency: 16,
            loopback: true,
            gpio: [0; 2],
            fail: None,
            concurrent: 0,
            empty_polls: 0,
            polls: 0,
            dropped: false,
        }
    }
}

impl MockState {
    pub(crate) fn written(&self) -> Vec<u8> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Write(data) => Some(data.as_slice()),
                _ => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    pub(crate) fn bytes_read(&self) -> usize {
        self.calls
            .iter()
            .map(|call| match call {
                Call::Read(n) => *n,
                _ => 0,
            })
            .sum()
    }

    fn fails(&self, op: Fail) -> Result<(), FtdiError> {
        if self.fail == Some(op) {
            Err(FtdiError::Usb(std::io::Error::other(format!(
                "mock {op:?} failure"
            ))))
        } else {
            Ok(())
        }
    }

    fn interpret(&mut self, data: &[u8]) {
        let len16 = |i: usize| u16::from_le_bytes([data[i], data[i + 1]]) as usize + 1;
        let mut i = 0;
        while i < data.len() {
            let op = data[i];
            i += 1;
            match op {
                0x11 | 0x31 => {
                    let len = len16(i);
                    i += 2;
                    if op == 0x31 {
                        self.rx.extend(&data[i..i + len]);
                    }
                    i += len;
                }
                0x33 => {
                    self.rx.push_back(data[i + 1]);
                    i += 2;
                }
                0x4a => i += 2,
                0x80 | 0x82 => {
                    self.gpio[((op - 0x80) / 2) as usize] = data[i];
                    i += 2;
                }
                0x81 | 0x83 => self.rx.push_back(self.gpio[((op - 0x81) / 2) as usize]),
                0x86 | 0x8f => i += 2,
                0x8a | 0x8b => {}
                0x8e => i += 1,
                _ => panic!("mock: unknown MPSSE opcode {op:#04x}"),
            }
        }
    }
}

pub(crate) struct MockTransport {
    state: Rc<RefCell<MockState>>,
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.state.borrow_mut().dropped = true;
    }
}

impl Transport for MockTransport {
    fn usb_reset(&mut self) -> Result<(), FtdiError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Reset);
        state.fails(Fail::Reset)
    }

    fn purge_buffers(&mut self) -> Result<(), FtdiError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Purge);
        state.fails(Fail::Purge)
    }

    fn write_data(&mut self, data: &[u8]) -> Result<usize, FtdiError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Write(data.to_vec()));
        state.fails(Fail::Write)?;
        if state.fail == Some(Fail::ShortWrite) {
            return Ok(data.len() - 1);
        }
        if state.loopback {
            state.interpret(data);
        }
        Ok(data.len())
    }

    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize, FtdiError> {
        let mut state = self.state.borrow_mut();
        state.polls += 1;
        state.fails(Fail::Read)?;
        if state.empty_polls > 0 {
            state.empty_polls -= 1;
            return Ok(0);
        }
        let len = buf.len().min(state.rx.len());
        for (dst, src) in buf.iter_mut().zip(state.rx.drain(..len)) {
            *dst = src;
        }
        if len > 0 {
            state.calls.push(Call::Read(len));
        }
        Ok(len)
    }

    fn write_read(&mut self, data: &[u8], buf: &mut [u8]) -> Result<(usize, usize), FtdiError> {
        let written = self.write_data(data)?;
        let mut state = self.state.borrow_mut();
        let len = buf.len().min(state.rx.len()).min(state.concurrent);
        for (dst, src) in buf.iter_mut().zip(state.rx.drain(..len)) {
            *dst = src;
        }
        if len > 0 {
            state.calls.push(Call::Read(len));
        }
        Ok((written, len))
    }

    fn latency_timer(&mut self) -> Result<u8, FtdiError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::GetLatency);
        state.fails(Fail::GetLatency)?;
        Ok(state.latency)
    }

    fn set_latency_timer(&mut self, value: u8) -> Result<(), FtdiError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::SetLatency(value));
        state.fails(Fail::SetLatency)?;
        state.latency = value;
        Ok(())
    }

    fn set_bitmode(&mut self, mask: u8, mode: BitMode) -> Result<(), FtdiError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::SetBitmode(mask, mode));
        state.fails(Fail::Bitmode)
    }

    fn close(&mut self) {
        self.state.borrow_mut().calls.push(Call::Close);
    }
}

#[derive(Default)]
pub(crate) struct MockConnector {
    pub(crate) state: Rc<RefCell<MockState>>,
    /// Device ids that can be opened; empty means none
    pub(crate) present: Vec<(u16, u16)>,
    pub(crate) attempts: Vec<String>,
}

impl MockConnector {
    /// A connector with one FT2232H attached.
    pub(crate) fn ft2232h() -> Self {
        Self {
            present: vec![(0x0403, 0x6010)],
            ..Default::default()
        }
    }

    fn transport(&self) -> MockTransport {
        MockTransport {
            state: self.state.clone(),
        }
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    fn open(
        &mut self,
        vendor_id: u16,
        product_id: u16,
        interface: Interface,
    ) -> Result<MockTransport, FtdiError> {
        self.attempts
            .push(format!("{vendor_id:#06x}:{product_id:#06x}/{interface:?}"));
        if self.present.contains(&(vendor_id, product_id)) {
            Ok(self.transport())
        } else {
            Err(FtdiError::OpenFailed("no such device".to_string()))
        }
    }

    fn open_locator(
        &mut self,
        locator: &DeviceLocator,
        interface: Interface,
    ) -> Result<MockTransport, FtdiError> {
        self.attempts.push(format!("{locator}/{interface:?}"));
        match locator {
            DeviceLocator::Id {
                vendor_id,
                product_id,
                ..
            } if self.present.contains(&(*vendor_id, *product_id)) => Ok(self.transport()),
            _ => Err(FtdiError::OpenFailed("no such device".to_string())),
        }
    }
}

/// A configured session on a loopback FT2232H, with the setup calls cleared.
pub(crate) fn configured(
    config: SessionConfig,
) -> (FtdiMpsse<MockTransport, NoDelay>, Rc<RefCell<MockState>>) {
    let mut connector = MockConnector::ft2232h();
    let state = connector.state.clone();
    let mut mpsse = FtdiMpsse::with_delay(config, NoDelay);
    mpsse.init(&mut connector).unwrap();
    state.borrow_mut().calls.clear();
    (mpsse, state)
}
