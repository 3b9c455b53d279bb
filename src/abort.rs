use eh1::delay::DelayNs;

use crate::{
    FtdiMpsse,
    mpsse::SessionState,
    transport::Transport,
};

/// Outcome of [`FtdiMpsse::abort`]: the device has been released and the
/// process should end with [`status`](Self::status).
#[derive(Debug)]
#[must_use = "call `exit` to terminate the process"]
pub struct Abort {
    status: i32,
    stray: Vec<u8>,
}

impl Abort {
    pub fn status(&self) -> i32 {
        self.status
    }

    /// Bytes found waiting on the read side when the session was aborted.
    pub fn stray_bytes(&self) -> &[u8] {
        &self.stray
    }

    /// Terminates the process with the abort status.
    pub fn exit(self) -> ! {
        std::process::exit(self.status)
    }
}

impl<T: Transport, D: DelayNs> FtdiMpsse<T, D> {
    /// Tears the session down after a fatal error.
    ///
    /// Drains and logs any unexpected reply bytes, then, if a device is open,
    /// restores the saved latency timer and closes it. The transport is
    /// released in every case. Teardown failures are logged only, so the
    /// original error stays the one reported. Safe to call in any state.
    pub fn abort(&mut self, status: i32) -> Abort {
        let mut stray = Vec::new();
        if let Some(transport) = self.transport.as_mut() {
            let mut byte = [0u8; 1];
            while let Ok(1) = transport.read_data(&mut byte) {
                log::error!("unexpected rx byte: {:02X}", byte[0]);
                stray.push(byte[0]);
            }
        }
        log::error!("ABORT.");
        if let Some(mut transport) = self.transport.take() {
            if let Some(latency) = self.saved_latency.take() {
                if let Err(e) = transport.set_latency_timer(latency) {
                    log::warn!("Failed to restore latency timer: {e}");
                }
            }
            transport.close();
        }
        self.saved_latency = None;
        self.state = SessionState::Closed;
        Abort { status, stray }
    }
}

#[cfg(test)]
mod test {
    use crate::{
        FtdiMpsse, SessionConfig, SessionState,
        delay::NoDelay,
        mock::{Call, Fail, MockConnector, MockTransport, configured},
    };

    #[test]
    fn abort_before_open_touches_nothing() {
        let mut mpsse = FtdiMpsse::<MockTransport, _>::with_delay(SessionConfig::default(), NoDelay);
        let abort = mpsse.abort(2);
        assert_eq!(abort.status(), 2);
        assert!(abort.stray_bytes().is_empty());
        assert_eq!(mpsse.state(), SessionState::Closed);
    }

    #[test]
    fn abort_restores_saved_latency_before_close() {
        let (mut mpsse, state) = configured(SessionConfig::default());
        let abort = mpsse.abort(7);
        assert_eq!(abort.status(), 7);
        let state = state.borrow();
        assert_eq!(state.calls, [Call::SetLatency(16), Call::Close]);
        assert!(state.dropped);
    }

    #[test]
    fn abort_without_saved_latency_only_closes() {
        let mut connector = MockConnector::ft2232h();
        let state = connector.state.clone();
        let mut mpsse = FtdiMpsse::with_delay(SessionConfig::default(), NoDelay);
        mpsse.open(&mut connector).unwrap();
        let _ = mpsse.abort(2);
        assert_eq!(state.borrow().calls, [Call::Close]);
    }

    #[test]
    fn abort_drains_stray_bytes() {
        let (mut mpsse, state) = configured(SessionConfig::default());
        state.borrow_mut().rx.extend([0xfa, 0x42, 0x00]);
        let abort = mpsse.abort(2);
        assert_eq!(abort.stray_bytes(), [0xfa, 0x42, 0x00]);
        assert!(state.borrow().rx.is_empty());
    }

    #[test]
    fn abort_survives_failing_device() {
        let (mut mpsse, state) = configured(SessionConfig::default());
        state.borrow_mut().fail = Some(Fail::SetLatency);
        let abort = mpsse.abort(2);
        assert_eq!(abort.status(), 2);
        assert_eq!(state.borrow().calls.last(), Some(&Call::Close));
    }

    #[test]
    fn abort_twice_is_harmless() {
        let (mut mpsse, state) = configured(SessionConfig::default());
        let _ = mpsse.abort(2);
        state.borrow_mut().calls.clear();
        let abort = mpsse.abort(2);
        assert_eq!(abort.status(), 2);
        assert!(state.borrow().calls.is_empty());
    }
}
