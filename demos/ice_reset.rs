use std::{thread::sleep, time::Duration};

use ice_mpsse::{ClockSpeed, DeviceLocator, FtdiMpsse, Interface, NusbConnector, SessionConfig};

/// Pulses CRESET on an iCE40 board and reports CDONE.
///
/// Usage: ice_reset [interface 0-3] [device string]
fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let interface = match args.next() {
        Some(index) => Interface::from_index(index.parse()?),
        None => Interface::A,
    };
    let mut config = SessionConfig::default()
        .with_interface(interface)
        .with_clock(ClockSpeed::Slow);
    if let Some(locator) = args.next() {
        config = config.with_locator(locator.parse::<DeviceLocator>()?);
    }

    let cdone = FtdiMpsse::new(config)
        .run(&mut NusbConnector, |mpsse| {
            mpsse.set_cs_creset(false, false)?;
            sleep(Duration::from_millis(1));
            mpsse.set_cs_creset(true, true)?;
            sleep(Duration::from_millis(2));
            mpsse.cdone()
        })
        .unwrap_or_else(|abort| abort.exit());

    println!("cdone: {}", if cdone { "high" } else { "low" });
    Ok(())
}
