use ice_mpsse::{FtdiMpsse, NusbConnector, SessionConfig};

/// Resets the JTAG TAP, reads 32 bits of DR and leaves the TAP in Run-Test/Idle.
fn main() -> anyhow::Result<()> {
    env_logger::init();

    let idcode = FtdiMpsse::new(SessionConfig::default())
        .run(&mut NusbConnector, |mpsse| {
            mpsse.jtag_init()?;
            // Test-Logic-Reset -> Run-Test/Idle -> Select-DR -> Capture-DR -> Shift-DR
            mpsse.jtag_tms(4, 0b0010)?;
            let mut data = [0u8; 4];
            mpsse.xfer_spi(&mut data)?;
            // Shift-DR -> Exit1-DR -> Update-DR -> Run-Test/Idle
            mpsse.jtag_tms(3, 0b011)?;
            Ok(data)
        })
        .unwrap_or_else(|abort| abort.exit());

    println!("raw DR: {idcode:02x?}");
    Ok(())
}
