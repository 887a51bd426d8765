use std::io;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use meter_core::config::DeviceConfig;
use meter_core::wakeup::WakeIntervalCode;
use session::{NodeSetup, Session, SoilProfile};

fn main() -> io::Result<()> {
    record_profile(SoilProfile::Drying)?;
    record_profile(SoilProfile::Watering)?;
    Ok(())
}

fn record_profile(profile: SoilProfile) -> io::Result<()> {
    let mut session = Session::new(profile, setup_for(profile))?;
    session.boot_banner()?;
    match profile {
        SoilProfile::Drying => record_drying(&mut session),
        SoilProfile::Watering => record_watering(&mut session),
    }
}

/// The watering run boots from a half-provisioned record so its transcript
/// shows the config faults being replaced.
fn setup_for(profile: SoilProfile) -> NodeSetup {
    match profile {
        SoilProfile::Drying => NodeSetup::default(),
        SoilProfile::Watering => NodeSetup {
            config: DeviceConfig::new(0x0042, 0, 0, WakeIntervalCode::new(0x0500)),
            sequence_counter: 4_210,
        },
    }
}

fn record_drying(session: &mut Session) -> io::Result<()> {
    let _ = session.handle_command("help")?;
    let _ = session.handle_command("tick 6")?;
    let _ = session.handle_command("status")?;
    let _ = session.handle_command("tick 60")?;
    let _ = session.handle_command("log 8")?;
    let _ = session.handle_command("tick 0")?;
    Ok(())
}

fn record_watering(session: &mut Session) -> io::Result<()> {
    let _ = session.handle_command("tick 9")?;
    let _ = session.handle_command("probe 27500")?;
    let _ = session.handle_command("tick 3")?;
    let _ = session.handle_command("baseline reset")?;
    let _ = session.handle_command("probe auto")?;
    let _ = session.handle_command("tick 3")?;
    let _ = session.handle_command("status")?;
    let _ = session.handle_command("help baseline")?;
    Ok(())
}
