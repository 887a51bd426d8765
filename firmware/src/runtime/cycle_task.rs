use embassy_time::{Duration, Timer};
use meter_core::power::WakeEvent;
use meter_core::scheduler::CycleSummary;

use super::FirmwareNode;
use crate::telemetry;

/// Measure, report, then sleep for the configured wake interval.
///
/// This is the awaiting form of [`meter_core::power::PowerCycleController::run`]:
/// the executor idles the core while the timer runs instead of blocking in a
/// wake source.
#[embassy_executor::task]
pub async fn run(mut node: FirmwareNode) -> ! {
    let interval = Duration::from_millis(node.wake_interval().code.period_millis());
    loop {
        let cycle = node.cycles();
        let outcome = node.run_cycle();
        telemetry::log_cycle(cycle, &CycleSummary::from(&outcome));
        Timer::after(interval).await;
        node.note_wake(WakeEvent::Timer);
    }
}
