mod api;
mod config;
#[cfg(target_os = "espidf")]
mod device;
#[cfg(not(target_os = "espidf"))]
mod simulation;

use std::time::Duration;

/// How long a requested restart waits, so the HTTP reply gets out first.
pub const RESTART_DELAY: Duration = Duration::from_secs(1);

fn main() -> anyhow::Result<()> {
    #[cfg(target_os = "espidf")]
    return device::run();

    #[cfg(not(target_os = "espidf"))]
    return simulation::run();
}
