use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Result;
use clock::{ClockSource, SunPosition};
use embedded_hal::delay::DelayNs;
use log::*;
use sensors::{AnalogSampler, PanelVoltmeter};

use crate::demo;
use crate::motion::Mount;
use crate::night::{self, NightAction};
use crate::policy;
use crate::servo::Actuators;
use crate::settings::Settings;
use crate::state::{Snapshot, TrackerState};
use crate::states::Mode;

/// Everything behind the controller's single lock. The delay here is the
/// one used while the lock is held (smooth moves, voltage sampling).
struct Shared<A, V, D> {
    state: TrackerState,
    settings: Settings,
    mount: Mount<A>,
    sampler: V,
    delay: D,
}

/// The tracking controller.
///
/// One mutex serializes the control loop and the request layer. It is not
/// reentrant: nothing in here takes it twice on one path. A smooth move
/// holds it for the whole move.
pub struct Controller<A, V, D> {
    shared: Mutex<Shared<A, V, D>>,
    voltmeter: PanelVoltmeter,
    clock: Box<dyn ClockSource + Send + Sync>,
    sun: Box<dyn SunPosition + Send + Sync>,
    access_point: bool,
}

impl<A, V, D> Controller<A, V, D>
where
    A: Actuators,
    V: AnalogSampler,
    D: DelayNs,
{
    pub fn new(
        settings: Settings,
        actuators: A,
        sampler: V,
        delay: D,
        clock: Box<dyn ClockSource + Send + Sync>,
        sun: Box<dyn SunPosition + Send + Sync>,
    ) -> Self {
        Controller {
            shared: Mutex::new(Shared {
                state: TrackerState::default(),
                settings,
                mount: Mount::new(actuators),
                sampler,
                delay,
            }),
            voltmeter: PanelVoltmeter::default(),
            clock,
            sun,
            access_point: false,
        }
    }

    pub fn with_voltmeter(mut self, voltmeter: PanelVoltmeter) -> Self {
        self.voltmeter = voltmeter;
        self
    }

    /// Sun tracking stays paused while the device hosts its setup network.
    pub fn in_access_point_mode(mut self, access_point: bool) -> Self {
        self.access_point = access_point;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Shared<A, V, D>> {
        // A panic mid-cycle leaves the state as consistent as any failed
        // driver call would, so keep serving it.
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Energize the servos once at boot
    pub fn start(&self) -> Result<()> {
        self.lock().mount.power_up()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().state.snapshot()
    }

    pub fn settings(&self) -> Settings {
        self.lock().settings
    }

    pub fn is_access_point(&self) -> bool {
        self.access_point
    }

    pub fn clock(&self) -> &dyn ClockSource {
        self.clock.as_ref()
    }

    pub fn needs_restart(&self) -> bool {
        self.lock().state.needs_restart
    }

    /// Swap in a freshly saved configuration and ask for a restart. The
    /// next cycle sees the new values; a running cycle keeps the old ones.
    pub fn update_settings(&self, settings: Settings) {
        let mut shared = self.lock();
        shared.settings = settings;
        shared.state.needs_restart = true;
        info!("Configuration updated, restart requested");
    }

    /// Switch modes. Every mode is reachable from every other one.
    pub fn set_mode(&self, mode: Mode) -> Result<()> {
        let mut guard = self.lock();
        let shared = &mut *guard;
        let previous = std::mem::replace(&mut shared.state.mode, mode);
        if previous != mode {
            info!("Mode {} -> {}", previous.name(), mode.name());
        }

        if mode != Mode::Auto {
            shared.state.is_night = false;
            shared.mount.power_up()?;
        }
        if mode == Mode::Demo {
            shared.state.demo.reset();
            let limits = shared.settings.limits();
            let start = shared.state.demo.position();
            shared
                .mount
                .set_position(&mut shared.state, limits, start, limits.min)?;
        }
        Ok(())
    }

    /// Position the mount directly. Returns `false` (and does nothing)
    /// unless the tracker is in Manual mode.
    pub fn set_manual(&self, horizontal: i32, vertical: i32) -> Result<bool> {
        let mut guard = self.lock();
        let shared = &mut *guard;
        if shared.state.mode != Mode::Manual {
            debug!("Manual command ignored in {} mode", shared.state.mode.name());
            return Ok(false);
        }
        let limits = shared.settings.limits();
        shared
            .mount
            .set_position(&mut shared.state, limits, horizontal, vertical)?;
        Ok(true)
    }

    /// One control loop iteration. Returns how long to sleep before the
    /// next one.
    pub fn cycle(&self) -> Duration {
        let mut guard = self.lock();
        let shared = &mut *guard;

        match self.voltmeter.measure(&mut shared.sampler, &mut shared.delay) {
            Ok(volts) => shared.state.panel_voltage = volts,
            Err(e) => warn!("Panel voltage sampling failed: {:?}", e),
        }

        let mode = shared.state.mode;
        let result = match mode {
            Mode::Auto => self.track_sun(shared),
            other => Self::hold_mode(shared, other),
        };
        if let Err(e) = result {
            warn!("{} cycle failed: {:?}", mode.name(), e);
        }

        mode.cycle_period()
    }

    /// Run the control loop forever, pausing between cycles with `pause`.
    pub fn run<P: DelayNs>(&self, pause: &mut P) -> ! {
        info!("Control loop started");
        loop {
            let period = self.cycle();
            pause.delay_ms(period.as_millis() as u32);
        }
    }

    /// Loop body for every mode but Auto
    fn hold_mode(shared: &mut Shared<A, V, D>, mode: Mode) -> Result<()> {
        shared.state.is_night = false;
        shared.mount.power_up()?;
        match mode {
            Mode::Calibration => shared.mount.hold_calibration_pose(&mut shared.state),
            Mode::Demo => Self::demo_step(shared),
            Mode::Manual | Mode::Auto => Ok(()),
        }
    }

    fn demo_step(shared: &mut Shared<A, V, D>) -> Result<()> {
        let limits = shared.settings.limits();
        let horizontal = shared.state.demo.advance();
        let vertical = demo::vertical_target(horizontal, limits);
        shared
            .mount
            .set_position(&mut shared.state, limits, horizontal, vertical)
    }

    fn track_sun(&self, shared: &mut Shared<A, V, D>) -> Result<()> {
        if self.access_point {
            debug!("Access point mode, sun tracking paused");
            return Ok(());
        }
        let now = self.clock.now();
        if !clock::clock::is_synchronized(now) {
            debug!("Clock not synchronized yet ({}), holding position", now);
            return Ok(());
        }

        let settings = shared.settings;
        let sun = self.sun.compute(
            settings.latitude,
            settings.longitude,
            now,
            settings.gmt_offset_hours,
        );
        shared.state.sun_azimuth = sun.azimuth;
        shared.state.sun_altitude = sun.altitude;

        let (horizontal, vertical) = policy::sun_targets(sun, &settings);
        let limits = settings.limits();
        let action = night::evaluate(shared.state.is_night, sun.altitude);
        shared.state.is_night = action.is_night();

        match action {
            NightAction::Sleep => {
                info!(
                    "Sun below horizon ({:.1}°), powering servos down",
                    sun.altitude
                );
                shared.mount.power_down()
            }
            NightAction::Rest => Ok(()),
            NightAction::Wake => {
                info!(
                    "Sunrise ({:.1}°), gliding to {}/{}",
                    sun.altitude, horizontal, vertical
                );
                shared.mount.smooth_move_to(
                    &mut shared.state,
                    limits,
                    horizontal,
                    vertical,
                    &mut shared.delay,
                )
            }
            NightAction::Track => {
                shared
                    .mount
                    .set_position(&mut shared.state, limits, horizontal, vertical)
            }
        }
    }
}
