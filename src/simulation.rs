//! Desktop run of the real controller against simulated hardware. Request
//! URIs typed on stdin (`/api/setMode?mode=3`) go through the same request
//! layer the device serves over HTTP.

use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clock::{NoaaSun, SystemClock};
use embedded_hal::delay::DelayNs;
use log::*;
use sensors::AnalogSampler;
use tracker::{Actuators, Axis, Controller};

use crate::api::RequestLayer;
use crate::config::{ConfigStore, FileConfigStore};
use crate::RESTART_DELAY;

const CONFIG_PATH: &str = "config.toml";

/// Servo pair that only logs what it is told
#[derive(Default)]
struct LoggingServos {
    attached: [bool; 2],
}

fn index(axis: Axis) -> usize {
    match axis {
        Axis::Horizontal => 0,
        Axis::Vertical => 1,
    }
}

impl Actuators for LoggingServos {
    fn attach(&mut self, axis: Axis) -> anyhow::Result<()> {
        info!("{:?} servo attached", axis);
        self.attached[index(axis)] = true;
        Ok(())
    }

    fn detach(&mut self, axis: Axis) -> anyhow::Result<()> {
        info!("{:?} servo detached", axis);
        self.attached[index(axis)] = false;
        Ok(())
    }

    fn is_attached(&self, axis: Axis) -> bool {
        self.attached[index(axis)]
    }

    fn write_angle(&mut self, axis: Axis, degrees: i32) -> anyhow::Result<()> {
        debug!("{:?} servo -> {}°", axis, degrees);
        Ok(())
    }
}

/// Steady panel, about 9 V ahead of the divider
struct SteadyPanel;

impl AnalogSampler for SteadyPanel {
    fn read_raw(&mut self) -> anyhow::Result<u16> {
        Ok(3771)
    }
}

struct ThreadSleep;

impl DelayNs for ThreadSleep {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(ns as u64));
    }
}

pub fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    info!("Solar tracker {} simulation", env!("CARGO_PKG_VERSION"));

    let mut store = FileConfigStore::new(CONFIG_PATH);
    let config = store.load()?;
    if !config.has_credentials() {
        info!("No Wi-Fi credentials stored; the device would boot into setup mode");
    }

    let controller = Arc::new(Controller::new(
        config.tracking(),
        LoggingServos::default(),
        SteadyPanel,
        ThreadSleep,
        Box::new(SystemClock),
        Box::new(NoaaSun),
    ));
    controller.start()?;

    let looping = controller.clone();
    thread::Builder::new()
        .name("tracker".into())
        .spawn(move || {
            looping.run(&mut ThreadSleep);
        })
        .context("spawning control loop")?;

    let layer = RequestLayer::new(controller.clone(), config, Box::new(store));
    info!("Type request URIs, e.g. /api/status");
    for line in io::stdin().lock().lines() {
        let line = line?;
        let uri = line.trim();
        if uri.is_empty() {
            continue;
        }
        let response = layer.handle(uri);
        println!("{} {}", response.status, response.body);

        if controller.needs_restart() {
            info!("Restart requested, exiting");
            thread::sleep(RESTART_DELAY);
            break;
        }
    }
    Ok(())
}
