use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clock::{NoaaSun, SystemClock};
use embedded_svc::{http::Method, io::Write};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{
        delay::FreeRtos,
        ledc::{config::TimerConfig, LedcDriver, LedcTimerDriver, Resolution},
        peripherals::Peripherals,
        prelude::*,
        reset,
    },
    http::server::{Configuration as HttpConfiguration, EspHttpServer},
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs},
    sntp::EspSntp,
};
use log::*;
use sensors::adc::AdcSampler;
use tracker::{Controller, ServoPair};
use wifi::wifi::Wifi;
use wifi::{NetworkMode, STATION_ATTEMPTS};

use crate::api::{
    RequestLayer, SAVE_CONFIG_PATH, SCAN_PATH, SET_MANUAL_PATH, SET_MODE_PATH, STATUS_PATH,
};
use crate::config::{Config, ConfigStore, NvsConfigStore};
use crate::RESTART_DELAY;

const CONTROL_STACK_SIZE: usize = 8 * 1024;

#[no_mangle]
pub extern "C" fn __pender() {
    // No-op: the embassy-time-driver feature handles wake-ups on FreeRTOS
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();
    info!("Solar tracker {} booting", env!("CARGO_PKG_VERSION"));

    let sysloop = EspSystemEventLoop::take()?;
    let peripherals = Peripherals::take()?;
    let nvs_default = EspDefaultNvsPartition::take()?;
    let nvs = EspNvs::new(nvs_default.clone(), "storage", true)?;
    info!("Got namespace {:?} from default partition", "storage");

    let mut store = NvsConfigStore::new(nvs);
    let config = store.load()?;

    // ======== Wifi ========
    let mut wifi = Wifi::new(peripherals.modem, sysloop.clone(), nvs_default)?;
    let network = if config.has_credentials() {
        match wifi.connect_station(
            &config.network.ssid,
            &config.network.password,
            STATION_ATTEMPTS,
        ) {
            Ok(mode) => mode,
            Err(e) => {
                error!("Wi-Fi connection failed ({:?}), resetting configuration", e);
                store.save(&Config::default())?;
                thread::sleep(RESTART_DELAY);
                reset::restart();
            }
        }
    } else {
        wifi.start_access_point()?
    };
    match network {
        NetworkMode::Station(ip) => info!("Running mode, open http://{}/", ip),
        NetworkMode::AccessPoint(ip) => info!("Setup mode, open http://{}/", ip),
    }

    // Wall-clock time only exists on the station network
    let _sntp = match network {
        NetworkMode::Station(_) => Some(EspSntp::new_default()?),
        NetworkMode::AccessPoint(_) => None,
    };

    // ======== Servos: 50 Hz LEDC, GPIO5 horizontal, GPIO18 vertical ========
    let timer = Arc::new(LedcTimerDriver::new(
        peripherals.ledc.timer0,
        &TimerConfig::default()
            .frequency(50.Hz().into())
            .resolution(Resolution::Bits14),
    )?);
    let horizontal = LedcDriver::new(
        peripherals.ledc.channel0,
        timer.clone(),
        peripherals.pins.gpio5,
    )?;
    let vertical = LedcDriver::new(peripherals.ledc.channel1, timer, peripherals.pins.gpio18)?;

    let sampler = AdcSampler::new(peripherals.adc1, peripherals.pins.gpio34)?;

    let controller = Arc::new(
        Controller::new(
            config.tracking(),
            ServoPair::new(horizontal, vertical),
            sampler,
            FreeRtos,
            Box::new(SystemClock),
            Box::new(NoaaSun),
        )
        .in_access_point_mode(network.is_access_point()),
    );
    controller.start()?;

    let looping = controller.clone();
    thread::Builder::new()
        .name("tracker".into())
        .stack_size(CONTROL_STACK_SIZE)
        .spawn(move || {
            looping.run(&mut FreeRtos);
        })?;

    // ======== HTTP ========
    // The request layer owns the radio from here on, for scans
    let layer = Arc::new(
        RequestLayer::new(controller.clone(), config, Box::new(store))
            .with_scanner(Box::new(wifi)),
    );
    let mut server = EspHttpServer::new(&HttpConfiguration::default())?;
    let routes = [
        STATUS_PATH,
        SET_MODE_PATH,
        SET_MANUAL_PATH,
        SAVE_CONFIG_PATH,
        SCAN_PATH,
    ];
    for path in routes {
        let layer = layer.clone();
        server.fn_handler(path, Method::Get, move |req| -> anyhow::Result<()> {
            let response = layer.handle(req.uri());
            let mut resp = req.into_response(
                response.status,
                None,
                &[("Content-Type", response.content_type)],
            )?;
            resp.write_all(response.body.as_bytes())?;
            Ok(())
        })?;
    }
    info!("HTTP server listening");

    loop {
        if controller.needs_restart() {
            info!("Restarting to apply the new configuration");
            thread::sleep(RESTART_DELAY);
            reset::restart();
        }
        thread::sleep(Duration::from_millis(100));
    }
}
