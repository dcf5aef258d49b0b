use std::num::{IntErrorKind, ParseIntError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use embedded_hal::delay::DelayNs;
use log::*;
use sensors::AnalogSampler;
use serde::Serialize;
use tracker::{Actuators, Controller, Mode};
use wifi::NetworkScanner;

use crate::config::{Config, ConfigStore};

pub const STATUS_PATH: &str = "/api/status";
pub const SET_MODE_PATH: &str = "/api/setMode";
pub const SET_MANUAL_PATH: &str = "/api/setManual";
pub const SAVE_CONFIG_PATH: &str = "/api/saveCfg";
pub const SCAN_PATH: &str = "/api/scan";

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Response {
    fn ok() -> Self {
        Self::text(200, "OK")
    }

    fn text(status: u16, body: impl Into<String>) -> Self {
        Response {
            status,
            content_type: "text/plain",
            body: body.into(),
        }
    }

    fn json(body: String) -> Self {
        Response {
            status: 200,
            content_type: "application/json",
            body,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Status<'a> {
    time: String,
    volts: f32,
    sun_az: f32,
    sun_alt: f32,
    cur_hor: i32,
    cur_ver: i32,
    mode: u8,
    #[serde(rename = "isAP")]
    is_ap: bool,
    is_night: bool,
    lat: f64,
    lon: f64,
    gmt: i32,
    ver_min: i32,
    ver_max: i32,
    h_off: i32,
    v_off: i32,
    ssid: &'a str,
}

#[derive(Serialize)]
struct ScanEntry<'a> {
    ssid: &'a str,
    rssi: i8,
}

struct Persisted {
    config: Config,
    store: Box<dyn ConfigStore + Send>,
}

/// HTTP-shaped front of the controller: a URI goes in, a response comes
/// out. Transport is the caller's business.
///
/// The config lock is always taken before the controller's, never the
/// other way around.
pub struct RequestLayer<A, V, D> {
    controller: Arc<Controller<A, V, D>>,
    persisted: Mutex<Persisted>,
    scanner: Option<Mutex<Box<dyn NetworkScanner + Send>>>,
}

impl<A, V, D> RequestLayer<A, V, D>
where
    A: Actuators,
    V: AnalogSampler,
    D: DelayNs,
{
    pub fn new(
        controller: Arc<Controller<A, V, D>>,
        config: Config,
        store: Box<dyn ConfigStore + Send>,
    ) -> Self {
        RequestLayer {
            controller,
            persisted: Mutex::new(Persisted { config, store }),
            scanner: None,
        }
    }

    /// Serve `/api/scan` from `scanner`. Without one the scan is always
    /// empty.
    pub fn with_scanner(mut self, scanner: Box<dyn NetworkScanner + Send>) -> Self {
        self.scanner = Some(Mutex::new(scanner));
        self
    }

    fn persisted(&self) -> MutexGuard<'_, Persisted> {
        self.persisted.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn handle(&self, uri: &str) -> Response {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, query),
            None => (uri, ""),
        };
        let params = parse_query(query);
        debug!("Request {} {:?}", path, params);

        match path {
            STATUS_PATH => self.status(),
            SET_MODE_PATH => self.set_mode(&params),
            SET_MANUAL_PATH => self.set_manual(&params),
            SAVE_CONFIG_PATH => self.save_config(&params),
            SCAN_PATH => self.scan(),
            _ => Response::text(404, "Not found"),
        }
    }

    fn status(&self) -> Response {
        let persisted = self.persisted();
        let config = &persisted.config;
        let snapshot = self.controller.snapshot();
        let now = self.controller.clock().now();

        let status = Status {
            time: clock::clock::format_local_time(now, config.location.gmt_offset_hours),
            volts: snapshot.panel_voltage,
            sun_az: snapshot.sun_azimuth,
            sun_alt: snapshot.sun_altitude,
            cur_hor: snapshot.current_horizontal,
            cur_ver: snapshot.current_vertical,
            mode: snapshot.mode.code(),
            is_ap: self.controller.is_access_point(),
            is_night: snapshot.is_night,
            lat: config.location.latitude,
            lon: config.location.longitude,
            gmt: config.location.gmt_offset_hours,
            ver_min: config.mount.vertical_min,
            ver_max: config.mount.vertical_max,
            h_off: config.mount.horizontal_offset,
            v_off: config.mount.vertical_offset,
            ssid: config.network.ssid.as_str(),
        };
        match serde_json::to_string(&status) {
            Ok(body) => Response::json(body),
            Err(e) => {
                error!("Status serialization failed: {:?}", e);
                Response::text(500, "Internal error")
            }
        }
    }

    fn scan(&self) -> Response {
        let found = match &self.scanner {
            Some(scanner) => {
                let mut scanner = scanner.lock().unwrap_or_else(PoisonError::into_inner);
                match scanner.scan() {
                    Ok(found) => found,
                    Err(e) => {
                        warn!("Wi-Fi scan failed: {:?}", e);
                        return Response::text(500, "Scan failed");
                    }
                }
            }
            None => Vec::new(),
        };
        let entries: Vec<ScanEntry> = found
            .iter()
            .map(|network| ScanEntry {
                ssid: &network.ssid,
                rssi: network.rssi,
            })
            .collect();
        match serde_json::to_string(&entries) {
            Ok(body) => Response::json(body),
            Err(e) => {
                error!("Scan serialization failed: {:?}", e);
                Response::text(500, "Internal error")
            }
        }
    }

    fn set_mode(&self, params: &[(String, String)]) -> Response {
        let Some(raw) = param(params, "mode") else {
            return Response::text(400, "Missing mode");
        };
        let Some(mode) = raw.trim().parse::<u8>().ok().and_then(Mode::from_code) else {
            return Response::text(400, format!("Unknown mode {:?}", raw));
        };
        match self.controller.set_mode(mode) {
            Ok(()) => Response::ok(),
            Err(e) => {
                warn!("Mode change to {} failed: {:?}", mode.name(), e);
                Response::text(500, "Servo error")
            }
        }
    }

    fn set_manual(&self, params: &[(String, String)]) -> Response {
        let (Some(h), Some(v)) = (param(params, "h"), param(params, "v")) else {
            return Response::text(400, "Missing h or v");
        };
        let (Ok(horizontal), Ok(vertical)) = (angle(h), angle(v)) else {
            return Response::text(400, "h and v must be integers");
        };
        match self.controller.set_manual(horizontal, vertical) {
            Ok(_) => Response::ok(),
            Err(e) => {
                warn!("Manual move to {}/{} failed: {:?}", horizontal, vertical, e);
                Response::text(500, "Servo error")
            }
        }
    }

    fn save_config(&self, params: &[(String, String)]) -> Response {
        let mut persisted = self.persisted();
        let pairs = params.iter().map(|(k, v)| (k.as_str(), v.as_str()));
        let next = match persisted.config.apply_update(pairs) {
            Ok(next) => next,
            Err(e) => return Response::text(400, format!("{:#}", e)),
        };
        if let Err(e) = persisted.store.save(&next) {
            error!("Saving configuration failed: {:?}", e);
            return Response::text(500, "Storage error");
        }
        self.controller.update_settings(next.tracking());
        persisted.config = next;
        Response::ok()
    }
}

/// Any integer is accepted, however large; the mount clamps it to its
/// travel.
fn angle(raw: &str) -> Result<i32, ParseIntError> {
    match raw.trim().parse::<i32>() {
        Ok(value) => Ok(value),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Ok(i32::MAX),
            IntErrorKind::NegOverflow => Ok(i32::MIN),
            _ => Err(e),
        },
    }
}

fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (decode(k), decode(v)),
            None => (decode(pair), String::new()),
        })
        .collect()
}

/// `application/x-www-form-urlencoded` value decoding. Malformed escapes
/// are kept literally.
fn decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                match (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi << 4) | lo);
                        i += 2;
                    }
                    _ => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
