use std::net::IpAddr;

/// Setup network hosted when no station credentials work.
pub const ACCESS_POINT_SSID: &str = "SolarTracker";
pub const ACCESS_POINT_PASSWORD: &str = "12345678";

/// Station association attempts before giving up, 500 ms apart.
pub const STATION_ATTEMPTS: u8 = 20;

/// How the device ended up on the network after boot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMode {
    Station(IpAddr),
    AccessPoint(IpAddr),
}

impl NetworkMode {
    pub fn is_access_point(&self) -> bool {
        matches!(self, NetworkMode::AccessPoint(_))
    }

    pub fn address(&self) -> IpAddr {
        match self {
            NetworkMode::Station(ip) | NetworkMode::AccessPoint(ip) => *ip,
        }
    }
}

/// One access point seen by a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedNetwork {
    pub ssid: String,
    /// dBm
    pub rssi: i8,
}

/// Lists nearby networks so a user on the setup network can pick one.
pub trait NetworkScanner {
    fn scan(&mut self) -> anyhow::Result<Vec<ScannedNetwork>>;
}

#[cfg(target_os = "espidf")]
pub mod wifi {
    use anyhow::anyhow;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::wifi::{
        AccessPointConfiguration, AuthMethod, BlockingWifi, ClientConfiguration, Configuration,
        EspWifi,
    };
    use log::*;
    use std::net::IpAddr;
    use std::thread;
    use std::time::Duration;

    use crate::{
        NetworkMode, NetworkScanner, ScannedNetwork, ACCESS_POINT_PASSWORD, ACCESS_POINT_SSID,
    };

    fn fixed<const N: usize>(value: &str) -> anyhow::Result<heapless::String<N>> {
        let mut s = heapless::String::<N>::new();
        s.push_str(value)
            .map_err(|_| anyhow!("'{}' is longer than {} bytes", value, N))?;
        Ok(s)
    }

    pub struct Wifi<'a> {
        inner: BlockingWifi<EspWifi<'a>>,
    }

    impl<'a> Wifi<'a> {
        pub fn new(
            modem: esp_idf_svc::hal::modem::Modem,
            sysloop: EspSystemEventLoop,
            nvs: EspDefaultNvsPartition,
        ) -> anyhow::Result<Self> {
            let esp_wifi = EspWifi::new(modem, sysloop.clone(), Some(nvs))?;
            let blocking = BlockingWifi::wrap(esp_wifi, sysloop)?;
            Ok(Wifi { inner: blocking })
        }

        /// Join `ssid`, retrying up to `attempts` times.
        pub fn connect_station(
            &mut self,
            ssid: &str,
            pass: &str,
            attempts: u8,
        ) -> anyhow::Result<NetworkMode> {
            info!("Connecting to Wi-Fi network {:?}", ssid);
            self.inner
                .set_configuration(&Configuration::Client(ClientConfiguration {
                    ssid: fixed(ssid)?,
                    password: fixed(pass)?,
                    auth_method: if pass.is_empty() {
                        AuthMethod::None
                    } else {
                        AuthMethod::WPA2Personal
                    },
                    ..Default::default()
                }))?;
            self.inner.start()?;

            let mut connected = false;
            for attempt in 1..=attempts {
                match self.inner.connect() {
                    Ok(()) => {
                        connected = true;
                        break;
                    }
                    Err(e) => {
                        debug!("Wi-Fi attempt {}/{} failed: {:?}", attempt, attempts, e);
                        thread::sleep(Duration::from_millis(500));
                    }
                }
            }
            if !connected {
                return Err(anyhow!("could not join {:?} after {} attempts", ssid, attempts));
            }

            self.inner.wait_netif_up()?;
            let ip_info = self.inner.wifi().sta_netif().get_ip_info()?;
            info!("Wi-Fi connected, IP address {}", ip_info.ip);
            Ok(NetworkMode::Station(IpAddr::V4(ip_info.ip)))
        }

        /// Host the setup access point. The station side stays up, unjoined,
        /// so scans keep working.
        pub fn start_access_point(&mut self) -> anyhow::Result<NetworkMode> {
            self.inner.set_configuration(&Configuration::Mixed(
                ClientConfiguration::default(),
                AccessPointConfiguration {
                    ssid: fixed(ACCESS_POINT_SSID)?,
                    password: fixed(ACCESS_POINT_PASSWORD)?,
                    auth_method: AuthMethod::WPA2Personal,
                    channel: 1,
                    ..Default::default()
                },
            ))?;
            self.inner.start()?;
            self.inner.wait_netif_up()?;

            let ip_info = self.inner.wifi().ap_netif().get_ip_info()?;
            info!("Setup access point {:?} up at {}", ACCESS_POINT_SSID, ip_info.ip);
            Ok(NetworkMode::AccessPoint(IpAddr::V4(ip_info.ip)))
        }
    }

    impl NetworkScanner for Wifi<'_> {
        fn scan(&mut self) -> anyhow::Result<Vec<ScannedNetwork>> {
            let found = self.inner.scan()?;
            debug!("Wi-Fi scan found {} networks", found.len());
            Ok(found
                .into_iter()
                .map(|ap| ScannedNetwork {
                    ssid: ap.ssid.to_string(),
                    rssi: ap.signal_strength,
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn access_point_mode_is_reported() {
        let ap = NetworkMode::AccessPoint(IpAddr::V4(Ipv4Addr::new(192, 168, 4, 1)));
        let sta = NetworkMode::Station(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)));
        assert!(ap.is_access_point());
        assert!(!sta.is_access_point());
        assert_eq!(sta.address(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)));
    }
}
