use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracker::Settings;

/// Bumped whenever the stored layout changes; older records are replaced
/// by the defaults.
pub const CONFIG_VERSION: u8 = 1;

/// Largest mounting offset accepted on either axis, degrees
pub const MAX_OFFSET: i32 = 180;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub version: u8,
    pub network: NetworkConfig,
    pub location: LocationConfig,
    pub mount: MountConfig,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub ssid: heapless::String<32>,
    pub password: heapless::String<32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationConfig {
    pub latitude: f64,
    pub longitude: f64,
    pub gmt_offset_hours: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountConfig {
    pub vertical_min: i32,
    pub vertical_max: i32,
    pub horizontal_offset: i32,
    pub vertical_offset: i32,
}

impl Default for Config {
    fn default() -> Self {
        let tracking = Settings::default();
        Config {
            version: CONFIG_VERSION,
            network: NetworkConfig::default(),
            location: LocationConfig {
                latitude: tracking.latitude,
                longitude: tracking.longitude,
                gmt_offset_hours: tracking.gmt_offset_hours,
            },
            mount: MountConfig {
                vertical_min: tracking.vertical_min,
                vertical_max: tracking.vertical_max,
                horizontal_offset: tracking.horizontal_offset,
                vertical_offset: tracking.vertical_offset,
            },
        }
    }
}

fn fixed(value: &str) -> anyhow::Result<heapless::String<32>> {
    let mut s = heapless::String::<32>::new();
    s.push_str(value)
        .map_err(|_| anyhow!("value longer than 32 bytes"))?;
    Ok(s)
}

fn number<T: std::str::FromStr>(key: &str, value: &str) -> anyhow::Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{} is not a number: {:?}", key, value))
}

impl Config {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.version != CONFIG_VERSION {
            bail!(
                "config version {} does not match {}",
                self.version,
                CONFIG_VERSION
            );
        }
        let m = &self.mount;
        if m.vertical_min < 0 || m.vertical_max > 180 || m.vertical_min > m.vertical_max {
            bail!(
                "vertical limits {}..{} must satisfy 0 <= min <= max <= 180",
                m.vertical_min,
                m.vertical_max
            );
        }
        for (name, offset) in [
            ("horizontal", m.horizontal_offset),
            ("vertical", m.vertical_offset),
        ] {
            if !(-MAX_OFFSET..=MAX_OFFSET).contains(&offset) {
                bail!("{} offset {} outside ±{}", name, offset, MAX_OFFSET);
            }
        }
        if !(-14..=14).contains(&self.location.gmt_offset_hours) {
            bail!("gmt offset {} out of range", self.location.gmt_offset_hours);
        }
        Ok(())
    }

    pub fn has_credentials(&self) -> bool {
        !self.network.ssid.is_empty()
    }

    /// The snapshot handed to the tracking controller
    pub fn tracking(&self) -> Settings {
        Settings {
            latitude: self.location.latitude,
            longitude: self.location.longitude,
            gmt_offset_hours: self.location.gmt_offset_hours,
            vertical_min: self.mount.vertical_min,
            vertical_max: self.mount.vertical_max,
            horizontal_offset: self.mount.horizontal_offset,
            vertical_offset: self.mount.vertical_offset,
        }
    }

    /// Copy of this config with the request layer's `saveCfg` parameters
    /// applied. Unknown keys are ignored; any bad value rejects the whole
    /// update.
    pub fn apply_update<'a, I>(&self, params: I) -> anyhow::Result<Config>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut next = self.clone();
        for (key, value) in params {
            match key {
                "ssid" => next.network.ssid = fixed(value).context("ssid")?,
                "pass" => next.network.password = fixed(value).context("pass")?,
                "lat" => next.location.latitude = number(key, value)?,
                "lon" => next.location.longitude = number(key, value)?,
                "gmt" => next.location.gmt_offset_hours = number(key, value)?,
                "verMin" => next.mount.vertical_min = number(key, value)?,
                "verMax" => next.mount.vertical_max = number(key, value)?,
                "hOff" => next.mount.horizontal_offset = number(key, value)?,
                "vOff" => next.mount.vertical_offset = number(key, value)?,
                _ => log::debug!("Ignoring config parameter {:?}", key),
            }
        }
        next.version = CONFIG_VERSION;
        next.validate()?;
        Ok(next)
    }
}

/// Persistent home of the configuration record.
pub trait ConfigStore {
    /// Raw stored text, `None` if nothing has been stored yet
    fn read(&mut self) -> anyhow::Result<Option<String>>;
    fn write(&mut self, text: &str) -> anyhow::Result<()>;

    /// Stored config, or the defaults (written back) when the record is
    /// missing, unreadable, from another version or invalid.
    fn load(&mut self) -> anyhow::Result<Config> {
        let reason = match self.read()? {
            Some(text) => match Config::parse(&text) {
                Ok(config) => {
                    log::info!("Loaded stored configuration");
                    return Ok(config);
                }
                Err(e) => format!("stored configuration rejected: {:#}", e),
            },
            None => String::from("no stored configuration"),
        };
        log::warn!("{}, using defaults", reason);
        let config = Config::default();
        self.save(&config)?;
        Ok(config)
    }

    fn save(&mut self, config: &Config) -> anyhow::Result<()> {
        config.validate()?;
        self.write(&config.to_toml()?)?;
        log::info!("Configuration saved");
        Ok(())
    }
}

/// TOML file on the host filesystem
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileConfigStore { path: path.into() }
    }
}

impl ConfigStore for FileConfigStore {
    fn read(&mut self) -> anyhow::Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        Ok(Some(text))
    }

    fn write(&mut self, text: &str) -> anyhow::Result<()> {
        fs::write(&self.path, text).with_context(|| format!("writing {}", self.path.display()))
    }
}

#[cfg(target_os = "espidf")]
pub use nvs::NvsConfigStore;

#[cfg(target_os = "espidf")]
mod nvs {
    use super::ConfigStore;
    use esp_idf_svc::nvs::{EspNvs, NvsPartitionId};

    const CONFIG_KEY: &str = "config";

    /// TOML text under one key of an NVS namespace
    pub struct NvsConfigStore<T: NvsPartitionId> {
        nvs: EspNvs<T>,
    }

    impl<T: NvsPartitionId> NvsConfigStore<T> {
        pub fn new(nvs: EspNvs<T>) -> Self {
            NvsConfigStore { nvs }
        }
    }

    impl<T: NvsPartitionId> ConfigStore for NvsConfigStore<T> {
        fn read(&mut self) -> anyhow::Result<Option<String>> {
            let mut buf = [0u8; 512];
            Ok(self
                .nvs
                .get_str(CONFIG_KEY, &mut buf)?
                .map(|s| s.to_string()))
        }

        fn write(&mut self, text: &str) -> anyhow::Result<()> {
            self.nvs.set_str(CONFIG_KEY, text)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MemoryStore {
        text: Option<String>,
        writes: usize,
    }

    impl ConfigStore for MemoryStore {
        fn read(&mut self) -> anyhow::Result<Option<String>> {
            Ok(self.text.clone())
        }

        fn write(&mut self, text: &str) -> anyhow::Result<()> {
            self.text = Some(text.to_string());
            self.writes += 1;
            Ok(())
        }
    }

    #[test]
    fn example_file_matches_defaults() {
        let example = include_str!("../config.toml.example");
        assert_eq!(Config::parse(example).unwrap(), Config::default());
    }

    #[test]
    fn missing_record_is_replaced_by_defaults() {
        let mut store = MemoryStore::default();
        assert_eq!(store.load().unwrap(), Config::default());
        assert_eq!(store.writes, 1);
        assert!(store.text.is_some());
    }

    #[test]
    fn stale_version_falls_back_to_defaults() {
        let mut old = Config::default();
        old.location.latitude = 10.0;
        let text = old.to_toml().unwrap().replace("version = 1", "version = 0");
        let mut store = MemoryStore {
            text: Some(text),
            writes: 0,
        };
        assert_eq!(store.load().unwrap(), Config::default());
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let mut store = MemoryStore {
            text: Some(String::from("\u{0}\u{0}not toml")),
            writes: 0,
        };
        assert_eq!(store.load().unwrap(), Config::default());
    }

    #[test]
    fn saved_record_loads_back() {
        let mut store = MemoryStore::default();
        let config = Config::default()
            .apply_update([("ssid", "roof"), ("pass", "sunny"), ("hOff", "-4")])
            .unwrap();
        store.save(&config).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.network.ssid.as_str(), "roof");
        assert_eq!(loaded.tracking().horizontal_offset, -4);
    }

    #[test]
    fn update_rejects_inverted_limits() {
        let err = Config::default()
            .apply_update([("verMin", "80"), ("verMax", "20")])
            .unwrap_err();
        assert!(err.to_string().contains("vertical limits"));
    }

    #[test]
    fn update_rejects_offsets_beyond_travel() {
        let err = Config::default()
            .apply_update([("hOff", "2147483647")])
            .unwrap_err();
        assert!(err.to_string().contains("horizontal offset"));
        assert!(Config::default().apply_update([("vOff", "-181")]).is_err());
        assert!(Config::default().apply_update([("hOff", "-180"), ("vOff", "180")]).is_ok());
    }

    #[test]
    fn stored_record_with_wild_offset_is_replaced() {
        let text = Config::default()
            .to_toml()
            .unwrap()
            .replace("horizontal_offset = 0", "horizontal_offset = 5000");
        let mut store = MemoryStore {
            text: Some(text),
            writes: 0,
        };
        assert_eq!(store.load().unwrap(), Config::default());
    }

    #[test]
    fn update_rejects_bad_numbers_and_long_credentials() {
        assert!(Config::default().apply_update([("lat", "north")]).is_err());
        let long = "x".repeat(33);
        assert!(Config::default().apply_update([("ssid", long.as_str())]).is_err());
    }

    #[test]
    fn update_keeps_untouched_fields() {
        let config = Config::default()
            .apply_update([("lat", "40.5"), ("gmt", "-3"), ("unknown", "1")])
            .unwrap();
        assert_eq!(config.location.latitude, 40.5);
        assert_eq!(config.location.gmt_offset_hours, -3);
        assert_eq!(config.location.longitude, 71.4333);
        assert_eq!(config.mount, Config::default().mount);
    }

    #[test]
    fn file_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut store = FileConfigStore::new(&path);
        assert_eq!(store.load().unwrap(), Config::default());
        assert!(path.exists());

        let updated = Config::default().apply_update([("vOff", "7")]).unwrap();
        store.save(&updated).unwrap();
        assert_eq!(FileConfigStore::new(&path).load().unwrap(), updated);
    }
}
