//! Configuration for the keylightd daemon.
//!
//! Loaded from YAML. Every field has a default, so an empty file (or no file
//! at all) yields a working configuration that only lacks devices.

use std::{
    collections::HashSet,
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result, bail, ensure};
use log::info;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{
    converter::{CalibrationPoint, CalibrationTable, DEFAULT_ANCHORS},
    error::CalibrationError,
    surface::{SliderRange, SurfaceSettings},
};

const ENV_CONFIG: &str = "KEYLIGHTD_CONFIG";
const CONFIG_FILE: &str = "keylightd/config.yml";
const SYSTEM_CONFIG: &str = "/etc/keylightd/config.yml";

/// Daemon configuration.
///
/// # Example
///
/// ```yaml
/// version: 1
/// discovery_timeout_secs: 10
/// quiet_window_ms: 700
/// clamp_brightness_steps: true
/// request_timeout_ms: 2000
///
/// brightness: { min: 3, max: 100, step: 1 }
/// temperature: { min: 2900, max: 7000, step: 50 }
///
/// devices:
///   - name: "Elgato Key Light 3A2F"
///     host: "192.168.1.40"
///   - name: "Elgato Key Light Air"
///     host: "keylight-air.local"
///     port: 9123
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Configuration format version. Only `1` is supported.
    #[serde(default = "defaults::version")]
    pub version: u8,

    /// How long discovery accepts new devices after startup.
    #[serde(default = "defaults::discovery_timeout_secs")]
    pub discovery_timeout_secs: u64,

    /// Quiet window of the slider debouncers.
    #[serde(default = "defaults::quiet_window_ms")]
    pub quiet_window_ms: u64,

    /// Keep `+`/`-` brightness steps inside the brightness slider range.
    #[serde(default = "defaults::clamp_brightness_steps")]
    pub clamp_brightness_steps: bool,

    #[serde(default = "defaults::brightness")]
    pub brightness: SliderRange,

    #[serde(default = "defaults::temperature")]
    pub temperature: SliderRange,

    /// Kelvin/native anchor pairs, ordered by Kelvin.
    #[serde(default = "defaults::calibration")]
    pub calibration: Vec<CalibrationPoint>,

    /// Per-request HTTP timeout for device round trips.
    #[serde(default = "defaults::request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Lights announced by the static discovery feed, in order.
    #[serde(default)]
    pub devices: Vec<DeviceCfg>,
}

/// A light reachable over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCfg {
    pub name: String,
    pub host: String,
    #[serde(default = "defaults::port")]
    pub port: u16,
}

mod defaults {
    use super::*;

    pub fn version() -> u8 {
        1
    }

    pub fn discovery_timeout_secs() -> u64 {
        10
    }

    pub fn quiet_window_ms() -> u64 {
        700
    }

    pub fn clamp_brightness_steps() -> bool {
        true
    }

    pub fn brightness() -> SliderRange {
        SliderRange::BRIGHTNESS
    }

    pub fn temperature() -> SliderRange {
        SliderRange::TEMPERATURE
    }

    pub fn calibration() -> Vec<CalibrationPoint> {
        DEFAULT_ANCHORS.iter().copied().map(Into::into).collect()
    }

    pub fn request_timeout_ms() -> u64 {
        2000
    }

    pub fn port() -> u16 {
        crate::drivers::elgato::DEFAULT_PORT
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: defaults::version(),
            discovery_timeout_secs: defaults::discovery_timeout_secs(),
            quiet_window_ms: defaults::quiet_window_ms(),
            clamp_brightness_steps: defaults::clamp_brightness_steps(),
            brightness: defaults::brightness(),
            temperature: defaults::temperature(),
            calibration: defaults::calibration(),
            request_timeout_ms: defaults::request_timeout_ms(),
            devices: Vec::new(),
        }
    }
}

impl Config {
    /// Checks the configuration for consistency.
    ///
    /// ```
    /// use keylightd::config::Config;
    ///
    /// let mut config = Config::default();
    /// assert!(config.validate().is_ok());
    ///
    /// config.brightness.step = 0;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.version == 1,
            "Unsupported config version {}",
            self.version
        );
        ensure!(
            self.discovery_timeout_secs > 0,
            "discovery_timeout_secs must be positive"
        );
        ensure!(self.quiet_window_ms > 0, "quiet_window_ms must be positive");
        ensure!(
            self.request_timeout_ms > 0,
            "request_timeout_ms must be positive"
        );

        validate_slider("brightness", &self.brightness)?;
        ensure!(
            self.brightness.min >= 0 && self.brightness.max <= 100,
            "brightness slider must stay within 0..=100 percent"
        );
        validate_slider("temperature", &self.temperature)?;

        self.calibration_table()
            .context("Invalid temperature calibration")?;

        let mut names = HashSet::new();
        for device in &self.devices {
            ensure!(
                !device.host.trim().is_empty(),
                "Device '{}' has an empty host",
                device.name
            );
            ensure!(
                names.insert(device.name.as_str()),
                "Device name '{}' is used more than once",
                device.name
            );
        }

        Ok(())
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    pub fn quiet_window(&self) -> Duration {
        Duration::from_millis(self.quiet_window_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn calibration_table(&self) -> Result<CalibrationTable, CalibrationError> {
        CalibrationTable::new(self.calibration.clone())
    }

    pub fn surface_settings(&self) -> SurfaceSettings {
        SurfaceSettings {
            brightness: self.brightness,
            temperature: self.temperature,
            quiet_window: self.quiet_window(),
            clamp_brightness_steps: self.clamp_brightness_steps,
        }
    }
}

fn validate_slider(name: &str, range: &SliderRange) -> Result<()> {
    ensure!(
        range.min < range.max,
        "{name} slider min ({}) must be below max ({})",
        range.min,
        range.max
    );
    ensure!(range.step > 0, "{name} slider step must be positive");
    Ok(())
}

/// Per-user config path: `$XDG_CONFIG_HOME/keylightd/config.yml` or
/// `~/.config/keylightd/config.yml`.
fn user_config_path() -> Option<PathBuf> {
    env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|h| Path::new(&h).join(".config")))
        .map(|dir| dir.join(CONFIG_FILE))
}

/// Finds the config file in the standard locations, if there is one.
fn locate_config() -> Option<PathBuf> {
    if let Some(env_path) = env::var_os(ENV_CONFIG) {
        return Some(PathBuf::from(env_path));
    }

    if let Some(user) = user_config_path().filter(|p| p.exists()) {
        return Some(user);
    }

    let system = Path::new(SYSTEM_CONFIG);
    system.exists().then(|| system.to_path_buf())
}

/// Owns the configuration and the file it came from.
///
/// # Example
///
/// ```no_run
/// use keylightd::config::ConfigManager;
/// use std::path::PathBuf;
///
/// # async fn example() -> anyhow::Result<()> {
/// // Explicit path: the file must exist.
/// let config_manager = ConfigManager::load(Some(PathBuf::from("config.yml"))).await?;
///
/// // Standard locations, falling back to defaults.
/// let config_manager = ConfigManager::load(None).await?;
///
/// let timeout = config_manager.get().await.discovery_timeout();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<Config>>,
    path: PathBuf,
}

impl ConfigManager {
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            path,
        }
    }

    /// Loads configuration from `path` or from the standard locations.
    ///
    /// Search order:
    /// 1. Provided path parameter
    /// 2. `KEYLIGHTD_CONFIG` environment variable
    /// 3. `$XDG_CONFIG_HOME/keylightd/config.yml` or `~/.config/keylightd/config.yml`
    /// 4. `/etc/keylightd/config.yml`
    ///
    /// Without any file the built-in defaults are used, and [`save`](Self::save)
    /// targets the per-user location.
    pub async fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path.or_else(locate_config) {
            Some(p) => p,
            None => {
                let target = user_config_path()
                    .unwrap_or_else(|| PathBuf::from(SYSTEM_CONFIG));
                info!(
                    "No configuration file found, using defaults (save target: {})",
                    target.display()
                );
                return Ok(Self::new(Config::default(), target));
            }
        };

        info!("Loading config from: {}", config_path.display());
        let config = Self::load_config_from_path(&config_path).await?;

        Ok(Self::new(config, config_path))
    }

    pub async fn get(&self) -> tokio::sync::RwLockReadGuard<'_, Config> {
        self.config.read().await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the current configuration to [`path`](Self::path). The file is
    /// staged next to the target and renamed into place.
    pub async fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&*self.config.read().await)
            .context("Failed to serialize configuration")?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let staged = self.path.with_extension("yml.tmp");
        fs::write(&staged, yaml)
            .with_context(|| format!("Failed to write {}", staged.display()))?;
        fs::rename(&staged, &self.path)
            .with_context(|| format!("Failed to move config to {}", self.path.display()))?;

        info!("Configuration written to {}", self.path.display());
        Ok(())
    }

    pub async fn validate(&self) -> Result<()> {
        self.config.read().await.validate()
    }

    async fn load_config_from_path(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        // An empty document parses as null; treat it as "all defaults".
        let config: Config = if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML in: {}", path.display()))?
        };

        if config.version != 1 {
            bail!(
                "Unsupported config version {} in file: {}",
                config.version,
                path.display()
            );
        }

        config
            .validate()
            .with_context(|| format!("Configuration validation failed for: {}", path.display()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    fn device(name: &str, host: &str) -> DeviceCfg {
        DeviceCfg {
            name: name.to_string(),
            host: host.to_string(),
            port: 9123,
        }
    }

    /// Points the search path at `xdg` and clears the override variable.
    ///
    /// # Safety
    /// Callers are `#[serial]`, so no other test touches the environment.
    unsafe fn isolate_env(xdg: &Path) {
        unsafe {
            env::remove_var(ENV_CONFIG);
            env::set_var("XDG_CONFIG_HOME", xdg);
        }
    }

    #[tokio::test]
    async fn load_full_yaml() {
        let yaml = r#"
version: 1
discovery_timeout_secs: 5
quiet_window_ms: 300
clamp_brightness_steps: false
request_timeout_ms: 1500
brightness: { min: 10, max: 90, step: 5 }
temperature: { min: 3000, max: 6500, step: 100 }
calibration:
  - { kelvin: 3000, native: 333 }
  - { kelvin: 6500, native: 154 }
devices:
  - name: "Elgato Key Light 3A2F"
    host: "192.168.1.40"
  - name: "Air"
    host: "keylight-air.local"
    port: 9124
"#;
        let temp_file = create_temp_config(yaml);

        let manager = ConfigManager::load(Some(temp_file.path().to_path_buf()))
            .await
            .unwrap();
        let config = manager.get().await.clone();

        assert_eq!(config.discovery_timeout(), Duration::from_secs(5));
        assert_eq!(config.quiet_window(), Duration::from_millis(300));
        assert_eq!(config.request_timeout(), Duration::from_millis(1500));
        assert!(!config.clamp_brightness_steps);
        assert_eq!(
            config.brightness,
            SliderRange {
                min: 10,
                max: 90,
                step: 5
            }
        );
        assert_eq!(config.calibration.len(), 2);
        assert_eq!(
            config.devices,
            vec![
                device("Elgato Key Light 3A2F", "192.168.1.40"),
                DeviceCfg {
                    name: "Air".to_string(),
                    host: "keylight-air.local".to_string(),
                    port: 9124,
                },
            ]
        );
        assert_eq!(manager.path(), temp_file.path());
    }

    #[tokio::test]
    async fn missing_fields_take_defaults() {
        let temp_file = create_temp_config("version: 1\n");
        let manager = ConfigManager::load(Some(temp_file.path().to_path_buf()))
            .await
            .unwrap();

        assert_eq!(*manager.get().await, Config::default());
    }

    #[tokio::test]
    async fn empty_file_is_all_defaults() {
        let temp_file = create_temp_config("");
        let manager = ConfigManager::load(Some(temp_file.path().to_path_buf()))
            .await
            .unwrap();

        assert_eq!(*manager.get().await, Config::default());
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let config = Config::default();
        assert_eq!(config.version, 1);
        assert_eq!(config.discovery_timeout(), Duration::from_secs(10));
        assert_eq!(config.quiet_window(), Duration::from_millis(700));
        assert!(config.clamp_brightness_steps);
        assert_eq!(config.brightness, SliderRange::BRIGHTNESS);
        assert_eq!(config.temperature, SliderRange::TEMPERATURE);
        assert_eq!(config.calibration_table().unwrap(), CalibrationTable::default());

        let settings = config.surface_settings();
        assert_eq!(settings, SurfaceSettings::default());
    }

    #[tokio::test]
    async fn explicit_missing_path_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = ConfigManager::load(Some(dir.path().join("nope.yml"))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unsupported_version_is_rejected() {
        let temp_file = create_temp_config("version: 2\n");
        let error = ConfigManager::load(Some(temp_file.path().to_path_buf()))
            .await
            .unwrap_err();
        assert!(format!("{error:#}").contains("Unsupported config version 2"));
    }

    #[tokio::test]
    async fn malformed_yaml_is_rejected() {
        let temp_file = create_temp_config("version: [1\n");
        let error = ConfigManager::load(Some(temp_file.path().to_path_buf()))
            .await
            .unwrap_err();
        assert!(format!("{error:#}").contains("Failed to parse YAML"));
    }

    #[test]
    fn validate_rejects_inverted_slider() {
        let mut config = Config::default();
        config.temperature = SliderRange {
            min: 7000,
            max: 2900,
            step: 50,
        };
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("temperature slider min"));
    }

    #[test]
    fn validate_rejects_brightness_above_hundred() {
        let mut config = Config::default();
        config.brightness.max = 150;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_timeouts() {
        let mut config = Config::default();
        config.quiet_window_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.discovery_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.request_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_calibration() {
        let mut config = Config::default();
        config.calibration = vec![(2900, 344).into(), (2800, 300).into()];
        let error = config.validate().unwrap_err();
        assert!(format!("{error:#}").contains("calibration"));
    }

    #[test]
    fn validate_rejects_duplicate_device_names() {
        let mut config = Config::default();
        config.devices = vec![device("desk", "10.0.0.2"), device("desk", "10.0.0.3")];
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("more than once"));
    }

    #[test]
    fn validate_rejects_empty_host() {
        let mut config = Config::default();
        config.devices = vec![device("desk", "  ")];
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn save_writes_a_loadable_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config.yml");

        let mut config = Config::default();
        config.devices.push(device("desk", "10.0.0.2"));
        ConfigManager::new(config.clone(), path.clone())
            .save()
            .await
            .unwrap();

        assert!(!path.with_extension("yml.tmp").exists());
        let reopened = ConfigManager::load(Some(path)).await.unwrap();
        assert_eq!(*reopened.get().await, config);
    }

    #[tokio::test]
    async fn save_replaces_an_existing_file() {
        let file = create_temp_config("version: 1\nquiet_window_ms: 50\n");
        let manager = ConfigManager::load(Some(file.path().to_path_buf())).await.unwrap();
        manager.save().await.unwrap();

        let written = std::fs::read_to_string(file.path()).unwrap();
        assert!(written.contains("quiet_window_ms: 50"));
        assert!(written.contains("discovery_timeout_secs: 10"));
    }

    #[tokio::test]
    #[serial]
    async fn env_variable_overrides_search_path() {
        let xdg = TempDir::new().unwrap();
        let temp_file = create_temp_config("version: 1\nquiet_window_ms: 250\n");
        unsafe {
            isolate_env(xdg.path());
            env::set_var(ENV_CONFIG, temp_file.path());
        }

        let manager = ConfigManager::load(None).await.unwrap();
        unsafe { env::remove_var(ENV_CONFIG) };

        assert_eq!(manager.get().await.quiet_window_ms, 250);
        assert_eq!(manager.path(), temp_file.path());
    }

    #[tokio::test]
    #[serial]
    async fn user_config_is_found_under_xdg() {
        let xdg = TempDir::new().unwrap();
        let path = xdg.path().join(CONFIG_FILE);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "version: 1\ndiscovery_timeout_secs: 3\n").unwrap();
        unsafe { isolate_env(xdg.path()) };

        let manager = ConfigManager::load(None).await.unwrap();
        assert_eq!(manager.get().await.discovery_timeout_secs, 3);
        assert_eq!(manager.path(), path);
    }

    #[tokio::test]
    #[serial]
    async fn no_config_anywhere_falls_back_to_defaults() {
        if Path::new(SYSTEM_CONFIG).exists() {
            return;
        }
        let xdg = TempDir::new().unwrap();
        unsafe { isolate_env(xdg.path()) };

        let manager = ConfigManager::load(None).await.unwrap();
        assert_eq!(*manager.get().await, Config::default());
        assert_eq!(manager.path(), xdg.path().join(CONFIG_FILE));
    }
}
