//! Configuration vault – reads/writes `~/.pirover/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pirover_runtime::{NavigatorConfig, PositionFeedConfig, RangeMonitorConfig, RoverConfig};
use pirover_types::RoverError;
use serde::{Deserialize, Serialize};

/// Where fixes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GpsBackend {
    #[default]
    Sim,
    Gpsd,
}

impl std::fmt::Display for GpsBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpsBackend::Sim => write!(f, "sim"),
            GpsBackend::Gpsd => write!(f, "gpsd"),
        }
    }
}

impl std::str::FromStr for GpsBackend {
    type Err = RoverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sim" => Ok(GpsBackend::Sim),
            "gpsd" => Ok(GpsBackend::Gpsd),
            other => Err(RoverError::Config(format!("unknown gps source '{other}'"))),
        }
    }
}

/// Persisted configuration stored in `~/.pirover/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub range: RangeSection,
    #[serde(default)]
    pub navigation: NavigationSection,
    #[serde(default)]
    pub gps: GpsSection,
    #[serde(default)]
    pub safety: SafetySection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: pirover_cockpit::DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeSection {
    pub period_ms: u64,
    pub warning_threshold_cm: f64,
    /// Reading reported by the simulated ranger at startup.
    pub sim_distance_cm: f64,
}

impl Default for RangeSection {
    fn default() -> Self {
        Self {
            period_ms: 100,
            warning_threshold_cm: 20.0,
            sim_distance_cm: 150.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationSection {
    pub tick_ms: u64,
    pub arrival_radius_m: f64,
    pub cruise_speed: u8,
    pub escape_pause_ms: u64,
    pub escape_turn_speed: u8,
    pub escape_turn_ms: u64,
    pub escape_forward_speed: u8,
    pub escape_forward_ms: u64,
    pub gps_loss_timeout_s: u64,
    pub max_fix_age_s: u64,
}

impl Default for NavigationSection {
    fn default() -> Self {
        let nav = NavigatorConfig::default();
        Self {
            tick_ms: nav.tick.as_millis() as u64,
            arrival_radius_m: nav.arrival_radius_m,
            cruise_speed: nav.cruise_speed,
            escape_pause_ms: nav.escape_pause.as_millis() as u64,
            escape_turn_speed: nav.escape_turn_speed,
            escape_turn_ms: nav.escape_turn.as_millis() as u64,
            escape_forward_speed: nav.escape_forward_speed,
            escape_forward_ms: nav.escape_forward.as_millis() as u64,
            gps_loss_timeout_s: nav.gps_loss_timeout.as_secs(),
            max_fix_age_s: nav.max_fix_age.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsSection {
    pub source: GpsBackend,
    pub gpsd_addr: String,
    /// Starting position of the simulated receiver.
    pub sim_latitude: f64,
    pub sim_longitude: f64,
}

impl Default for GpsSection {
    fn default() -> Self {
        Self {
            source: GpsBackend::default(),
            gpsd_addr: pirover_hal::gps::DEFAULT_GPSD_ADDR.to_string(),
            sim_latitude: 47.3769,
            sim_longitude: 8.5417,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetySection {
    /// Avoidance flag at boot.
    pub avoidance_enabled: bool,
    /// Drop repeated identical drive commands.
    pub dedup_commands: bool,
}

impl Default for SafetySection {
    fn default() -> Self {
        Self {
            avoidance_enabled: false,
            dedup_commands: true,
        }
    }
}

impl Config {
    /// Translate into the runtime's configuration.
    ///
    /// # Errors
    ///
    /// [`RoverError::Config`] when a speed lies outside `0..=100`.
    pub fn rover_config(&self) -> Result<RoverConfig, RoverError> {
        let nav = &self.navigation;
        for (name, speed) in [
            ("cruise_speed", nav.cruise_speed),
            ("escape_turn_speed", nav.escape_turn_speed),
            ("escape_forward_speed", nav.escape_forward_speed),
        ] {
            if speed > 100 {
                return Err(RoverError::Config(format!(
                    "navigation.{name} must be 0..=100, got {speed}"
                )));
            }
        }

        Ok(RoverConfig {
            warning_threshold_cm: self.range.warning_threshold_cm,
            avoidance_enabled: self.safety.avoidance_enabled,
            dedup: self.safety.dedup_commands,
            range: RangeMonitorConfig {
                period: Duration::from_millis(self.range.period_ms),
            },
            position: PositionFeedConfig::default(),
            navigator: NavigatorConfig {
                tick: Duration::from_millis(nav.tick_ms),
                arrival_radius_m: nav.arrival_radius_m,
                cruise_speed: nav.cruise_speed,
                escape_pause: Duration::from_millis(nav.escape_pause_ms),
                escape_turn_speed: nav.escape_turn_speed,
                escape_turn: Duration::from_millis(nav.escape_turn_ms),
                escape_forward_speed: nav.escape_forward_speed,
                escape_forward: Duration::from_millis(nav.escape_forward_ms),
                gps_loss_timeout: Duration::from_secs(nav.gps_loss_timeout_s),
                max_fix_age: Duration::from_secs(nav.max_fix_age_s),
            },
        })
    }
}

/// Return the path to `~/.pirover/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".pirover").join("config.toml")
}

/// Load the config from disk and apply the `PIROVER_*` overrides.
/// Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, RoverError> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, RoverError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| RoverError::Config(format!("failed to read {}: {e}", path.display())))?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| RoverError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Apply `PIROVER_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `PIROVER_PORT` | `server.port` |
/// | `PIROVER_GPS_SOURCE` | `gps.source` (`sim` or `gpsd`) |
/// | `PIROVER_GPSD_ADDR` | `gps.gpsd_addr` |
/// | `PIROVER_AVOIDANCE` | `safety.avoidance_enabled` (`true`/`false`) |
/// | `PIROVER_CRUISE_SPEED` | `navigation.cruise_speed` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("PIROVER_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.server.port = port;
    }
    if let Ok(v) = std::env::var("PIROVER_GPS_SOURCE")
        && let Ok(source) = v.parse::<GpsBackend>()
    {
        cfg.gps.source = source;
    }
    if let Ok(v) = std::env::var("PIROVER_GPSD_ADDR") {
        cfg.gps.gpsd_addr = v;
    }
    if let Ok(v) = std::env::var("PIROVER_AVOIDANCE")
        && let Ok(enabled) = v.parse::<bool>()
    {
        cfg.safety.avoidance_enabled = enabled;
    }
    if let Ok(v) = std::env::var("PIROVER_CRUISE_SPEED")
        && let Ok(speed) = v.parse::<u8>()
    {
        cfg.navigation.cruise_speed = speed;
    }
}

/// Save the config to disk, creating `~/.pirover/` if necessary.
pub fn save(cfg: &Config) -> Result<(), RoverError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), RoverError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| RoverError::Config(format!("failed to create config directory: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                RoverError::Config(format!("failed to set config directory permissions: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| RoverError::Config(format!("failed to serialize config: {e}")))?;
    let write_err =
        |e: std::io::Error| RoverError::Config(format!("failed to write {}: {e}", path.display()));

    // Owner-only read/write (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_meta = std::fs::metadata(path.parent().unwrap()).expect("dir metadata");
        assert_eq!(dir_meta.permissions().mode() & 0o777, 0o700);
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.server.port, 5000);
        assert_eq!(loaded.gps.source, GpsBackend::Sim);
        assert!((loaded.range.warning_threshold_cm - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[navigation]\ncruise_speed = 35\n\n[gps]\nsource = \"gpsd\"\n").unwrap();

        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.navigation.cruise_speed, 35);
        assert_eq!(cfg.navigation.tick_ms, 500);
        assert_eq!(cfg.gps.source, GpsBackend::Gpsd);
        assert_eq!(cfg.gps.gpsd_addr, "127.0.0.1:2947");
        assert!(cfg.safety.dedup_commands);
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = \"not a number\"\n").unwrap();
        assert!(matches!(load_from(&path), Err(RoverError::Config(_))));
    }

    #[test]
    fn config_path_points_to_pirover_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".pirover"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn rover_config_carries_values() {
        let mut cfg = Config::default();
        cfg.navigation.tick_ms = 250;
        cfg.safety.avoidance_enabled = true;
        let rover = cfg.rover_config().unwrap();
        assert_eq!(rover.navigator.tick, Duration::from_millis(250));
        assert!(rover.avoidance_enabled);
        assert_eq!(rover.navigator.max_fix_age, Duration::from_secs(5));
    }

    #[test]
    fn rover_config_rejects_speed_over_100() {
        let mut cfg = Config::default();
        cfg.navigation.escape_turn_speed = 120;
        assert!(matches!(cfg.rover_config(), Err(RoverError::Config(msg)) if msg.contains("escape_turn_speed")));
    }

    #[test]
    fn gps_backend_parses() {
        assert_eq!("GPSD".parse::<GpsBackend>().unwrap(), GpsBackend::Gpsd);
        assert!("serial".parse::<GpsBackend>().is_err());
    }

    // Each test owns distinct variables so parallel tests do not interfere.

    #[test]
    fn apply_env_overrides_changes_port() {
        // SAFETY: no other test touches PIROVER_PORT.
        unsafe { std::env::set_var("PIROVER_PORT", "6001") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.server.port, 6001);
        unsafe { std::env::remove_var("PIROVER_PORT") };
    }

    #[test]
    fn apply_env_overrides_changes_gps_source() {
        // SAFETY: no other test touches these variables.
        unsafe {
            std::env::set_var("PIROVER_GPS_SOURCE", "gpsd");
            std::env::set_var("PIROVER_GPSD_ADDR", "10.0.0.2:2947");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.gps.source, GpsBackend::Gpsd);
        assert_eq!(cfg.gps.gpsd_addr, "10.0.0.2:2947");
        unsafe {
            std::env::remove_var("PIROVER_GPS_SOURCE");
            std::env::remove_var("PIROVER_GPSD_ADDR");
        }
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_values() {
        // SAFETY: no other test touches these variables.
        unsafe {
            std::env::set_var("PIROVER_AVOIDANCE", "maybe");
            std::env::set_var("PIROVER_CRUISE_SPEED", "fast");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert!(!cfg.safety.avoidance_enabled);
        assert_eq!(cfg.navigation.cruise_speed, 50);
        unsafe {
            std::env::remove_var("PIROVER_AVOIDANCE");
            std::env::remove_var("PIROVER_CRUISE_SPEED");
        }
    }
}
