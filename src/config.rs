//! Application configuration.
//!
//! The configuration is loaded from a JSON file at
//! `$XDG_CONFIG_HOME/kanata-indicator/config.json`.  Keys use kebab-case to
//! match kanata's own naming, and every key is optional.
//!
//! # Example
//!
//! ```json
//! {
//!   "host": "127.0.0.1",
//!   "port": 10000,
//!   "service-name": "kanata.service",
//!   "indicator": { "corner": "top-right", "margin": 8 }
//! }
//! ```

use crate::kanata::connection::ConnectionTarget;
use crate::systemd::monitor::UnitNames;
use crate::systemd::unit_path_suffix;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "kanata-indicator";

/// Top-level configuration.
///
/// A minimal `{}` file is valid and every field falls back to its
/// compiled-in default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Host kanata listens on.
    pub host: String,
    /// TCP port passed to kanata with `--port`.
    pub port: u16,
    /// Unit name as it appears in `JobRemoved` notifications.
    pub service_name: String,
    /// Escaped object-path suffix of the unit.  Derived from
    /// `service_name` when unset.
    pub dbus_name: Option<String>,
    /// Upper bound on one connect attempt (ms).  `0` leaves it to the OS.
    pub connect_timeout_ms: u64,
    /// Indicator placement.
    pub indicator: IndicatorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 10000,
            service_name: "kanata.service".into(),
            dbus_name: None,
            connect_timeout_ms: 1000,
            indicator: IndicatorConfig::default(),
        }
    }
}

/// Screen corner the indicator is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Indicator placement and initial content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct IndicatorConfig {
    pub corner: Corner,
    /// Distance from the screen edges (px).
    pub margin: i32,
    /// Label text before the first layer arrives.  The indicator stays
    /// hidden until then.
    pub initial_text: String,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            corner: Corner::TopRight,
            margin: 8,
            initial_text: "init...".into(),
        }
    }
}

/// Directory holding `config.json` and `style.css`.
///
/// `$XDG_CONFIG_HOME/kanata-indicator`, or `~/.config/kanata-indicator` when
/// that is unset or empty.  `None` without either variable.
pub fn config_dir() -> Option<PathBuf> {
    config_dir_from(
        std::env::var_os("XDG_CONFIG_HOME"),
        std::env::var_os("HOME"),
    )
}

fn config_dir_from(xdg_config_home: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    let base = match xdg_config_home.filter(|v| !v.is_empty()) {
        Some(xdg) => PathBuf::from(xdg),
        None => PathBuf::from(home.filter(|v| !v.is_empty())?).join(".config"),
    };
    Some(base.join(APP_DIR))
}

impl Config {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// [`load`](Self::load), falling back to the defaults.  A missing file is
    /// normal; an unreadable or invalid one is worth a warning.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => {
                info!("loaded config from {}", path.display());
                config
            }
            Err(ConfigError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                info!("no config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn target(&self) -> ConnectionTarget {
        ConnectionTarget::new(self.host.clone(), self.port)
    }

    pub fn unit(&self) -> UnitNames {
        UnitNames {
            service_name: self.service_name.clone(),
            dbus_name: self
                .dbus_name
                .clone()
                .unwrap_or_else(|| unit_path_suffix(&self.service_name)),
        }
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        match self.connect_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// Error from loading or parsing a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_full_config() {
        let json = r#"{
            "host": "localhost",
            "port": 4039,
            "service-name": "kanata-laptop.service",
            "dbus-name": "custom",
            "connect-timeout-ms": 250,
            "indicator": {
                "corner": "bottom-left",
                "margin": 0,
                "initial-text": "..."
            }
        }"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.target(), ConnectionTarget::new("localhost", 4039));
        assert_eq!(cfg.unit().service_name, "kanata-laptop.service");
        assert_eq!(cfg.unit().dbus_name, "custom");
        assert_eq!(cfg.connect_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(cfg.indicator.corner, Corner::BottomLeft);
        assert_eq!(cfg.indicator.margin, 0);
        assert_eq!(cfg.indicator.initial_text, "...");
    }

    #[test]
    fn deserialize_empty_uses_defaults() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        let d = Config::default();
        assert_eq!(cfg.host, d.host);
        assert_eq!(cfg.port, d.port);
        assert_eq!(cfg.service_name, d.service_name);
        assert_eq!(cfg.connect_timeout_ms, d.connect_timeout_ms);
        assert_eq!(cfg.indicator.corner, Corner::TopRight);
        assert_eq!(cfg.indicator.initial_text, "init...");
    }

    #[test]
    fn dbus_name_is_derived_from_service_name() {
        let cfg: Config = serde_json::from_str(r#"{ "service-name": "kanata.service" }"#).unwrap();
        assert_eq!(cfg.unit().dbus_name, "kanata_2eservice");
    }

    #[test]
    fn zero_timeout_means_none() {
        let cfg: Config = serde_json::from_str(r#"{ "connect-timeout-ms": 0 }"#).unwrap();
        assert_eq!(cfg.connect_timeout(), None);
    }

    #[test]
    fn out_of_range_port_is_rejected() {
        assert!(serde_json::from_str::<Config>(r#"{ "port": 70000 }"#).is_err());
    }

    #[test]
    fn unknown_keys_ignored() {
        let _cfg: Config = serde_json::from_str(r#"{ "future-key": { "a": 1 } }"#).unwrap();
    }

    #[test]
    fn load_missing_file_is_error() {
        let err = Config::load(Path::new("/nonexistent/kanata-indicator.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    fn temp_config(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "kanata-indicator-{}-{}.json",
            name,
            std::process::id()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn load_or_default_reads_file() {
        let path = temp_config("port", r#"{ "port": 4040 }"#);
        let cfg = Config::load_or_default(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(cfg.port, 4040);
    }

    #[test]
    fn load_or_default_falls_back_on_invalid_file() {
        let path = temp_config("invalid", "{ port: ");
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
        let cfg = Config::load_or_default(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(cfg.port, Config::default().port);
    }

    #[test]
    fn load_or_default_falls_back_on_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/kanata-indicator.json"));
        assert_eq!(cfg.host, "127.0.0.1");
    }

    #[test]
    fn config_dir_prefers_xdg_config_home() {
        assert_eq!(
            config_dir_from(Some("/xdg".into()), Some("/home/me".into())),
            Some(PathBuf::from("/xdg/kanata-indicator"))
        );
    }

    #[test]
    fn config_dir_falls_back_to_home() {
        let expected = Some(PathBuf::from("/home/me/.config/kanata-indicator"));
        assert_eq!(config_dir_from(None, Some("/home/me".into())), expected);
        assert_eq!(config_dir_from(Some("".into()), Some("/home/me".into())), expected);
    }

    #[test]
    fn config_dir_needs_some_base() {
        assert_eq!(config_dir_from(None, None), None);
    }
}
