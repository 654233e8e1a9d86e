use std::path::PathBuf;

use tactus_core::TactusConfig;
use tracing::{debug, warn};

pub(crate) fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tactus")
        .join("config.toml")
}

/// Read the config file, writing the defaults out when there is none
pub(crate) fn load_config() -> TactusConfig {
    let path = config_path();
    let Ok(s) = std::fs::read_to_string(&path) else {
        let config = TactusConfig::default();
        save_config(&config);
        return config;
    };
    match toml::from_str(&s) {
        Ok(config) => {
            debug!(path = %path.display(), "Loaded config");
            config
        }
        Err(e) => {
            warn!(path = %path.display(), "Ignoring unreadable config: {}", e);
            TactusConfig::default()
        }
    }
}

pub(crate) fn save_config(config: &TactusConfig) {
    let path = config_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let Ok(s) = toml::to_string_pretty(config) else { return };
    let _ = std::fs::write(&path, s);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path() {
        let path = config_path();
        assert!(path.ends_with("tactus/config.toml"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: TactusConfig = toml::from_str("[timer]\nlookahead = 0.05\n").unwrap();
        assert_eq!(config.timer.lookahead, 0.05);
        assert_eq!(config.timer.frame_duration, 0.2);
        assert_eq!(config.demo, TactusConfig::default().demo);
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = TactusConfig::default();
        let s = toml::to_string_pretty(&config).unwrap();
        assert_eq!(toml::from_str::<TactusConfig>(&s).unwrap(), config);
    }
}
