//! Application configuration
//!
//! Configuration is stored as YAML in the user's config directory.
//! Default location: ~/.config/looper/config.yaml

use looper_core::audio::AudioConfig;
use looper_core::config::{default_config_path, EngineConfig};
use looper_midi::MidiConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default config file name inside the config directory
pub const CONFIG_FILE: &str = "config.yaml";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Recorder, sync and mixer behavior
    pub engine: EngineConfig,
    /// Device, buffer and line-in settings
    pub audio: AudioConfig,
    /// Controller ports and bindings
    pub midi: MidiConfig,
}

pub fn default_app_config_path() -> PathBuf {
    default_config_path(CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use looper_core::config::{load_config, save_config, MidiSyncMode};

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
engine:
  midi_sync: clock_master
midi:
  output_port: "Launchpad"
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.engine.midi_sync, MidiSyncMode::ClockMaster);
        assert_eq!(config.midi.output_port.as_deref(), Some("Launchpad"));
        assert_eq!(config.audio, AudioConfig::default());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let mut config = AppConfig::default();
        config.engine = config.engine.with_metronome(true);
        config.midi.input_port = Some("nanoKONTROL".into());

        save_config(&config, &path).unwrap();
        let loaded: AppConfig = load_config(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_default_path() {
        assert!(default_app_config_path().ends_with("looper/config.yaml"));
    }
}
