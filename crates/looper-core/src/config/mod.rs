//! Shared configuration utilities
//!
//! - Generic YAML config loading/saving
//! - Default config path
//! - Engine behaviour settings ([`EngineConfig`])
//!
//! # Usage
//!
//! ```ignore
//! use looper_core::config::{load_config, save_config, default_config_path};
//!
//! let config: MyAppConfig = load_config(&default_config_path("config.yaml"));
//! save_config(&config, &path)?;
//! ```

mod engine;
mod io;
mod paths;

pub use engine::{EngineConfig, InputRecMode, MidiSyncMode, RecTriggerMode};
pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path};
