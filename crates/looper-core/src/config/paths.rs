//! Path utilities for configuration files

use std::path::PathBuf;

/// Get the default configuration directory
///
/// Returns: `~/.config/looper` (platform config dir), or `./looper` when the
/// platform has none.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("looper")
}

/// Get the default config file path for a given file name
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_ends_with_looper() {
        assert!(default_config_dir().ends_with("looper"));
    }

    #[test]
    fn test_config_path_includes_filename() {
        let path = default_config_path("test.yaml");
        assert!(path.ends_with("test.yaml"));
    }
}
