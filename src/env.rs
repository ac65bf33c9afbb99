//! Environment constants and path utilities for the relay.
//!
//! Centralizes default addresses, file names and labels so they are defined
//! in one place.

use std::path::{Path, PathBuf};

/// Per-user configuration directory name (inside the home directory)
pub const RELAY_DIR_NAME: &str = ".relay";

/// Configuration file name inside [`RELAY_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration file name looked up in the current directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "relay.toml";

/// Default host the relay advertises
pub const DEFAULT_TCP_HOST: &str = "0.0.0.0";

/// Default port the relay advertises
pub const DEFAULT_TCP_PORT: u16 = 9090;

/// Default engine request timeout in seconds
pub const DEFAULT_DOCKER_TIMEOUT_SECS: u64 = 120;

/// Docker socket value that selects the in-memory backend
pub const FAKE_SOCKET: &str = "fake";

/// Label set on every container the relay creates
pub const MANAGED_LABEL: &str = "relay.managed";

/// Default log filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "relay=info";

/// Build the per-user config directory path from a home directory
pub fn relay_dir_path(home: &Path) -> PathBuf {
    home.join(RELAY_DIR_NAME)
}

/// Build the per-user config file path from a home directory
pub fn user_config_path(home: &Path) -> PathBuf {
    relay_dir_path(home).join(CONFIG_FILE_NAME)
}

/// Build the local config file path from a working directory
pub fn local_config_path(dir: &Path) -> PathBuf {
    dir.join(LOCAL_CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_paths() {
        let home = Path::new("/home/user");
        assert_eq!(
            user_config_path(home),
            PathBuf::from("/home/user/.relay/config.toml")
        );
        assert_eq!(
            local_config_path(Path::new("/srv")),
            PathBuf::from("/srv/relay.toml")
        );
    }
}
