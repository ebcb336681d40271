//! Daemon configuration file loading.
//!
//! The format is TOML with `[[listener]]` and `[[module]]` tables:
//!
//! ```toml
//! [[listener]]
//! rsyncd = "localhost:8730"
//!
//! [[module]]
//! name = "pub"
//! path = "/srv/pub"
//! comment = "public files"
//! writable = false
//! acl = ["allow 10.0.0.0/8", "deny all"]
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::module::Module;
use crate::DaemonError;

/// One listening endpoint.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Listener {
    /// `host:port` to serve the rsync protocol on.
    pub rsyncd: String,
}

/// A parsed daemon configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Listening endpoints.
    #[serde(default, rename = "listener")]
    pub listeners: Vec<Listener>,
    /// Exposed modules.
    #[serde(default, rename = "module")]
    pub modules: Vec<Module>,
}

impl Config {
    /// Parses a configuration from TOML text.
    pub fn from_str(text: &str) -> Result<Self, DaemonError> {
        toml::from_str(text).map_err(|error| DaemonError::Config(error.to_string()))
    }

    /// Loads and parses a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, DaemonError> {
        let text = fs::read_to_string(path)
            .map_err(|error| DaemonError::Config(format!("{}: {error}", path.display())))?;
        Self::from_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses() {
        let config = Config::from_str(
            r#"
            [[listener]]
            rsyncd = "localhost:8730"

            [[module]]
            name = "pub"
            path = "/srv/pub"
            comment = "public files"
            acl = ["allow 10.0.0.0/8", "deny all"]

            [[module]]
            name = "incoming"
            path = "/srv/incoming"
            writable = true
            "#,
        )
        .unwrap();

        assert_eq!(config.listeners.len(), 1);
        assert_eq!(config.modules.len(), 2);
        assert_eq!(config.modules[0].name, "pub");
        assert!(!config.modules[0].writable);
        assert!(config.modules[1].writable);
        assert_eq!(config.modules[0].acl.len(), 2);
    }

    #[test]
    fn empty_config_is_valid() {
        let config = Config::from_str("").unwrap();
        assert!(config.listeners.is_empty());
        assert!(config.modules.is_empty());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_str("[[module]]\nname = \"x\"\npath = \"/x\"\nbogus = 1\n").is_err());
    }
}
