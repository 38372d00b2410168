//! Server configuration.
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or no file) yields a working local setup:
//!
//! ```toml
//! listen = "0.0.0.0:8080"
//! transport_scheme = "http"
//! ui_path = "/solver/"
//! default_puzzle = "1-star"
//! puzzles_file = "puzzles.toml"
//!
//! [session]
//! cookie_name = "susen-session"
//! idle_timeout_secs = 3600
//! sweep_interval_secs = 60
//! forwarded_proto_header = "x-forwarded-proto"
//! trust_forwarded_proto = true
//! affinity = "scheme-and-source"
//!
//! [log]
//! level = "info"
//! format = "pretty"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cookie::SchemeAffinity;
use crate::logging::LogConfig;
use crate::session::Scheme;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
pub const DEFAULT_UI_PATH: &str = "/solver/";
pub const DEFAULT_COOKIE_NAME: &str = "susen-session";
pub const DEFAULT_FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60 * 60;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Scheme of the listener itself, used when no forwarded header applies.
    pub transport_scheme: Scheme,
    /// Where `/reset/{puzzle}` redirects to.
    pub ui_path: String,
    /// Puzzle a freshly minted session starts on.
    pub default_puzzle: String,
    /// Extra catalog entries, see `susen_puzzle::catalog`.
    pub puzzles_file: Option<PathBuf>,
    pub session: SessionConfig,
    pub log: LogConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
            transport_scheme: Scheme::Http,
            ui_path: DEFAULT_UI_PATH.to_string(),
            default_puzzle: susen_puzzle::DEFAULT_PUZZLE.to_string(),
            puzzles_file: None,
            session: SessionConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Session and cookie settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,
    /// Sessions unused for this long are evicted.
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub forwarded_proto_header: String,
    /// Honour the forwarded-protocol header. Disable when the service is
    /// reachable without going through the proxy.
    pub trust_forwarded_proto: bool,
    pub affinity: SchemeAffinity,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            forwarded_proto_header: DEFAULT_FORWARDED_PROTO_HEADER.to_string(),
            trust_forwarded_proto: true,
            affinity: SchemeAffinity::default(),
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check values serde cannot. Puzzle names are checked against the
    /// catalog when the app state is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "session.idle_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.session.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "session.sweep_interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if !is_cookie_token(&self.session.cookie_name) {
            return Err(ConfigError::Invalid {
                field: "session.cookie_name",
                reason: format!("{:?} is not a cookie name token", self.session.cookie_name),
            });
        }
        if !self.ui_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                field: "ui_path",
                reason: format!("{:?} must start with '/'", self.ui_path),
            });
        }
        if self.default_puzzle.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "default_puzzle",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// RFC 6265 cookie-name: a non-empty HTTP token.
fn is_cookie_token(name: &str) -> bool {
    const SEPARATORS: &[u8] = b"()<>@,;:\\\"/[]?={} \t";
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_graphic() && !SEPARATORS.contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;

    #[test]
    fn test_defaults_validate() {
        let config = ServerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.listen.to_string(), DEFAULT_LISTEN);
        assert_eq!(config.session.affinity, SchemeAffinity::SchemeAndSource);
        assert_eq!(config.session.idle_timeout(), Duration::from_secs(3600));
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = ServerConfig::from_toml_str("").unwrap();
        assert_eq!(config.ui_path, DEFAULT_UI_PATH);
        assert_eq!(config.session.cookie_name, DEFAULT_COOKIE_NAME);
    }

    #[test]
    fn test_parse_full_file() {
        let text = r#"
            listen = "0.0.0.0:9000"
            transport_scheme = "https"
            ui_path = "/play/"
            default_puzzle = "3-star"

            [session]
            cookie_name = "sid"
            idle_timeout_secs = 120
            sweep_interval_secs = 5
            forwarded_proto_header = "x-scheme"
            trust_forwarded_proto = false
            affinity = "scheme"

            [log]
            level = "debug"
            format = "json"
        "#;
        let config = ServerConfig::from_toml_str(text).unwrap();
        config.validate().unwrap();
        assert_eq!(config.listen.port(), 9000);
        assert_eq!(config.transport_scheme, Scheme::Https);
        assert_eq!(config.ui_path, "/play/");
        assert_eq!(config.default_puzzle, "3-star");
        assert_eq!(config.session.cookie_name, "sid");
        assert_eq!(config.session.sweep_interval(), Duration::from_secs(5));
        assert!(!config.session.trust_forwarded_proto);
        assert_eq!(config.session.affinity, SchemeAffinity::Scheme);
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn test_rejects_unknown_affinity() {
        let err = ServerConfig::from_toml_str("[session]\naffinity = \"host\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ServerConfig::default();
        config.session.idle_timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "session.idle_timeout_secs",
                ..
            })
        ));

        let mut config = ServerConfig::default();
        config.session.cookie_name = "bad name;".to_string();
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.ui_path = "solver".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = ServerConfig::load(Path::new("/nonexistent/susen.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
