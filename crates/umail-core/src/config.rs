use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{UmailError, UmailResult};

/// Chunk length of the reference configuration: 35 bytes render as a
/// 70-character hex boundary.
pub const DEFAULT_CHUNK_LENGTH: usize = 35;

/// Largest useful chunk length: a maximal 65535-byte payload plus its
/// 2-byte length prefix fits in one chunk.
pub const MAX_CHUNK_LENGTH: usize = u16::MAX as usize + 2;

/// Top-level configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UmailConfig {
    pub storage: StorageConfig,
    pub otp: OtpConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Application state directory holding `keys/` and `sessions/`
    pub home: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OtpConfig {
    /// Bytes per boundary. Sender and receiver must agree on this value.
    pub chunk_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: warn)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            home: PathBuf::from("~/.smailer"),
        }
    }
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            chunk_length: DEFAULT_CHUNK_LENGTH,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}

impl UmailConfig {
    /// Load the configuration from a TOML file.
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> UmailResult<Self> {
        let config: UmailConfig = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|e| UmailError::Config(format!("parsing {}: {e}", path.display())))?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            UmailConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> UmailResult<()> {
        if self.otp.chunk_length == 0 {
            return Err(UmailError::Config("otp.chunk_length must be at least 1".into()));
        }
        if self.otp.chunk_length > MAX_CHUNK_LENGTH {
            return Err(UmailError::Config(format!(
                "otp.chunk_length must be at most {MAX_CHUNK_LENGTH}, got {}",
                self.otp.chunk_length
            )));
        }
        match self.log.format.as_str() {
            "text" | "json" => Ok(()),
            other => Err(UmailError::Config(format!(
                "log.format must be \"text\" or \"json\", got \"{other}\""
            ))),
        }
    }

    pub fn home(&self) -> PathBuf {
        expand_tilde(&self.storage.home)
    }

    pub fn keys_dir(&self) -> PathBuf {
        self.home().join("keys")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.home().join("sessions")
    }

    /// Create the key and session directories if they are missing.
    pub fn ensure_dirs(&self) -> UmailResult<()> {
        for dir in [self.keys_dir(), self.sessions_dir()] {
            if dir.exists() && !dir.is_dir() {
                return Err(UmailError::Config(format!(
                    "{} exists but is not a directory",
                    dir.display()
                )));
            }
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

/// Expand `~` in path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if s == "~" {
        return PathBuf::from(std::env::var("HOME").unwrap_or_default());
    }
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[storage]
home = "/var/lib/umail"

[otp]
chunk_length = 16

[log]
level = "debug"
format = "json"
"#;
        let config: UmailConfig = toml::from_str(toml_str).unwrap();
        config.validate().unwrap();

        assert_eq!(config.home(), PathBuf::from("/var/lib/umail"));
        assert_eq!(config.keys_dir(), PathBuf::from("/var/lib/umail/keys"));
        assert_eq!(config.sessions_dir(), PathBuf::from("/var/lib/umail/sessions"));
        assert_eq!(config.otp.chunk_length, 16);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "json");
    }

    #[test]
    fn test_parse_defaults() {
        let config: UmailConfig = toml::from_str("").unwrap();

        assert_eq!(config.storage.home, PathBuf::from("~/.smailer"));
        assert_eq!(config.otp.chunk_length, DEFAULT_CHUNK_LENGTH);
        assert_eq!(config.log.level, "warn");
        assert_eq!(config.log.format, "text");
    }

    #[test]
    fn test_zero_chunk_length_rejected() {
        let config: UmailConfig = toml::from_str("[otp]\nchunk_length = 0\n").unwrap();
        assert!(matches!(config.validate(), Err(UmailError::Config(_))));
    }

    #[test]
    fn test_oversized_chunk_length_rejected() {
        let config: UmailConfig =
            toml::from_str("[otp]\nchunk_length = 9223372036854775807\n").unwrap();
        assert!(matches!(config.validate(), Err(UmailError::Config(_))));

        let mut config = UmailConfig::default();
        config.otp.chunk_length = MAX_CHUNK_LENGTH;
        config.validate().unwrap();
        config.otp.chunk_length = MAX_CHUNK_LENGTH + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_log_format_rejected() {
        let config: UmailConfig = toml::from_str("[log]\nformat = \"xml\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = UmailConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.otp.chunk_length, DEFAULT_CHUNK_LENGTH);
    }

    #[test]
    fn test_ensure_dirs_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = UmailConfig::default();
        config.storage.home = dir.path().join("state");

        config.ensure_dirs().unwrap();
        assert!(config.keys_dir().is_dir());
        assert!(config.sessions_dir().is_dir());

        // Idempotent
        config.ensure_dirs().unwrap();
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = UmailConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: UmailConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.storage.home, parsed.storage.home);
        assert_eq!(config.otp.chunk_length, parsed.otp.chunk_length);
    }
}
