use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::error::RefreshError;

pub const DEFAULT_PROFILE: &str = "default";
pub const DEFAULT_LONG_TERM_SUFFIX: &str = "-long-term";
pub const DEFAULT_SHORT_TERM_SUFFIX: &str = "";
const FALLBACK_SESSION_NAME: &str = "mfaws";
const MAX_SESSION_NAME_LEN: usize = 64;

static SESSION_NAME_INVALID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w+=,.@-]").unwrap());

/// Resolved settings for one refresh, built once from flags, environment and
/// the optional settings file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshConfig {
    pub credentials_file: PathBuf,
    pub profile: String,
    pub long_term_suffix: String,
    pub short_term_suffix: String,
    pub device: Option<String>,
    pub assume_role: Option<String>,
    pub duration_seconds: Option<i32>,
    pub role_session_name: String,
    pub force: bool,
}

impl RefreshConfig {
    pub fn new(credentials_file: impl Into<PathBuf>, profile: impl Into<String>) -> Self {
        Self {
            credentials_file: credentials_file.into(),
            profile: profile.into(),
            long_term_suffix: DEFAULT_LONG_TERM_SUFFIX.to_string(),
            short_term_suffix: DEFAULT_SHORT_TERM_SUFFIX.to_string(),
            device: None,
            assume_role: None,
            duration_seconds: None,
            role_session_name: default_role_session_name(),
            force: false,
        }
    }

    pub fn long_term_profile(&self) -> String {
        format!("{}{}", self.profile, self.long_term_suffix)
    }

    pub fn short_term_profile(&self) -> String {
        format!("{}{}", self.profile, self.short_term_suffix)
    }

    pub fn validate(&self) -> Result<(), RefreshError> {
        if self.profile.trim().is_empty() {
            return Err(RefreshError::InvalidConfiguration("profile name is empty".to_string()));
        }
        if self.long_term_profile() == self.short_term_profile() {
            return Err(RefreshError::InvalidConfiguration(format!(
                "long-term and short-term profiles are both `{}`",
                self.long_term_profile()
            )));
        }
        Ok(())
    }
}

/// Per-profile defaults from the TOML settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileSettings {
    pub device: Option<String>,
    pub assume_role: Option<String>,
    pub duration: Option<i32>,
    pub role_session_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub profiles: HashMap<String, ProfileSettings>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Loads an explicitly requested file, or the default one when it exists.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => match default_settings_path() {
                Some(path) if path.exists() => Self::load(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn profile(&self, name: &str) -> ProfileSettings {
        self.profiles.get(name).cloned().unwrap_or_default()
    }
}

pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mfaws").join("config.toml"))
}

pub fn default_credentials_file() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".aws").join("credentials"))
}

pub fn default_role_session_name() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default();
    sanitize_session_name(&user)
}

/// Maps a free-form name onto the character set STS accepts for session names.
pub fn sanitize_session_name(name: &str) -> String {
    let cleaned = SESSION_NAME_INVALID.replace_all(name.trim(), "-");
    let cleaned: String = cleaned.chars().take(MAX_SESSION_NAME_LEN).collect();
    if cleaned.chars().count() < 2 {
        FALLBACK_SESSION_NAME.to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tempfile::TempDir;

    #[test]
    fn profile_names_use_suffixes() {
        let config = RefreshConfig::new("/tmp/credentials", "work");
        assert_eq!(config.long_term_profile(), "work-long-term");
        assert_eq!(config.short_term_profile(), "work");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn identical_sections_are_rejected() {
        let mut config = RefreshConfig::new("/tmp/credentials", "work");
        config.long_term_suffix = "-mfa".to_string();
        config.short_term_suffix = "-mfa".to_string();
        assert!(matches!(config.validate(), Err(RefreshError::InvalidConfiguration(_))));
    }

    #[test]
    fn empty_profile_is_rejected() {
        let config = RefreshConfig::new("/tmp/credentials", " ");
        assert!(matches!(config.validate(), Err(RefreshError::InvalidConfiguration(_))));
    }

    #[rstest]
    #[case("alice", "alice")]
    #[case("alice.smith@example.com", "alice.smith@example.com")]
    #[case("DOMAIN\\alice", "DOMAIN-alice")]
    #[case("john doe", "john-doe")]
    #[case("", "mfaws")]
    #[case("x", "mfaws")]
    fn session_names_are_sanitized(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize_session_name(input), expected);
    }

    #[test]
    fn long_session_names_are_truncated() {
        assert_eq!(sanitize_session_name(&"a".repeat(100)).len(), 64);
    }

    #[test]
    fn settings_file_is_parsed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[profiles.work]
device = "arn:aws:iam::123456789012:mfa/alice"
assume_role = "arn:aws:iam::123456789012:role/Example"
duration = 1800
"#,
        )
        .unwrap();

        let settings = Settings::resolve(Some(&path)).unwrap();
        assert_eq!(
            settings.profile("work"),
            ProfileSettings {
                device: Some("arn:aws:iam::123456789012:mfa/alice".to_string()),
                assume_role: Some("arn:aws:iam::123456789012:role/Example".to_string()),
                duration: Some(1800),
                role_session_name: None,
            }
        );
        assert_eq!(settings.profile("other"), ProfileSettings::default());
    }

    #[test]
    fn explicit_missing_settings_file_fails() {
        let dir = TempDir::new().unwrap();
        assert!(Settings::resolve(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn unknown_settings_keys_fail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[profiles.work]\nregion = \"eu-west-1\"\n").unwrap();
        assert!(Settings::load(&path).is_err());
    }
}
