use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use tracing::debug;

use crate::config::{
    default_credentials_file, default_role_session_name, sanitize_session_name, RefreshConfig, Settings,
    DEFAULT_LONG_TERM_SUFFIX, DEFAULT_PROFILE, DEFAULT_SHORT_TERM_SUFFIX,
};
use crate::mfa::{MfaPrompter, TokenSource};
use crate::refresh::{Outcome, Refresher};
use crate::service::StsTokenService;

/// Longest session STS hands out for AssumeRole.
const MAX_ASSUME_ROLE_DURATION: i32 = 43_200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "mfaws", version, about = "AWS Multi-Factor Authentication manager", long_about = None)]
pub struct Cli {
    #[arg(
        short = 'c',
        long,
        env = "AWS_SHARED_CREDENTIALS_FILE",
        help = "Path to AWS credentials file [default: ~/.aws/credentials]"
    )]
    pub credentials_file: Option<PathBuf>,

    #[arg(
        short = 'p',
        long,
        env = "AWS_PROFILE",
        default_value = DEFAULT_PROFILE,
        help = "Name of profile to use in AWS credentials file"
    )]
    pub profile: String,

    #[arg(
        long,
        allow_hyphen_values = true,
        help = "Suffix appended to long-term profiles [default: -long-term]"
    )]
    pub long_term_suffix: Option<String>,

    #[arg(
        long,
        allow_hyphen_values = true,
        help = "Suffix appended to short-term profiles [default: \"\"]"
    )]
    pub short_term_suffix: Option<String>,

    #[arg(short = 'd', long, env = "MFA_DEVICE", help = "ARN of MFA device to use")]
    pub device: Option<String>,

    #[arg(short = 'a', long, env = "MFA_ASSUME_ROLE", help = "ARN of IAM role to assume")]
    pub assume_role: Option<String>,

    #[arg(
        short = 'l',
        long,
        env = "MFA_STS_DURATION",
        value_parser = clap::value_parser!(i32).range(900..=129_600),
        help = "Duration in seconds for credentials to remain valid [default: assume-role ? 3600 : 43200]"
    )]
    pub duration: Option<i32>,

    #[arg(short = 's', long, help = "Session name when assuming a role [default: current user]")]
    pub role_session_name: Option<String>,

    #[arg(short = 'f', long, help = "Force credentials to refresh even if not expired")]
    pub force: bool,

    #[arg(
        short = 't',
        long,
        allow_hyphen_values = true,
        help = "MFA token to use for authentication, `-` to prompt"
    )]
    pub token: Option<String>,

    #[arg(
        long,
        env = "MFA_TOTP_SECRET",
        hide_env_values = true,
        help = "Base32 TOTP secret used to generate the MFA token"
    )]
    pub totp_secret: Option<String>,

    #[arg(long, help = "Path to settings file [default: <config dir>/mfaws/config.toml]")]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Format::Text, help = "Output format")]
    pub format: Format,

    #[arg(short = 'v', long, action = ArgAction::Count, help = "Increase verbosity (-v info, -vv debug, -vvv trace)")]
    pub verbose: u8,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        self.validate_arguments()?;

        let settings = Settings::resolve(self.config.as_deref())?;
        let config = self.refresh_config(&settings)?;
        debug!("Resolved configuration: {:?}", config);

        let source = TokenSource::from_options(self.token.as_deref(), self.totp_secret.as_deref());
        debug!("MFA token source: {:?}", source);

        let service = StsTokenService::new(config.long_term_profile(), &config.credentials_file);
        let outcome = Refresher::new(&config, MfaPrompter::new(source))
            .run(&service)
            .await
            .with_context(|| {
                format!(
                    "Failed to refresh credentials for profile `{}`",
                    config.short_term_profile()
                )
            })?;

        self.print(&outcome)
    }

    pub fn validate_arguments(&self) -> Result<()> {
        if self.profile.trim().is_empty() {
            bail!("--profile must not be empty");
        }
        let long_term = self.long_term_suffix.as_deref().unwrap_or(DEFAULT_LONG_TERM_SUFFIX);
        let short_term = self.short_term_suffix.as_deref().unwrap_or(DEFAULT_SHORT_TERM_SUFFIX);
        if long_term == short_term {
            bail!("--long-term-suffix and --short-term-suffix must differ");
        }
        if let (Some(_), Some(duration)) = (non_empty(&self.assume_role), self.duration) {
            if duration > MAX_ASSUME_ROLE_DURATION {
                bail!("--duration must be at most {MAX_ASSUME_ROLE_DURATION} seconds when assuming a role");
            }
        }
        Ok(())
    }

    /// Flags and environment win over the settings file; the credentials file
    /// fills the remaining gaps later.
    pub fn refresh_config(&self, settings: &Settings) -> Result<RefreshConfig> {
        let credentials_file = self
            .credentials_file
            .clone()
            .or_else(default_credentials_file)
            .context("Failed to determine AWS credentials path")?;
        let profile_settings = settings.profile(&self.profile);

        let mut config = RefreshConfig::new(credentials_file, self.profile.trim());
        if let Some(suffix) = &self.long_term_suffix {
            config.long_term_suffix = suffix.clone();
        }
        if let Some(suffix) = &self.short_term_suffix {
            config.short_term_suffix = suffix.clone();
        }
        config.device = non_empty(&self.device).or(profile_settings.device);
        config.assume_role = non_empty(&self.assume_role).or(profile_settings.assume_role);
        config.duration_seconds = self.duration.or(profile_settings.duration);
        config.role_session_name = non_empty(&self.role_session_name)
            .or(profile_settings.role_session_name)
            .map(|name| sanitize_session_name(&name))
            .unwrap_or_else(default_role_session_name);
        config.force = self.force;
        Ok(config)
    }

    fn print(&self, outcome: &Outcome) -> Result<()> {
        match self.format {
            Format::Text => println!("{outcome}"),
            Format::Json => println!("{}", serde_json::to_string(outcome)?),
        }
        Ok(())
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
