use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::RefreshConfig;
use crate::error::{RefreshError, Result};
use crate::exchange::{Exchange, RefreshRequest};
use crate::expiry::is_still_valid;
use crate::mfa::MfaPrompter;
use crate::service::TokenService;
use crate::store::CredentialStore;

/// What a finished invocation reports back to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    StillValid {
        profile: String,
        seconds_remaining: i64,
    },
    Refreshed {
        profile: String,
        valid_for_seconds: i64,
        expiration: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        assumed_role_arn: Option<String>,
    },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StillValid {
                profile,
                seconds_remaining,
            } => write!(
                f,
                "Credentials for profile `{profile}` still valid for {seconds_remaining} seconds"
            ),
            Self::Refreshed {
                profile,
                valid_for_seconds,
                ..
            } => write!(
                f,
                "Success! Credentials for profile `{profile}` valid for {valid_for_seconds} seconds"
            ),
        }
    }
}

/// Runs one refresh: check the stored record, then prompt, exchange and persist
/// when it is missing, expired or forced.
pub struct Refresher<'a> {
    config: &'a RefreshConfig,
    prompter: MfaPrompter,
    clock: fn() -> DateTime<Utc>,
}

impl<'a> Refresher<'a> {
    pub fn new(config: &'a RefreshConfig, prompter: MfaPrompter) -> Self {
        Self {
            config,
            prompter,
            clock: Utc::now,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn run<S>(&self, service: &S) -> Result<Outcome>
    where
        S: TokenService + Sync,
    {
        self.config.validate()?;
        let short_term = self.config.short_term_profile();
        let long_term = self.config.long_term_profile();

        let mut store = CredentialStore::load(&self.config.credentials_file)?;

        let validity = is_still_valid(
            store.short_term_expiration(&short_term),
            (self.clock)(),
            self.config.force,
        );
        if validity.valid {
            info!(
                "Credentials for profile `{}` still valid for {} seconds",
                short_term, validity.seconds_remaining
            );
            return Ok(Outcome::StillValid {
                profile: short_term,
                seconds_remaining: validity.seconds_remaining,
            });
        }
        if self.config.force {
            info!("Forcing refresh of profile `{}`", short_term);
        }

        let (exchange, mut request) = self.plan(&store, &long_term, &short_term)?;
        debug!("Planned {} with {:?}", exchange.operation(), request);

        request.token_code = self.prompter.get_token()?;

        let credential = exchange
            .perform(service, &request, self.clock)
            .await
            .inspect_err(|e| debug!("Refreshing profile `{}` failed: {}", short_term, e))?;

        store.put_short_term(&short_term, &credential);
        store.save()?;
        info!(
            "Wrote credentials for profile `{}` to {}",
            short_term,
            store.path().display()
        );

        Ok(Outcome::Refreshed {
            profile: short_term,
            valid_for_seconds: (credential.expiration - (self.clock)()).num_seconds(),
            expiration: credential.expiration,
            assumed_role_arn: Some(credential.assumed_role_arn).filter(|arn| !arn.is_empty()),
        })
    }

    /// Resolves device, role and duration. Explicit settings win over the
    /// defaults kept in the long-term section.
    fn plan(&self, store: &CredentialStore, long_term: &str, short_term: &str) -> Result<(Exchange, RefreshRequest)> {
        if !store.has_section(long_term) {
            return Err(RefreshError::ConfigurationMissing(format!(
                "long-term profile `{}` not found in {}",
                long_term,
                store.path().display()
            )));
        }
        let defaults = store.long_term_defaults(long_term);

        let mfa_device = self
            .config
            .device
            .clone()
            .or(defaults.mfa_device)
            .ok_or_else(|| {
                RefreshError::ConfigurationMissing(format!(
                    "no MFA device for profile `{}`, pass --device or set aws_mfa_device in [{}]",
                    self.config.profile, long_term
                ))
            })?;
        let role_arn = self.config.assume_role.clone().or(defaults.assume_role);

        let exchange = Exchange::select(role_arn.as_deref());
        let duration_seconds = self
            .config
            .duration_seconds
            .unwrap_or_else(|| exchange.default_duration());
        exchange.check_duration(duration_seconds)?;

        let request = RefreshRequest {
            profile: short_term.to_string(),
            duration_seconds,
            mfa_device,
            role_arn,
            role_session_name: self.config.role_session_name.clone(),
            token_code: String::new(),
            force: self.config.force,
        };
        Ok((exchange, request))
    }
}
