use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::error::{RefreshError, Result};
use crate::expiry::truncate_to_seconds;
use crate::service::TokenService;
use crate::store::ShortTermCredential;

/// Everything one exchange needs. Built per invocation and dropped afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshRequest {
    pub profile: String,
    pub duration_seconds: i32,
    pub mfa_device: String,
    pub role_arn: Option<String>,
    pub role_session_name: String,
    pub token_code: String,
    pub force: bool,
}

impl std::fmt::Debug for RefreshRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshRequest")
            .field("profile", &self.profile)
            .field("duration_seconds", &self.duration_seconds)
            .field("mfa_device", &self.mfa_device)
            .field("role_arn", &self.role_arn)
            .field("role_session_name", &self.role_session_name)
            .field("token_code", &"<redacted>")
            .field("force", &self.force)
            .finish()
    }
}

/// The two ways of turning a long-term identity into temporary credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exchange {
    /// GetSessionToken: keeps the caller's own permissions.
    DirectSession,
    /// AssumeRole: switches to the permissions of `role_arn`.
    AssumeRole { role_arn: String },
}

impl Exchange {
    pub fn select(role_arn: Option<&str>) -> Self {
        match role_arn.map(str::trim).filter(|arn| !arn.is_empty()) {
            Some(role_arn) => Self::AssumeRole {
                role_arn: role_arn.to_string(),
            },
            None => Self::DirectSession,
        }
    }

    pub fn default_duration(&self) -> i32 {
        match self {
            Self::DirectSession => 43_200,
            Self::AssumeRole { .. } => 3_600,
        }
    }

    /// Shortest lifetime STS issues for either operation.
    pub const MIN_DURATION: i32 = 900;

    pub fn max_duration(&self) -> i32 {
        match self {
            Self::DirectSession => 129_600,
            Self::AssumeRole { .. } => 43_200,
        }
    }

    /// Rejects a lifetime the selected operation would refuse.
    pub fn check_duration(&self, duration_seconds: i32) -> Result<()> {
        let max = self.max_duration();
        if (Self::MIN_DURATION..=max).contains(&duration_seconds) {
            return Ok(());
        }
        Err(RefreshError::InvalidConfiguration(format!(
            "duration {} seconds is outside {}..={} for {}",
            duration_seconds,
            Self::MIN_DURATION,
            max,
            self.operation()
        )))
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Self::DirectSession => "GetSessionToken",
            Self::AssumeRole { .. } => "AssumeRole",
        }
    }

    pub async fn perform<S>(
        &self,
        service: &S,
        request: &RefreshRequest,
        clock: fn() -> DateTime<Utc>,
    ) -> Result<ShortTermCredential>
    where
        S: TokenService + Sync,
    {
        match self {
            Self::DirectSession => {
                let issued = service
                    .get_session_token(request.duration_seconds, &request.mfa_device, &request.token_code)
                    .await?;
                // The service's expiration is authoritative here, never recompute it.
                let expiration = issued.expiration.ok_or_else(|| RefreshError::ExchangeRejected {
                    operation: self.operation(),
                    message: "response carried no expiration".to_string(),
                })?;
                info!("Obtained session token for profile `{}`", request.profile);

                Ok(ShortTermCredential {
                    assumed_role: false,
                    assumed_role_arn: String::new(),
                    access_key_id: issued.access_key_id,
                    secret_access_key: issued.secret_access_key,
                    session_token: issued.session_token,
                    expiration: truncate_to_seconds(expiration),
                })
            }
            Self::AssumeRole { role_arn } => {
                let issued = service
                    .assume_role(
                        role_arn,
                        &request.role_session_name,
                        &request.mfa_device,
                        &request.token_code,
                        request.duration_seconds,
                    )
                    .await?;
                let expiration = match issued.expiration {
                    Some(expiration) => expiration,
                    None => {
                        debug!("AssumeRole returned no expiration, computing it locally");
                        clock() + Duration::seconds(i64::from(request.duration_seconds))
                    }
                };
                info!("Assumed role {} for profile `{}`", role_arn, request.profile);

                Ok(ShortTermCredential {
                    assumed_role: true,
                    assumed_role_arn: role_arn.clone(),
                    access_key_id: issued.access_key_id,
                    secret_access_key: issued.secret_access_key,
                    session_token: issued.session_token,
                    expiration: truncate_to_seconds(expiration),
                })
            }
        }
    }
}
