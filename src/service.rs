use std::path::PathBuf;

use async_trait::async_trait;
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_runtime::env_config::file::{EnvConfigFileKind, EnvConfigFiles};
use aws_sdk_sts::error::DisplayErrorContext;
use aws_sdk_sts::primitives::DateTime as SmithyDateTime;
use aws_sdk_sts::types::Credentials;
use aws_sdk_sts::Client as StsClient;
use chrono::{DateTime, Utc};
use mockall::automock;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{RefreshError, Result};

/// Used for STS when neither the environment nor the profile names a region.
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Credential material handed back by the token-issuing service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: Option<DateTime<Utc>>,
}

#[automock]
#[async_trait]
pub trait TokenService {
    async fn get_session_token(
        &self,
        duration_seconds: i32,
        serial_number: &str,
        token_code: &str,
    ) -> Result<IssuedCredentials>;

    async fn assume_role(
        &self,
        role_arn: &str,
        role_session_name: &str,
        serial_number: &str,
        token_code: &str,
        duration_seconds: i32,
    ) -> Result<IssuedCredentials>;
}

/// STS client signed with the long-term profile. The SDK client is only built
/// on the first call.
#[derive(Debug)]
pub struct StsTokenService {
    profile: String,
    credentials_file: PathBuf,
    client: OnceCell<StsClient>,
}

impl StsTokenService {
    pub fn new(profile: impl Into<String>, credentials_file: impl Into<PathBuf>) -> Self {
        Self {
            profile: profile.into(),
            credentials_file: credentials_file.into(),
            client: OnceCell::new(),
        }
    }

    fn profile_files(&self) -> EnvConfigFiles {
        EnvConfigFiles::builder()
            .include_default_config_file(true)
            .with_file(EnvConfigFileKind::Credentials, &self.credentials_file)
            .build()
    }

    /// Reads the long-term key pair from the profile only, so exported
    /// `AWS_ACCESS_KEY_ID`/`AWS_SECRET_ACCESS_KEY` cannot take its place.
    fn long_term_credentials(&self) -> ProfileFileCredentialsProvider {
        ProfileFileCredentialsProvider::builder()
            .profile_name(&self.profile)
            .profile_files(self.profile_files())
            .build()
    }

    async fn load_config(&self) -> SdkConfig {
        let loaded = aws_config::defaults(BehaviorVersion::latest())
            .profile_name(&self.profile)
            .profile_files(self.profile_files())
            .credentials_provider(self.long_term_credentials())
            .load()
            .await;

        match loaded.region() {
            Some(region) => {
                info!("Using region: {}", region);
                loaded
            }
            None => {
                info!("No region configured, using default {} for STS", DEFAULT_AWS_REGION);
                loaded.into_builder().region(Region::new(DEFAULT_AWS_REGION)).build()
            }
        }
    }

    async fn client(&self) -> &StsClient {
        self.client
            .get_or_init(|| async { StsClient::new(&self.load_config().await) })
            .await
    }
}

#[async_trait]
impl TokenService for StsTokenService {
    async fn get_session_token(
        &self,
        duration_seconds: i32,
        serial_number: &str,
        token_code: &str,
    ) -> Result<IssuedCredentials> {
        info!("Calling AWS STS GetSessionToken");
        debug!("Profile: {}", self.profile);
        debug!("Serial number: {}", serial_number);
        debug!("Duration: {} seconds", duration_seconds);

        let response = self
            .client()
            .await
            .get_session_token()
            .duration_seconds(duration_seconds)
            .serial_number(serial_number)
            .token_code(token_code)
            .send()
            .await
            .map_err(|e| rejected("GetSessionToken", DisplayErrorContext(&e).to_string()))?;

        issued(response.credentials(), "GetSessionToken")
    }

    async fn assume_role(
        &self,
        role_arn: &str,
        role_session_name: &str,
        serial_number: &str,
        token_code: &str,
        duration_seconds: i32,
    ) -> Result<IssuedCredentials> {
        info!("Calling AWS STS AssumeRole");
        debug!("Profile: {}", self.profile);
        debug!("Role ARN: {}", role_arn);
        debug!("Role session name: {}", role_session_name);
        debug!("Serial number: {}", serial_number);
        debug!("Duration: {} seconds", duration_seconds);

        let response = self
            .client()
            .await
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(role_session_name)
            .serial_number(serial_number)
            .token_code(token_code)
            .duration_seconds(duration_seconds)
            .send()
            .await
            .map_err(|e| rejected("AssumeRole", DisplayErrorContext(&e).to_string()))?;

        issued(response.credentials(), "AssumeRole")
    }
}

fn rejected(operation: &'static str, message: String) -> RefreshError {
    RefreshError::ExchangeRejected { operation, message }
}

fn issued(credentials: Option<&Credentials>, operation: &'static str) -> Result<IssuedCredentials> {
    let credentials =
        credentials.ok_or_else(|| rejected(operation, "AWS STS returned no credentials".to_string()))?;

    Ok(IssuedCredentials {
        access_key_id: credentials.access_key_id().to_string(),
        secret_access_key: credentials.secret_access_key().to_string(),
        session_token: credentials.session_token().to_string(),
        expiration: to_chrono(credentials.expiration()),
    })
}

fn to_chrono(instant: &SmithyDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(instant.secs(), instant.subsec_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_sts::config::ProvideCredentials;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn sts_credentials() -> Credentials {
        Credentials::builder()
            .access_key_id("ASIATEMPORARY")
            .secret_access_key("secret")
            .session_token("token")
            .expiration(SmithyDateTime::from_secs(1_714_564_800))
            .build()
            .unwrap()
    }

    #[test]
    fn converts_sdk_credentials() {
        let issued = issued(Some(&sts_credentials()), "GetSessionToken").unwrap();
        assert_eq!(
            issued,
            IssuedCredentials {
                access_key_id: "ASIATEMPORARY".to_string(),
                secret_access_key: "secret".to_string(),
                session_token: "token".to_string(),
                expiration: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
            }
        );
    }

    #[test]
    fn missing_credentials_are_a_rejection() {
        let err = issued(None, "AssumeRole").unwrap_err();
        assert!(matches!(
            err,
            RefreshError::ExchangeRejected {
                operation: "AssumeRole",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn signs_with_long_term_profile_over_environment() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        std::fs::write(
            &path,
            "[default-long-term]\naws_access_key_id = AKIALONGTERM\naws_secret_access_key = longtermsecret\n",
        )
        .unwrap();
        std::env::set_var("AWS_ACCESS_KEY_ID", "ASIAFROMENV");
        std::env::set_var("AWS_SECRET_ACCESS_KEY", "fromenv");
        std::env::set_var("AWS_REGION", "eu-west-1");
        std::env::set_var("AWS_EC2_METADATA_DISABLED", "true");

        let service = StsTokenService::new("default-long-term", &path);
        let config = service.load_config().await;
        let credentials = config
            .credentials_provider()
            .unwrap()
            .provide_credentials()
            .await
            .unwrap();

        assert_eq!(credentials.access_key_id(), "AKIALONGTERM");
        assert_eq!(credentials.secret_access_key(), "longtermsecret");
    }

    #[test]
    fn client_is_not_built_eagerly() {
        let service = StsTokenService::new("default-long-term", "/nonexistent/credentials");
        assert!(service.client.get().is_none());
    }
}
