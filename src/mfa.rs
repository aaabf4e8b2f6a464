use std::io::{self, BufRead, Write};

use totp_rs::{Algorithm, Secret, TOTP};
use tracing::{debug, info};

use crate::error::{RefreshError, Result};

const PROMPT: &str = "MFA token code: ";

/// Where the MFA token code comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum TokenSource {
    Provided(String),
    Totp(String),
    Interactive,
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provided(_) => f.write_str("Provided(<redacted>)"),
            Self::Totp(_) => f.write_str("Totp(<redacted>)"),
            Self::Interactive => f.write_str("Interactive"),
        }
    }
}

impl TokenSource {
    /// An empty token or `-` falls back to prompting on the terminal.
    pub fn from_options(token: Option<&str>, totp_secret: Option<&str>) -> Self {
        match (token, totp_secret) {
            (Some(token), _) if !matches!(token.trim(), "" | "-") => Self::Provided(token.to_string()),
            (_, Some(secret)) if !secret.trim().is_empty() => Self::Totp(secret.trim().to_string()),
            _ => Self::Interactive,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MfaPrompter {
    source: TokenSource,
}

impl MfaPrompter {
    pub fn new(source: TokenSource) -> Self {
        Self { source }
    }

    pub fn get_token(&self) -> Result<String> {
        match &self.source {
            TokenSource::Provided(token) => Ok(token.clone()),
            TokenSource::Totp(secret) => generate_totp(secret),
            TokenSource::Interactive => {
                let stdin = io::stdin();
                read_token(&mut stdin.lock(), &mut io::stderr())
            }
        }
    }
}

/// Prompts on `output` and blocks until one line is read from `input`.
pub fn read_token<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<String> {
    let unavailable = |e: io::Error| RefreshError::InputUnavailable(e.to_string());

    write!(output, "{PROMPT}").map_err(unavailable)?;
    output.flush().map_err(unavailable)?;

    let mut line = String::new();
    let read = input.read_line(&mut line).map_err(unavailable)?;
    if read == 0 {
        return Err(RefreshError::InputUnavailable(
            "input closed before a token was entered".to_string(),
        ));
    }

    let token = line.trim();
    if token.is_empty() {
        return Err(RefreshError::InputUnavailable("empty token entered".to_string()));
    }
    debug!("Read MFA token from terminal");
    Ok(token.to_string())
}

fn generate_totp(secret: &str) -> Result<String> {
    let invalid = |reason: String| RefreshError::InputUnavailable(format!("cannot generate TOTP code: {reason}"));

    let bytes = Secret::Encoded(secret.to_uppercase())
        .to_bytes()
        .map_err(|e| invalid(format!("{e:?}")))?;
    let totp = TOTP::new(Algorithm::SHA1, 6, 1, 30, bytes).map_err(|e| invalid(e.to_string()))?;
    let code = totp.generate_current().map_err(|e| invalid(e.to_string()))?;
    info!("Generated MFA token from TOTP secret");
    Ok(code)
}
