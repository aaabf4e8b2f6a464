use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ini::{Ini, ParseOption, Properties};
use tracing::{debug, warn};

use crate::error::{RefreshError, Result};
use crate::expiry::{format_expiration, parse_expiration};

const ASSUMED_ROLE: &str = "assumed_role";
const ASSUMED_ROLE_ARN: &str = "assumed_role_arn";
const ACCESS_KEY_ID: &str = "aws_access_key_id";
const SECRET_ACCESS_KEY: &str = "aws_secret_access_key";
const SESSION_TOKEN: &str = "aws_session_token";
const SECURITY_TOKEN: &str = "aws_security_token";
const EXPIRATION: &str = "expiration";

const OWNED_KEYS: [&str; 7] = [
    ASSUMED_ROLE,
    ASSUMED_ROLE_ARN,
    ACCESS_KEY_ID,
    SECRET_ACCESS_KEY,
    SESSION_TOKEN,
    SECURITY_TOKEN,
    EXPIRATION,
];

const MFA_DEVICE: &str = "aws_mfa_device";
const ASSUME_ROLE: &str = "assume_role";

/// Temporary credentials written to a short-term profile section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortTermCredential {
    pub assumed_role: bool,
    pub assumed_role_arn: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
}

impl ShortTermCredential {
    fn from_section(section: &Properties) -> Option<Self> {
        Some(Self {
            assumed_role: section
                .get(ASSUMED_ROLE)
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
            assumed_role_arn: section.get(ASSUMED_ROLE_ARN).unwrap_or_default().to_string(),
            access_key_id: section.get(ACCESS_KEY_ID)?.to_string(),
            secret_access_key: section.get(SECRET_ACCESS_KEY)?.to_string(),
            session_token: section.get(SESSION_TOKEN)?.to_string(),
            expiration: parse_expiration(section.get(EXPIRATION)?)?,
        })
    }
}

/// Defaults an operator may keep next to the long-term key pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LongTermDefaults {
    pub mfa_device: Option<String>,
    pub assume_role: Option<String>,
}

/// The shared credentials file, loaded once and written back as a whole.
///
/// Reads go through the parsed view. Writes are spliced into the original
/// text so comments, quoting and other sections stay byte-for-byte intact.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
    raw: String,
    ini: Ini,
}

impl CredentialStore {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let unreadable = |source| RefreshError::StoreUnreadable {
            path: path.clone(),
            source,
        };
        let raw = std::fs::read_to_string(&path).map_err(|e| unreadable(ini::Error::Io(e)))?;
        let ini = Ini::load_from_str_opt(&raw, literal_values()).map_err(|e| unreadable(ini::Error::Parse(e)))?;
        debug!("Loaded credentials store {}", path.display());
        Ok(Self { path, raw, ini })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.ini.section(Some(section)).is_some()
    }

    pub fn long_term_defaults(&self, section: &str) -> LongTermDefaults {
        let Some(props) = self.ini.section(Some(section)) else {
            return LongTermDefaults::default();
        };
        let non_empty = |key: &str| {
            props
                .get(key)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        LongTermDefaults {
            mfa_device: non_empty(MFA_DEVICE),
            assume_role: non_empty(ASSUME_ROLE),
        }
    }

    /// Expiration of the short-term record, `None` when absent or unparsable.
    pub fn short_term_expiration(&self, section: &str) -> Option<DateTime<Utc>> {
        let raw = self.ini.section(Some(section))?.get(EXPIRATION)?;
        let parsed = parse_expiration(raw);
        if parsed.is_none() {
            warn!("Ignoring unparsable expiration `{}` in profile `{}`", raw, section);
        }
        parsed
    }

    pub fn short_term(&self, section: &str) -> Option<ShortTermCredential> {
        self.ini
            .section(Some(section))
            .and_then(ShortTermCredential::from_section)
    }

    /// Overwrites the credential keys of `section`, leaving any other keys alone.
    pub fn put_short_term(&mut self, section: &str, credential: &ShortTermCredential) {
        let mut entries = vec![(ASSUMED_ROLE, if credential.assumed_role { "True" } else { "False" }.to_string())];
        if !credential.assumed_role_arn.is_empty() {
            entries.push((ASSUMED_ROLE_ARN, credential.assumed_role_arn.clone()));
        }
        entries.extend([
            (ACCESS_KEY_ID, credential.access_key_id.clone()),
            (SECRET_ACCESS_KEY, credential.secret_access_key.clone()),
            (SESSION_TOKEN, credential.session_token.clone()),
            (SECURITY_TOKEN, credential.session_token.clone()),
            (EXPIRATION, format_expiration(credential.expiration)),
        ]);

        let mut setter = self.ini.with_section(Some(section));
        for (key, value) in &entries {
            setter.set(*key, value.as_str());
        }
        if credential.assumed_role_arn.is_empty() {
            if let Some(props) = self.ini.section_mut(Some(section)) {
                props.remove(ASSUMED_ROLE_ARN);
            }
        }

        self.raw = splice_section(&self.raw, section, &entries);
    }

    pub fn save(&self) -> Result<()> {
        let unwritable = |source| RefreshError::StoreUnwritable {
            path: self.path.clone(),
            source,
        };
        std::fs::write(&self.path, &self.raw).map_err(unwritable)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut permissions = std::fs::metadata(&self.path).map_err(unwritable)?.permissions();
            permissions.set_mode(0o600);
            std::fs::set_permissions(&self.path, permissions).map_err(unwritable)?;
        }

        debug!("Wrote credentials store {}", self.path.display());
        Ok(())
    }
}

/// Values are opaque: no unquoting, no escape processing.
fn literal_values() -> ParseOption {
    ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..ParseOption::default()
    }
}

fn section_name(line: &str) -> Option<&str> {
    let line = line.trim();
    line.strip_prefix('[')?.strip_suffix(']').map(str::trim)
}

fn entry_key(line: &str) -> Option<&str> {
    let line = line.trim_start();
    if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
        return None;
    }
    let end = line.find(['=', ':'])?;
    Some(line[..end].trim())
}

/// Rewrites the owned keys of `section` inside `raw`. The first owned key
/// marks where the new entries go; without one they follow the header. A
/// missing section is appended.
fn splice_section(raw: &str, section: &str, entries: &[(&str, String)]) -> String {
    let newline = if raw.contains("\r\n") { "\r\n" } else { "\n" };
    let rendered: Vec<String> = entries.iter().map(|(key, value)| format!("{key} = {value}")).collect();
    let lines: Vec<&str> = raw.lines().collect();

    let Some(header) = lines.iter().position(|line| section_name(line) == Some(section)) else {
        let mut out = raw.to_string();
        if !out.is_empty() {
            if !out.ends_with('\n') {
                out.push_str(newline);
            }
            out.push_str(newline);
        }
        out.push_str(&format!("[{section}]{newline}"));
        for line in &rendered {
            out.push_str(line);
            out.push_str(newline);
        }
        return out;
    };
    let body_end = lines[header + 1..]
        .iter()
        .position(|line| section_name(line).is_some())
        .map_or(lines.len(), |offset| header + 1 + offset);

    let mut body: Vec<&str> = Vec::new();
    let mut insert_at = None;
    for line in &lines[header + 1..body_end] {
        if entry_key(line).is_some_and(|key| OWNED_KEYS.contains(&key)) {
            insert_at.get_or_insert(body.len());
            continue;
        }
        body.push(line);
    }
    let insert_at = insert_at.unwrap_or(0);

    let mut out: Vec<&str> = lines[..=header].to_vec();
    out.extend_from_slice(&body[..insert_at]);
    out.extend(rendered.iter().map(String::as_str));
    out.extend_from_slice(&body[insert_at..]);
    out.extend_from_slice(&lines[body_end..]);

    let mut text = out.join(newline);
    text.push_str(newline);
    text
}
