//! Principals, credentials and the tokens a session holds.

use crate::config::{AuthType, ClientConfig};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

/// Secret material presented during the handshake.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Keytab(Vec<u8>),
    Password(String),
}

impl Credential {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Credential::Keytab(bytes) => bytes,
            Credential::Password(p) => p.as_bytes(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Keytab(bytes) => write!(f, "Keytab(<{} bytes>)", bytes.len()),
            Credential::Password(_) => write!(f, "Password(<redacted>)"),
        }
    }
}

/// Where a session obtains its credential. Called again on every token
/// refresh, so a rotated keytab is picked up without restarting.
pub trait CredentialSource: Send + Sync {
    fn principal(&self) -> &str;
    fn load(&self) -> Result<Credential>;
}

/// Kerberos keytab on disk.
#[derive(Debug, Clone)]
pub struct KeytabFile {
    principal: String,
    path: PathBuf,
}

impl KeytabFile {
    pub fn new(principal: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            principal: principal.into(),
            path: path.into(),
        }
    }
}

impl CredentialSource for KeytabFile {
    fn principal(&self) -> &str {
        &self.principal
    }

    fn load(&self) -> Result<Credential> {
        let bytes = std::fs::read(&self.path).map_err(|e| Error::Authentication {
            principal: self.principal.clone(),
            reason: format!("cannot read keytab {}: {}", self.path.display(), e),
        })?;
        if bytes.is_empty() {
            return Err(Error::Authentication {
                principal: self.principal.clone(),
                reason: format!("keytab {} is empty", self.path.display()),
            });
        }
        Ok(Credential::Keytab(bytes))
    }
}

/// Credential held in memory.
#[derive(Debug, Clone)]
pub struct StaticCredential {
    principal: String,
    credential: Credential,
}

impl StaticCredential {
    pub fn new(principal: impl Into<String>, credential: Credential) -> Self {
        Self {
            principal: principal.into(),
            credential,
        }
    }

    pub fn password(principal: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(principal, Credential::Password(password.into()))
    }
}

impl CredentialSource for StaticCredential {
    fn principal(&self) -> &str {
        &self.principal
    }

    fn load(&self) -> Result<Credential> {
        Ok(self.credential.clone())
    }
}

/// Build the credential source described by `auth.type`, `auth.principal`
/// and `auth.token`.
pub fn credentials_from_config(config: &ClientConfig) -> Result<Box<dyn CredentialSource>> {
    let principal = config
        .principal
        .clone()
        .ok_or_else(|| Error::Config("auth.principal is required".to_string()))?;
    let token = config
        .token
        .clone()
        .ok_or_else(|| Error::Config("auth.token is required".to_string()))?;

    Ok(match config.auth_type {
        AuthType::Kerberos => Box::new(KeytabFile::new(principal, token)),
        AuthType::Password => Box::new(StaticCredential::password(principal, token)),
    })
}

/// SASL quality of protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum Qop {
    #[default]
    #[serde(rename = "auth")]
    Auth,
    #[serde(rename = "auth-int")]
    AuthInt,
    #[serde(rename = "auth-conf")]
    AuthConf,
}

impl FromStr for Qop {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auth" => Ok(Qop::Auth),
            "auth-int" => Ok(Qop::AuthInt),
            "auth-conf" => Ok(Qop::AuthConf),
            other => Err(Error::Config(format!(
                "invalid sasl.qop {:?}, expected auth, auth-int or auth-conf",
                other
            ))),
        }
    }
}

impl fmt::Display for Qop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Qop::Auth => "auth",
            Qop::AuthInt => "auth-int",
            Qop::AuthConf => "auth-conf",
        };
        write!(f, "{}", s)
    }
}

/// Handshake parameters passed through to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeOptions {
    pub sasl_enabled: bool,
    pub qop: Qop,
    pub server_primary: String,
}

impl Default for HandshakeOptions {
    fn default() -> Self {
        Self {
            sasl_enabled: true,
            qop: Qop::Auth,
            server_primary: "accumulo".to_string(),
        }
    }
}

/// Token issued by the store after a successful handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub principal: String,
    pub secret: Vec<u8>,
    pub expires_at: SystemTime,
}

impl AuthToken {
    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }

    /// True when the token expires within `margin`.
    pub fn expires_within(&self, margin: Duration) -> bool {
        match self.expires_at.duration_since(SystemTime::now()) {
            Ok(remaining) => remaining <= margin,
            Err(_) => true,
        }
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("principal", &self.principal)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_keytab_file_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\x05\x02keytab-bytes").unwrap();

        let source = KeytabFile::new("client@EXAMPLE.COM", file.path());
        assert_eq!(source.principal(), "client@EXAMPLE.COM");
        match source.load().unwrap() {
            Credential::Keytab(bytes) => assert_eq!(bytes, b"\x05\x02keytab-bytes"),
            other => panic!("unexpected credential {:?}", other),
        }
    }

    #[test]
    fn test_missing_or_empty_keytab_is_auth_error() {
        let missing = KeytabFile::new("client@EXAMPLE.COM", "/nonexistent/client.keytab");
        assert!(missing.load().unwrap_err().is_authentication());

        let empty = tempfile::NamedTempFile::new().unwrap();
        let source = KeytabFile::new("client@EXAMPLE.COM", empty.path());
        assert!(source.load().unwrap_err().is_authentication());
    }

    #[test]
    fn test_qop_parse() {
        assert_eq!("auth-conf".parse::<Qop>().unwrap(), Qop::AuthConf);
        assert!("privacy".parse::<Qop>().is_err());
    }

    #[test]
    fn test_token_expiry_window() {
        let token = AuthToken {
            principal: "p".into(),
            secret: vec![1],
            expires_at: SystemTime::now() + Duration::from_secs(30),
        };
        assert!(!token.is_expired());
        assert!(token.expires_within(Duration::from_secs(60)));
        assert!(!token.expires_within(Duration::from_secs(5)));
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let rendered = format!("{:?}", Credential::Password("hunter2".into()));
        assert!(!rendered.contains("hunter2"));
    }
}
