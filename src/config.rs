//! Client configuration.
//!
//! Settings come from a client properties file (`key=value` lines, `#` or `!`
//! comments) or from a JSON object carrying the same keys. Command line
//! options are overlaid on top by [`crate::opts::ClientOpts`].

use crate::auth::{HandshakeOptions, Qop};
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::writer::BatchWriterConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const INSTANCE_NAME: &str = "instance.name";
pub const INSTANCE_ZOOKEEPERS: &str = "instance.zookeepers";
pub const AUTH_TYPE: &str = "auth.type";
pub const AUTH_PRINCIPAL: &str = "auth.principal";
pub const AUTH_TOKEN: &str = "auth.token";
pub const SASL_ENABLED: &str = "sasl.enabled";
pub const SASL_QOP: &str = "sasl.qop";
pub const SASL_SERVER_PRIMARY: &str = "sasl.kerberos.server.primary";
pub const STORE_PATH: &str = "store.path";
pub const BATCH_WRITER_MEMORY_MAX: &str = "batch.writer.memory.max";
pub const BATCH_WRITER_LATENCY_MAX: &str = "batch.writer.latency.max";
pub const BATCH_WRITER_MUTATIONS_MAX: &str = "batch.writer.mutations.max";
pub const BATCH_WRITER_RETRIES_MAX: &str = "batch.writer.retries.max";
pub const SCAN_BATCH_SIZE: &str = "scan.batch.size";
pub const SESSION_TOKEN_TTL: &str = "session.token.ttl";
pub const SESSION_TOKEN_REFRESH: &str = "session.token.refresh";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    Kerberos,
    Password,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub instance_name: Option<String>,
    pub zookeepers: Option<String>,
    pub auth_type: AuthType,
    pub principal: Option<String>,
    /// Keytab path for kerberos, the password itself otherwise.
    pub token: Option<String>,
    pub handshake: HandshakeOptions,
    pub store_path: Option<PathBuf>,
    pub batch_writer: BatchWriterConfig,
    pub scan_batch_size: usize,
    pub token_ttl: Duration,
    pub refresh_margin: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            instance_name: None,
            zookeepers: None,
            auth_type: AuthType::Kerberos,
            principal: None,
            token: None,
            handshake: HandshakeOptions::default(),
            store_path: None,
            batch_writer: BatchWriterConfig::default(),
            scan_batch_size: 1000,
            token_ttl: Duration::from_secs(24 * 60 * 60),
            refresh_margin: Duration::from_secs(5 * 60),
        }
    }
}

impl ClientConfig {
    /// Load from a `.json` file or a properties file (any other extension).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_properties(&parse_properties(&contents)),
        }
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let file: JsonConfig = serde_json::from_str(contents)
            .map_err(|e| Error::Config(format!("invalid JSON configuration: {}", e)))?;
        let mut config = Self::default();
        file.apply(&mut config)?;
        Ok(config)
    }

    pub fn from_properties(props: &BTreeMap<String, String>) -> Result<Self> {
        let mut config = Self::default();
        for (key, value) in props {
            config.set(key, value)?;
        }
        Ok(config)
    }

    /// Apply one property. Unknown keys are ignored so that files shared
    /// with other clients still load.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            INSTANCE_NAME => self.instance_name = Some(value.to_string()),
            INSTANCE_ZOOKEEPERS => self.zookeepers = Some(value.to_string()),
            AUTH_TYPE => {
                self.auth_type = match value {
                    "kerberos" => AuthType::Kerberos,
                    "password" => AuthType::Password,
                    other => {
                        return Err(Error::Config(format!(
                            "{} must be kerberos or password, got {:?}",
                            AUTH_TYPE, other
                        )))
                    }
                }
            }
            AUTH_PRINCIPAL => self.principal = Some(value.to_string()),
            AUTH_TOKEN => self.token = Some(value.to_string()),
            SASL_ENABLED => self.handshake.sasl_enabled = parse_bool(key, value)?,
            SASL_QOP => self.handshake.qop = value.parse::<Qop>()?,
            SASL_SERVER_PRIMARY => self.handshake.server_primary = value.to_string(),
            STORE_PATH => self.store_path = Some(PathBuf::from(value)),
            BATCH_WRITER_MEMORY_MAX => self.batch_writer.max_memory = parse_memory(key, value)?,
            BATCH_WRITER_LATENCY_MAX => self.batch_writer.max_latency = parse_duration(key, value)?,
            BATCH_WRITER_MUTATIONS_MAX => {
                self.batch_writer.max_mutations = parse_number(key, value)?
            }
            BATCH_WRITER_RETRIES_MAX => {
                self.batch_writer.retry = RetryPolicy {
                    max_attempts: parse_number(key, value)?,
                    ..self.batch_writer.retry.clone()
                }
            }
            SCAN_BATCH_SIZE => self.scan_batch_size = parse_number(key, value)?,
            SESSION_TOKEN_TTL => self.token_ttl = parse_duration(key, value)?,
            SESSION_TOKEN_REFRESH => self.refresh_margin = parse_duration(key, value)?,
            _ => {}
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.principal.as_deref().unwrap_or("").is_empty() {
            return Err(Error::Config(format!("{} is required", AUTH_PRINCIPAL)));
        }
        if self.token.as_deref().unwrap_or("").is_empty() {
            return Err(Error::Config(format!("{} is required", AUTH_TOKEN)));
        }
        if self.auth_type == AuthType::Kerberos && !self.handshake.sasl_enabled {
            return Err(Error::Config(format!(
                "kerberos authentication requires {}=true",
                SASL_ENABLED
            )));
        }
        if self.batch_writer.max_memory == 0 {
            return Err(Error::Config(format!("{} must be positive", BATCH_WRITER_MEMORY_MAX)));
        }
        if self.batch_writer.max_mutations == 0 {
            return Err(Error::Config(format!(
                "{} must be positive",
                BATCH_WRITER_MUTATIONS_MAX
            )));
        }
        if self.scan_batch_size == 0 {
            return Err(Error::Config(format!("{} must be positive", SCAN_BATCH_SIZE)));
        }
        if self.refresh_margin >= self.token_ttl {
            return Err(Error::Config(format!(
                "{} must be shorter than {}",
                SESSION_TOKEN_REFRESH, SESSION_TOKEN_TTL
            )));
        }
        Ok(())
    }
}

/// Parse `key=value` / `key: value` lines.
pub fn parse_properties(contents: &str) -> BTreeMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let idx = line.find(['=', ':'])?;
            Some((
                line[..idx].trim().to_string(),
                line[idx + 1..].trim().to_string(),
            ))
        })
        .collect()
}

/// A size or duration given either as a bare number or with a unit suffix.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Quantity {
    Number(u64),
    Text(String),
}

impl Quantity {
    fn render(&self) -> String {
        match self {
            Quantity::Number(n) => n.to_string(),
            Quantity::Text(s) => s.clone(),
        }
    }
}

/// JSON form of the client properties, keyed by the same property names.
/// Unknown keys are ignored.
#[derive(Debug, Deserialize)]
struct JsonConfig {
    #[serde(rename = "instance.name")]
    instance_name: Option<String>,
    #[serde(rename = "instance.zookeepers")]
    zookeepers: Option<String>,
    #[serde(rename = "auth.type")]
    auth_type: Option<AuthType>,
    #[serde(rename = "auth.principal")]
    principal: Option<String>,
    #[serde(rename = "auth.token")]
    token: Option<String>,
    #[serde(rename = "sasl.enabled")]
    sasl_enabled: Option<bool>,
    #[serde(rename = "sasl.qop")]
    qop: Option<Qop>,
    #[serde(rename = "sasl.kerberos.server.primary")]
    server_primary: Option<String>,
    #[serde(rename = "store.path")]
    store_path: Option<PathBuf>,
    #[serde(rename = "batch.writer.memory.max")]
    max_memory: Option<Quantity>,
    #[serde(rename = "batch.writer.latency.max")]
    max_latency: Option<Quantity>,
    #[serde(rename = "batch.writer.mutations.max")]
    max_mutations: Option<usize>,
    #[serde(rename = "batch.writer.retries.max")]
    max_retries: Option<u32>,
    #[serde(rename = "scan.batch.size")]
    scan_batch_size: Option<usize>,
    #[serde(rename = "session.token.ttl")]
    token_ttl: Option<Quantity>,
    #[serde(rename = "session.token.refresh")]
    refresh_margin: Option<Quantity>,
}

impl JsonConfig {
    fn apply(self, config: &mut ClientConfig) -> Result<()> {
        if self.instance_name.is_some() {
            config.instance_name = self.instance_name;
        }
        if self.zookeepers.is_some() {
            config.zookeepers = self.zookeepers;
        }
        if let Some(auth_type) = self.auth_type {
            config.auth_type = auth_type;
        }
        if self.principal.is_some() {
            config.principal = self.principal;
        }
        if self.token.is_some() {
            config.token = self.token;
        }
        if let Some(enabled) = self.sasl_enabled {
            config.handshake.sasl_enabled = enabled;
        }
        if let Some(qop) = self.qop {
            config.handshake.qop = qop;
        }
        if let Some(primary) = self.server_primary {
            config.handshake.server_primary = primary;
        }
        if self.store_path.is_some() {
            config.store_path = self.store_path;
        }
        if let Some(memory) = self.max_memory {
            config.batch_writer.max_memory =
                parse_memory(BATCH_WRITER_MEMORY_MAX, &memory.render())?;
        }
        if let Some(latency) = self.max_latency {
            config.batch_writer.max_latency =
                parse_duration(BATCH_WRITER_LATENCY_MAX, &latency.render())?;
        }
        if let Some(mutations) = self.max_mutations {
            config.batch_writer.max_mutations = mutations;
        }
        if let Some(retries) = self.max_retries {
            config.batch_writer.retry.max_attempts = retries;
        }
        if let Some(size) = self.scan_batch_size {
            config.scan_batch_size = size;
        }
        if let Some(ttl) = self.token_ttl {
            config.token_ttl = parse_duration(SESSION_TOKEN_TTL, &ttl.render())?;
        }
        if let Some(margin) = self.refresh_margin {
            config.refresh_margin = parse_duration(SESSION_TOKEN_REFRESH, &margin.render())?;
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(Error::Config(format!("{} must be a boolean, got {:?}", key, value))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a number, got {:?}", key, value)))
}

/// Sizes like `50M`, `512K`, `1G` or a plain byte count.
pub fn parse_memory(key: &str, value: &str) -> Result<usize> {
    let (digits, multiplier) = match value.chars().last() {
        Some('K') | Some('k') => (&value[..value.len() - 1], 1024),
        Some('M') | Some('m') => (&value[..value.len() - 1], 1024 * 1024),
        Some('G') | Some('g') => (&value[..value.len() - 1], 1024 * 1024 * 1024),
        _ => (value, 1),
    };
    let base: usize = parse_number(key, digits.trim())?;
    base.checked_mul(multiplier)
        .ok_or_else(|| Error::Config(format!("{} is too large: {}", key, value)))
}

/// Durations like `120s`, `250ms`, `5m`, `1h` or plain milliseconds.
pub fn parse_duration(key: &str, value: &str) -> Result<Duration> {
    let value = value.trim();
    let (digits, unit) = if let Some(d) = value.strip_suffix("ms") {
        (d, 1u64)
    } else if let Some(d) = value.strip_suffix('s') {
        (d, 1000)
    } else if let Some(d) = value.strip_suffix('m') {
        (d, 60 * 1000)
    } else if let Some(d) = value.strip_suffix('h') {
        (d, 60 * 60 * 1000)
    } else {
        (value, 1)
    };
    let amount: u64 = parse_number(key, digits.trim())?;
    Ok(Duration::from_millis(amount.saturating_mul(unit)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CLIENT_PROPERTIES: &str = "\
# client settings
instance.name=hello
instance.zookeepers=zk1:2181,zk2:2181
auth.type=kerberos
auth.principal=client@EXAMPLE.COM
auth.token=/etc/security/keytabs/client.keytab
sasl.enabled=true
sasl.qop=auth-conf
sasl.kerberos.server.primary=accumulo
batch.writer.memory.max=10M
batch.writer.latency.max=2s
";

    #[test]
    fn test_parse_client_properties() {
        let props = parse_properties(CLIENT_PROPERTIES);
        let config = ClientConfig::from_properties(&props).unwrap();

        assert_eq!(config.instance_name.as_deref(), Some("hello"));
        assert_eq!(config.principal.as_deref(), Some("client@EXAMPLE.COM"));
        assert_eq!(config.handshake.qop, Qop::AuthConf);
        assert_eq!(config.handshake.server_primary, "accumulo");
        assert_eq!(config.batch_writer.max_memory, 10 * 1024 * 1024);
        assert_eq!(config.batch_writer.max_latency, Duration::from_secs(2));
        config.validate().unwrap();
    }

    #[test]
    fn test_load_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"auth.type": "password", "auth.principal": "root", "auth.token": "secret",
                "batch.writer.mutations.max": 500, "sasl.enabled": false}}"#
        )
        .unwrap();

        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.auth_type, AuthType::Password);
        assert_eq!(config.batch_writer.max_mutations, 500);
        assert!(!config.handshake.sasl_enabled);
        config.validate().unwrap();
    }

    #[test]
    fn test_json_typed_values() {
        let config = ClientConfig::from_json(
            r#"{"auth.type": "kerberos", "auth.principal": "svc@EXAMPLE.COM",
                "auth.token": "/etc/svc.keytab", "sasl.enabled": true,
                "sasl.qop": "auth-int", "batch.writer.memory.max": "2M",
                "batch.writer.latency.max": 1500, "session.token.ttl": "1h",
                "unrelated.key": [1, 2]}"#,
        )
        .unwrap();
        assert_eq!(config.auth_type, AuthType::Kerberos);
        assert_eq!(config.handshake.qop, Qop::AuthInt);
        assert_eq!(config.batch_writer.max_memory, 2 * 1024 * 1024);
        assert_eq!(config.batch_writer.max_latency, Duration::from_millis(1500));
        assert_eq!(config.token_ttl, Duration::from_secs(3600));
        config.validate().unwrap();

        assert!(ClientConfig::from_json(r#"{"auth.type": "delegation"}"#).is_err());
        assert!(ClientConfig::from_json(r#"{"sasl.qop": "privacy"}"#).is_err());
        assert!(ClientConfig::from_json(r#"{"sasl.enabled": "maybe"}"#).is_err());
    }

    #[test]
    fn test_validation_failures() {
        assert!(ClientConfig::default().validate().is_err());

        let mut config = ClientConfig::default();
        config.set(AUTH_PRINCIPAL, "client@EXAMPLE.COM").unwrap();
        config.set(AUTH_TOKEN, "/tmp/client.keytab").unwrap();
        config.set(SASL_ENABLED, "false").unwrap();
        assert!(config.validate().is_err());

        assert!(config.set(SASL_QOP, "privacy").is_err());
        assert!(config.set(AUTH_TYPE, "delegation").is_err());
    }

    #[test]
    fn test_memory_and_duration_units() {
        assert_eq!(parse_memory("k", "512K").unwrap(), 512 * 1024);
        assert_eq!(parse_memory("k", "1024").unwrap(), 1024);
        assert_eq!(parse_duration("k", "250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("k", "5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("k", "1500").unwrap(), Duration::from_millis(1500));
        assert!(parse_duration("k", "soon").is_err());
    }
}
