//! Command line options shared by the bundled programs.

use crate::config::{AuthType, ClientConfig};
use crate::error::{Error, Result};
use crate::local_store::LocalStore;
use crate::logging::{init_logging, parse_level};
use crate::transport::TabletTransport;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;

#[derive(Debug, Clone)]
pub struct ClientOpts {
    pub conf: Option<PathBuf>,
    pub principal: Option<String>,
    pub keytab: Option<PathBuf>,
    pub table: String,
    pub log_level: Level,
    pub json_logs: bool,
}

impl ClientOpts {
    /// Build the clap command for a program writing to or reading from
    /// `default_table`.
    pub fn command(name: &'static str, about: &'static str, default_table: &'static str) -> Command {
        Command::new(name)
            .about(about)
            .version(env!("CARGO_PKG_VERSION"))
            .arg(
                Arg::new("conf")
                    .help("Client properties or JSON file")
                    .short('c')
                    .long("conf"),
            )
            .arg(
                Arg::new("principal")
                    .help("Principal to authenticate as")
                    .long("principal"),
            )
            .arg(
                Arg::new("keytab")
                    .help("Keytab for the principal (implies kerberos)")
                    .long("keytab"),
            )
            .arg(
                Arg::new("table")
                    .help("Table name")
                    .long("table")
                    .default_value(default_table),
            )
            .arg(
                Arg::new("log-level")
                    .help("Log level")
                    .long("log-level")
                    .value_parser(["error", "warn", "info", "debug", "trace"])
                    .default_value("info"),
            )
            .arg(
                Arg::new("json-logs")
                    .help("Emit logs as JSON")
                    .long("json-logs")
                    .action(ArgAction::SetTrue),
            )
    }

    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let level = matches
            .get_one::<String>("log-level")
            .map(String::as_str)
            .unwrap_or("info");
        Ok(Self {
            conf: matches.get_one::<String>("conf").map(PathBuf::from),
            principal: matches.get_one::<String>("principal").cloned(),
            keytab: matches.get_one::<String>("keytab").map(PathBuf::from),
            table: matches
                .get_one::<String>("table")
                .cloned()
                .ok_or_else(|| Error::Config("--table is required".to_string()))?,
            log_level: parse_level(level)
                .ok_or_else(|| Error::Config(format!("invalid log level {:?}", level)))?,
            json_logs: matches.get_flag("json-logs"),
        })
    }

    pub fn try_parse_from<I, T>(command: Command, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = command
            .try_get_matches_from(args)
            .map_err(|e| Error::Config(e.to_string()))?;
        Self::from_matches(&matches)
    }

    pub fn init_logging(&self) {
        init_logging(self.log_level, self.json_logs);
    }

    /// The configuration file (if any) with command line values laid over
    /// it, validated.
    pub fn client_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.conf {
            Some(path) => ClientConfig::load(path)?,
            None => ClientConfig::default(),
        };
        if let Some(principal) = &self.principal {
            config.principal = Some(principal.clone());
        }
        if let Some(keytab) = &self.keytab {
            config.auth_type = AuthType::Kerberos;
            config.handshake.sasl_enabled = true;
            config.token = Some(keytab.display().to_string());
        }
        config.validate()?;
        Ok(config)
    }
}

/// Open the store named by the configuration: the snapshot at `store.path`
/// when set, otherwise a fresh in-memory store.
pub fn connect(config: &ClientConfig) -> Result<Arc<dyn TabletTransport>> {
    Ok(match &config.store_path {
        Some(path) => Arc::new(LocalStore::open(path)?),
        None => Arc::new(LocalStore::new()),
    })
}
