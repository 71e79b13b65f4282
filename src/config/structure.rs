//! Configuration structure
// (c) 2024 Ross Younger

use std::path::PathBuf;

use anyhow::Result;
use figment::{Metadata, Provider, providers::Serialized};
use serde::{Deserialize, Serialize};
use struct_field_names_as_array::FieldNamesAsSlice;

use crate::util::TimeFormat;

/// Default TCP port for the server
pub const DEFAULT_PORT: u16 = 5000;

/// The set of configurable options supported by rfa.
///
/// These may be set in configuration files, in the environment (as `RFA_<FIELD>`, e.g. `RFA_QUEUE_DEPTH`)
/// or on the command line (in kebab-case, e.g. `--queue-depth`).
///
/// [More details about the configuration mechanism](crate::config).
///
/// You can access rfa's hard-wired defaults through [`Configuration::system_default()`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, FieldNamesAsSlice)]
pub struct Configuration {
    /// TCP port. The server listens on it; the client connects to it unless told otherwise.
    pub port: u16,
    /// Address the server binds to
    pub address: String,
    /// Directory the server exposes; each session starts here
    pub root: PathBuf,
    /// Directory the client saves downloads into
    pub download_dir: PathBuf,
    /// Maximum number of outbound packets queued per connection before senders wait
    pub queue_depth: usize,
    /// Time format to use in log messages
    pub time_format: TimeFormat,
}

impl Configuration {
    /// Hard-wired configuration defaults
    #[must_use]
    pub fn system_default() -> Self {
        Self {
            port: DEFAULT_PORT,
            address: "0.0.0.0".into(),
            root: ".".into(),
            download_dir: ".".into(),
            queue_depth: 64,
            time_format: TimeFormat::Local,
        }
    }

    /// Checks the values make sense
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.queue_depth > 0, "queue_depth must be at least 1");
        anyhow::ensure!(!self.address.is_empty(), "address must not be empty");
        Ok(())
    }

    /// Where the server listens, as `address:port`
    #[must_use]
    pub fn bind_address(&self) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }

    /// A field's value, for display
    pub(crate) fn value_of(&self, field: &str) -> Option<String> {
        Some(match field {
            "port" => self.port.to_string(),
            "address" => self.address.clone(),
            "root" => self.root.display().to_string(),
            "download_dir" => self.download_dir.display().to_string(),
            "queue_depth" => self.queue_depth.to_string(),
            "time_format" => self.time_format.to_string(),
            _ => return None,
        })
    }
}

/// Configuration options given on the command line. Anything not given is left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, clap::Args)]
pub struct ConfigurationOverrides {
    /// TCP port to listen on (server) or connect to (client, if SERVER does not include one)
    /// [default: 5000]
    #[arg(short, long, help_heading("Configuration"), value_name("PORT"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Address for the server to bind to [default: 0.0.0.0]
    #[arg(long, help_heading("Configuration"), value_name("ADDR"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Directory the server exposes [default: .]
    #[arg(long, help_heading("Configuration"), value_name("DIR"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Directory downloads are saved into [default: .]
    #[arg(long, help_heading("Configuration"), value_name("DIR"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<PathBuf>,

    /// Outbound packets queued per connection before senders wait [default: 64]
    #[arg(long, help_heading("Advanced"), value_name("N"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_depth: Option<usize>,

    /// Time format for log messages [default: local]
    #[arg(long, help_heading("Output"), value_name("FORMAT"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_format: Option<TimeFormat>,
}

impl ConfigurationOverrides {
    const META_NAME: &str = "command line";
}

impl Provider for ConfigurationOverrides {
    fn metadata(&self) -> Metadata {
        Metadata::named(Self::META_NAME)
    }

    fn data(
        &self,
    ) -> std::result::Result<
        figment::value::Map<figment::Profile, figment::value::Dict>,
        figment::Error,
    > {
        Serialized::defaults(self).data()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use pretty_assertions::assert_eq;
    use struct_field_names_as_array::FieldNamesAsSlice as _;

    use super::Configuration;

    #[test]
    fn every_field_displays() {
        let c = Configuration::system_default();
        for f in Configuration::FIELD_NAMES_AS_SLICE {
            assert!(c.value_of(f).is_some(), "{f}");
        }
        assert_eq!(c.value_of("nonsense"), None);
    }

    #[test]
    fn bind_addresses() {
        let mut c = Configuration::system_default();
        assert_eq!(c.bind_address(), "0.0.0.0:5000");
        c.address = "::".into();
        c.port = 99;
        assert_eq!(c.bind_address(), "[::]:99");
    }

    #[test]
    fn validation() {
        let mut c = Configuration::system_default();
        c.validate().unwrap();
        c.queue_depth = 0;
        assert!(c.validate().is_err());
    }
}
