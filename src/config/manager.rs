//! Configuration file wrangling
// (c) 2024 Ross Younger

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use figment::{
    Figment, Provider,
    providers::{Env, Format as _, Toml},
};
use struct_field_names_as_array::FieldNamesAsSlice as _;
use tabled::{
    Table, Tabled,
    settings::{Alignment, object::Columns},
};
use tracing::debug;

use super::{Configuration, sysdefault::SystemDefault};
use crate::cli::styles::TABLE_STYLE;

/// Prefix for configuration environment variables
const ENV_PREFIX: &str = "RFA_";

const SYSTEM_CONFIG_FILE: &str = "/etc/rfa.toml";

/// One row of the `--show-config` table
#[derive(Tabled)]
struct DescribedField {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Source")]
    source: String,
}

/// Processes and merges all possible configuration sources.
///
/// Configuration file locations are platform-dependent.
/// To see what applies on the current platform, run `rfa --config-files`.
#[derive(Debug)]
pub struct Manager {
    /// Configuration data
    data: Figment,
}

impl Manager {
    /// Holds only the system defaults
    fn new() -> Self {
        Self {
            data: Figment::from(SystemDefault {}),
        }
    }

    /// General constructor for production use
    ///
    /// Reads the system and user configuration files, then `extra_file` if given, then the environment.
    /// Each layer overrides the ones before it.
    pub fn standard(extra_file: Option<&Path>) -> Result<Self> {
        let mut new1 = Self::new();
        new1.add_config("system", Self::system_config_path().as_deref());
        new1.add_config("user", Self::user_config_path().as_deref());
        if let Some(path) = extra_file {
            anyhow::ensure!(
                path.is_file(),
                "configuration file {} not found",
                path.display()
            );
            new1.merge_provider(Toml::file(path));
        }
        new1.merge_provider(Env::prefixed(ENV_PREFIX));
        Ok(new1)
    }

    /// Testing/internal constructor, does not read files or apply environment; DOES apply system default.
    #[must_use]
    #[cfg(test)]
    pub(crate) fn without_files() -> Self {
        Self::new()
    }

    fn add_config(&mut self, what: &str, path: Option<&Path>) {
        let Some(path) = path else {
            debug!("could not determine {what} configuration file path");
            return;
        };
        if !path.exists() {
            debug!("{what} configuration file {path:?} not present");
            return;
        }
        self.merge_provider(Toml::file(path));
    }

    /// Location of the system-wide configuration file, if the platform has one
    #[must_use]
    pub fn system_config_path() -> Option<PathBuf> {
        cfg!(unix).then(|| PathBuf::from(SYSTEM_CONFIG_FILE))
    }

    /// Location of the current user's configuration file
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("rfa").join("rfa.toml"))
    }

    /// Returns the list of configuration files we read.
    ///
    /// This is a function of platform and the current user id.
    #[must_use]
    pub fn config_files() -> Vec<String> {
        [Self::system_config_path(), Self::user_config_path()]
            .into_iter()
            .flatten()
            .map(|p| p.as_os_str().to_string_lossy().to_string())
            .collect()
    }

    /// Merges in a data set, which is some sort of [figment::Provider](https://docs.rs/figment/latest/figment/trait.Provider.html).
    /// This uses figment's `merge` operation, which prefers to _replace_ existing items.
    pub fn merge_provider<T>(&mut self, provider: T)
    where
        T: Provider,
    {
        let f = std::mem::take(&mut self.data);
        self.data = f.merge(provider); // in the error case, this leaves the provider in a fused state
    }

    /// Extracts and validates the final configuration
    pub fn get(&self) -> Result<Configuration> {
        let config: Configuration = self
            .data
            .extract()
            .context("failed to understand configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Describes every field: its value and where that value came from
    pub fn describe(&self) -> Result<String> {
        let config = self.get()?;
        let rows = Configuration::FIELD_NAMES_AS_SLICE.iter().map(|&field| {
            let source = self.data.find_metadata(field).map_or_else(
                || SystemDefault::META_NAME.to_string(),
                |m| {
                    m.source
                        .as_ref()
                        .map_or_else(|| m.name.to_string(), ToString::to_string)
                },
            );
            DescribedField {
                field,
                value: config.value_of(field).unwrap_or_default(),
                source,
            }
        });
        let mut table = Table::new(rows);
        let _ = table
            .with(TABLE_STYLE.clone())
            .modify(Columns::first(), Alignment::right());
        Ok(table.to_string())
    }
}
