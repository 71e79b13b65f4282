//! Command-line argument definitions
// (c) 2024 Ross Younger

use std::{ffi::OsString, path::PathBuf};

use clap::{ArgAction::SetTrue, Parser};

use crate::{cli::styles::CLAP_STYLES, client::Parameters, config::ConfigurationOverrides};

/// Remote File Access
///
/// Serves a directory tree over TCP, or connects to such a server and browses it interactively.
#[derive(Debug, Parser, Clone)]
#[command(
    author,
    version,
    about,
    before_help = "e.g.   rfa --server --root /srv/files\n       rfa myserver:5000",
    styles = CLAP_STYLES,
    infer_long_args(true),
)]
pub(crate) struct CliArgs {
    /// Runs as a server, serving the configured root directory
    #[arg(
        long,
        action = SetTrue,
        help_heading("Modes"),
        conflicts_with_all(["show_config", "config_files"]),
    )]
    pub server: bool,

    /// Outputs the configuration, then exits.
    ///
    /// Shows every configuration field, its value, and where the value came from.
    #[arg(long, help_heading("Configuration"), display_order(0))]
    pub show_config: bool,

    /// Outputs the paths to configuration file(s), then exits
    #[arg(long, help_heading("Configuration"), display_order(0))]
    pub config_files: bool,

    /// Reads an additional configuration file, which takes precedence over the standard files
    #[arg(long, value_name("FILE"), help_heading("Configuration"), display_order(0))]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub config_overrides: ConfigurationOverrides,

    #[command(flatten)]
    pub client_params: Parameters,
}

impl CliArgs {
    pub(crate) fn custom_parse<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(args)
    }
}

/// What the invocation asked us to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MainMode {
    Server,
    Client,
    ShowConfig,
    ShowConfigFiles,
}

impl From<&CliArgs> for MainMode {
    fn from(args: &CliArgs) -> Self {
        if args.server {
            MainMode::Server
        } else if args.show_config {
            MainMode::ShowConfig
        } else if args.config_files {
            MainMode::ShowConfigFiles
        } else {
            MainMode::Client
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::{CliArgs, MainMode};

    #[rstest]
    #[case(&["rfa", "--server"], MainMode::Server)]
    #[case(&["rfa", "--show-config"], MainMode::ShowConfig)]
    #[case(&["rfa", "--config-files"], MainMode::ShowConfigFiles)]
    #[case(&["rfa", "somehost"], MainMode::Client)]
    #[case(&["rfa"], MainMode::Client)]
    fn modes(#[case] argv: &[&str], #[case] expected: MainMode) {
        let args = CliArgs::custom_parse(argv).unwrap();
        assert_eq!(MainMode::from(&args), expected);
    }

    #[test]
    fn server_conflicts_with_show_config() {
        assert!(CliArgs::custom_parse(["rfa", "--server", "--show-config"]).is_err());
    }

    #[test]
    fn overrides_are_collected() {
        let args = CliArgs::custom_parse([
            "rfa",
            "--server",
            "-p",
            "6000",
            "--root",
            "/srv",
            "--queue-depth",
            "4",
            "--config",
            "extra.toml",
        ])
        .unwrap();
        assert_eq!(args.config_overrides.port, Some(6000));
        assert_eq!(args.config_overrides.root, Some("/srv".into()));
        assert_eq!(args.config_overrides.queue_depth, Some(4));
        assert_eq!(args.config_overrides.address, None);
        assert_eq!(args.config, Some("extra.toml".into()));
    }

    #[test]
    fn client_params_are_collected() {
        let args = CliArgs::custom_parse(["rfa", "-q", "host:1"]).unwrap();
        assert!(args.client_params.quiet);
        assert_eq!(args.client_params.remote.as_deref(), Some("host:1"));
    }
}
