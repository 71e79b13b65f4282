//! Options specific to client mode
// (c) 2024 Ross Younger

use clap::Parser;

#[derive(Debug, Parser, Clone, Default)]
/// Client-side options which may be provided on the command line, but are not persistent configuration options.
pub struct Parameters {
    /// Enable detailed debug output
    ///
    /// This has the same effect as setting `RUST_LOG=rfa=debug` in the environment.
    /// If present, `RUST_LOG` overrides this option.
    #[arg(short, long, action, help_heading("Debug"), display_order(0))]
    pub debug: bool,

    /// Log to a file
    ///
    /// By default the log receives everything printed to stderr.
    /// To override this behaviour, set the environment variable `RUST_LOG_FILE_DETAIL` (same semantics as `RUST_LOG`).
    #[arg(
        short('l'),
        long,
        action,
        value_name("FILE"),
        help_heading("Output"),
        next_line_help(true),
        display_order(0)
    )]
    pub log_file: Option<String>,

    /// Quiet mode
    ///
    /// Switches off progress display; reports only errors
    #[arg(short, long, action, conflicts_with("debug"), help_heading("Output"))]
    pub quiet: bool,

    /// The server to connect to, as HOST or HOST:PORT.
    ///
    /// If no port is given, the configured port is used.
    #[arg(value_name = "SERVER")]
    pub remote: Option<String>,
}

impl Parameters {
    /// The address to connect to, filling in the port if the user didn't give one
    pub(crate) fn server_address(&self, default_port: u16) -> anyhow::Result<String> {
        let target = self
            .remote
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("a server to connect to is required (try --help)"))?;
        Ok(with_default_port(target, default_port))
    }
}

fn with_default_port(target: &str, port: u16) -> String {
    if target.starts_with('[') {
        // [v6addr] or [v6addr]:port
        if target.contains("]:") {
            target.to_owned()
        } else {
            format!("{target}:{port}")
        }
    } else {
        match target.matches(':').count() {
            0 => format!("{target}:{port}"),
            1 => target.to_owned(),
            _ => format!("[{target}]:{port}"),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::{Parameters, with_default_port};
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_debug_option() {
        let params = Parameters::parse_from(["test", "--debug"]);
        assert!(params.debug);
    }

    #[test]
    fn test_log_file_option() {
        let params = Parameters::parse_from(["test", "--log-file", "log.txt"]);
        assert_eq!(params.log_file, Some("log.txt".to_string()));
    }

    #[test]
    fn test_quiet_option() {
        let params = Parameters::parse_from(["test", "--quiet"]);
        assert!(params.quiet);
    }

    #[test]
    fn quiet_and_debug_conflict() {
        assert!(Parameters::try_parse_from(["test", "--quiet", "--debug"]).is_err());
    }

    #[rstest]
    #[case("host", "host:5000")]
    #[case("host:1234", "host:1234")]
    #[case("10.0.0.1", "10.0.0.1:5000")]
    #[case("::1", "[::1]:5000")]
    #[case("[::1]", "[::1]:5000")]
    #[case("[::1]:99", "[::1]:99")]
    fn ports(#[case] target: &str, #[case] expected: &str) {
        assert_eq!(with_default_port(target, 5000), expected);
    }

    #[test]
    fn server_address() {
        let params = Parameters::parse_from(["test", "example.com"]);
        assert_eq!(params.server_address(7).unwrap(), "example.com:7");
        let params = Parameters::parse_from(["test"]);
        assert!(params.server_address(7).is_err());
    }
}
