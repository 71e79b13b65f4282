//! Tracing helpers
// (c) 2024 Ross Younger

use std::{
    fs::File,
    io::Write,
    sync::atomic::{AtomicBool, Ordering},
    sync::{Arc, Mutex},
};

use anyhow::Context;
use indicatif::MultiProgress;
use serde::{Deserialize, Serialize, de};
use strum::VariantNames as _;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{
        MakeWriter,
        time::{ChronoLocal, ChronoUtc},
    },
    prelude::*,
};

use crate::cli::styles::maybe_strip_color;

static TRACING_INITIALIZED: AtomicBool = AtomicBool::new(false);

const FRIENDLY_FORMAT_LOCAL: &str = "%Y-%m-%d %H:%M:%SL";
const FRIENDLY_FORMAT_UTC: &str = "%Y-%m-%d %H:%M:%SZ";

/// Environment variable that controls what gets logged to stderr
const STANDARD_ENV_VAR: &str = "RUST_LOG";
/// Environment variable that controls what gets logged to file
const LOG_FILE_DETAIL_ENV_VAR: &str = "RUST_LOG_FILE_DETAIL";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Computes the trace level for a given set of [`Parameters`](crate::client::Parameters)
pub(crate) fn trace_level(args: &crate::client::Parameters) -> &'static str {
    if args.debug {
        "debug"
    } else if args.quiet {
        "error"
    } else {
        "info"
    }
}

/// Selects the format of time stamps in output messages
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
    clap::ValueEnum,
    Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "kebab-case")]
pub enum TimeFormat {
    /// Local time (as best as we can figure it out), as "year-month-day HH:MM:SS"
    #[default]
    Local,
    /// UTC time, as "year-month-day HH:MM:SS"
    Utc,
    /// UTC time, in the format described in [RFC 3339](https://datatracker.ietf.org/doc/html/rfc3339).
    ///
    /// Examples:
    /// `1997-11-12T09:55:06-06:00`
    /// `2010-03-14T18:32:03Z`
    Rfc3339,
}

impl<'de> Deserialize<'de> for TimeFormat {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let lower = s.to_ascii_lowercase();
        // requires strum::EnumString && strum::VariantNames && #[strum(serialize_all = "lowercase")]
        std::str::FromStr::from_str(&lower)
            .map_err(|_| de::Error::unknown_variant(&s, TimeFormat::VARIANTS))
    }
}

/// Builds a filter from the given environment variable.
/// If it is unset, we log only our own events at `trace_level`.
///
/// Returns the filter, and whether it came from the environment.
fn filter_for(trace_level: &str, key: &str) -> anyhow::Result<(EnvFilter, bool)> {
    match EnvFilter::try_from_env(key) {
        Ok(filter) => Ok((filter, true)),
        // set but unparseable
        Err(e) if std::env::var(key).is_ok() => {
            anyhow::bail!("{key} (set in environment) was not understood: {e}")
        }
        Err(_) => Ok((EnvFilter::try_new(format!("rfa={trace_level}"))?, false)),
    }
}

fn make_tracing_layer<W>(
    writer: W,
    filter: EnvFilter,
    time_format: TimeFormat,
    show_target: bool,
    ansi: bool,
) -> BoxedLayer
where
    W: for<'writer> MakeWriter<'writer> + 'static + Sync + Send,
{
    let layer = tracing_subscriber::fmt::layer::<Registry>()
        .compact()
        .with_target(show_target)
        .with_ansi(ansi)
        .with_writer(writer);

    // The timer changes the layer's type, so each arm has to finish the job
    match time_format {
        TimeFormat::Local => layer
            .with_timer(ChronoLocal::new(FRIENDLY_FORMAT_LOCAL.into()))
            .with_filter(filter)
            .boxed(),
        TimeFormat::Utc => layer
            .with_timer(ChronoUtc::new(FRIENDLY_FORMAT_UTC.into()))
            .with_filter(filter)
            .boxed(),
        TimeFormat::Rfc3339 => layer
            .with_timer(ChronoLocal::rfc_3339())
            .with_filter(filter)
            .boxed(),
    }
}

/// Where console log output goes
#[derive(Debug)]
pub(crate) enum ConsoleTraceType {
    /// Straight to stderr (server mode)
    Standard,
    /// Via Indicatif, so it doesn't trample the progress bars (client mode).
    /// Cloning the [`MultiProgress`] is cheap.
    Indicatif(MultiProgress),
    /// Do not print traces anywhere
    #[cfg(test)]
    None,
}

/// Set up rust tracing, to console (via an optional `MultiProgress`) and optionally to file.
///
/// By default we log only our own events, at a given trace level.
/// This can be overridden by setting `RUST_LOG`.
///
/// For examples, see <https://docs.rs/tracing-subscriber/0.3.18/tracing_subscriber/fmt/index.html#filtering-events-with-environment-variables>
///
/// **CAUTION:** If this function fails, tracing won't be set up; callers must take extra care to report the error.
///
/// **NOTE:** You can only run this once per process. A global bool prevents re-running.
pub(crate) fn setup(
    trace_level: &str,
    display: ConsoleTraceType,
    log_file: Option<&String>,
    time_format: TimeFormat,
    ansi_colours: bool,
) -> anyhow::Result<()> {
    if TRACING_INITIALIZED.swap(true, Ordering::Relaxed) {
        tracing::warn!("tracing::setup called a second time (ignoring)");
        return Ok(());
    }
    let layers = setup_inner(trace_level, display, log_file, time_format, ansi_colours)?;
    tracing_subscriber::registry().with(layers).init();
    Ok(())
}

fn setup_inner(
    trace_level: &str,
    display: ConsoleTraceType,
    log_file: Option<&String>,
    time_format: TimeFormat,
    ansi_colours: bool,
) -> anyhow::Result<Vec<BoxedLayer>> {
    let mut layers = Vec::new();

    // If the filter came from the environment, it may admit other crates' events, so show targets.
    let (filter, from_env) = filter_for(trace_level, STANDARD_ENV_VAR)?;
    match display {
        #[cfg(test)]
        ConsoleTraceType::None => (),
        ConsoleTraceType::Standard => layers.push(make_tracing_layer(
            std::io::stderr,
            filter,
            time_format,
            from_env,
            ansi_colours,
        )),
        ConsoleTraceType::Indicatif(mp) => layers.push(make_tracing_layer(
            ProgressWriter::wrap(mp),
            filter,
            time_format,
            from_env,
            ansi_colours,
        )),
    }

    if let Some(filename) = log_file {
        let out_file = Arc::new(File::create(filename).context("Failed to open log file")?);
        let (filter, from_env) = if std::env::var(LOG_FILE_DETAIL_ENV_VAR).is_ok() {
            (EnvFilter::try_from_env(LOG_FILE_DETAIL_ENV_VAR)?, true)
        } else {
            filter_for(trace_level, STANDARD_ENV_VAR)?
        };
        layers.push(make_tracing_layer(
            out_file,
            filter,
            time_format,
            from_env,
            false,
        ));
    }

    Ok(layers)
}

/// Returns whether tracing has been initialized
pub(crate) fn is_initialized() -> bool {
    TRACING_INITIALIZED.load(Ordering::Relaxed)
}

/// A wrapper type so tracing can output in a way that doesn't mess up `MultiProgress`
struct ProgressWriter(MultiProgress);

impl ProgressWriter {
    fn wrap(display: MultiProgress) -> Mutex<Self> {
        Mutex::new(Self(display))
    }
}

impl Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let msg = std::str::from_utf8(buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let msg = maybe_strip_color(msg);
        let msg = msg.trim_end_matches('\n');
        if self.0.is_hidden() {
            eprintln!("{msg}");
        } else {
            self.0.println(msg)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
