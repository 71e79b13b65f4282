// (c) 2024 Ross Younger
//! CLI output styling
//!
//! This module provides styles for use with anstream's `println!` / `eprintln!` macros,
//! and a `RESET` constant to reset styling to the default.

use anstream::ColorChoice;
#[allow(clippy::enum_glob_use)]
use anstyle::AnsiColor::*;
use anstyle::Color::Ansi;
use clap::builder::styling::Styles;
use std::borrow::Cow;
use std::io::IsTerminal;
use std::sync::LazyLock;
use tabled::settings::{Theme, style::Style};

const _ERROR: anstyle::Style = anstyle::Style::new().bold().fg_color(Some(Ansi(Red)));
const _WARNING: anstyle::Style = anstyle::Style::new().bold().fg_color(Some(Ansi(Yellow)));
const _INFO: anstyle::Style = anstyle::Style::new().fg_color(Some(Ansi(Cyan)));
const _HEADER: anstyle::Style = anstyle::Style::new()
    .underline()
    .fg_color(Some(Ansi(Yellow)));

/// Resets styling to default. This is a re-export of [`anstyle::Reset`].
pub use anstyle::Reset as RESET;

// clap reads the CLICOLOR environment variables itself
pub(crate) const CLAP_STYLES: Styles = Styles::styled()
    .usage(_HEADER)
    .header(_HEADER)
    .literal(anstyle::Style::new().bold())
    .invalid(_WARNING)
    .error(_ERROR)
    .valid(_INFO.bold().underline())
    .placeholder(_INFO);

/// Border style for tabular output
pub(crate) static TABLE_STYLE: LazyLock<Theme> = LazyLock::new(|| {
    if cfg!(windows) {
        Style::psql().into()
    } else {
        Style::sharp().into()
    }
});

/// Wrap a constant in a function that returns the style if colours are enabled.
macro_rules! wrap {
    ($func:ident, $def:ident) => {
        #[must_use]
        /// Conditional styling accessor for
        #[doc = stringify!($func)]
        /// messages
        ///
        /// This function returns either an active [`anstyle::Style`], or
        /// (if colours are disabled) the empty Style.
        pub fn $func() -> anstyle::Style {
            if use_colours() {
                $def
            } else {
                anstyle::Style::new()
            }
        }
    };
}

wrap!(error, _ERROR);
wrap!(header, _HEADER);

/// Are we configured to use terminal colours?
#[must_use]
pub fn use_colours() -> bool {
    console::colors_enabled()
}

/// Detect the desired colour mode from the environment.
///
/// See [https://bixense.com/clicolors/](https://bixense.com/clicolors/) for more information.
fn autodetect_colour() -> bool {
    let clicolor_force = std::env::var("CLICOLOR_FORCE").unwrap_or_default();
    let no_color = std::env::var("NO_COLOR").unwrap_or_default();

    if !no_color.is_empty() {
        false
    } else if !clicolor_force.is_empty() {
        true
    } else {
        std::io::stderr().is_terminal()
    }
}

/// Sets up the terminal colour mode from the quasi-standard `CLICOLOR_FORCE` and `NO_COLOR`
/// environment variables, falling back to whether stderr is a terminal.
pub fn configure_colours() {
    let state = autodetect_colour();
    console::set_colors_enabled(state);
    console::set_colors_enabled_stderr(state);
    if state {
        ColorChoice::Always
    } else {
        ColorChoice::Never
    }
    .write_global();
}

pub(crate) fn maybe_strip_color(s: &str) -> Cow<'_, str> {
    if use_colours() {
        s.into()
    } else {
        console::strip_ansi_codes(s)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use pretty_assertions::assert_eq;
    use rusty_fork::rusty_fork_test;

    // colour state is process-global
    rusty_fork_test! {
        #[test]
        fn colours_off() {
            console::set_colors_enabled(false);
            assert!(!super::use_colours());
            assert_eq!(super::error(), anstyle::Style::new());
            assert_eq!(super::maybe_strip_color("\x1b[31mred\x1b[0m"), "red");
        }

        #[test]
        fn colours_on() {
            console::set_colors_enabled(true);
            assert!(super::use_colours());
            assert_eq!(super::header(), super::_HEADER);
            assert_eq!(super::maybe_strip_color("\x1b[31mred\x1b[0m"), "\x1b[31mred\x1b[0m");
        }
    }
}
