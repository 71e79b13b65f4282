// (c) 2024 Ross Younger
//! # 📖 Configuration management
//!
//! rfa obtains run-time configuration from the following sources, in order of increasing priority:
//! 1. Hard-wired defaults
//! 2. The system-wide configuration file
//!    * On Unix, this is `/etc/rfa.toml`
//! 3. The user's configuration file
//!    * On Unix, this is `~/.config/rfa/rfa.toml`
//!    * On Windows, this is `%AppData%\Roaming\rfa\rfa.toml`
//! 4. A file named with `--config`, if any
//! 5. Environment variables named `RFA_<FIELD>`, for example `RFA_QUEUE_DEPTH=16`
//! 6. Command-line options
//!
//! Run `rfa --config-files` for a list of which files we read.
//!
//! ## File format
//!
//! Configuration files are [TOML](https://toml.io/). Field names are in snake_case:
//!
//! ```toml
//! port = 5000
//! root = "/srv/files"
//! download_dir = "/home/me/Downloads"
//! queue_depth = 64
//! time_format = "utc"
//! ```
//!
//! ## Configurable options
//!
//! The set of supported fields is the [Configuration] structure.
//!
//! * `rfa --show-config` outputs a list of supported fields, their current values, and where each value came from.
//! * For an explanation of each field, refer to `rfa --help` .
//! * `rfa --config-files` outputs the list of configuration files for the current user and platform.

mod manager;
mod structure;
mod sysdefault;

pub use manager::Manager;
pub use structure::{Configuration, ConfigurationOverrides, DEFAULT_PORT};
