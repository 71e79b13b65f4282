// (c) 2025 Ross Younger

#![allow(clippy::doc_markdown)]
//! Remote File Access (`rfa`) is a small client/server tool for browsing and downloading
//! files from a remote directory tree over a single TCP connection.
//!
//! ## 📖 Documentation
//!
//! * [About the rfa protocol](protocol)
//! * [Configuring rfa](config)
//!
//! ## Overview
//!
//! - 🗂️ The server exposes one directory tree (its _root_) to any number of concurrent clients.
//!   Each client gets a session of its own, with its own working directory.
//! - 💬 The client is an interactive shell: type `ls`, `cd`, `pwd`, `get` and `quit`.
//! - 🚀 Downloads run in the background, and several may be in flight at once on the same connection.
//!   The client shows a progress bar for each.
//!
//! #### What rfa is not
//!
//! * Secure. There is no authentication and no encryption; use it on networks you trust, or over a tunnel.
//! * A way to upload, delete or rename files.
//! * A resumable or checksummed transfer tool.
//!
//! ## 🧰 Getting Started
//!
//! On the machine with the files:
//! ```text
//! rfa --server --root /srv/files
//! ```
//! On the machine that wants them:
//! ```text
//! rfa --download-dir ~/Downloads fileserver
//! ls
//! cd photos
//! get beach.jpg
//! quit
//! ```
//!
//! Run `rfa --help` for the full list of options.
//!
//! ## Configuration
//!
//! Most options can also be set in a configuration file or the environment. See [config] for details.
//!
//! #### MSRV policy
//!
//! As this is an application crate, the MSRV is not guaranteed to remain stable.
//! The MSRV may be upgraded from time to time to take advantage of new language features.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub(crate) mod cli;
pub use cli::cli as main;
pub use cli::styles;

pub mod client;
pub use client::{ClientSession, Parameters, TextSink};

pub mod config;
pub use config::Configuration;

pub mod protocol;
pub mod server;
pub mod util;
