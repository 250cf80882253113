//! Tag-triggered music player for physical song blocks.
//!
//! MusicBlocks pairs NFC-tagged wooden blocks with songs: place a block on
//! the reader and its song plays, take it off and the song stops. A daemon
//! polls the reader and drives an external `mpg123` process; management
//! subcommands maintain the block database and the song library.
//!
//! Core modules:
//! - [`controller`] - Tag-to-playback state machine (the daemon core)
//! - [`player`] - External player subprocess control
//! - [`reader`] - NFC reader polling
//! - [`db`] - Block database and play history
//!
//! ### Supporting Modules
//!
//! - [`config`] - Data directory and runtime settings
//! - [`manage`] - Block registration and reports
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use musicblocks::{config, controller, db, player, reader};
//! use std::sync::atomic::AtomicBool;
//! use std::time::Duration;
//!
//! let settings = config::Settings::load()?;
//! let conn = db::open(&config::get_db_path()?)?;
//!
//! let nfc = reader::NfcReader::new(&settings.reader_bin);
//! nfc.probe()?;
//! let player = player::Mpg123Player::spawn(&settings.player_bin)?;
//!
//! let mut controller = controller::Controller::new(
//!     nfc,
//!     player,
//!     conn,
//!     settings.music_dir.clone(),
//!     Duration::from_secs(settings.poll_interval_secs),
//! );
//!
//! static SHUTDOWN: AtomicBool = AtomicBool::new(false);
//! controller.run(&SHUTDOWN)?; // Runs until a shutdown signal
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Behavior
//!
//! The controller applies one transition per poll cycle:
//!
//! - A registered tag appearing starts its song and opens a play-history
//!   entry.
//! - The same tag re-read on later cycles changes nothing; the track keeps
//!   playing.
//! - The tag disappearing (or a different tag appearing) stops the track
//!   and closes the history entry with the played duration.
//! - Unregistered tags and missing song files are reported and skipped;
//!   the daemon keeps polling.
//!
//! ## Error Handling
//!
//! All public functions return `Result<T, anyhow::Error>`. Startup errors
//! (missing database, unreachable reader, missing player binary) are fatal
//! with actionable messages; per-cycle conditions ("no tag", "unknown tag",
//! "file missing") are expected states, and history bookkeeping failures
//! are logged without interrupting playback control.

pub mod cli;
pub mod completion;
pub mod config;
pub mod controller;
pub mod db;
pub mod manage;
pub mod player;
pub mod reader;
