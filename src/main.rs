//! # MusicBlocks - Tag-Triggered Music Player
//!
//! MusicBlocks plays songs when NFC-tagged physical blocks are placed on a
//! reader. The daemon (`musicblocks run`) polls the reader and controls an
//! external `mpg123` process; the remaining subcommands manage the block
//! database.
//!
//! ## Architecture
//!
//! - `cli`: Command-line interface definitions
//! - `controller`: Tag-to-playback state machine (the daemon core)
//! - `player`: mpg123 subprocess control
//! - `reader`: NFC reader polling via nfc-list
//! - `db`: SQLite block database and play history
//! - `manage`: Block registration and reports
//! - `config`: Data directory and runtime settings
//!
//! ## Usage
//!
//! ```bash
//! # Register block number 4 with a song (reads the tag from the hardware)
//! musicblocks add --block 4 --file ~/Downloads/song.mp3 --title "Song One"
//!
//! # Start the daemon
//! musicblocks run
//!
//! # Inspect
//! musicblocks status
//! musicblocks history --limit 20
//! ```

mod cli;
mod completion;
mod config;
mod controller;
mod db;
mod manage;
mod player;
mod reader;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::controller::Controller;
use crate::player::{Mpg123Player, PlayerControl};
use crate::reader::NfcReader;

/// Set by the signal handler, checked by the controller loop each cycle so
/// the teardown path (stop playback, close history, quit the player) runs
/// on SIGINT/SIGTERM instead of the process dying mid-song.
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn request_shutdown(_signal: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() {
    let handler = request_shutdown as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }
}

/// Start the playback daemon: open the store, probe the reader, spawn the
/// player, then hand control to the polling loop.
///
/// Each startup dependency failure is fatal and explains what the operator
/// has to fix before the daemon can do anything useful.
fn run_daemon(volume: Option<f64>, interval: Option<u64>) -> Result<()> {
    let settings = config::Settings::load()?;
    let db_path = config::get_db_path()?;

    let conn = db::open(&db_path).map_err(|e| {
        eprintln!("Cannot start: block database is not usable.");
        eprintln!("  {e}");
        eprintln!();
        eprintln!("To fix this:");
        eprintln!("  1. Register at least one block: musicblocks add --block 1 --file <song>");
        eprintln!("  2. Check permissions on {}", db_path.display());
        e
    })?;

    let nfc = NfcReader::new(&settings.reader_bin);
    nfc.probe().map_err(|e| {
        eprintln!("Cannot start: NFC reader is not usable.");
        eprintln!("  {e}");
        eprintln!();
        eprintln!("To fix this:");
        eprintln!("  1. Install libnfc tools (provides {})", settings.reader_bin);
        eprintln!("  2. Connect the reader and check device permissions");
        e
    })?;

    let mut player = Mpg123Player::spawn(&settings.player_bin).map_err(|e| {
        eprintln!("Cannot start: audio player is not usable.");
        eprintln!("  {e}");
        e
    })?;
    player
        .set_volume(volume.unwrap_or(settings.volume))
        .context("Failed to set startup volume")?;

    install_signal_handlers();

    let poll_interval = Duration::from_secs(interval.unwrap_or(settings.poll_interval_secs).max(1));
    let mut controller = Controller::new(
        nfc,
        player,
        conn,
        settings.music_dir.clone(),
        poll_interval,
    );

    info!("MusicBlocks daemon starting");
    controller.run(&SHUTDOWN)
}

/// Main entry point for the MusicBlocks application.
///
/// Initializes logging, parses command-line arguments, and routes commands
/// to the appropriate module functions.
///
/// # Logging
///
/// Initializes environment logger which can be controlled via `RUST_LOG`:
/// - `RUST_LOG=debug musicblocks run` - Enable debug logging
/// - `RUST_LOG=musicblocks::controller=trace musicblocks run` - Module-specific logging
fn main() -> Result<()> {
    // Initialize environment logger for debugging and monitoring
    env_logger::init();

    // Parse command-line arguments using Clap derive macros
    let args = cli::Args::parse();

    match args.command {
        cli::Command::Run { volume, interval } => {
            run_daemon(volume, interval)?;
        }
        cli::Command::Add {
            block,
            file,
            title,
            tag,
        } => {
            let settings = config::Settings::load()?;
            let db_path = config::get_db_path()?;
            manage::add(&settings, &db_path, block, &file, title, tag)?;
        }
        cli::Command::Replace { block, file, title } => {
            let settings = config::Settings::load()?;
            let db_path = config::get_db_path()?;
            manage::replace(&settings, &db_path, block, &file, title)?;
        }
        cli::Command::Remove { block } => {
            let settings = config::Settings::load()?;
            let db_path = config::get_db_path()?;
            manage::remove(&settings, &db_path, block)?;
        }
        cli::Command::Status => {
            manage::status(&config::get_db_path()?)?;
        }
        cli::Command::History { limit } => {
            manage::history(&config::get_db_path()?, limit)?;
        }
        cli::Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(completion::shell_to_completion_shell(&shell), &mut cmd);
        }
    }

    Ok(())
}
