//! # Command-Line Interface Module
//!
//! This module defines the command-line interface for MusicBlocks using Clap
//! derive macros. It provides a type-safe way to parse command-line
//! arguments and route them to appropriate functionality.
//!
//! ## Commands
//!
//! - `run`: Start the tag-polling playback daemon
//! - `add`: Register a block (tag + song)
//! - `replace`: Swap the song behind an existing block
//! - `remove`: Delete a block registration
//! - `status`: List registered blocks
//! - `history`: Show play history
//!
//! ## Examples
//!
//! ```bash
//! musicblocks add --block 4 --file ~/Downloads/song.mp3 --title "Song One"
//! musicblocks run --volume 80
//! musicblocks history --limit 20
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
#[derive(Parser)]
#[command(name = "musicblocks")]
#[command(about = "MusicBlocks - play songs by placing tagged blocks on an NFC reader")]
#[command(version)]
pub struct Args {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Enumeration of all available subcommands.
///
/// Command arguments are embedded directly in the enum variants for type
/// safety and automatic validation.
#[derive(Subcommand)]
pub enum Command {
    /// Run the playback daemon
    ///
    /// Polls the NFC reader once a second. Placing a registered block on the
    /// reader plays its song; removing it stops playback. Runs until
    /// interrupted (SIGINT/SIGTERM), shutting the player down cleanly.
    Run {
        /// Startup volume in percent (0-100, clamped)
        #[arg(long)]
        volume: Option<f64>,

        /// Seconds between reader polls
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Register a new block
    ///
    /// Copies the song file into the managed music library and pairs it with
    /// a tag. Without --tag, you will be prompted to place the tag on the
    /// reader.
    Add {
        /// Number printed on the physical block
        #[arg(long)]
        block: i64,

        /// Path of the song file to register
        #[arg(long, value_hint = clap::ValueHint::FilePath)]
        file: PathBuf,

        /// Song title (defaults to the file name without extension)
        #[arg(long)]
        title: Option<String>,

        /// Tag UID in hex (read from the hardware when omitted)
        #[arg(long)]
        tag: Option<String>,
    },

    /// Replace the song behind an existing block
    ///
    /// The block keeps its number and tag; the old song file is removed from
    /// the library after the new one is installed.
    Replace {
        /// Number printed on the physical block
        #[arg(long)]
        block: i64,

        /// Path of the new song file
        #[arg(long, value_hint = clap::ValueHint::FilePath)]
        file: PathBuf,

        /// Song title (defaults to the file name without extension)
        #[arg(long)]
        title: Option<String>,
    },

    /// Remove a block registration
    ///
    /// Deletes the block and its song from the database and removes the song
    /// file from the library. Play history is kept.
    Remove {
        /// Number printed on the physical block
        #[arg(long)]
        block: i64,
    },

    /// List registered blocks
    Status,

    /// Show play history, most recent first
    History {
        /// Maximum number of entries to show
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Generate shell completions
    ///
    /// Usage: musicblocks completion bash > ~/.local/share/bash-completion/completions/musicblocks
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}
