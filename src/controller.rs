//! # Tag-Playback Controller
//!
//! The daemon core: a polling loop that reconciles the physically-present
//! tag with the currently-playing song. Each cycle reads the tag, diffs it
//! against the previously-known tag, and drives the playback engine and the
//! play-history log through the resulting transition.
//!
//! ## State machine
//!
//! Session state is two values owned by the controller (never globals):
//! the last-seen tag UID and the open playback segment, if any. Per cycle:
//!
//! - `Absent` while playing: stop, close the history entry, forget the tag.
//! - `Absent` while idle: nothing.
//! - Same tag as last cycle: nothing. Re-reading the tag that is sitting on
//!   the reader must not restart the track.
//! - A different tag: stop whatever plays first (never two tracks), then
//!   look the tag up. Unknown tags and missing files leave playback idle but
//!   are remembered as last-seen so the lookup is not repeated every second.
//!
//! Each cycle reports a [`CycleOutcome`] so tests assert on transitions
//! rather than on log output.

use anyhow::{Context, Result};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::db;
use crate::player::PlayerControl;
use crate::reader::{TagPoll, TagReader};

/// What a single poll cycle did. `Started`/`Stopped` carry the song title
/// for the status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No tag, nothing playing.
    Idle,
    /// The tracked tag is still on the reader; playback continues untouched.
    StillPlaying,
    Started(String),
    Stopped(String),
    /// Tag is not registered to any block.
    UnknownTag(String),
    /// Tag is registered but its song file is gone from disk.
    FileMissing(String),
}

/// The in-flight playback segment.
struct OpenPlayback {
    /// Row id of the open history entry. None when the history insert
    /// failed; bookkeeping is best-effort and never blocks playback.
    history_id: Option<i64>,
    title: String,
    started: Instant,
}

/// Ties reader, store and player together for the life of the daemon
/// process.
pub struct Controller<R: TagReader, P: PlayerControl> {
    reader: R,
    player: P,
    conn: rusqlite::Connection,
    music_dir: PathBuf,
    poll_interval: Duration,
    last_tag: Option<String>,
    playing: Option<OpenPlayback>,
}

impl<R: TagReader, P: PlayerControl> Controller<R, P> {
    pub fn new(
        reader: R,
        player: P,
        conn: rusqlite::Connection,
        music_dir: PathBuf,
        poll_interval: Duration,
    ) -> Self {
        Self {
            reader,
            player,
            conn,
            music_dir,
            poll_interval,
            last_tag: None,
            playing: None,
        }
    }

    /// Run one transition for the given poll result.
    ///
    /// # Errors
    ///
    /// Store lookup failures and player I/O failures propagate; both mean
    /// the daemon cannot keep functioning. History bookkeeping failures are
    /// only logged, and playback control continues.
    pub fn step(&mut self, poll: TagPoll) -> Result<CycleOutcome> {
        match poll {
            TagPoll::Absent => {
                self.last_tag = None;
                match self.stop_playback() {
                    Some(title) => {
                        println!("■ Stopped: {title}");
                        Ok(CycleOutcome::Stopped(title))
                    }
                    None => Ok(CycleOutcome::Idle),
                }
            }
            TagPoll::Present(uid) => {
                if self.last_tag.as_deref() == Some(uid.as_str()) {
                    return Ok(if self.playing.is_some() {
                        CycleOutcome::StillPlaying
                    } else {
                        CycleOutcome::Idle
                    });
                }
                self.handle_new_tag(uid)
            }
        }
    }

    /// A tag differing from last cycle's appeared: swap playback over to it.
    fn handle_new_tag(&mut self, uid: String) -> Result<CycleOutcome> {
        // Stop-before-start: the old track's segment ends before the new
        // tag is even looked up.
        if let Some(title) = self.stop_playback() {
            println!("■ Stopped: {title}");
        }

        // Remember the tag whether or not it plays, so an unregistered or
        // broken block is not re-queried every cycle it sits on the reader.
        self.last_tag = Some(uid.clone());

        let block = db::find_block_by_tag(&self.conn, &uid)
            .context("Block lookup failed")?;
        let Some(block) = block else {
            info!("Tag {uid} is not registered to any block");
            println!("✗ Unknown tag: {uid}");
            return Ok(CycleOutcome::UnknownTag(uid));
        };

        let song = db::song_for_block(&self.conn, &block)?;
        let path = self.music_dir.join(&song.file_name);

        if !self.player.play(&path)? {
            warn!(
                "Cannot play '{}': {} is missing or unreadable",
                song.title,
                path.display()
            );
            println!("✗ Cannot play '{}': file {} is missing", song.title, path.display());
            return Ok(CycleOutcome::FileMissing(song.title));
        }

        let history_id = match db::open_history(
            &self.conn,
            &song.title,
            chrono::Utc::now().timestamp(),
        ) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Failed to open play history entry: {e:#}");
                None
            }
        };

        self.playing = Some(OpenPlayback {
            history_id,
            title: song.title.clone(),
            started: Instant::now(),
        });
        println!("♫ Playing: {}", song.title);
        Ok(CycleOutcome::Started(song.title))
    }

    /// Stop the current playback segment, if any, and close its history
    /// entry. Player and history trouble is logged, never fatal: the
    /// segment is over either way.
    fn stop_playback(&mut self) -> Option<String> {
        let open = self.playing.take()?;

        if let Err(e) = self.player.stop() {
            warn!("Player stop failed: {e:#}");
        }

        if let Some(history_id) = open.history_id {
            let seconds = open.started.elapsed().as_secs_f64();
            if let Err(e) = db::close_history(&self.conn, history_id, seconds) {
                warn!("Failed to close play history entry: {e:#}");
            }
        }

        Some(open.title)
    }

    /// Poll/transition/sleep until `shutdown` is set, then tear down.
    ///
    /// A reader error mid-run is logged and the cycle skipped. No
    /// transition happens on a failed read, so one flaky poll never stops a
    /// playing track.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        info!(
            "Controller started (poll interval {}s)",
            self.poll_interval.as_secs_f64()
        );

        while !shutdown.load(Ordering::SeqCst) {
            match self.reader.poll() {
                Ok(poll) => {
                    self.step(poll)?;
                }
                Err(e) => warn!("Tag poll failed: {e:#}"),
            }
            self.sleep_interval(shutdown);
        }

        info!("Shutdown requested");
        self.shutdown()
    }

    /// Teardown path, also run on signal-induced exit: close out whatever
    /// is playing (using "now" as the segment end) and quit the player.
    pub fn shutdown(&mut self) -> Result<()> {
        if let Some(title) = self.stop_playback() {
            println!("■ Stopped: {title}");
        }
        self.player.quit()
    }

    /// Sleep the poll interval in short slices so a shutdown signal is
    /// honored promptly instead of after a full interval.
    fn sleep_interval(&self, shutdown: &AtomicBool) {
        let mut remaining = self.poll_interval;
        while remaining > Duration::ZERO && !shutdown.load(Ordering::SeqCst) {
            let slice = remaining.min(Duration::from_millis(100));
            std::thread::sleep(slice);
            remaining -= slice;
        }
    }
}
