//! # Integration Tests for MusicBlocks
//!
//! End-to-end tests that exercise the management path and the daemon core
//! together against a real (temporary) block database, driving the
//! controller with scripted poll results instead of reader hardware.

use anyhow::Result;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use tempfile::TempDir;

use musicblocks::config::Settings;
use musicblocks::controller::{Controller, CycleOutcome};
use musicblocks::db;
use musicblocks::manage;
use musicblocks::player::PlayerControl;
use musicblocks::reader::{TagPoll, TagReader};

#[derive(Debug, Clone, PartialEq, Eq)]
enum PlayerCall {
    Play(PathBuf),
    Stop,
    Quit,
}

/// Player double sharing its call log with the test through an Rc handle,
/// since the controller takes ownership of the player.
struct SharedPlayer {
    calls: Rc<RefCell<Vec<PlayerCall>>>,
    playing: bool,
}

impl SharedPlayer {
    fn new() -> (Self, Rc<RefCell<Vec<PlayerCall>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                calls: Rc::clone(&calls),
                playing: false,
            },
            calls,
        )
    }
}

impl PlayerControl for SharedPlayer {
    fn play(&mut self, path: &Path) -> Result<bool> {
        if !path.is_file() {
            return Ok(false);
        }
        self.calls.borrow_mut().push(PlayerCall::Play(path.to_path_buf()));
        self.playing = true;
        Ok(true)
    }

    fn stop(&mut self) -> Result<bool> {
        if !self.playing {
            return Ok(false);
        }
        self.calls.borrow_mut().push(PlayerCall::Stop);
        self.playing = false;
        Ok(true)
    }

    fn set_volume(&mut self, _percent: f64) -> Result<()> {
        Ok(())
    }

    fn quit(&mut self) -> Result<()> {
        self.calls.borrow_mut().push(PlayerCall::Quit);
        self.playing = false;
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}

struct ScriptedReader {
    polls: VecDeque<TagPoll>,
}

impl TagReader for ScriptedReader {
    fn poll(&mut self) -> Result<TagPoll> {
        Ok(self.polls.pop_front().unwrap_or(TagPoll::Absent))
    }
}

fn present(uid: &str) -> TagPoll {
    TagPoll::Present(uid.to_string())
}

/// Register two blocks through the real management path, exactly as an
/// operator would (minus the hardware tag read).
fn setup_library(temp_dir: &TempDir) -> (Settings, PathBuf) {
    let settings = Settings {
        music_dir: temp_dir.path().join("music"),
        ..Settings::default()
    };
    let db_path = temp_dir.path().join("MusicBlocks.db");

    let song1 = temp_dir.path().join("song1.mp3");
    let song2 = temp_dir.path().join("song2.mp3");
    fs::write(&song1, b"audio one").unwrap();
    fs::write(&song2, b"audio two").unwrap();

    manage::add(
        &settings,
        &db_path,
        1,
        &song1,
        Some("Song One".to_string()),
        Some("A1B2".to_string()),
    )
    .unwrap();
    manage::add(
        &settings,
        &db_path,
        2,
        &song2,
        Some("Song Two".to_string()),
        Some("C3D4".to_string()),
    )
    .unwrap();

    (settings, db_path)
}

fn make_controller(
    settings: &Settings,
    db_path: &Path,
) -> (
    Controller<ScriptedReader, SharedPlayer>,
    Rc<RefCell<Vec<PlayerCall>>>,
) {
    let (player, calls) = SharedPlayer::new();
    let conn = db::open(db_path).unwrap();
    let controller = Controller::new(
        ScriptedReader {
            polls: VecDeque::new(),
        },
        player,
        conn,
        settings.music_dir.clone(),
        Duration::from_secs(1),
    );
    (controller, calls)
}

#[test]
fn test_registered_blocks_drive_playback_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let (settings, db_path) = setup_library(&temp_dir);
    let (mut controller, calls) = make_controller(&settings, &db_path);

    // Place block 1, let it sit a cycle, lift it, place block 2.
    assert_eq!(
        controller.step(present("A1B2")).unwrap(),
        CycleOutcome::Started("Song One".to_string())
    );
    assert_eq!(
        controller.step(present("A1B2")).unwrap(),
        CycleOutcome::StillPlaying
    );
    assert_eq!(
        controller.step(TagPoll::Absent).unwrap(),
        CycleOutcome::Stopped("Song One".to_string())
    );
    assert_eq!(
        controller.step(present("C3D4")).unwrap(),
        CycleOutcome::Started("Song Two".to_string())
    );
    controller.shutdown().unwrap();

    assert_eq!(
        *calls.borrow(),
        vec![
            PlayerCall::Play(settings.music_dir.join("song1.mp3")),
            PlayerCall::Stop,
            PlayerCall::Play(settings.music_dir.join("song2.mp3")),
            PlayerCall::Stop,
            PlayerCall::Quit,
        ]
    );

    // Two closed segments, newest first.
    let conn = db::open(&db_path).unwrap();
    let entries = db::list_history(&conn, None).unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.seconds_played.is_some()));
}

#[test]
fn test_unregistered_tag_is_inert() {
    let temp_dir = TempDir::new().unwrap();
    let (settings, db_path) = setup_library(&temp_dir);
    let (mut controller, calls) = make_controller(&settings, &db_path);

    assert_eq!(
        controller.step(present("FFFF")).unwrap(),
        CycleOutcome::UnknownTag("FFFF".to_string())
    );
    assert_eq!(controller.step(present("FFFF")).unwrap(), CycleOutcome::Idle);

    assert!(calls.borrow().is_empty());
    let conn = db::open(&db_path).unwrap();
    assert!(db::list_history(&conn, None).unwrap().is_empty());
}

#[test]
fn test_deleted_song_file_is_skipped_not_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let (settings, db_path) = setup_library(&temp_dir);

    // Pull the file out from under the registration.
    fs::remove_file(settings.music_dir.join("song1.mp3")).unwrap();

    let (mut controller, calls) = make_controller(&settings, &db_path);
    assert_eq!(
        controller.step(present("A1B2")).unwrap(),
        CycleOutcome::FileMissing("Song One".to_string())
    );

    // Still pollable, and the intact block still works.
    assert_eq!(
        controller.step(present("C3D4")).unwrap(),
        CycleOutcome::Started("Song Two".to_string())
    );

    assert_eq!(
        *calls.borrow(),
        vec![PlayerCall::Play(settings.music_dir.join("song2.mp3"))]
    );
}

#[test]
fn test_replace_takes_effect_for_the_daemon() {
    let temp_dir = TempDir::new().unwrap();
    let (settings, db_path) = setup_library(&temp_dir);

    let new_song = temp_dir.path().join("song3.mp3");
    fs::write(&new_song, b"audio three").unwrap();
    manage::replace(
        &settings,
        &db_path,
        1,
        &new_song,
        Some("Song Three".to_string()),
    )
    .unwrap();

    let (mut controller, calls) = make_controller(&settings, &db_path);
    assert_eq!(
        controller.step(present("A1B2")).unwrap(),
        CycleOutcome::Started("Song Three".to_string())
    );
    assert_eq!(
        *calls.borrow(),
        vec![PlayerCall::Play(settings.music_dir.join("song3.mp3"))]
    );
}

#[test]
fn test_removed_block_no_longer_plays() {
    let temp_dir = TempDir::new().unwrap();
    let (settings, db_path) = setup_library(&temp_dir);

    manage::remove(&settings, &db_path, 1).unwrap();

    let (mut controller, calls) = make_controller(&settings, &db_path);
    assert_eq!(
        controller.step(present("A1B2")).unwrap(),
        CycleOutcome::UnknownTag("A1B2".to_string())
    );
    assert!(calls.borrow().is_empty());
}

/// Known limitation: a daemon killed mid-song leaves its history entry open
/// (no recorded length), and a restarted daemon does not reconcile or close
/// such stale entries. This test pins that behavior down.
#[test]
fn test_ungraceful_kill_leaves_open_history_entry_unreconciled() {
    let temp_dir = TempDir::new().unwrap();
    let (settings, db_path) = setup_library(&temp_dir);

    // First daemon session starts a song and is dropped without its
    // teardown path, as a SIGKILL would.
    {
        let (mut controller, _calls) = make_controller(&settings, &db_path);
        controller.step(present("A1B2")).unwrap();
        // No shutdown(); the controller is just dropped.
    }

    let conn = db::open(&db_path).unwrap();
    let entries = db::list_history(&conn, None).unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].seconds_played.is_none());
    drop(conn);

    // Second session: the stale entry is untouched, and a fresh segment
    // opens and closes independently of it.
    let (mut controller, _calls) = make_controller(&settings, &db_path);
    controller.step(present("A1B2")).unwrap();
    controller.step(TagPoll::Absent).unwrap();
    controller.shutdown().unwrap();

    let conn = db::open(&db_path).unwrap();
    let entries = db::list_history(&conn, None).unwrap();
    assert_eq!(entries.len(), 2);

    let open_count = entries
        .iter()
        .filter(|e| e.seconds_played.is_none())
        .count();
    assert_eq!(open_count, 1, "stale entry stays open, new entry was closed");
}
