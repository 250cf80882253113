//! # Block Management Module
//!
//! Implements the operator-facing subcommands: registering, replacing and
//! removing blocks, plus the status and history reports. These are plain
//! data-entry operations over the block database; the daemon never writes
//! `blocks`/`songs` and this module never touches playback.
//!
//! Registered song files are copied into the managed music directory under
//! their bare file name, so the daemon only ever resolves files inside that
//! one directory.

use anyhow::{bail, Context, Result};
use chrono::{Local, TimeZone};
use log::{info, warn};
use path_absolutize::Absolutize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::db;
use crate::reader::{self, NfcReader};

/// Copy a song file into the music directory. Returns the destination path.
fn copy_into_library(source: &Path, music_dir: &Path, file_name: &str) -> Result<PathBuf> {
    fs::create_dir_all(music_dir).with_context(|| {
        format!("Failed to create music directory at {}", music_dir.display())
    })?;

    let dest = music_dir.join(file_name);
    fs::copy(source, &dest).with_context(|| {
        format!(
            "Failed to copy {} into music library at {}",
            source.display(),
            dest.display()
        )
    })?;
    Ok(dest)
}

/// Delete a song file from the music directory. Best-effort: the store is
/// already consistent, a stale file is only wasted space.
fn remove_from_library(music_dir: &Path, file_name: &str) {
    let path = music_dir.join(file_name);
    if let Err(e) = fs::remove_file(&path) {
        warn!("Could not remove {}: {e}", path.display());
    }
}

/// Validate an operator-supplied song path and split it into (absolute
/// source, bare file name, default title).
fn resolve_source(file: &Path) -> Result<(PathBuf, String, String)> {
    let source = file
        .absolutize()
        .with_context(|| format!("Failed to resolve path {}", file.display()))?
        .into_owned();

    if !source.is_file() {
        bail!("File not found: {}", source.display());
    }

    let file_name = source
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Invalid file name in {}", source.display()))?
        .to_string();
    let title = source
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or(&file_name)
        .to_string();

    Ok((source, file_name, title))
}

/// Register a new block: pair a tag with a song and copy the song into the
/// library. When no tag UID is given, the operator is prompted to place the
/// tag on the reader.
pub fn add(
    settings: &Settings,
    db_path: &Path,
    number: i64,
    file: &Path,
    title: Option<String>,
    tag: Option<String>,
) -> Result<()> {
    let (source, file_name, default_title) = resolve_source(file)?;
    let title = title.unwrap_or(default_title);

    let tag_id = match tag {
        Some(raw) => {
            let uid = reader::normalize_uid(&raw);
            if uid.is_empty() {
                bail!("'{raw}' is not a valid tag UID (expected hex digits)");
            }
            uid
        }
        None => {
            let mut nfc = NfcReader::new(&settings.reader_bin);
            nfc.probe()?;
            match reader::capture_tag(&mut nfc)? {
                Some(uid) => uid,
                None => bail!("No tag detected. Place a tag on the reader and try again."),
            }
        }
    };

    let mut conn = db::init(db_path)?;
    db::add_block(&mut conn, number, &tag_id, &title, &file_name)?;

    // The row is committed; if the copy fails, roll the registration back
    // so the store never points at a file that was never installed.
    if let Err(e) = copy_into_library(&source, &settings.music_dir, &file_name) {
        if let Err(undo) = db::remove_block(&mut conn, number) {
            warn!("Failed to undo registration of block {number}: {undo:#}");
        }
        return Err(e);
    }

    info!("Registered block {number} (tag {tag_id}) -> '{title}'");
    println!("Block {number} added: '{title}' ({file_name})");
    Ok(())
}

/// Swap the song behind an existing block for a new file, removing the old
/// file from the library.
pub fn replace(
    settings: &Settings,
    db_path: &Path,
    number: i64,
    file: &Path,
    title: Option<String>,
) -> Result<()> {
    let (source, file_name, default_title) = resolve_source(file)?;
    let title = title.unwrap_or(default_title);

    let mut conn = db::init(db_path)?;

    // Look the block up before copying anything, so a bad block number
    // leaves the library untouched.
    let Some(block) = db::find_block_by_number(&conn, number)? else {
        bail!("Block {number} not found");
    };
    let old = db::song_for_block(&conn, &block)?;

    copy_into_library(&source, &settings.music_dir, &file_name)?;
    db::replace_block_song(&mut conn, number, &title, &file_name)?;

    if old.file_name != file_name {
        remove_from_library(&settings.music_dir, &old.file_name);
    }

    info!("Replaced song on block {number} -> '{title}'");
    println!("Block {number} updated: '{title}' ({file_name})");
    Ok(())
}

/// Remove a block registration and its song file.
pub fn remove(settings: &Settings, db_path: &Path, number: i64) -> Result<()> {
    let mut conn = db::open(db_path)?;
    let (_block, song) = db::remove_block(&mut conn, number)?;

    remove_from_library(&settings.music_dir, &song.file_name);

    info!("Removed block {number} ('{}')", song.title);
    println!("Block {number} removed: '{}' ({})", song.title, song.file_name);
    Ok(())
}

/// List all registered blocks.
pub fn status(db_path: &Path) -> Result<()> {
    let conn = db::open(db_path)?;
    let blocks = db::list_blocks(&conn)?;

    if blocks.is_empty() {
        println!("No blocks registered. Run 'musicblocks add' to register one.");
        return Ok(());
    }

    println!("{:>5}  {:<10}  {:<30}  {}", "Block", "Tag", "Title", "File");
    for (block, song) in &blocks {
        println!(
            "{:>5}  {:<10}  {:<30}  {}",
            block.number,
            block.tag_id.as_deref().unwrap_or("-"),
            song.title,
            song.file_name
        );
    }
    println!("{} block(s) registered", blocks.len());
    Ok(())
}

fn format_seconds(seconds: f64) -> String {
    let total = seconds.round() as i64;
    if total >= 60 {
        format!("{}m {:02}s", total / 60, total % 60)
    } else {
        format!("{total}s")
    }
}

fn format_started_at(timestamp: i64) -> String {
    match Local.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => format!("@{timestamp}"),
    }
}

/// List play history, most recent first. Entries without a recorded length
/// were interrupted ungracefully (daemon killed mid-song) and stay open
/// forever.
pub fn history(db_path: &Path, limit: Option<u32>) -> Result<()> {
    let conn = db::open(db_path)?;
    let entries = db::list_history(&conn, limit)?;

    if entries.is_empty() {
        println!("No play history yet.");
        return Ok(());
    }

    for entry in &entries {
        let played = entry
            .seconds_played
            .map_or_else(|| "interrupted".to_string(), format_seconds);
        println!(
            "{}  {:<30}  {}",
            format_started_at(entry.started_at),
            entry.song_title,
            played
        );
    }
    Ok(())
}
