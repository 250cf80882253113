//! # Block Database Module
//!
//! SQLite-backed catalog mapping physical blocks to songs, plus the play
//! history log. The daemon only reads `blocks`/`songs` and appends to
//! `play_history`; the management subcommands are the sole writers of
//! `blocks`/`songs`.
//!
//! Both processes can have the database open at the same time, so every
//! connection runs in WAL mode with a busy timeout. Mutations are wrapped in
//! transactions so a failed `add`/`replace`/`remove` leaves no partial rows.

use anyhow::{bail, Context, Result};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

/// A registered physical block: one tag, one song.
#[derive(Debug, Clone)]
pub struct Block {
    pub id: i64,
    /// Operator-assigned number printed on the physical block.
    pub number: i64,
    /// Hardware UID of the paired NFC tag. Unset until a tag is assigned.
    pub tag_id: Option<String>,
    pub song_id: i64,
}

/// A playable song backed by a file in the managed music directory.
#[derive(Debug, Clone)]
pub struct Song {
    pub id: i64,
    pub title: String,
    /// Bare file name inside the music directory.
    pub file_name: String,
}

/// One playback segment. `seconds_played` stays NULL while the segment is
/// open, and forever if the daemon was killed before closing it.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub id: i64,
    pub song_title: String,
    /// Unix timestamp of playback start.
    pub started_at: i64,
    pub seconds_played: Option<f64>,
}

fn configure(conn: &Connection) -> Result<()> {
    // WAL + busy timeout: the management tool and the daemon share this file
    // from separate processes.
    conn.query_row("PRAGMA journal_mode = WAL", [], |_row| Ok(()))
        .context("Failed to enable WAL journal mode")?;
    conn.busy_timeout(Duration::from_secs(5))
        .context("Failed to set busy timeout")?;
    conn.execute("PRAGMA foreign_keys = ON", [])
        .context("Failed to enable foreign key enforcement")?;
    Ok(())
}

/// Open an existing block database. Refuses to create one: a missing
/// database means no blocks were ever registered, which the daemon cannot do
/// anything useful with.
pub fn open(db_path: &Path) -> Result<Connection> {
    if !db_path.exists() {
        bail!(
            "Block database not found at {}.\nRun 'musicblocks add' to create it and register a first block.",
            db_path.display()
        );
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open block database at {}", db_path.display()))?;
    configure(&conn)?;
    Ok(conn)
}

/// Open the block database, creating the file and schema if needed. Used by
/// the management subcommands.
pub fn init(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open block database at {}", db_path.display()))?;
    configure(&conn)?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS songs (
            id        INTEGER PRIMARY KEY,
            title     TEXT NOT NULL,
            file_name TEXT NOT NULL UNIQUE
        );
        CREATE TABLE IF NOT EXISTS blocks (
            id      INTEGER PRIMARY KEY,
            number  INTEGER NOT NULL UNIQUE,
            tag_id  TEXT UNIQUE,
            song_id INTEGER NOT NULL REFERENCES songs (id)
        );
        CREATE TABLE IF NOT EXISTS play_history (
            id             INTEGER PRIMARY KEY,
            song_title     TEXT NOT NULL,
            started_at     INTEGER NOT NULL,
            seconds_played REAL
        );",
    )
    .context("Failed to create block database schema")?;

    Ok(conn)
}

fn block_from_row(row: &rusqlite::Row) -> rusqlite::Result<Block> {
    Ok(Block {
        id: row.get(0)?,
        number: row.get(1)?,
        tag_id: row.get(2)?,
        song_id: row.get(3)?,
    })
}

/// Look up the block paired with a tag UID. Exact match only.
pub fn find_block_by_tag(conn: &Connection, tag_id: &str) -> Result<Option<Block>> {
    conn.query_row(
        "SELECT id, number, tag_id, song_id FROM blocks WHERE tag_id = ?1",
        [tag_id],
        block_from_row,
    )
    .optional()
    .with_context(|| format!("Failed to query block for tag {tag_id}"))
}

/// Look up a block by its printed number.
pub fn find_block_by_number(conn: &Connection, number: i64) -> Result<Option<Block>> {
    conn.query_row(
        "SELECT id, number, tag_id, song_id FROM blocks WHERE number = ?1",
        [number],
        block_from_row,
    )
    .optional()
    .with_context(|| format!("Failed to query block {number}"))
}

/// Resolve the song behind a block. A block without its song is a broken
/// store (the management tool writes both in one transaction), so this is a
/// hard error rather than a "not found".
pub fn song_for_block(conn: &Connection, block: &Block) -> Result<Song> {
    let song = conn
        .query_row(
            "SELECT id, title, file_name FROM songs WHERE id = ?1",
            [block.song_id],
            |row| {
                Ok(Song {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    file_name: row.get(2)?,
                })
            },
        )
        .optional()
        .with_context(|| format!("Failed to query song for block {}", block.number))?;

    match song {
        Some(song) => Ok(song),
        None => bail!(
            "Data integrity error: block {} references missing song id {}",
            block.number,
            block.song_id
        ),
    }
}

/// Open a play-history entry at playback start. Returns the row id so the
/// entry can be closed when playback ends.
pub fn open_history(conn: &Connection, song_title: &str, started_at: i64) -> Result<i64> {
    conn.execute(
        "INSERT INTO play_history (song_title, started_at) VALUES (?1, ?2)",
        params![song_title, started_at],
    )
    .with_context(|| format!("Failed to record playback start for '{song_title}'"))?;

    Ok(conn.last_insert_rowid())
}

/// Close a play-history entry with the seconds actually played. Closed
/// entries are never touched again.
pub fn close_history(conn: &Connection, history_id: i64, seconds_played: f64) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE play_history SET seconds_played = ?1 WHERE id = ?2",
            params![seconds_played, history_id],
        )
        .with_context(|| format!("Failed to record playback length for entry {history_id}"))?;

    if updated != 1 {
        bail!("Play history entry {history_id} vanished before it could be closed");
    }
    Ok(())
}

/// Register a new block and its song in one transaction.
///
/// Duplicate block numbers and duplicate tag UIDs are reported with distinct
/// messages; in either case the database is left unchanged.
pub fn add_block(
    conn: &mut Connection,
    number: i64,
    tag_id: &str,
    title: &str,
    file_name: &str,
) -> Result<()> {
    let tx = conn.transaction().context("Failed to start transaction")?;

    let number_taken: bool = tx
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM blocks WHERE number = ?1)",
            [number],
            |row| row.get(0),
        )
        .context("Failed to check for existing block number")?;
    if number_taken {
        bail!("Block {number} is already in use");
    }

    let tag_taken: bool = tx
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM blocks WHERE tag_id = ?1)",
            [tag_id],
            |row| row.get(0),
        )
        .context("Failed to check for existing tag")?;
    if tag_taken {
        bail!("Tag {tag_id} is already paired with another block");
    }

    tx.execute(
        "INSERT INTO songs (title, file_name) VALUES (?1, ?2)",
        params![title, file_name],
    )
    .with_context(|| format!("Failed to insert song '{title}' ({file_name})"))?;
    let song_id = tx.last_insert_rowid();

    tx.execute(
        "INSERT INTO blocks (number, tag_id, song_id) VALUES (?1, ?2, ?3)",
        params![number, tag_id, song_id],
    )
    .with_context(|| format!("Failed to insert block {number}"))?;

    tx.commit().context("Committing SQL transaction failed")?;
    debug!("Added block {number} (tag {tag_id}, song '{title}')");
    Ok(())
}

/// Swap the song behind an existing block. Returns the replaced song so the
/// caller can clean up its backing file.
pub fn replace_block_song(
    conn: &mut Connection,
    number: i64,
    title: &str,
    file_name: &str,
) -> Result<Song> {
    let tx = conn.transaction().context("Failed to start transaction")?;

    let block = tx
        .query_row(
            "SELECT id, number, tag_id, song_id FROM blocks WHERE number = ?1",
            [number],
            block_from_row,
        )
        .optional()
        .with_context(|| format!("Failed to query block {number}"))?;
    let Some(block) = block else {
        bail!("Block {number} not found");
    };

    let old = tx
        .query_row(
            "SELECT id, title, file_name FROM songs WHERE id = ?1",
            [block.song_id],
            |row| {
                Ok(Song {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    file_name: row.get(2)?,
                })
            },
        )
        .with_context(|| format!("Failed to query song for block {number}"))?;

    tx.execute(
        "UPDATE songs SET title = ?1, file_name = ?2 WHERE id = ?3",
        params![title, file_name, block.song_id],
    )
    .with_context(|| format!("Failed to update song for block {number}"))?;

    tx.commit().context("Committing SQL transaction failed")?;
    debug!("Replaced song on block {number}: '{}' -> '{title}'", old.title);
    Ok(old)
}

/// Delete a block and its song in one transaction. Returns both deleted rows
/// so the caller can report them and remove the backing file.
pub fn remove_block(conn: &mut Connection, number: i64) -> Result<(Block, Song)> {
    let tx = conn.transaction().context("Failed to start transaction")?;

    let block = tx
        .query_row(
            "SELECT id, number, tag_id, song_id FROM blocks WHERE number = ?1",
            [number],
            block_from_row,
        )
        .optional()
        .with_context(|| format!("Failed to query block {number}"))?;
    let Some(block) = block else {
        bail!("Block {number} not found");
    };

    let song = tx
        .query_row(
            "SELECT id, title, file_name FROM songs WHERE id = ?1",
            [block.song_id],
            |row| {
                Ok(Song {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    file_name: row.get(2)?,
                })
            },
        )
        .with_context(|| format!("Failed to query song for block {number}"))?;

    tx.execute("DELETE FROM blocks WHERE id = ?1", [block.id])
        .with_context(|| format!("Failed to delete block {number}"))?;
    tx.execute("DELETE FROM songs WHERE id = ?1", [song.id])
        .with_context(|| format!("Failed to delete song for block {number}"))?;

    tx.commit().context("Committing SQL transaction failed")?;
    debug!("Removed block {number} ('{}')", song.title);
    Ok((block, song))
}

/// All registered blocks with their songs, ordered by block number.
pub fn list_blocks(conn: &Connection) -> Result<Vec<(Block, Song)>> {
    let mut stmt = conn
        .prepare(
            "SELECT b.id, b.number, b.tag_id, b.song_id, s.id, s.title, s.file_name
             FROM blocks b JOIN songs s ON s.id = b.song_id
             ORDER BY b.number",
        )
        .context("Failed to prepare block listing query")?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                Block {
                    id: row.get(0)?,
                    number: row.get(1)?,
                    tag_id: row.get(2)?,
                    song_id: row.get(3)?,
                },
                Song {
                    id: row.get(4)?,
                    title: row.get(5)?,
                    file_name: row.get(6)?,
                },
            ))
        })
        .context("Failed to query blocks")?;

    let mut blocks = Vec::new();
    for row in rows {
        blocks.push(row.context("Failed to read block row")?);
    }
    Ok(blocks)
}

/// Play history, most recent first. `limit` bounds the result when given.
pub fn list_history(conn: &Connection, limit: Option<u32>) -> Result<Vec<HistoryEntry>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, song_title, started_at, seconds_played FROM play_history
             ORDER BY started_at DESC, id DESC LIMIT ?1",
        )
        .context("Failed to prepare history listing query")?;

    // SQLite treats a negative LIMIT as "no limit".
    let limit = limit.map_or(-1_i64, i64::from);
    let rows = stmt
        .query_map([limit], |row| {
            Ok(HistoryEntry {
                id: row.get(0)?,
                song_title: row.get(1)?,
                started_at: row.get(2)?,
                seconds_played: row.get(3)?,
            })
        })
        .context("Failed to query play history")?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row.context("Failed to read history row")?);
    }
    Ok(entries)
}
