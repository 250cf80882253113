//! # Player Module
//!
//! Owns the single external audio player subprocess for the life of the
//! daemon. The player is `mpg123 -R`, driven over its line-oriented remote
//! interface on stdin: `L <file>` loads and plays, `S` stops, `V <pct>` sets
//! volume, `Q` quits. That wire protocol never leaks out of this module;
//! everything else talks to the [`PlayerControl`] trait.
//!
//! The engine owns at most one subprocess at a time. Loading a new file goes
//! through the same process, so two tracks can never play over each other.
//! A subprocess that dies mid-run is detected on the next command, treated
//! as stopped, and respawned on the next play request.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::{Duration, Instant};

/// Narrow command surface of the playback engine.
///
/// `play` and `stop` report whether they changed anything: playing a missing
/// file or stopping while already stopped returns `Ok(false)` and leaves the
/// engine state untouched.
pub trait PlayerControl {
    fn play(&mut self, path: &Path) -> Result<bool>;
    fn stop(&mut self) -> Result<bool>;
    fn set_volume(&mut self, percent: f64) -> Result<()>;
    /// Graceful stop-and-terminate. Idempotent; the engine is unusable
    /// afterwards.
    fn quit(&mut self) -> Result<()>;
    fn is_playing(&self) -> bool;
}

#[derive(Debug)]
struct PlayerProcess {
    child: Child,
    stdin: ChildStdin,
}

/// Playback engine wrapping one `mpg123 -R` subprocess.
#[derive(Debug)]
pub struct Mpg123Player {
    binary: String,
    process: Option<PlayerProcess>,
    /// File currently loaded into the player, if any.
    current: Option<PathBuf>,
    volume: f64,
    quit_sent: bool,
}

fn spawn_player(binary: &str) -> Result<PlayerProcess> {
    let mut child = Command::new(binary)
        .arg("-R")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| {
            format!("Failed to run '{binary}'. Please install mpg123 (e.g. 'apt-get install mpg123')")
        })?;

    let stdin = child
        .stdin
        .take()
        .context("Failed to open player stdin")?;

    Ok(PlayerProcess { child, stdin })
}

impl Mpg123Player {
    /// Spawn the player subprocess. Failing to spawn is fatal for the
    /// daemon, so the error names the missing external dependency.
    pub fn spawn(binary: &str) -> Result<Self> {
        let mut player = Self {
            binary: binary.to_string(),
            process: Some(spawn_player(binary)?),
            current: None,
            volume: 100.0,
            quit_sent: false,
        };

        // Suppress the per-frame status chatter of the remote interface.
        player.send("SILENCE\n")?;
        info!("Player subprocess started ({binary})");
        Ok(player)
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    fn send(&mut self, line: &str) -> Result<()> {
        let process = self
            .process
            .as_mut()
            .context("Player subprocess is not running")?;
        process
            .stdin
            .write_all(line.as_bytes())
            .context("Failed to write to player subprocess")?;
        process
            .stdin
            .flush()
            .context("Failed to flush player command")?;
        Ok(())
    }

    /// Reap a dead subprocess. Returns true if the player is alive
    /// afterwards. A dead player means whatever was loaded is gone.
    fn check_alive(&mut self) -> Result<bool> {
        let Some(process) = self.process.as_mut() else {
            return Ok(false);
        };

        match process.child.try_wait() {
            Ok(None) => Ok(true),
            Ok(Some(status)) => {
                warn!("Player subprocess exited unexpectedly ({status}); will respawn on next play");
                self.process = None;
                self.current = None;
                Ok(false)
            }
            Err(e) => Err(e).context("Failed to check player subprocess status"),
        }
    }

    fn respawn(&mut self) -> Result<()> {
        info!("Respawning player subprocess ({})", self.binary);
        self.process = Some(spawn_player(&self.binary)?);
        self.send("SILENCE\n")?;
        let volume = self.volume;
        self.send(&format!("V {volume}\n"))?;
        Ok(())
    }
}

impl PlayerControl for Mpg123Player {
    fn play(&mut self, path: &Path) -> Result<bool> {
        if self.quit_sent {
            return Ok(false);
        }
        if !path.is_file() {
            return Ok(false);
        }

        if !self.check_alive()? {
            self.respawn()?;
        }

        // Loading over a playing track is an implicit stop-then-start; send
        // the stop explicitly so the handover is clean.
        if self.current.is_some() {
            self.send("S\n")?;
        }

        self.send(&format!("L {}\n", path.display()))?;
        self.current = Some(path.to_path_buf());
        debug!("Player loaded {}", path.display());
        Ok(true)
    }

    fn stop(&mut self) -> Result<bool> {
        if self.quit_sent {
            return Ok(false);
        }
        if !self.check_alive()? {
            // Nothing left to stop; death already cleared the loaded file.
            return Ok(false);
        }
        if self.current.is_none() {
            return Ok(false);
        }

        self.send("S\n")?;
        self.current = None;
        Ok(true)
    }

    fn set_volume(&mut self, percent: f64) -> Result<()> {
        // Saturating control: out-of-range input is clamped, never an error.
        self.volume = percent.clamp(0.0, 100.0);
        if self.quit_sent {
            return Ok(());
        }
        if self.check_alive()? {
            let volume = self.volume;
            self.send(&format!("V {volume}\n"))?;
        }
        Ok(())
    }

    fn quit(&mut self) -> Result<()> {
        if self.quit_sent {
            return Ok(());
        }
        self.quit_sent = true;
        self.current = None;

        let Some(mut process) = self.process.take() else {
            return Ok(());
        };

        // Graceful shutdown, then a bounded wait; never leave the subprocess
        // running past the daemon.
        let _ = process.stdin.write_all(b"S\nQ\n");
        let _ = process.stdin.flush();
        drop(process.stdin);

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            match process.child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(50));
                }
                Ok(None) => {
                    warn!("Player subprocess ignored quit; killing it");
                    process
                        .child
                        .kill()
                        .context("Failed to kill player subprocess")?;
                    process
                        .child
                        .wait()
                        .context("Failed to reap player subprocess")?;
                    break;
                }
                Err(e) => return Err(e).context("Failed to wait for player subprocess"),
            }
        }

        info!("Player subprocess shut down");
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.current.is_some() && !self.quit_sent
    }
}

impl Drop for Mpg123Player {
    /// Last-resort teardown so the subprocess never outlives the daemon,
    /// whatever exit path got us here.
    fn drop(&mut self) {
        if let Err(e) = self.quit() {
            warn!("Failed to shut down player subprocess: {e:#}");
        }
    }
}
