//! # Tag Reader Module
//!
//! Wraps the NFC reader hardware behind a single "what tag is on the reader
//! right now" operation, using the libnfc `nfc-list` command-line tool.
//!
//! ## Design Decision: nfc-list vs Direct libnfc Bindings
//!
//! This implementation shells out to `nfc-list` instead of binding libnfc
//! directly:
//! - Simplicity: no unsafe FFI against libnfc's device model
//! - Reliability: nfc-list handles reader quirks and bus resets itself
//! - Compatibility: works with every reader libnfc supports
//!
//! One invocation performs one hardware read cycle and exits, which keeps
//! each poll bounded; the controller owns the poll cadence.

use anyhow::{bail, Context, Result};
use log::debug;
use std::process::Command;
use std::time::Duration;

/// Result of one reader poll. `Absent` is the normal steady state of an
/// empty reader, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagPoll {
    /// A tag is present; the payload is its hardware UID as uppercase hex.
    Present(String),
    Absent,
}

/// The single I/O boundary to the tag hardware.
pub trait TagReader {
    /// Read the currently-present tag, if any. One hardware read cycle.
    fn poll(&mut self) -> Result<TagPoll>;
}

/// Reader adapter driving the libnfc `nfc-list` tool.
#[derive(Debug, Clone)]
pub struct NfcReader {
    binary: String,
}

impl NfcReader {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }

    /// Verify the reader tool and hardware are usable. Run once at daemon
    /// startup; a reader that cannot be opened is fatal, not a condition to
    /// retry every poll.
    pub fn probe(&self) -> Result<()> {
        let output = Command::new(&self.binary).output().with_context(|| {
            format!(
                "Failed to execute '{}'. Please install libnfc (nfc-list)",
                self.binary
            )
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "NFC reader is not available. Check that the reader is connected and libnfc is configured.\nError: {}",
                stderr.trim()
            );
        }

        Ok(())
    }
}

impl TagReader for NfcReader {
    fn poll(&mut self) -> Result<TagPoll> {
        let output = Command::new(&self.binary)
            .output()
            .with_context(|| format!("Failed to execute '{}'", self.binary))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("Tag read failed: {}", stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_uid(&stdout) {
            Some(uid) => {
                debug!("Tag present: {uid}");
                Ok(TagPoll::Present(uid))
            }
            None => Ok(TagPoll::Absent),
        }
    }
}

/// Extract the first tag UID from `nfc-list` output.
///
/// The tool prints one `UID (NFCID1): 04 a2 ...` line per target; no such
/// line means no tag is on the reader.
pub fn parse_uid(output: &str) -> Option<String> {
    for line in output.lines() {
        let line = line.trim();
        if !line.starts_with("UID") {
            continue;
        }
        let (_, raw) = line.split_once(':')?;
        let uid = normalize_uid(raw);
        if !uid.is_empty() {
            return Some(uid);
        }
    }
    None
}

/// Canonical UID form: uppercase hex, no separators. Applied to both reader
/// output and operator-supplied `--tag` values so equality comparison works.
pub fn normalize_uid(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_hexdigit())
        .collect::<String>()
        .to_uppercase()
}

/// Wait for the operator to place a tag on the reader, polling once a second
/// for up to ten seconds. Used by `musicblocks add` when no `--tag` is given.
pub fn capture_tag(reader: &mut dyn TagReader) -> Result<Option<String>> {
    println!("Place tag on reader");
    for _ in 0..10 {
        println!("Reading...");
        match reader.poll()? {
            TagPoll::Present(uid) => {
                println!("Tag UID: {uid}");
                return Ok(Some(uid));
            }
            TagPoll::Absent => std::thread::sleep(Duration::from_secs(1)),
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct ScriptedReader {
        polls: VecDeque<TagPoll>,
    }

    impl TagReader for ScriptedReader {
        fn poll(&mut self) -> Result<TagPoll> {
            Ok(self.polls.pop_front().unwrap_or(TagPoll::Absent))
        }
    }

    #[test]
    fn test_parse_uid_from_nfc_list_output() {
        let output = "\
nfc-list uses libnfc 1.8.0
NFC device: pn532_uart:/dev/ttyUSB0 opened
1 ISO14443A passive target(s) found:
    ATQA (SENS_RES): 00  04
       UID (NFCID1): 04  a2  3b  1c
      SAK (SEL_RES): 08
";
        assert_eq!(parse_uid(output), Some("04A23B1C".to_string()));
    }

    #[test]
    fn test_parse_uid_no_target() {
        let output = "\
nfc-list uses libnfc 1.8.0
NFC device: pn532_uart:/dev/ttyUSB0 opened
";
        assert_eq!(parse_uid(output), None);
    }

    #[test]
    fn test_parse_uid_empty_output() {
        assert_eq!(parse_uid(""), None);
    }

    #[test]
    fn test_normalize_uid() {
        assert_eq!(normalize_uid("04 a2 3b 1c"), "04A23B1C");
        assert_eq!(normalize_uid("04:A2:3B:1C"), "04A23B1C");
        assert_eq!(normalize_uid("a1b2"), "A1B2");
        assert_eq!(normalize_uid("  "), "");
    }

    #[test]
    fn test_capture_tag_returns_first_present() {
        let mut reader = ScriptedReader {
            polls: VecDeque::from([TagPoll::Present("A1B2".to_string())]),
        };

        let uid = capture_tag(&mut reader).unwrap();
        assert_eq!(uid, Some("A1B2".to_string()));
    }

    struct FailingReader;

    impl TagReader for FailingReader {
        fn poll(&mut self) -> Result<TagPoll> {
            bail!("reader unplugged")
        }
    }

    #[test]
    fn test_capture_tag_propagates_reader_errors() {
        let mut reader = FailingReader;

        let err = capture_tag(&mut reader).unwrap_err();
        assert!(err.to_string().contains("reader unplugged"));
    }
}
