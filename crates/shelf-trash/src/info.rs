//! The `.trashinfo` metadata file.

use std::ffi::OsStr;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime, Timelike};
use serde::Serialize;

use crate::error::{Result, TrashError};

/// File extension of info files.
pub const INFO_EXTENSION: &str = "trashinfo";

/// The only section of an info file.
pub const INFO_SECTION: &str = "Trash Info";

/// Local time, second precision.
pub const DELETION_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parsed contents of an info file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrashInfo {
    /// Original location as recorded: absolute for the home trash,
    /// relative to the mount point for device trashes.
    pub path: PathBuf,
    /// When the entry was trashed.
    pub deletion_date: NaiveDateTime,
}

impl TrashInfo {
    pub fn new(path: impl Into<PathBuf>, deletion_date: NaiveDateTime) -> Self {
        Self {
            path: path.into(),
            deletion_date,
        }
    }

    /// Info stamped with the current local time.
    pub fn now(path: impl Into<PathBuf>) -> Self {
        let now = Local::now().naive_local();
        Self::new(path, now.with_nanosecond(0).unwrap_or(now))
    }

    /// Parse info file text. `source` is only used for error reporting.
    pub fn parse(text: &str, source: &Path) -> Result<Self> {
        let invalid = |reason: &str| TrashError::InvalidInfo {
            path: source.to_path_buf(),
            reason: reason.to_string(),
        };

        let mut in_section = false;
        let mut seen_section = false;
        let mut path = None;
        let mut date = None;

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                in_section = header == INFO_SECTION;
                seen_section |= in_section;
                continue;
            }
            if !in_section {
                continue;
            }
            let Some((key, value)) = raw.split_once('=') else {
                continue;
            };
            match key.trim() {
                "Path" => path = Some(decode_path(value)),
                "DeletionDate" => date = Some(value.trim().to_string()),
                _ => {}
            }
        }

        if !seen_section {
            return Err(invalid("missing [Trash Info] section"));
        }
        let path = path
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| invalid("missing Path"))?;
        let date = date.ok_or_else(|| invalid("missing DeletionDate"))?;
        let deletion_date = NaiveDateTime::parse_from_str(&date, DELETION_DATE_FORMAT)
            .map_err(|e| invalid(&format!("bad DeletionDate {date:?}: {e}")))?;

        Ok(Self::new(path, deletion_date))
    }

    /// Read and parse the info file at `path`.
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| TrashError::io(path, e))?;
        Self::parse(&text, path)
    }

    /// Render as info file text. `Path` is percent-encoded, so any byte in
    /// a name (newlines included) survives the round trip.
    pub fn to_ini(&self) -> String {
        format!(
            "[{INFO_SECTION}]\nPath={}\nDeletionDate={}\n",
            encode_path(&self.path),
            self.deletion_date.format(DELETION_DATE_FORMAT)
        )
    }

    /// Write a new info file at `path` and sync it.
    ///
    /// Fails with `AlreadyExists` instead of replacing another entry's info.
    pub fn write_new(&self, path: &Path) -> io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        file.write_all(self.to_ini().as_bytes())?;
        file.sync_all()
    }
}

/// Percent-encode every byte of `path` except `/` and the unreserved set.
fn encode_path(path: &Path) -> String {
    path.as_os_str()
        .as_bytes()
        .split(|&b| b == b'/')
        .map(urlencoding::encode_binary)
        .collect::<Vec<_>>()
        .join("/")
}

/// Decode a recorded `Path` value. Unencoded values written by older tools
/// pass through unchanged.
fn decode_path(value: &str) -> PathBuf {
    let bytes = urlencoding::decode_binary(value.as_bytes());
    PathBuf::from(OsStr::from_bytes(&bytes))
}
