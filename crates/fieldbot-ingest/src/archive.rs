//! Message archive — every inbound report, one JSONL file per day.
//!
//! Files live in `messages/<team>/messages_DDMMYYYY.jsonl`. The archive is the
//! source of truth for the workbook, which is regenerated from it in full.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate};
use fieldbot_core::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const FILE_PREFIX: &str = "messages_";
const FILE_SUFFIX: &str = ".jsonl";

/// One archived report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedMessage {
    pub sender: String,
    pub received_at: DateTime<Local>,
    pub text: String,
}

/// Append-only store of inbound reports.
pub struct MessageArchive {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl MessageArchive {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append a report received now. Returns the day file it was written to.
    pub fn append(&self, sender: &str, text: &str) -> Result<PathBuf> {
        self.append_at(sender, text, Local::now())
    }

    /// Append a report with an explicit receive time.
    pub fn append_at(
        &self,
        sender: &str,
        text: &str,
        received_at: DateTime<Local>,
    ) -> Result<PathBuf> {
        let message = ArchivedMessage {
            sender: sender.to_string(),
            received_at,
            text: text.to_string(),
        };
        let path = self.day_file(received_at.date_naive());
        let mut line = serde_json::to_string(&message)?;
        line.push('\n');

        let _guard = self.write_lock.lock();
        std::fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;

        info!("Message from {} archived to {}", sender, path.display());
        Ok(path)
    }

    /// Every archived message, oldest first. Unreadable lines are skipped.
    pub fn load_all(&self) -> Result<Vec<ArchivedMessage>> {
        let mut days: Vec<(NaiveDate, PathBuf)> = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries
                .flatten()
                .filter_map(|e| {
                    let path = e.path();
                    let name = path.file_name()?.to_str()?;
                    parse_day(name).map(|day| (day, path.clone()))
                })
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        days.sort();

        let mut messages = Vec::new();
        for (_, path) in days {
            let data = std::fs::read_to_string(&path)?;
            for (n, line) in data.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ArchivedMessage>(line) {
                    Ok(message) => messages.push(message),
                    Err(e) => warn!("Skipping line {} of {}: {}", n + 1, path.display(), e),
                }
            }
        }
        messages.sort_by_key(|m| m.received_at);
        Ok(messages)
    }

    /// Delete every day file. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let _guard = self.write_lock.lock();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_day_file = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_day)
                .is_some();
            if is_day_file {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        info!("Message archive cleared: {} files", removed);
        Ok(removed)
    }

    fn day_file(&self, day: NaiveDate) -> PathBuf {
        self.dir.join(format!(
            "{}{}{}",
            FILE_PREFIX,
            day.format("%d%m%Y"),
            FILE_SUFFIX
        ))
    }
}

fn parse_day(file_name: &str) -> Option<NaiveDate> {
    let stamp = file_name
        .strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_SUFFIX)?;
    NaiveDate::parse_from_str(stamp, "%d%m%Y").ok()
}
