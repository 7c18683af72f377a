//! Session backed by a directory shared with the multiworld bridge.
//!
//! The bridge appends received items to `items.jsonl`, one
//! `{"index":N,"capability":C}` object per line, and keeps `checked.json`
//! holding the array of locations the server already knows about. Reports
//! from this side are appended to `outbox.jsonl`.

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tcsync::{Error, LedgerEntry, LocationId, Result, Session, SessionEvent};
use tracing::{debug, info, warn};

pub const ITEMS_FILE: &str = "items.jsonl";
pub const CHECKED_FILE: &str = "checked.json";
pub const OUTBOX_FILE: &str = "outbox.jsonl";

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum OutboxRecord<'a> {
    Checks {
        time: DateTime<Utc>,
        locations: &'a BTreeSet<LocationId>,
    },
    Goal {
        time: DateTime<Utc>,
    },
}

pub struct FileSession {
    dir: PathBuf,
    locations: BTreeSet<LocationId>,
    connected: bool,
    /// Byte offset of the first unread line in the item log.
    items_read: u64,
    checked: BTreeSet<LocationId>,
}

impl FileSession {
    /// `locations` is every location the game table can detect.
    pub fn new(dir: impl Into<PathBuf>, locations: impl IntoIterator<Item = LocationId>) -> Self {
        Self {
            dir: dir.into(),
            locations: locations.into_iter().collect(),
            connected: false,
            items_read: 0,
            checked: BTreeSet::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_checked(&self) -> Result<BTreeSet<LocationId>> {
        let path = self.dir.join(CHECKED_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(BTreeSet::new());
        }
        serde_json::from_str(&text)
            .map_err(|e| Error::Session(format!("invalid {}: {}", CHECKED_FILE, e)))
    }

    fn items_len(&self) -> Result<u64> {
        match fs::metadata(self.dir.join(ITEMS_FILE)) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Read complete lines past `items_read`. A trailing partial line is
    /// left for the next poll.
    fn read_items(&mut self) -> Result<Vec<LedgerEntry>> {
        let file = match File::open(self.dir.join(ITEMS_FILE)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(self.items_read))?;

        let mut entries = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader.read_line(&mut line)?;
            if n == 0 || !line.ends_with('\n') {
                break;
            }
            self.items_read += n as u64;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<LedgerEntry>(trimmed) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping malformed item line '{}': {}", trimmed, e),
            }
        }
        Ok(entries)
    }

    fn append_outbox(&self, record: &OutboxRecord<'_>) -> Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| Error::Session(format!("failed to encode report: {}", e)))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(OUTBOX_FILE))?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

impl Session for FileSession {
    fn poll_events(&mut self) -> Result<Vec<SessionEvent>> {
        let mut events = Vec::new();
        if !self.dir.is_dir() {
            if self.connected {
                info!("Session directory {} disappeared", self.dir.display());
                self.connected = false;
                events.push(SessionEvent::Disconnected);
            }
            return Ok(events);
        }

        if self.connected && self.items_len()? < self.items_read {
            info!("Item log was truncated, starting a new session");
            self.connected = false;
            events.push(SessionEvent::Disconnected);
        }

        if self.connected {
            let checked = self.read_checked()?;
            let confirmed: BTreeSet<LocationId> =
                checked.difference(&self.checked).copied().collect();
            if !confirmed.is_empty() {
                debug!("{} locations confirmed by the session", confirmed.len());
                self.checked.extend(confirmed.iter().copied());
                events.push(SessionEvent::LocationsChecked(confirmed));
            }
        } else {
            self.checked = self.read_checked()?;
            self.items_read = 0;
            let missing = self.locations.difference(&self.checked).copied().collect();
            self.connected = true;
            events.push(SessionEvent::Connected {
                checked: self.checked.clone(),
                missing,
            });
        }

        let items = self.read_items()?;
        if !items.is_empty() {
            events.push(SessionEvent::ItemsReceived(items));
        }
        Ok(events)
    }

    fn report_checks(&mut self, locations: &BTreeSet<LocationId>) -> Result<()> {
        debug!("Reporting {} checked locations", locations.len());
        self.append_outbox(&OutboxRecord::Checks {
            time: Utc::now(),
            locations,
        })
    }

    fn report_goal_complete(&mut self) -> Result<()> {
        self.append_outbox(&OutboxRecord::Goal { time: Utc::now() })
    }
}
