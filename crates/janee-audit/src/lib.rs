// SPDX-License-Identifier: MIT OR Apache-2.0
//! janee-audit
//!
//! Append-only audit log: one JSONL file per UTC date, synchronous appends,
//! newest-first queries, and a polling follow-stream that survives the daily
//! rotation. Files are created `0600` inside a `0700` directory.

#![deny(unsafe_code)]

use chrono::{DateTime, NaiveDate, Utc};
use janee_core::AuditEvent;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

/// Request bodies are captured up to this many bytes.
pub const MAX_BODY_CAPTURE: usize = 10_240;

/// How often the follow-stream polls the active file.
pub const TAIL_POLL_INTERVAL: Duration = Duration::from_millis(400);

/// Errors raised by the audit log.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Filesystem failure while appending or reading.
    #[error("audit log I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An event could not be serialised.
    #[error("audit event serialisation failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Append-only daily audit log rooted at a directory.
#[derive(Debug, Clone)]
pub struct AuditLog {
    dir: PathBuf,
}

impl AuditLog {
    /// Open (creating if necessary) the audit directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;
        }
        Ok(Self { dir })
    }

    /// Directory holding the dated files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for a given UTC date.
    pub fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.jsonl", date.format("%Y-%m-%d")))
    }

    /// File currently being appended to.
    pub fn current_file(&self) -> PathBuf {
        self.file_for(Utc::now().date_naive())
    }

    /// Append one event as a single JSON line.
    ///
    /// The target filename is re-derived from the current UTC date on every
    /// call, so rotation at midnight is transparent.
    pub fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let path = self.current_file();
        let mut opts = std::fs::OpenOptions::new();
        opts.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let mut file = opts.open(path)?;
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read up to `limit` events, newest first.
    ///
    /// Walks date files newest-first and each file bottom-to-top; optional
    /// filters restrict by service name and minimum timestamp.
    pub fn read_logs(
        &self,
        limit: usize,
        service: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditEvent>, AuditError> {
        let mut out = Vec::new();
        if limit == 0 {
            return Ok(out);
        }

        for date in self.dates_desc()? {
            let content = match std::fs::read_to_string(self.file_for(date)) {
                Ok(content) => content,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };

            for line in content.lines().rev() {
                if line.trim().is_empty() {
                    continue;
                }
                let event: AuditEvent = match serde_json::from_str(line) {
                    Ok(event) => event,
                    Err(err) => {
                        warn!(date = %date, error = %err, "skipping unparsable audit line");
                        continue;
                    }
                };
                if let Some(service) = service
                    && event.service != service
                {
                    continue;
                }
                if let Some(since) = since
                    && event.timestamp < since
                {
                    continue;
                }
                out.push(event);
                if out.len() == limit {
                    return Ok(out);
                }
            }
        }
        Ok(out)
    }

    /// Follow the log: an infinite stream of events appended after this
    /// call. Cancellation is by dropping the returned stream.
    ///
    /// The watcher polls the active file's length every
    /// [`TAIL_POLL_INTERVAL`]; when the UTC date rolls over it advances to
    /// the new file and restarts from offset zero.
    pub fn tail(&self) -> ReceiverStream<AuditEvent> {
        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let log = self.clone();

        // Snapshot the starting offset before handing off to the watcher so
        // events appended immediately after this call are never skipped.
        let mut date = Utc::now().date_naive();
        let mut pos = std::fs::metadata(self.file_for(date))
            .map(|m| m.len())
            .unwrap_or(0);

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(TAIL_POLL_INTERVAL).await;

                let today = Utc::now().date_naive();
                if today != date {
                    date = today;
                    pos = 0;
                }

                let path = log.file_for(date);
                let len = match tokio::fs::metadata(&path).await {
                    Ok(meta) => meta.len(),
                    Err(_) => continue,
                };
                if len <= pos {
                    continue;
                }

                let Ok(mut file) = tokio::fs::File::open(&path).await else {
                    continue;
                };
                if file.seek(SeekFrom::Start(pos)).await.is_err() {
                    continue;
                }
                let mut delta = Vec::with_capacity((len - pos) as usize);
                if file.read_to_end(&mut delta).await.is_err() {
                    continue;
                }

                // Only consume complete lines; a partially flushed line is
                // left for the next poll.
                let consumed = match delta.iter().rposition(|&b| b == b'\n') {
                    Some(idx) => idx + 1,
                    None => continue,
                };
                pos += consumed as u64;

                for line in delta[..consumed].split(|&b| b == b'\n') {
                    if line.is_empty() {
                        continue;
                    }
                    let event: AuditEvent = match serde_json::from_slice(line) {
                        Ok(event) => event,
                        Err(err) => {
                            warn!(error = %err, "skipping unparsable tailed line");
                            continue;
                        }
                    };
                    if tx.send(event).await.is_err() {
                        return; // consumer dropped
                    }
                }
            }
        });

        ReceiverStream::new(rx)
    }

    fn dates_desc(&self) -> Result<Vec<NaiveDate>, AuditError> {
        let mut dates = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".jsonl")) else {
                continue;
            };
            if let Ok(date) = NaiveDate::parse_from_str(stem, "%Y-%m-%d") {
                dates.push(date);
            }
        }
        dates.sort_unstable_by(|a, b| b.cmp(a));
        Ok(dates)
    }
}

/// Decide what, if anything, of a request body is captured into the audit
/// entry.
///
/// Bodies are captured for write methods only, only when capture is enabled,
/// and are truncated at [`MAX_BODY_CAPTURE`] bytes with a marker carrying the
/// original length.
pub fn capture_body(method: &str, body: Option<&str>, enabled: bool) -> Option<String> {
    if !enabled {
        return None;
    }
    let is_write = matches!(
        method.to_ascii_uppercase().as_str(),
        "POST" | "PUT" | "PATCH"
    );
    if !is_write {
        return None;
    }
    let body = body?;
    if body.len() <= MAX_BODY_CAPTURE {
        return Some(body.to_string());
    }

    let mut cut = MAX_BODY_CAPTURE;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    Some(format!(
        "{}... [truncated, original length: {}]",
        &body[..cut],
        body.len()
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
