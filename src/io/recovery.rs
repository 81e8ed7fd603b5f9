use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;

use crate::io::lock::try_lock;

/// Size past which appending trims the log first (1 MB).
const MAX_LOG_SIZE: u64 = 1_048_576;

/// Default age in days before entries are prunable.
pub const PRUNE_AGE_DAYS: i64 = 30;

/// Header written at the top of a new recovery log.
const FILE_HEADER: &str = "\
<!-- aftercare recovery log: append-only record of writes that failed,
     were rolled back, or deleted a subtree. View with: ac recovery
     Prune old entries: ac recovery prune
     Safe to delete. -->

---
";

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryCategory {
    /// A store write failed after validation passed
    Write,
    /// A composite create failed midway and was rolled back
    PartialCreate,
    /// A subtree was removed by a cascading delete
    Delete,
}

impl fmt::Display for RecoveryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryCategory::Write => write!(f, "write"),
            RecoveryCategory::PartialCreate => write!(f, "partial-create"),
            RecoveryCategory::Delete => write!(f, "delete"),
        }
    }
}

impl RecoveryCategory {
    pub fn parse_category(s: &str) -> Option<Self> {
        match s {
            "write" => Some(RecoveryCategory::Write),
            "partial-create" => Some(RecoveryCategory::PartialCreate),
            "delete" => Some(RecoveryCategory::Delete),
            _ => None,
        }
    }
}

/// A single entry in the recovery log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryEntry {
    pub timestamp: DateTime<Utc>,
    pub category: RecoveryCategory,
    pub description: String,
    pub fields: Vec<(String, String)>,
    pub body: String,
}

impl RecoveryEntry {
    pub fn now(category: RecoveryCategory, description: impl Into<String>) -> Self {
        RecoveryEntry {
            timestamp: Utc::now(),
            category,
            description: description.into(),
            fields: Vec::new(),
            body: String::new(),
        }
    }

    pub fn field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.push((key.to_string(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }
}

pub fn recovery_log_path(data_dir: &Path) -> PathBuf {
    data_dir.join(".recovery.log")
}

// ---------------------------------------------------------------------------
// Atomic file write
// ---------------------------------------------------------------------------

/// Write `content` to `path` atomically using a temp file + rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

impl RecoveryEntry {
    fn to_markdown(&self) -> String {
        let mut out = format!(
            "## {} | {}: {}\n\n",
            self.timestamp
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.category,
            self.description,
        );
        for (key, value) in &self.fields {
            out.push_str(&format!("{}: {}\n", key, value));
        }
        if !self.body.is_empty() {
            out.push_str("\n```json\n");
            out.push_str(&self.body);
            if !self.body.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("```\n");
        }
        out.push_str("\n---\n");
        out
    }

    pub fn to_json(&self) -> serde_json::Value {
        let fields: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        serde_json::json!({
            "timestamp": self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            "category": self.category.to_string(),
            "description": self.description,
            "fields": fields,
            "body": self.body,
        })
    }
}

/// Append an entry to the log. Failures are reported through tracing and
/// otherwise ignored; the log must never turn a handled error into a new one.
pub fn log_recovery(data_dir: &Path, entry: RecoveryEntry) {
    if let Err(e) = append_entry(data_dir, &entry) {
        tracing::warn!(error = %e, "could not write to recovery log");
    }
}

fn append_entry(data_dir: &Path, entry: &RecoveryEntry) -> io::Result<()> {
    let path = recovery_log_path(data_dir);
    if let Ok(meta) = std::fs::metadata(&path)
        && meta.len() > MAX_LOG_SIZE
    {
        try_inline_trim(&path);
    }
    let needs_header = std::fs::metadata(&path).map_or(true, |m| m.len() == 0);
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    if needs_header {
        file.write_all(FILE_HEADER.as_bytes())?;
    }
    file.write_all(entry.to_markdown().as_bytes())
}

/// Shrink an oversized log without waiting: skipped when another process
/// holds it. Drops entries past the prune age, then the oldest entries until
/// the log is back under half of `MAX_LOG_SIZE`.
fn try_inline_trim(path: &Path) {
    let Ok(file) = OpenOptions::new().read(true).write(true).open(path) else {
        return;
    };
    if try_lock(&file).is_err() {
        return;
    }
    let mut content = String::new();
    if (&file).read_to_string(&mut content).is_err() {
        return;
    }

    let cutoff = Utc::now() - chrono::Duration::days(PRUNE_AGE_DAYS);
    let (header, mut chunks) = split_entries(&content);
    chunks.retain(|c| c.timestamp.is_some_and(|ts| ts >= cutoff));
    let budget = (MAX_LOG_SIZE / 2) as usize;
    let mut size: usize = header.len() + chunks.iter().map(|c| c.text.len()).sum::<usize>();
    let mut drop_count = 0;
    while size > budget && drop_count < chunks.len() {
        size -= chunks[drop_count].text.len();
        drop_count += 1;
    }
    chunks.drain(..drop_count);

    let trimmed = join_entries(&header, &chunks);
    if trimmed.len() < content.len()
        && let Ok(mut f) = File::create(path)
    {
        let _ = f.write_all(trimmed.as_bytes());
    }
}

// ---------------------------------------------------------------------------
// Pruning
// ---------------------------------------------------------------------------

/// Remove entries older than `before` (default: `PRUNE_AGE_DAYS` ago), or
/// every entry with `all`. Returns how many were removed.
pub fn prune_recovery(
    data_dir: &Path,
    before: Option<DateTime<Utc>>,
    all: bool,
) -> io::Result<usize> {
    let path = recovery_log_path(data_dir);
    if !path.exists() {
        return Ok(0);
    }

    let file = OpenOptions::new().read(true).write(true).open(&path)?;
    let mut locked = false;
    for _ in 0..10 {
        if try_lock(&file).is_ok() {
            locked = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    if !locked {
        return Err(io::Error::new(
            io::ErrorKind::WouldBlock,
            "recovery log is in use, try again later",
        ));
    }

    let content = std::fs::read_to_string(&path)?;
    let (header, mut chunks) = split_entries(&content);
    let original = chunks.len();
    if all {
        chunks.clear();
    } else {
        let cutoff =
            before.unwrap_or_else(|| Utc::now() - chrono::Duration::days(PRUNE_AGE_DAYS));
        chunks.retain(|c| c.timestamp.is_some_and(|ts| ts >= cutoff));
    }
    std::fs::write(&path, join_entries(&header, &chunks))?;
    Ok(original - chunks.len())
}

/// Raw text of one entry, header line through its `---` separator.
struct EntryChunk {
    timestamp: Option<DateTime<Utc>>,
    text: String,
}

/// Split raw log content into the file header and per-entry chunks.
/// Lines before the first entry all belong to the header.
fn split_entries(content: &str) -> (String, Vec<EntryChunk>) {
    let mut header = String::new();
    let mut chunks: Vec<EntryChunk> = Vec::new();
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("## ") {
            chunks.push(EntryChunk {
                timestamp: parse_entry_header(rest).map(|e| e.timestamp),
                text: String::new(),
            });
        }
        let target = match chunks.last_mut() {
            Some(chunk) => &mut chunk.text,
            None => &mut header,
        };
        target.push_str(line);
        target.push('\n');
    }
    if header.is_empty() {
        header.push_str(FILE_HEADER);
    }
    (header, chunks)
}

fn join_entries(header: &str, chunks: &[EntryChunk]) -> String {
    let mut out = header.to_string();
    for chunk in chunks {
        out.push_str(&chunk.text);
    }
    out
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Read entries, most recent first. A missing log reads as empty.
pub fn read_recovery_entries(data_dir: &Path, limit: Option<usize>) -> Vec<RecoveryEntry> {
    let content = match std::fs::read_to_string(recovery_log_path(data_dir)) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };
    let mut entries = parse_entries(&content);
    if let Some(n) = limit {
        let skip = entries.len().saturating_sub(n);
        entries.drain(..skip);
    }
    entries.reverse();
    entries
}

fn parse_entries(content: &str) -> Vec<RecoveryEntry> {
    let mut entries = Vec::new();
    let mut current: Option<RecoveryEntry> = None;
    let mut in_body = false;

    for line in content.lines() {
        if let Some(header) = line.strip_prefix("## ") {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current = parse_entry_header(header);
            in_body = false;
            continue;
        }
        let Some(entry) = current.as_mut() else {
            continue;
        };
        if line.starts_with("```") {
            in_body = !in_body;
            continue;
        }
        if in_body {
            entry.body.push_str(line);
            entry.body.push('\n');
        } else if line == "---" {
            if let Some(done) = current.take() {
                entries.push(done);
            }
        } else if let Some((key, value)) = line.split_once(": ") {
            entry.fields.push((key.to_string(), value.to_string()));
        }
    }
    if let Some(entry) = current {
        entries.push(entry);
    }
    entries
}

fn parse_entry_header(header: &str) -> Option<RecoveryEntry> {
    let (ts, rest) = header.split_once(" | ")?;
    let (category, description) = rest.split_once(": ")?;
    Some(RecoveryEntry {
        timestamp: DateTime::parse_from_rfc3339(ts).ok()?.with_timezone(&Utc),
        category: RecoveryCategory::parse_category(category)?,
        description: description.to_string(),
        fields: Vec::new(),
        body: String::new(),
    })
}
