#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Append-only JSON-lines writers shared by the hostgate crates.
//!
//! Audit streams are kept apart from diagnostic logging: every stream owns a
//! single `<name>.jsonl` file that is only ever appended to.

use std::{
    collections::HashMap,
    fs::{self, File},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};

/// Thread-safe JSON-lines writer with append-only semantics.
#[derive(Debug)]
pub struct JsonLogger {
    path: PathBuf,
    writer: Mutex<File>,
}

impl JsonLogger {
    /// Creates or opens a logger at the desired path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating log directory {}", parent.display()))?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        Ok(Self {
            path,
            writer: Mutex::new(file),
        })
    }

    /// Appends any serializable record as one JSON line and flushes it.
    pub fn append<T: Serialize>(&self, record: &T) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut writer = self.writer.lock();
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }

    /// Returns the underlying file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Directory of append-only streams, one file per stream name.
///
/// Files are opened lazily on first write and kept open afterwards.
#[derive(Debug)]
pub struct StreamLogger {
    dir: PathBuf,
    streams: Mutex<HashMap<String, std::sync::Arc<JsonLogger>>>,
}

impl StreamLogger {
    /// Creates the logger rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating stream directory {}", dir.display()))?;
        Ok(Self {
            dir,
            streams: Mutex::new(HashMap::new()),
        })
    }

    /// Appends a record to the named stream.
    pub fn append<T: Serialize>(&self, stream: &str, record: &T) -> Result<()> {
        let logger = self.stream(stream)?;
        logger.append(record)
    }

    /// Path of the file backing `stream`.
    #[must_use]
    pub fn stream_path(&self, stream: &str) -> PathBuf {
        self.dir.join(format!("{stream}.jsonl"))
    }

    /// Root directory of all streams.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn stream(&self, stream: &str) -> Result<std::sync::Arc<JsonLogger>> {
        let mut streams = self.streams.lock();
        if let Some(logger) = streams.get(stream) {
            return Ok(std::sync::Arc::clone(logger));
        }
        let logger = std::sync::Arc::new(JsonLogger::new(self.stream_path(stream))?);
        streams.insert(stream.to_string(), std::sync::Arc::clone(&logger));
        Ok(logger)
    }
}

/// Reads every record of a JSON-lines file, skipping blank lines.
pub fn read_records<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut records = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .with_context(|| format!("{}:{} is not a valid record", path.display(), idx + 1))?;
        records.push(record);
    }
    Ok(records)
}

/// Truncates `text` to at most `max_chars` characters on a char boundary.
#[must_use]
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    #[test]
    fn writes_json_lines() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::new(dir.path().join("nested/test.jsonl")).unwrap();
        logger.append(&json!({"message": "hello"})).unwrap();
        let content = fs::read_to_string(logger.path()).unwrap();
        assert_eq!(content, "{\"message\":\"hello\"}\n");
    }

    #[test]
    fn streams_are_separate_files() {
        let dir = tempdir().unwrap();
        let streams = StreamLogger::new(dir.path().join("audit")).unwrap();
        streams.append("security_event", &json!({"action": "blocked"})).unwrap();
        streams.append("command_execution", &json!({"action": "ran"})).unwrap();
        streams.append("command_execution", &json!({"action": "ran again"})).unwrap();

        let security: Vec<Value> = read_records(streams.stream_path("security_event")).unwrap();
        let commands: Vec<Value> = read_records(streams.stream_path("command_execution")).unwrap();
        assert_eq!(security.len(), 1);
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[1]["action"], "ran again");
    }

    #[test]
    fn reopening_appends_instead_of_truncating() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.jsonl");
        JsonLogger::new(&path).unwrap().append(&json!({"n": 1})).unwrap();
        JsonLogger::new(&path).unwrap().append(&json!({"n": 2})).unwrap();
        let records: Vec<Value> = read_records(&path).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("héllo wörld", 4), "héll");
        assert_eq!(excerpt("short", 200), "short");
        assert_eq!(excerpt("", 3), "");
    }
}
