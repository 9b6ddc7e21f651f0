//! Conversation transcripts as JSON Lines.
//!
//! One object per [`ConversationEvent`]: the payload's fields plus `type`,
//! `timestamp` and `seq` (position within this writer). Non-object payloads
//! go under `data`. Opening an existing transcript appends to it.

use parley_application::ports::conversation_logger::{ConversationEvent, ConversationLogger};
use serde_json::{Map, Value};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

struct Transcript {
    out: BufWriter<File>,
    next_seq: u64,
}

/// Appends session transcripts to a `.jsonl` file.
pub struct JsonlConversationLogger {
    transcript: Mutex<Transcript>,
    path: PathBuf,
}

impl JsonlConversationLogger {
    /// Open the transcript at `path`, or `None` (with a warning) when it
    /// cannot be opened for appending.
    pub fn new(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        Self::open(path)
            .inspect_err(|e| warn!("Conversation log {} unavailable: {}", path.display(), e))
            .ok()
    }

    /// Open the transcript at `path`, creating it and its parent directories.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            transcript: Mutex::new(Transcript {
                out: BufWriter::new(file),
                next_seq: 0,
            }),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn transcript_record(event: ConversationEvent, timestamp: String, seq: u64) -> Value {
    let mut record = match event.payload {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("data".into(), other);
            map
        }
    };
    record.insert("type".into(), event.event_type.into());
    record.insert("timestamp".into(), timestamp.into());
    record.insert("seq".into(), seq.into());
    Value::Object(record)
}

impl ConversationLogger for JsonlConversationLogger {
    fn log(&self, event: ConversationEvent) {
        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let Ok(mut transcript) = self.transcript.lock() else {
            return;
        };
        let record = transcript_record(event, timestamp, transcript.next_seq);
        transcript.next_seq += 1;

        let written = serde_json::to_writer(&mut transcript.out, &record)
            .map_err(io::Error::from)
            .and_then(|()| writeln!(transcript.out))
            // Readers follow the file while the session runs
            .and_then(|()| transcript.out.flush());
        if let Err(e) = written {
            warn!("Conversation log {}: {}", self.path.display(), e);
        }
    }
}

impl Drop for JsonlConversationLogger {
    fn drop(&mut self) {
        if let Ok(transcript) = self.transcript.get_mut() {
            let _ = transcript.out.flush();
        }
    }
}
