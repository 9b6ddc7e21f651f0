//! File-backed session store.
//!
//! One file per session, named `gpt4all-<id>.chat`, holding a small header
//! followed by the encoded session body:
//!
//! | Field | Encoding |
//! |-------|----------|
//! | magic | `u32` `0xF5D553CC` |
//! | version | `i32` |
//! | body | session stream written at `version` |

use parley_application::ports::session_store::{SessionStore, StoreError, StoredSession};
use parley_domain::{DataReader, DataWriter, SessionId, check_version};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Magic number opening every session file.
pub const SESSION_FILE_MAGIC: u32 = 0xF5D5_53CC;

const FILE_PREFIX: &str = "gpt4all-";
const FILE_SUFFIX: &str = ".chat";

/// Stores sessions as files in one directory.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Default location: `<data dir>/parley/sessions`.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("parley").join("sessions"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding `id`. Ids that could leave the store directory are
    /// rejected.
    pub fn path_for(&self, id: &SessionId) -> Result<PathBuf, StoreError> {
        let name = id.as_str();
        if name.is_empty() || name.contains(['/', '\\', '\0']) || name.contains("..") {
            return Err(StoreError::InvalidId(id.clone()));
        }
        Ok(self.dir.join(format!("{FILE_PREFIX}{name}{FILE_SUFFIX}")))
    }

    fn io_error(path: &Path, source: io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Wrap an encoded body in the session file header.
pub fn encode_session_file(version: i32, body: &[u8]) -> Vec<u8> {
    let mut writer = DataWriter::new();
    writer.write_u32(SESSION_FILE_MAGIC);
    writer.write_i32(version);
    writer.write_raw(body);
    writer.into_bytes()
}

/// Split a session file into its version and body.
pub fn decode_session_file(bytes: &[u8]) -> Result<StoredSession, StoreError> {
    let mut reader = DataReader::new(bytes);
    let magic = reader
        .read_u32()
        .map_err(|_| StoreError::BadHeader("file too short".to_string()))?;
    if magic != SESSION_FILE_MAGIC {
        return Err(StoreError::BadHeader(format!("bad magic {magic:#010x}")));
    }
    let version = reader
        .read_i32()
        .map_err(|_| StoreError::BadHeader("missing version".to_string()))?;
    check_version(version)?;
    Ok(StoredSession {
        version,
        body: bytes[reader.position()..].to_vec(),
    })
}

/// Read a session file from disk.
pub fn read_session_file(path: &Path) -> Result<StoredSession, StoreError> {
    let bytes = fs::read(path).map_err(|e| FileSessionStore::io_error(path, e))?;
    decode_session_file(&bytes)
}

/// Write a session file, replacing any previous copy atomically.
pub fn write_session_file(path: &Path, version: i32, body: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| FileSessionStore::io_error(parent, e))?;
    }
    let tmp = path.with_extension("chat.tmp");
    fs::write(&tmp, encode_session_file(version, body))
        .map_err(|e| FileSessionStore::io_error(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| FileSessionStore::io_error(path, e))
}

impl SessionStore for FileSessionStore {
    fn save(&self, id: &SessionId, version: i32, body: &[u8]) -> Result<(), StoreError> {
        check_version(version)?;
        let path = self.path_for(id)?;
        write_session_file(&path, version, body)?;
        debug!("Saved session {} to {}", id, path.display());
        Ok(())
    }

    fn load(&self, id: &SessionId) -> Result<StoredSession, StoreError> {
        let path = self.path_for(id)?;
        match fs::read(&path) {
            Ok(bytes) => decode_session_file(&bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound(id.clone())),
            Err(e) => Err(Self::io_error(&path, e)),
        }
    }

    fn list(&self) -> Result<Vec<SessionId>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io_error(&self.dir, e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Self::io_error(&self.dir, e))?;
            let name = entry.file_name();
            if let Some(id) = name
                .to_str()
                .and_then(|n| n.strip_prefix(FILE_PREFIX))
                .and_then(|n| n.strip_suffix(FILE_SUFFIX))
                .filter(|id| !id.is_empty())
            {
                ids.push(SessionId::from(id));
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn remove(&self, id: &SessionId) -> Result<(), StoreError> {
        let path = self.path_for(id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Removed saved session {}", id);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(&path, e)),
        }
    }
}
