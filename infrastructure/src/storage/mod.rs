//! Session storage adapters

pub mod file_store;

pub use file_store::{
    FileSessionStore, SESSION_FILE_MAGIC, decode_session_file, encode_session_file,
    read_session_file, write_session_file,
};
