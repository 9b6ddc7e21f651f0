//! Binary persistence of sessions.
//!
//! - [`stream`] - big-endian primitive reader/writer
//! - [`codec`] - versioned session layout
//! - [`error::CodecError`] - encode/decode failures

pub mod codec;
pub mod error;
pub mod stream;
