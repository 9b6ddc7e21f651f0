//! Versioned session codec.
//!
//! Field order is fixed:
//!
//! 1. creation timestamp (`i64`)
//! 2. id, display name, user name, saved model name (strings)
//! 3. enabled collections (string list, version > 2)
//! 4. worker state (byte array, produced by the worker itself)
//! 5. turn sequence (`i32` count, then each turn)
//!
//! The version is supplied by the caller and is not written to the stream.

use super::error::CodecError;
use super::stream::{DataReader, DataWriter};
use crate::session::entities::{Session, SessionId};
use crate::session::turn::{ChatModel, Turn, TurnRole};

/// Oldest format version this codec reads and writes.
pub const MIN_FORMAT_VERSION: i32 = 1;
/// Newest format version; used for all new saves.
pub const CURRENT_FORMAT_VERSION: i32 = 3;
/// Model family whose saved state is unusable before version 2.
pub const LEGACY_INCOMPATIBLE_MARKER: &str = "gpt4all-j";

/// Fail with [`CodecError::UnsupportedVersion`] for unknown versions.
pub fn check_version(version: i32) -> Result<(), CodecError> {
    if (MIN_FORMAT_VERSION..=CURRENT_FORMAT_VERSION).contains(&version) {
        Ok(())
    } else {
        Err(CodecError::UnsupportedVersion(version))
    }
}

/// Whether `version` persists enabled collections and turn citations.
pub fn has_collections(version: i32) -> bool {
    version > 2
}

/// A fully decoded session, not yet adopted by anyone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session: Session,
    /// Opaque state owned by the worker; restored through the worker.
    pub worker_state: Vec<u8>,
}

/// Encode `session` and the worker's serialized state at `version`.
pub fn encode_session(
    session: &Session,
    worker_state: &[u8],
    version: i32,
) -> Result<Vec<u8>, CodecError> {
    let mut writer = DataWriter::new();
    write_session(&mut writer, session, worker_state, version)?;
    Ok(writer.into_bytes())
}

/// Decode a session encoded at `version`. The whole buffer must be consumed.
pub fn decode_session(bytes: &[u8], version: i32) -> Result<SessionSnapshot, CodecError> {
    let mut reader = DataReader::new(bytes);
    let snapshot = read_session(&mut reader, version)?;
    if !reader.is_at_end() {
        return Err(CodecError::Corrupt(format!(
            "{} trailing bytes after session",
            reader.remaining()
        )));
    }
    Ok(snapshot)
}

pub fn write_session(
    writer: &mut DataWriter,
    session: &Session,
    worker_state: &[u8],
    version: i32,
) -> Result<(), CodecError> {
    check_version(version)?;

    writer.write_i64(session.creation_date());
    writer.write_string(session.id().as_str())?;
    writer.write_string(session.display_name())?;
    writer.write_string(session.user_name())?;
    writer.write_string(session.saved_model_name())?;
    if has_collections(version) {
        writer.write_string_list(session.collections())?;
    }
    writer.write_bytes(worker_state)?;
    write_chat_model(writer, session.chat(), version)
}

pub fn read_session(reader: &mut DataReader<'_>, version: i32) -> Result<SessionSnapshot, CodecError> {
    check_version(version)?;

    let creation_date = reader.read_i64()?;
    let id = SessionId::from(reader.read_string()?);
    let name = reader.read_string()?;
    let user_name = reader.read_string()?;
    let saved_model_name = reader.read_string()?;

    // Before version 2 this model family was saved with an incompatible
    // cache layout; there is no migration path.
    if version < 2 && saved_model_name.contains(LEGACY_INCOMPATIBLE_MARKER) {
        return Err(CodecError::IncompatibleLegacyModel {
            model: saved_model_name,
            version,
        });
    }

    let collections = if has_collections(version) {
        reader.read_string_list()?
    } else {
        Vec::new()
    };
    let worker_state = reader.read_bytes()?;
    let chat = read_chat_model(reader, version)?;

    Ok(SessionSnapshot {
        session: Session::restored(
            id,
            name,
            user_name,
            saved_model_name,
            creation_date,
            collections,
            chat,
        ),
        worker_state,
    })
}

fn write_chat_model(
    writer: &mut DataWriter,
    chat: &ChatModel,
    version: i32,
) -> Result<(), CodecError> {
    let count = i32::try_from(chat.len()).map_err(|_| CodecError::TooLarge("turn sequence"))?;
    writer.write_i32(count);
    for turn in chat.turns() {
        writer.write_i32(turn.id);
        writer.write_string(turn.role.label())?;
        writer.write_string(&turn.value)?;
        writer.write_string(&turn.prompt)?;
        writer.write_bool(turn.new_response);
        writer.write_bool(turn.current_response);
        writer.write_bool(turn.stopped);
        writer.write_bool(turn.thumbs_up);
        writer.write_bool(turn.thumbs_down);
        if has_collections(version) {
            writer.write_string(&turn.references)?;
            writer.write_string_list(&turn.references_context)?;
        }
    }
    Ok(())
}

fn read_chat_model(reader: &mut DataReader<'_>, version: i32) -> Result<ChatModel, CodecError> {
    let offset = reader.position();
    let count = reader.read_i32()?;
    let count = usize::try_from(count)
        .map_err(|_| CodecError::Corrupt(format!("negative turn count {count} at offset {offset}")))?;

    let mut turns = Vec::new();
    for _ in 0..count {
        turns.push(read_turn(reader, version)?);
    }
    Ok(ChatModel::from_turns(turns))
}

fn read_turn(reader: &mut DataReader<'_>, version: i32) -> Result<Turn, CodecError> {
    let id = reader.read_i32()?;
    let label_offset = reader.position();
    let label = reader.read_string()?;
    let role = TurnRole::from_label(&label).ok_or_else(|| {
        CodecError::Corrupt(format!("unknown turn label {label:?} at offset {label_offset}"))
    })?;
    let value = reader.read_string()?;
    let prompt = reader.read_string()?;
    let new_response = reader.read_bool()?;
    let current_response = reader.read_bool()?;
    let stopped = reader.read_bool()?;
    let thumbs_up = reader.read_bool()?;
    let thumbs_down = reader.read_bool()?;
    let (references, references_context) = if has_collections(version) {
        (reader.read_string()?, reader.read_string_list()?)
    } else {
        (String::new(), Vec::new())
    };

    Ok(Turn {
        id,
        role,
        value,
        prompt,
        new_response,
        current_response,
        stopped,
        thumbs_up,
        thumbs_down,
        references,
        references_context,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_session() -> Session {
        let mut session = Session::new();
        session.set_display_name("Rust Questions");
        session.set_saved_model_name("mistral-7b");
        session.add_collection("docs");
        let chat = session.chat_mut();
        chat.append_prompt("What is X?");
        chat.append_response("What is X?");
        chat.update_open_value("X is Y.");
        chat.finalize_open_response("\n\n---\n1. In a.txt.".into(), vec!["X is Y.".into()], false);
        session
    }

    #[test]
    fn round_trip_current_version() {
        let session = sample_session();
        let bytes = encode_session(&session, &[9, 9], CURRENT_FORMAT_VERSION).unwrap();
        let snapshot = decode_session(&bytes, CURRENT_FORMAT_VERSION).unwrap();
        assert_eq!(snapshot.session, session);
        assert_eq!(snapshot.worker_state, vec![9, 9]);
    }

    #[test]
    fn version_two_drops_collections_and_citations() {
        let session = sample_session();
        let bytes = encode_session(&session, &[], 2).unwrap();
        let restored = decode_session(&bytes, 2).unwrap().session;
        assert!(restored.collections().is_empty());
        assert!(restored.chat().turns()[1].references().is_empty());
        assert_eq!(restored.chat().turns()[1].value(), "X is Y.");
    }

    #[test]
    fn unknown_versions_are_refused() {
        let session = sample_session();
        for version in [0, CURRENT_FORMAT_VERSION + 1, -1] {
            assert_eq!(
                encode_session(&session, &[], version),
                Err(CodecError::UnsupportedVersion(version))
            );
            assert_eq!(
                decode_session(&[], version),
                Err(CodecError::UnsupportedVersion(version))
            );
        }
    }

    #[test]
    fn legacy_model_family_is_rejected_before_version_two() {
        let mut session = sample_session();
        session.set_saved_model_name("ggml-gpt4all-j-v1.3-groovy");
        let bytes = encode_session(&session, &[], 1).unwrap();
        let err = decode_session(&bytes, 1).unwrap_err();
        assert!(matches!(err, CodecError::IncompatibleLegacyModel { version: 1, .. }));

        let bytes = encode_session(&session, &[], 2).unwrap();
        assert!(decode_session(&bytes, 2).is_ok());
    }

    #[test]
    fn truncated_stream_fails() {
        let bytes = encode_session(&sample_session(), &[1, 2, 3], CURRENT_FORMAT_VERSION).unwrap();
        for cut in [0, 5, bytes.len() / 2, bytes.len() - 1] {
            assert!(decode_session(&bytes[..cut], CURRENT_FORMAT_VERSION).is_err());
        }
    }

    #[test]
    fn trailing_bytes_are_corrupt() {
        let mut bytes = encode_session(&sample_session(), &[], CURRENT_FORMAT_VERSION).unwrap();
        bytes.push(0);
        assert!(matches!(
            decode_session(&bytes, CURRENT_FORMAT_VERSION),
            Err(CodecError::Corrupt(_))
        ));
    }

    #[test]
    fn unknown_turn_label_is_corrupt() {
        let mut w = DataWriter::new();
        w.write_i32(1);
        w.write_i32(0);
        w.write_string("Assistant: ").unwrap();
        let bytes = w.into_bytes();
        let mut r = DataReader::new(&bytes);
        assert!(matches!(read_chat_model(&mut r, 3), Err(CodecError::Corrupt(_))));
    }

    fn arb_turn() -> impl Strategy<Value = Turn> {
        (
            any::<bool>(),
            ".{0,24}",
            ".{0,12}",
            prop::array::uniform5(any::<bool>()),
            ".{0,24}",
            prop::collection::vec(".{0,16}", 0..3),
        )
            .prop_map(|(is_prompt, value, prompt, flags, references, context)| Turn {
                id: 0,
                role: if is_prompt { TurnRole::Prompt } else { TurnRole::Response },
                value,
                prompt,
                new_response: flags[0],
                current_response: flags[1],
                stopped: flags[2],
                thumbs_up: flags[3],
                thumbs_down: flags[4],
                references,
                references_context: context,
            })
    }

    fn arb_session() -> impl Strategy<Value = Session> {
        (
            any::<i64>(),
            "[a-f0-9-]{1,36}",
            ".{0,20}",
            ".{0,20}",
            "[a-z0-9.-]{0,24}",
            prop::collection::vec("[a-z]{1,8}", 0..4),
            prop::collection::vec(arb_turn(), 0..6),
        )
            .prop_map(|(created, id, name, user, model, collections, turns)| {
                let turns = turns
                    .into_iter()
                    .enumerate()
                    .map(|(i, mut t)| {
                        t.id = i as i32;
                        t
                    })
                    .collect();
                Session::restored(
                    SessionId::from(id),
                    name,
                    user,
                    model,
                    created,
                    collections,
                    ChatModel::from_turns(turns),
                )
            })
    }

    /// What survives a save at `version`.
    fn persisted_view(session: &Session, version: i32) -> Session {
        if has_collections(version) {
            return session.clone();
        }
        let turns = session
            .chat()
            .turns()
            .iter()
            .cloned()
            .map(|mut t| {
                t.references.clear();
                t.references_context.clear();
                t
            })
            .collect();
        Session::restored(
            session.id().clone(),
            session.display_name().to_string(),
            session.user_name().to_string(),
            session.saved_model_name().to_string(),
            session.creation_date(),
            Vec::new(),
            ChatModel::from_turns(turns),
        )
    }

    proptest! {
        #[test]
        fn round_trip_every_supported_version(
            session in arb_session(),
            worker_state in prop::collection::vec(any::<u8>(), 0..32),
            version in 2..=CURRENT_FORMAT_VERSION,
        ) {
            let bytes = encode_session(&session, &worker_state, version).unwrap();
            let snapshot = decode_session(&bytes, version).unwrap();
            prop_assert_eq!(&snapshot.session, &persisted_view(&session, version));
            prop_assert_eq!(&snapshot.worker_state, &worker_state);

            let again = encode_session(&snapshot.session, &snapshot.worker_state, version).unwrap();
            prop_assert_eq!(again, bytes);
        }

        #[test]
        fn round_trip_version_one_without_legacy_model(
            session in arb_session(),
        ) {
            prop_assume!(!session.saved_model_name().contains(LEGACY_INCOMPATIBLE_MARKER));
            let bytes = encode_session(&session, &[], 1).unwrap();
            let snapshot = decode_session(&bytes, 1).unwrap();
            prop_assert_eq!(snapshot.session, persisted_view(&session, 1));
        }
    }
}
