//! `parley inspect`: print a saved session file.

use anyhow::{Context, Result};
use parley_domain::{Session, TurnRole, decode_session};
use parley_infrastructure::read_session_file;
use std::fmt::Write as _;
use std::path::Path;

pub fn run(path: &Path) -> Result<()> {
    let stored =
        read_session_file(path).with_context(|| format!("reading {}", path.display()))?;
    let snapshot = decode_session(&stored.body, stored.version)
        .with_context(|| format!("decoding {}", path.display()))?;
    print!(
        "{}",
        render(&snapshot.session, stored.version, snapshot.worker_state.len())
    );
    Ok(())
}

fn render(session: &Session, version: i32, worker_state_len: usize) -> String {
    let created = chrono::DateTime::from_timestamp(session.creation_date(), 0)
        .map(|d| d.to_rfc3339())
        .unwrap_or_else(|| session.creation_date().to_string());

    let mut out = String::new();
    let _ = writeln!(out, "Session:      {}", session.id());
    let _ = writeln!(out, "Name:         {}", session.name());
    let _ = writeln!(out, "Created:      {created}");
    let _ = writeln!(out, "Model:        {}", session.saved_model_name());
    let _ = writeln!(out, "Format:       v{version}");
    if !session.collections().is_empty() {
        let _ = writeln!(out, "Collections:  {}", session.collections().join(", "));
    }
    let _ = writeln!(out, "Worker state: {worker_state_len} bytes");
    let _ = writeln!(out);

    for turn in session.chat().turns() {
        let who = match turn.role() {
            TurnRole::Prompt => "you",
            TurnRole::Response => "model",
        };
        let _ = writeln!(out, "[{}] {who}: {}", turn.id(), turn.value());
        if turn.was_stopped() {
            let _ = writeln!(out, "    (stopped)");
        }
        for line in turn.references().lines().filter(|l| !l.trim().is_empty()) {
            let _ = writeln!(out, "    {line}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lists_turns() {
        let mut session = Session::new();
        session.add_collection("notes");
        session.chat_mut().append_prompt("What is X?");
        session.chat_mut().append_response("What is X?");
        session.chat_mut().update_open_value("X is Y.");

        let text = render(&session, 3, 12);
        assert!(text.contains("Collections:  notes"));
        assert!(text.contains("Worker state: 12 bytes"));
        assert!(text.contains("[0] you: What is X?"));
        assert!(text.contains("[1] model: X is Y."));
    }
}
