//! Turns and the turn sequence of a chat session.
//!
//! A [`ChatModel`] is append-only with one exception: the trailing response
//! turn stays *open* while its response is being generated and accepts
//! in-place updates. Finalizing the response closes it; after that it only
//! changes again if it is explicitly reopened for regeneration.

use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TurnRole {
    Prompt,
    Response,
}

impl TurnRole {
    /// Label persisted alongside each turn.
    pub fn label(&self) -> &'static str {
        match self {
            TurnRole::Prompt => "Prompt: ",
            TurnRole::Response => "Response: ",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Prompt: " => Some(TurnRole::Prompt),
            "Response: " => Some(TurnRole::Response),
            _ => None,
        }
    }
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnRole::Prompt => write!(f, "prompt"),
            TurnRole::Response => write!(f, "response"),
        }
    }
}

/// A single entry in the turn sequence (Entity)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub(crate) id: i32,
    pub(crate) role: TurnRole,
    pub(crate) value: String,
    pub(crate) prompt: String,
    pub(crate) new_response: bool,
    pub(crate) current_response: bool,
    pub(crate) stopped: bool,
    pub(crate) thumbs_up: bool,
    pub(crate) thumbs_down: bool,
    pub(crate) references: String,
    pub(crate) references_context: Vec<String>,
}

impl Turn {
    fn new(id: i32, role: TurnRole) -> Self {
        Self {
            id,
            role,
            value: String::new(),
            prompt: String::new(),
            new_response: false,
            current_response: false,
            stopped: false,
            thumbs_up: false,
            thumbs_down: false,
            references: String::new(),
            references_context: Vec::new(),
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn role(&self) -> TurnRole {
        self.role
    }

    /// The displayed text: the prompt for prompt turns, the (partial)
    /// response for response turns.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The prompt a response turn answers.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn is_new_response(&self) -> bool {
        self.new_response
    }

    /// Whether this turn is open for in-place updates.
    pub fn is_open(&self) -> bool {
        self.current_response
    }

    /// Whether generation of this response was interrupted by the user.
    pub fn was_stopped(&self) -> bool {
        self.stopped
    }

    pub fn thumbs_up(&self) -> bool {
        self.thumbs_up
    }

    pub fn thumbs_down(&self) -> bool {
        self.thumbs_down
    }

    pub fn references(&self) -> &str {
        &self.references
    }

    pub fn references_context(&self) -> &[String] {
        &self.references_context
    }
}

/// Ordered turn sequence of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatModel {
    turns: Vec<Turn>,
}

impl ChatModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_turns(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    fn next_id(&self) -> i32 {
        i32::try_from(self.turns.len()).unwrap_or(i32::MAX)
    }

    /// Append a closed prompt turn.
    pub fn append_prompt(&mut self, prompt: impl Into<String>) -> i32 {
        let id = self.next_id();
        let mut turn = Turn::new(id, TurnRole::Prompt);
        turn.value = prompt.into();
        self.turns.push(turn);
        id
    }

    /// Append an open, empty response turn answering `prompt`.
    pub fn append_response(&mut self, prompt: impl Into<String>) -> i32 {
        let id = self.next_id();
        let mut turn = Turn::new(id, TurnRole::Response);
        turn.prompt = prompt.into();
        turn.new_response = true;
        turn.current_response = true;
        self.turns.push(turn);
        id
    }

    fn open_response_mut(&mut self) -> Option<&mut Turn> {
        self.turns
            .last_mut()
            .filter(|t| t.role == TurnRole::Response && t.current_response)
    }

    /// The trailing turn, if it is an open response.
    pub fn open_response(&self) -> Option<&Turn> {
        self.turns
            .last()
            .filter(|t| t.role == TurnRole::Response && t.current_response)
    }

    /// Overwrite the text of the open response. Returns `false` when there
    /// is no open response turn.
    pub fn update_open_value(&mut self, value: impl Into<String>) -> bool {
        match self.open_response_mut() {
            Some(turn) => {
                turn.value = value.into();
                true
            }
            None => false,
        }
    }

    /// Attach citations to the open response and close it.
    pub fn finalize_open_response(
        &mut self,
        references: String,
        references_context: Vec<String>,
        stopped: bool,
    ) -> bool {
        match self.open_response_mut() {
            Some(turn) => {
                turn.references = references;
                turn.references_context = references_context;
                turn.stopped = stopped;
                turn.current_response = false;
                true
            }
            None => false,
        }
    }

    /// Close the trailing response without touching its content.
    pub fn close_current_response(&mut self) {
        if let Some(turn) = self.open_response_mut() {
            turn.current_response = false;
        }
    }

    /// Reopen the trailing response so it can be generated again.
    ///
    /// Clears its text and citations. Returns `false` when the last turn is
    /// not a response.
    pub fn reopen_last_response(&mut self) -> bool {
        match self.turns.last_mut() {
            Some(turn) if turn.role == TurnRole::Response => {
                turn.value.clear();
                turn.references.clear();
                turn.references_context.clear();
                turn.stopped = false;
                turn.current_response = true;
                true
            }
            _ => false,
        }
    }

    /// Record thumbs up/down feedback on a response turn.
    pub fn set_feedback(&mut self, index: usize, thumbs_up: bool, thumbs_down: bool) -> bool {
        match self.turns.get_mut(index) {
            Some(turn) if turn.role == TurnRole::Response => {
                turn.thumbs_up = thumbs_up;
                turn.thumbs_down = thumbs_down && !thumbs_up;
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
