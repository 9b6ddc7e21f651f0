//! Session domain entities

use super::turn::ChatModel;
use serde::{Deserialize, Serialize};

/// Display name of a freshly created session.
pub const DEFAULT_SESSION_NAME: &str = "New Chat";
/// Display name of a server-driven session.
pub const SERVER_SESSION_NAME: &str = "Server Chat";

/// Opaque unique session identifier (Value Object)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chat session (Entity)
///
/// Holds the identity, naming, retrieval scopes and the turn sequence of one
/// conversation. Identity fields are fixed at construction except the id
/// (changed only by [`Session::regenerate_id`]), the display and user names,
/// and the saved model name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    name: String,
    user_name: String,
    saved_model_name: String,
    creation_date: i64,
    collections: Vec<String>,
    chat: ChatModel,
    is_server: bool,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: SessionId::generate(),
            name: DEFAULT_SESSION_NAME.to_string(),
            user_name: String::new(),
            saved_model_name: String::new(),
            creation_date: chrono::Utc::now().timestamp(),
            collections: Vec::new(),
            chat: ChatModel::new(),
            is_server: false,
        }
    }

    /// A session whose prompts are driven by an external API server.
    pub fn new_server() -> Self {
        Self {
            name: SERVER_SESSION_NAME.to_string(),
            is_server: true,
            ..Self::new()
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restored(
        id: SessionId,
        name: String,
        user_name: String,
        saved_model_name: String,
        creation_date: i64,
        collections: Vec<String>,
        chat: ChatModel,
    ) -> Self {
        Self {
            id,
            name,
            user_name,
            saved_model_name,
            creation_date,
            collections,
            chat,
            is_server: false,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Replace the id. Only a full session reset does this.
    pub fn regenerate_id(&mut self) -> &SessionId {
        self.id = SessionId::generate();
        &self.id
    }

    /// Name shown to the user: the user-assigned name when set, otherwise
    /// the system-assigned display name.
    pub fn name(&self) -> &str {
        if self.user_name.is_empty() {
            &self.name
        } else {
            &self.user_name
        }
    }

    /// System-assigned display name (default or generated).
    pub fn display_name(&self) -> &str {
        &self.name
    }

    pub fn set_display_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn set_user_name(&mut self, name: impl Into<String>) {
        self.user_name = name.into();
    }

    pub fn saved_model_name(&self) -> &str {
        &self.saved_model_name
    }

    pub fn set_saved_model_name(&mut self, name: impl Into<String>) {
        self.saved_model_name = name.into();
    }

    /// Creation time in seconds since the Unix epoch.
    pub fn creation_date(&self) -> i64 {
        self.creation_date
    }

    pub fn collections(&self) -> &[String] {
        &self.collections
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.iter().any(|c| c == name)
    }

    /// Enable a retrieval collection. Returns `false` if already enabled.
    pub fn add_collection(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.has_collection(&name) {
            return false;
        }
        self.collections.push(name);
        true
    }

    /// Disable a retrieval collection. Returns `false` if it was not enabled.
    pub fn remove_collection(&mut self, name: &str) -> bool {
        let before = self.collections.len();
        self.collections.retain(|c| c != name);
        before != self.collections.len()
    }

    pub fn chat(&self) -> &ChatModel {
        &self.chat
    }

    pub fn chat_mut(&mut self) -> &mut ChatModel {
        &mut self.chat
    }

    pub fn is_server(&self) -> bool {
        self.is_server
    }

    /// Adopt the persisted fields of `restored`, keeping this session's
    /// server flag.
    pub fn adopt(&mut self, restored: Session) {
        let is_server = self.is_server;
        *self = Session {
            is_server,
            ..restored
        };
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
