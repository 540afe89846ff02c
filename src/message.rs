use serde::{Deserialize, Serialize};

/// A message in a run's conversation, containing a role and text content.
///
/// Messages are the primary data structure for the conversational channel:
/// user requests, assistant turns, system instructions, and the results of
/// executed tools all flow through it.
///
/// # Examples
///
/// ```
/// use codeloom::message::Message;
///
/// let user_msg = Message::user("Fix the failing test in parser.rs");
/// let assistant_msg = Message::assistant("Looking at the test output now.");
/// let tool_msg = Message::tool("shell", "2 passed; 0 failed");
///
/// assert!(user_msg.has_role(Message::USER));
/// assert_eq!(tool_msg.role, "tool");
/// ```
///
/// # Serialization
///
/// Messages implement `Serialize` and `Deserialize` so they round-trip
/// through checkpoints unchanged:
/// ```
/// use codeloom::message::Message;
///
/// let msg = Message::user("test");
/// let json = serde_json::to_string(&msg).unwrap();
/// let parsed: Message = serde_json::from_str(&json).unwrap();
/// assert_eq!(msg, parsed);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender (e.g., "user", "assistant", "tool").
    ///
    /// Use the constants on [`Message`] for standardized values.
    pub role: String,
    /// The text content of the message.
    pub content: String,
    /// Name of the tool that produced this message, for `tool` role entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    /// User input message role.
    pub const USER: &'static str = "user";
    /// AI assistant response message role.
    pub const ASSISTANT: &'static str = "assistant";
    /// System prompt or instruction message role.
    pub const SYSTEM: &'static str = "system";
    /// Tool execution result message role.
    pub const TOOL: &'static str = "tool";

    /// Creates a new message with the specified role and content.
    #[must_use]
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            tool_name: None,
        }
    }

    /// Creates a user message with the specified content.
    #[must_use]
    pub fn user(content: &str) -> Self {
        Self::new(Self::USER, content)
    }

    /// Creates an assistant message with the specified content.
    #[must_use]
    pub fn assistant(content: &str) -> Self {
        Self::new(Self::ASSISTANT, content)
    }

    /// Creates a system message with the specified content.
    #[must_use]
    pub fn system(content: &str) -> Self {
        Self::new(Self::SYSTEM, content)
    }

    /// Creates a tool-result message attributed to the named tool.
    ///
    /// # Examples
    /// ```
    /// use codeloom::message::Message;
    ///
    /// let msg = Message::tool("read_file", "fn main() {}");
    /// assert_eq!(msg.role, "tool");
    /// assert_eq!(msg.tool_name.as_deref(), Some("read_file"));
    /// ```
    #[must_use]
    pub fn tool(tool_name: &str, content: &str) -> Self {
        Self {
            role: Self::TOOL.to_string(),
            content: content.to_string(),
            tool_name: Some(tool_name.to_string()),
        }
    }

    /// Returns true if this message has the specified role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }

    /// Creates a message from a typed [`Role`].
    #[must_use]
    pub fn with_role(role: Role, content: &str) -> Self {
        Self::new(role.as_str(), content)
    }
}

/// Standard roles as a typed enum for APIs that want exhaustiveness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    /// The canonical string form of this role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => Message::USER,
            Role::Assistant => Message::ASSISTANT,
            Role::System => Message::SYSTEM,
            Role::Tool => Message::TOOL,
        }
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        match s {
            Message::ASSISTANT => Role::Assistant,
            Message::SYSTEM => Role::System,
            Message::TOOL => Role::Tool,
            _ => Role::User,
        }
    }
}
