//! Wire-level message and run-item types.
//!
//! This module defines the vocabulary shared by every other component: the
//! [`Message`] shape sent to and received from a model, the [`Input`] a
//! caller hands to a runner, and the [`RunItem`] records a run produces as
//! it works through a turn.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::AgentRef;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message providing instructions.
    System,
    /// Developer message (distinct from `System` for backends that expose
    /// the two separately; otherwise treated identically).
    Developer,
    /// User message.
    User,
    /// Assistant (model) message.
    Assistant,
    /// Tool response message.
    Tool,
}

impl Role {
    /// Get the string representation of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Developer => "developer",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// Content of a message, which can be text, image, or other types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
    /// Image URL content.
    ImageUrl {
        /// The image URL (or a base64 data URL).
        url: String,
    },
}

impl Content {
    /// Create a new text content block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create a new image-url content block.
    #[must_use]
    pub fn image_url(url: impl Into<String>) -> Self {
        Self::ImageUrl { url: url.into() }
    }

    /// Get the text content if this is a text block.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::ImageUrl { .. } => None,
        }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for the tool call, referenced by its eventual output.
    pub id: String,
    /// Name of the tool (or handoff) being invoked.
    pub name: String,
    /// Arguments, as the model produced them (a JSON string or JSON value).
    pub arguments: Value,
}

impl ToolCall {
    /// Create a new tool call.
    #[must_use]
    pub fn function(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Parse the arguments as a typed value.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments are not valid JSON for `T`.
    pub fn parse_arguments<T: for<'de> Deserialize<'de>>(&self) -> serde_json::Result<T> {
        match &self.arguments {
            Value::String(s) => serde_json::from_str(s),
            other => serde_json::from_value(other.clone()),
        }
    }

    /// Get the arguments as a JSON string, regardless of how they were stored.
    #[must_use]
    pub fn arguments_string(&self) -> String {
        match &self.arguments {
            Value::String(s) => s.clone(),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }
}

/// A chat message exchanged with a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender.
    pub role: Role,
    /// Content of the message (absent for pure tool-call assistant messages).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<Content>>,
    /// Tool calls made by the model (assistant messages only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// The tool call this message responds to (tool messages only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Create a new system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role_text(Role::System, content)
    }

    /// Create a new developer message.
    #[must_use]
    pub fn developer(content: impl Into<String>) -> Self {
        Self::with_role_text(Role::Developer, content)
    }

    /// Create a new user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role_text(Role::User, content)
    }

    /// Create a new assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role_text(Role::Assistant, content)
    }

    /// Create a new assistant message carrying only tool calls (no text).
    #[must_use]
    pub const fn assistant_with_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    /// Create a new tool response message.
    #[must_use]
    pub fn tool_response(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(vec![Content::text(content)]),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn with_role_text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(vec![Content::text(content)]),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Get the concatenated text content of the message.
    #[must_use]
    pub fn text_content(&self) -> Option<String> {
        self.content.as_ref().map(|contents| {
            contents
                .iter()
                .filter_map(Content::as_text)
                .collect::<Vec<_>>()
                .join("")
        })
    }

    /// Check if this message has tool calls.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls
            .as_ref()
            .is_some_and(|calls| !calls.is_empty())
    }
}

/// A single wire-level input item, as accepted by a model or produced by a
/// prior run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputItem {
    /// A plain message (user, assistant, system, developer).
    Message(Message),
    /// A record of a tool (or handoff) call the model requested.
    ToolCall(ToolCall),
    /// The output produced for a prior tool call.
    ToolCallOutput {
        /// The id of the [`ToolCall`] this is the output of.
        call_id: String,
        /// The tool's output, serialized to a string.
        output: String,
    },
    /// A reasoning block, passed through unchanged.
    Reasoning {
        /// Opaque, backend-specific reasoning payload.
        content: Value,
    },
    /// A reference to an item already present in a session or prior
    /// response, rather than an inline copy of it.
    ItemReference {
        /// The referenced item's id.
        id: String,
    },
    /// A backend-specific item with no dedicated shape above (a hosted
    /// file-search, web-search, computer-use, image-generation, or
    /// code-interpreter call). Carried verbatim so replaying a conversation
    /// stays lossless even for items this crate doesn't interpret.
    Raw(Value),
}

impl InputItem {
    /// Wrap a message as an input item.
    #[must_use]
    pub const fn message(message: Message) -> Self {
        Self::Message(message)
    }
}

/// The input to a run: either a single string (shorthand for one user
/// message) or an explicit, ordered list of wire-level items.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Input {
    /// Shorthand for `Items(vec![InputItem::message(Message::user(text))])`.
    Text(String),
    /// An explicit, ordered list of input items.
    Items(Vec<InputItem>),
}

impl Input {
    /// Project this input to an explicit list of items.
    #[must_use]
    pub fn into_items(self) -> Vec<InputItem> {
        match self {
            Self::Text(text) => vec![InputItem::message(Message::user(text))],
            Self::Items(items) => items,
        }
    }

    /// Borrowing equivalent of [`Input::into_items`].
    #[must_use]
    pub fn to_items(&self) -> Vec<InputItem> {
        self.clone().into_items()
    }

    /// Returns `true` if this is the `Items` variant. A configured
    /// [`Session`](crate::session::Session) rejects ambiguous string input
    /// once history exists, so callers should check this first.
    #[must_use]
    pub const fn is_items(&self) -> bool {
        matches!(self, Self::Items(_))
    }
}

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Input {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<InputItem>> for Input {
    fn from(value: Vec<InputItem>) -> Self {
        Self::Items(value)
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::assistant(String::new())
    }
}

/// A structured record of something that happened during a run.
///
/// Every run-item belongs to exactly one agent (the agent that was current
/// when it was produced) and knows how to project itself back into an
/// [`InputItem`] for the next turn or a replayed run.
#[derive(Debug, Clone)]
pub enum RunItem {
    /// A plain message emitted by the model.
    MessageOutput {
        /// The agent that produced this item.
        agent: AgentRef,
        /// The raw message.
        raw: Message,
    },
    /// A record of a function-tool call the model requested.
    ToolCallItem {
        /// The agent that produced this item.
        agent: AgentRef,
        /// The raw tool call.
        raw: ToolCall,
    },
    /// The output of a function-tool call.
    ToolCallOutputItem {
        /// The agent that produced this item.
        agent: AgentRef,
        /// The id of the tool call this answers.
        call_id: String,
        /// The tool's output, serialized to a string.
        output: String,
    },
    /// A record of a handoff call the model requested.
    HandoffCallItem {
        /// The source agent of the handoff.
        agent: AgentRef,
        /// The raw handoff call.
        raw: ToolCall,
    },
    /// The output of a handoff call: the acknowledgement the next agent sees.
    HandoffOutputItem {
        /// The source agent of the handoff.
        agent: AgentRef,
        /// The id of the handoff call this answers.
        call_id: String,
        /// The next agent's name, surfaced to the model as the tool result.
        output: String,
    },
    /// A reasoning block, passed through unchanged.
    ReasoningItem {
        /// The agent that produced this item.
        agent: AgentRef,
        /// Opaque, backend-specific reasoning payload.
        raw: Value,
    },
    /// A hosted tool call the model backend executed itself (file search,
    /// web search, computer use, image generation, code interpreter). No
    /// local invocation happens for these; the item is recorded as-is.
    HostedToolCallItem {
        /// The agent that produced this item.
        agent: AgentRef,
        /// The backend-assigned id of the call.
        item_id: String,
        /// The full wire-level item, serialized verbatim.
        raw: Value,
    },
}

impl RunItem {
    /// The agent that produced this item.
    #[must_use]
    pub fn agent(&self) -> &AgentRef {
        match self {
            Self::MessageOutput { agent, .. }
            | Self::ToolCallItem { agent, .. }
            | Self::ToolCallOutputItem { agent, .. }
            | Self::HandoffCallItem { agent, .. }
            | Self::HandoffOutputItem { agent, .. }
            | Self::ReasoningItem { agent, .. }
            | Self::HostedToolCallItem { agent, .. } => agent,
        }
    }

    /// Project this run-item back into the input item the next turn (or a
    /// replay of this run) should see.
    #[must_use]
    pub fn to_input_item(&self) -> InputItem {
        match self {
            Self::MessageOutput { raw, .. } => InputItem::message(raw.clone()),
            Self::ToolCallItem { raw, .. } | Self::HandoffCallItem { raw, .. } => {
                InputItem::ToolCall(raw.clone())
            }
            Self::ToolCallOutputItem {
                call_id, output, ..
            }
            | Self::HandoffOutputItem {
                call_id, output, ..
            } => InputItem::ToolCallOutput {
                call_id: call_id.clone(),
                output: output.clone(),
            },
            Self::ReasoningItem { raw, .. } => InputItem::Reasoning {
                content: raw.clone(),
            },
            Self::HostedToolCallItem { raw, .. } => InputItem::Raw(raw.clone()),
        }
    }
}

/// Project an original input plus the new items generated so far into the
/// list a fresh run (or the next turn) should see.
///
/// The replay invariant requires that feeding `to_input_list(original,
/// items)` into a new run reproduces the same conversation state.
#[must_use]
pub fn to_input_list(original: &Input, items: &[RunItem]) -> Vec<InputItem> {
    let mut list = original.to_items();
    list.extend(items.iter().map(RunItem::to_input_item));
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use std::sync::Arc;

    #[test]
    fn text_input_projects_to_single_user_message() {
        let input: Input = "hello".into();
        let items = input.into_items();
        assert_eq!(items.len(), 1);
        assert!(matches!(&items[0], InputItem::Message(m) if m.role == Role::User));
    }

    #[test]
    fn message_round_trips_text() {
        let message = Message::user("hi there");
        assert_eq!(message.text_content().as_deref(), Some("hi there"));
        assert!(!message.has_tool_calls());
    }

    #[test]
    fn assistant_tool_calls_has_no_text() {
        let message = Message::assistant_with_tool_calls(vec![ToolCall::function(
            "call_1",
            "foo",
            serde_json::json!({"a": "b"}),
        )]);
        assert!(message.has_tool_calls());
        assert!(message.text_content().is_none());
    }

    #[test]
    fn tool_call_parses_string_and_object_arguments() {
        let string_args = ToolCall::function("1", "foo", serde_json::json!("{\"a\":1}"));
        let object_args = ToolCall::function("2", "foo", serde_json::json!({"a": 1}));

        #[derive(Deserialize)]
        struct Args {
            a: i32,
        }

        assert_eq!(string_args.parse_arguments::<Args>().unwrap().a, 1);
        assert_eq!(object_args.parse_arguments::<Args>().unwrap().a, 1);
    }

    #[test]
    fn to_input_list_concatenates_original_and_projected_items() {
        let agent: AgentRef = Arc::new(Agent::new("test"));
        let original: Input = "question".into();
        let items = vec![RunItem::MessageOutput {
            agent,
            raw: Message::assistant("answer"),
        }];

        let list = to_input_list(&original, &items);
        assert_eq!(list.len(), 2);
        assert!(matches!(&list[1], InputItem::Message(m) if m.role == Role::Assistant));
    }

    #[test]
    fn is_items_distinguishes_variants() {
        assert!(!Input::from("hi").is_items());
        assert!(Input::from(Vec::<InputItem>::new()).is_items());
    }

    #[test]
    fn hosted_tool_call_projects_to_raw_input_item() {
        let agent: AgentRef = Arc::new(Agent::new("test"));
        let item = RunItem::HostedToolCallItem {
            agent,
            item_id: "ws_1".into(),
            raw: serde_json::json!({"type": "web_search_call", "id": "ws_1"}),
        };
        assert!(matches!(item.to_input_item(), InputItem::Raw(_)));
    }
}
