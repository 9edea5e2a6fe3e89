//! Model Context Protocol server interface.
//!
//! This crate treats an MCP server as an external collaborator: it defines
//! the contract an [`Mcp`] implementation must satisfy (list tools, call a
//! tool, decide whether results should be passed through as structured
//! content) without implementing MCP's own transport, handshake, or
//! serialization. A concrete stdio/HTTP MCP client lives outside this crate
//! and is handed to an [`Agent`](crate::agent::Agent) as `Arc<dyn Mcp>`.

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::ToolDefinition;
use crate::error::Result;

/// An MCP server's tool list, filtered to what an agent is allowed to see.
///
/// Static allow/block lists are checked first; a dynamic predicate (when
/// present) runs last and can veto anything the static lists would
/// otherwise permit.
#[derive(Debug, Clone, Default)]
pub struct ToolFilter {
    /// If non-empty, only tools named here are exposed.
    pub allowed: Vec<String>,
    /// Tools named here are always excluded, even if in `allowed`.
    pub blocked: Vec<String>,
}

impl ToolFilter {
    /// A filter that passes every tool through unchanged.
    #[must_use]
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Restrict to an explicit allow-list.
    #[must_use]
    pub fn allow_only(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allowed: names.into_iter().map(Into::into).collect(),
            blocked: Vec::new(),
        }
    }

    /// Exclude an explicit block-list.
    #[must_use]
    pub fn block(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allowed: Vec::new(),
            blocked: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether a tool named `name` passes this filter.
    #[must_use]
    pub fn permits(&self, name: &str) -> bool {
        if self.blocked.iter().any(|b| b == name) {
            return false;
        }
        self.allowed.is_empty() || self.allowed.iter().any(|a| a == name)
    }

    /// Apply this filter to a tool list, keeping only permitted entries.
    #[must_use]
    pub fn apply(&self, tools: Vec<ToolDefinition>) -> Vec<ToolDefinition> {
        tools.into_iter().filter(|t| self.permits(&t.name)).collect()
    }
}

/// The raw result of one MCP tool call, before it is normalized to the
/// output string the model sees.
///
/// MCP results carry a list of content items (text, image, or embedded
/// resource blocks, each already JSON-valued by the time they reach this
/// crate) and, optionally, a separate structured-content payload the server
/// produced alongside them.
#[derive(Debug, Clone, Default)]
pub struct McpToolResult {
    /// Content items returned by the call, in server-emitted order.
    pub content: Vec<Value>,
    /// Structured content, if the server returned any in addition to `content`.
    pub structured_content: Option<Value>,
}

impl McpToolResult {
    /// A result carrying a single content item and nothing else.
    #[must_use]
    pub fn single(item: Value) -> Self {
        Self {
            content: vec![item],
            structured_content: None,
        }
    }
}

/// Normalize an MCP tool result to the output string fed back to the model.
///
/// Preference order: structured content, if `use_structured` requests it and
/// the server provided any; otherwise a single content item's JSON verbatim;
/// otherwise the whole content array's JSON; otherwise `"[]"` when the
/// server returned nothing at all.
#[must_use]
pub fn normalize_mcp_result(result: &McpToolResult, use_structured: bool) -> String {
    if use_structured {
        if let Some(structured) = &result.structured_content {
            return structured.to_string();
        }
    }
    match result.content.as_slice() {
        [] => "[]".to_owned(),
        [single] => single.to_string(),
        many => serde_json::to_value(many)
            .unwrap_or(Value::Null)
            .to_string(),
    }
}

/// An external MCP server this agent can draw tools from.
///
/// Implementations own the protocol's transport and wire format; this
/// crate's turn driver only needs to list tools and call one by name.
#[async_trait]
pub trait Mcp: Send + Sync {
    /// A human-readable name for this server, used in tracing.
    fn name(&self) -> &str;

    /// List the tools this server currently exposes.
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>>;

    /// Call a tool by name with the given arguments, returning its raw,
    /// un-normalized result. Callers normalize it via
    /// [`normalize_mcp_result`], consulting [`Self::use_structured_content`].
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<McpToolResult>;

    /// Whether this server's tool results should be normalized from
    /// structured content (parsed JSON) rather than the plain content array
    /// when fed back to the model.
    fn use_structured_content(&self) -> bool {
        false
    }
}
