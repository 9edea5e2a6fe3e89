//! Classifies a model response into the message/tool-call/handoff vocabulary
//! the side-effects executor and turn driver act on.
//!
//! [`process_response`] walks a [`ModelResponse`]'s output items in emission
//! order and sorts each into a function-tool call, an MCP-tool call, a
//! handoff call, a hosted-tool call record, a reasoning item, or a plain
//! message, producing a [`ProcessedResponse`]. It also resolves the handful
//! of tie-break rules a turn loop needs before it can decide what happens
//! next: which message (if any) is the final output candidate, and which
//! handoff (if more than one was requested) is actually honored.

use serde_json::Value;

use crate::agent::{Agent, Handoff, OutputSchema};
use crate::error::{Error, Result};
use crate::message::{Role, RunItem, ToolCall};
use crate::model::{ModelResponse, ResponseOutputItem};

/// A tool call routed through an MCP server, pending local invocation.
#[derive(Debug, Clone)]
pub struct McpToolCall {
    /// Backend-assigned item id.
    pub item_id: String,
    /// Id used to correlate this call with its eventual output.
    pub call_id: String,
    /// Name of the MCP server the call was routed to.
    pub server: String,
    /// Name of the tool invoked on that server.
    pub name: String,
    /// Arguments, as the model produced them.
    pub arguments: Value,
}

/// The result of classifying one [`ModelResponse`] against the agent that
/// produced it.
///
/// Every output item becomes exactly one entry in `new_items`, in the order
/// the model emitted it; `function_calls`, `mcp_calls`, and `handoff` are
/// views into that same set, picked out for the executor to act on.
#[derive(Debug, Default)]
pub struct ProcessedResponse {
    /// Run items for every output item in the response, in emission order.
    pub new_items: Vec<RunItem>,
    /// Function-tool calls pending local invocation.
    pub function_calls: Vec<ToolCall>,
    /// MCP-tool calls pending local invocation.
    pub mcp_calls: Vec<McpToolCall>,
    /// The handoff call honored this turn, if any requested one, paired
    /// with the [`Handoff`] it resolved to. At most one handoff is ever
    /// honored per turn even if the model requested several.
    pub handoff: Option<(ToolCall, Handoff)>,
    /// Handoff calls beyond the first, requested in the same turn but not
    /// honored. The executor still owes each of these a tool output so the
    /// conversation stays well-formed.
    pub extra_handoff_calls: Vec<ToolCall>,
    /// Names of tools and handoffs invoked this turn, in call order. Used
    /// by the turn driver to decide whether `Agent::reset_tool_choice`
    /// should clear a forced `ToolChoice` before the next turn.
    pub tools_used: Vec<String>,
    /// The final-output candidate, if the response contains a message (or,
    /// with a structured `output_type`, a message whose text parses as
    /// JSON). Tie-break: the last message in emission order that qualifies
    /// wins, demoting any earlier candidate to a plain message item.
    pub final_output: Option<Value>,
}

impl ProcessedResponse {
    /// Returns `true` if the response requested at least one local tool
    /// invocation (function or MCP) or a handoff.
    #[must_use]
    pub fn has_pending_tool_calls(&self) -> bool {
        !self.function_calls.is_empty() || !self.mcp_calls.is_empty() || self.handoff.is_some()
    }

    /// Returns `true` if `final_output` is set and no tool calls or handoff
    /// are pending — the one unambiguous "the run is done" case.
    #[must_use]
    pub fn has_final_output_with_no_pending_tools(&self) -> bool {
        self.final_output.is_some() && !self.has_pending_tool_calls()
    }
}

/// Classify `response`'s output items against `agent`'s registered tools
/// and handoffs.
///
/// # Errors
///
/// Returns [`Error::ModelBehaviorError`] if the response names a function
/// or handoff tool the agent has not registered.
pub fn process_response(
    agent: &Agent,
    agent_ref: &crate::agent::AgentRef,
    response: &ModelResponse,
    output_type: Option<&OutputSchema>,
) -> Result<ProcessedResponse> {
    let mut processed = ProcessedResponse::default();
    let mut handoff_requested = false;

    for item in &response.output {
        match item {
            ResponseOutputItem::Message { id, role, text } => {
                processed.new_items.push(RunItem::MessageOutput {
                    agent: std::sync::Arc::clone(agent_ref),
                    raw: crate::message::Message {
                        role: *role,
                        content: Some(vec![crate::message::Content::text(text.clone())]),
                        tool_calls: None,
                        tool_call_id: None,
                    },
                });
                let _ = id;
                if let Some(candidate) = final_output_candidate(text, output_type) {
                    processed.final_output = Some(candidate);
                }
            }
            ResponseOutputItem::FunctionCall {
                call_id,
                name,
                arguments,
                ..
            } => {
                let call = ToolCall::function(call_id.clone(), name.clone(), arguments.clone());

                if let Some(handoff) = agent.find_handoff(name) {
                    processed.new_items.push(RunItem::HandoffCallItem {
                        agent: std::sync::Arc::clone(agent_ref),
                        raw: call.clone(),
                    });
                    if handoff_requested {
                        // Not the first handoff this turn: record the call but
                        // don't let it override the one already honored.
                        processed.extra_handoff_calls.push(call);
                        continue;
                    }
                    handoff_requested = true;
                    processed.tools_used.push(name.clone());
                    processed.handoff = Some((call, handoff.clone()));
                } else if agent.find_tool(name).is_some() {
                    processed.new_items.push(RunItem::ToolCallItem {
                        agent: std::sync::Arc::clone(agent_ref),
                        raw: call.clone(),
                    });
                    processed.tools_used.push(name.clone());
                    processed.function_calls.push(call);
                } else {
                    return Err(Error::model_behavior(format!(
                        "model requested unknown tool or handoff '{name}'"
                    )));
                }
            }
            ResponseOutputItem::McpCall {
                id,
                call_id,
                server,
                name,
                arguments,
                output,
            } => {
                processed.new_items.push(RunItem::ToolCallItem {
                    agent: std::sync::Arc::clone(agent_ref),
                    raw: ToolCall::function(call_id.clone(), name.clone(), arguments.clone()),
                });
                processed.tools_used.push(name.clone());
                if output.is_none() {
                    processed.mcp_calls.push(McpToolCall {
                        item_id: id.clone(),
                        call_id: call_id.clone(),
                        server: server.clone(),
                        name: name.clone(),
                        arguments: arguments.clone(),
                    });
                } else if let Some(output) = output {
                    processed.new_items.push(RunItem::ToolCallOutputItem {
                        agent: std::sync::Arc::clone(agent_ref),
                        call_id: call_id.clone(),
                        output: output.clone(),
                    });
                }
            }
            ResponseOutputItem::Reasoning { content, .. } => {
                processed.new_items.push(RunItem::ReasoningItem {
                    agent: std::sync::Arc::clone(agent_ref),
                    raw: content.clone(),
                });
            }
            ResponseOutputItem::Refusal { refusal, .. } => {
                processed.new_items.push(RunItem::MessageOutput {
                    agent: std::sync::Arc::clone(agent_ref),
                    raw: crate::message::Message::assistant(refusal.clone()),
                });
            }
            ResponseOutputItem::FileSearchCall { .. }
            | ResponseOutputItem::WebSearchCall { .. }
            | ResponseOutputItem::ComputerCall { .. }
            | ResponseOutputItem::ImageGeneration { .. }
            | ResponseOutputItem::CodeInterpreter { .. } => {
                processed.new_items.push(RunItem::HostedToolCallItem {
                    agent: std::sync::Arc::clone(agent_ref),
                    item_id: item.id().to_owned(),
                    raw: serde_json::to_value(item).unwrap_or(Value::Null),
                });
            }
        }
    }

    Ok(processed)
}

/// Decide whether `text` is a final-output candidate for the active agent.
///
/// With no `output_type`, any message text qualifies (tie-break handled by
/// overwriting `final_output` as messages are visited in order). With an
/// `output_type`, text must both parse as JSON and validate against the
/// schema (via [`OutputSchema::matches`], which honors `strict`) — an agent
/// asked for structured output that instead free-talks, or emits JSON that
/// doesn't conform to the requested shape, doesn't end the run.
fn final_output_candidate(text: &str, output_type: Option<&OutputSchema>) -> Option<Value> {
    match output_type {
        None => Some(Value::String(text.to_owned())),
        Some(schema) => {
            let value: Value = serde_json::from_str(text).ok()?;
            schema.matches(&value).then_some(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, AgentRef, Tool, ToolDefinition, ToolError};
    use crate::callback::RunContext;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo".into(),
                description: "echoes input".into(),
                parameters: serde_json::json!({"type": "object"}),
            }
        }

        async fn call(&self, _ctx: &RunContext, arguments: Value) -> Result<String, ToolError> {
            Ok(arguments.to_string())
        }
    }

    fn agent_with_tool() -> AgentRef {
        Arc::new(Agent::new("triage").tool(Arc::new(EchoTool)))
    }

    #[test]
    fn plain_message_becomes_final_output_candidate() {
        let agent = agent_with_tool();
        let response = ModelResponse::from_text("resp_1", "hello there");
        let processed = process_response(&agent, &agent, &response, None).unwrap();

        assert_eq!(processed.new_items.len(), 1);
        assert_eq!(
            processed.final_output,
            Some(Value::String("hello there".into()))
        );
        assert!(processed.has_final_output_with_no_pending_tools());
    }

    #[test]
    fn last_text_wins_tie_break() {
        let agent = agent_with_tool();
        let response = ModelResponse {
            output: vec![
                ResponseOutputItem::Message {
                    id: "1".into(),
                    role: Role::Assistant,
                    text: "first".into(),
                },
                ResponseOutputItem::Message {
                    id: "2".into(),
                    role: Role::Assistant,
                    text: "second".into(),
                },
            ],
            ..Default::default()
        };
        let processed = process_response(&agent, &agent, &response, None).unwrap();
        assert_eq!(processed.final_output, Some(Value::String("second".into())));
        assert_eq!(processed.new_items.len(), 2);
    }

    #[test]
    fn structured_output_ignores_unparseable_text() {
        let agent = agent_with_tool();
        let schema = OutputSchema {
            name: "Answer".into(),
            schema: serde_json::json!({"type": "object"}),
            strict: true,
        };
        let response = ModelResponse::from_text("resp_1", "not json");
        let processed = process_response(&agent, &agent, &response, Some(&schema)).unwrap();
        assert!(processed.final_output.is_none());
    }

    #[test]
    fn structured_output_parses_valid_json_text() {
        let agent = agent_with_tool();
        let schema = OutputSchema {
            name: "Answer".into(),
            schema: serde_json::json!({"type": "object"}),
            strict: true,
        };
        let response = ModelResponse::from_text("resp_1", r#"{"value": 42}"#);
        let processed = process_response(&agent, &agent, &response, Some(&schema)).unwrap();
        assert_eq!(processed.final_output, Some(serde_json::json!({"value": 42})));
    }

    #[test]
    fn structured_output_rejects_json_that_does_not_conform_to_the_schema() {
        let agent = agent_with_tool();
        let schema = OutputSchema {
            name: "Foo".into(),
            schema: serde_json::json!({
                "type": "object",
                "properties": {"bar": {"type": "string"}},
                "required": ["bar"],
            }),
            strict: true,
        };
        // Valid JSON, but neither an object (first case) nor one carrying the
        // required `bar` field (second case) — both must be demoted to a
        // plain message instead of ending the run.
        for text in ["[1, 2, 3]", "{}"] {
            let response = ModelResponse::from_text("resp_1", text);
            let processed = process_response(&agent, &agent, &response, Some(&schema)).unwrap();
            assert!(processed.final_output.is_none(), "{text} should not conform");
        }
    }

    #[test]
    fn structured_output_strict_mode_rejects_unexpected_properties() {
        let agent = agent_with_tool();
        let schema = OutputSchema {
            name: "Foo".into(),
            schema: serde_json::json!({
                "type": "object",
                "properties": {"bar": {"type": "string"}},
                "required": ["bar"],
            }),
            strict: true,
        };
        let response = ModelResponse::from_text("resp_1", r#"{"bar": "baz", "extra": 1}"#);
        let processed = process_response(&agent, &agent, &response, Some(&schema)).unwrap();
        assert!(processed.final_output.is_none());
    }

    #[test]
    fn function_call_for_known_tool_is_classified() {
        let agent = agent_with_tool();
        let response = ModelResponse {
            output: vec![ResponseOutputItem::FunctionCall {
                id: "item_1".into(),
                call_id: "call_1".into(),
                name: "echo".into(),
                arguments: serde_json::json!({"x": 1}),
            }],
            ..Default::default()
        };
        let processed = process_response(&agent, &agent, &response, None).unwrap();
        assert_eq!(processed.function_calls.len(), 1);
        assert!(processed.handoff.is_none());
        assert!(processed.final_output.is_none());
        assert!(!processed.has_final_output_with_no_pending_tools());
        assert_eq!(processed.tools_used, vec!["echo".to_owned()]);
    }

    #[test]
    fn unknown_tool_name_is_model_behavior_error() {
        let agent = agent_with_tool();
        let response = ModelResponse {
            output: vec![ResponseOutputItem::FunctionCall {
                id: "item_1".into(),
                call_id: "call_1".into(),
                name: "does_not_exist".into(),
                arguments: Value::Null,
            }],
            ..Default::default()
        };
        let err = process_response(&agent, &agent, &response, None).unwrap_err();
        assert!(matches!(err, Error::ModelBehaviorError(_)));
    }

    #[test]
    fn handoff_call_is_classified_and_honored() {
        let billing = Arc::new(Agent::new("billing"));
        let triage = Arc::new(Agent::new("triage").handoff(Handoff::new(billing)));
        let response = ModelResponse {
            output: vec![ResponseOutputItem::FunctionCall {
                id: "item_1".into(),
                call_id: "call_1".into(),
                name: "transfer_to_billing".into(),
                arguments: Value::Null,
            }],
            ..Default::default()
        };
        let processed = process_response(&triage, &triage, &response, None).unwrap();
        assert!(processed.handoff.is_some());
        assert_eq!(processed.handoff.unwrap().1.target.name, "billing");
    }

    #[test]
    fn multiple_handoffs_only_honors_the_first() {
        let billing = Arc::new(Agent::new("billing"));
        let support = Arc::new(Agent::new("support"));
        let triage = Arc::new(
            Agent::new("triage")
                .handoff(Handoff::new(billing))
                .handoff(Handoff::new(support)),
        );
        let response = ModelResponse {
            output: vec![
                ResponseOutputItem::FunctionCall {
                    id: "item_1".into(),
                    call_id: "call_1".into(),
                    name: "transfer_to_billing".into(),
                    arguments: Value::Null,
                },
                ResponseOutputItem::FunctionCall {
                    id: "item_2".into(),
                    call_id: "call_2".into(),
                    name: "transfer_to_support".into(),
                    arguments: Value::Null,
                },
            ],
            ..Default::default()
        };
        let processed = process_response(&triage, &triage, &response, None).unwrap();
        assert_eq!(processed.handoff.unwrap().1.target.name, "billing");
        assert_eq!(processed.extra_handoff_calls.len(), 1);
        // Both calls are still recorded as items so the conversation stays
        // well-formed.
        assert_eq!(processed.new_items.len(), 2);
    }

    #[test]
    fn hosted_tool_call_is_recorded_without_local_invocation() {
        let agent = agent_with_tool();
        let response = ModelResponse {
            output: vec![ResponseOutputItem::WebSearchCall {
                id: "ws_1".into(),
                query: Some("rust async".into()),
            }],
            ..Default::default()
        };
        let processed = process_response(&agent, &agent, &response, None).unwrap();
        assert!(processed.function_calls.is_empty());
        assert!(matches!(
            &processed.new_items[0],
            RunItem::HostedToolCallItem { .. }
        ));
    }

    #[test]
    fn mcp_call_without_inline_output_is_pending() {
        let agent = agent_with_tool();
        let response = ModelResponse {
            output: vec![ResponseOutputItem::McpCall {
                id: "item_1".into(),
                call_id: "call_1".into(),
                server: "filesystem".into(),
                name: "read_file".into(),
                arguments: serde_json::json!({"path": "/tmp/x"}),
                output: None,
            }],
            ..Default::default()
        };
        let processed = process_response(&agent, &agent, &response, None).unwrap();
        assert_eq!(processed.mcp_calls.len(), 1);
        assert_eq!(processed.mcp_calls[0].server, "filesystem");
    }

    #[test]
    fn mcp_call_with_inline_output_needs_no_local_invocation() {
        let agent = agent_with_tool();
        let response = ModelResponse {
            output: vec![ResponseOutputItem::McpCall {
                id: "item_1".into(),
                call_id: "call_1".into(),
                server: "filesystem".into(),
                name: "read_file".into(),
                arguments: Value::Null,
                output: Some("file contents".into()),
            }],
            ..Default::default()
        };
        let processed = process_response(&agent, &agent, &response, None).unwrap();
        assert!(processed.mcp_calls.is_empty());
        assert_eq!(processed.new_items.len(), 2);
    }
}
