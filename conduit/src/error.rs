//! Error taxonomy for the agent run loop.
//!
//! Every fallible operation in this crate returns [`Result<T>`], an alias for
//! `std::result::Result<T, Error>`. [`Error`] is a closed, five-kind
//! `thiserror` enum plus a `Runtime` escape hatch for errors surfaced by an
//! external [`Model`](crate::model::Model), [`Session`](crate::session::Session),
//! or [`Mcp`](crate::mcp::Mcp) implementation.

use std::sync::Arc;

use thiserror::Error as ThisError;

use crate::guardrail::{InputGuardrailResult, OutputGuardrailResult};
use crate::message::{Input, RunItem};
use crate::model::ModelResponse;

/// A type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Forensic snapshot attached to an error on surfacing, so a caller can
/// inspect exactly how far a run got before it failed.
#[derive(Debug, Clone)]
pub struct RunErrorDetails {
    /// The original input the run was given.
    pub input: Input,
    /// Run items produced before the failure.
    pub new_items: Vec<RunItem>,
    /// Raw model responses collected before the failure.
    pub raw_responses: Vec<ModelResponse>,
    /// Name of the agent that was active when the failure occurred.
    pub last_agent: String,
    /// Input guardrail results collected before the failure, if any ran.
    pub input_guardrail_results: Vec<InputGuardrailResult>,
    /// Output guardrail results collected before the failure, if any ran.
    pub output_guardrail_results: Vec<OutputGuardrailResult>,
}

/// The error type for agent run operations.
#[derive(Debug, ThisError)]
pub enum Error {
    /// The caller passed invalid arguments to a public API
    /// (e.g. an empty agent name, a malformed `RunConfig`).
    #[error("invalid usage: {0}")]
    UserError(String),

    /// The model produced output that could not be interpreted
    /// (malformed tool-call arguments, an unparseable structured output,
    /// multiple simultaneous handoffs).
    #[error("model behavior error: {0}")]
    ModelBehaviorError(String),

    /// The run exceeded `RunConfig::max_turns` without producing a final
    /// output.
    #[error("exceeded maximum turns ({max_turns})")]
    MaxTurnsExceededError {
        /// The configured turn limit that was hit.
        max_turns: usize,
        /// Forensic snapshot of the run at the point it was aborted.
        details: Box<RunErrorDetails>,
    },

    /// An input guardrail's tripwire was triggered; the model was never
    /// (or may never have been) called with untrusted input.
    #[error("input guardrail '{}' tripped", .0.guardrail_name)]
    InputGuardrailTripwireTriggered(InputGuardrailResult),

    /// An output guardrail's tripwire was triggered; the final output was
    /// withheld from the caller.
    #[error("output guardrail '{}' tripped", .0.guardrail_name)]
    OutputGuardrailTripwireTriggered(OutputGuardrailResult),

    /// A catch-all for run-level failures that don't fit the other variants
    /// (an unresolvable handoff target, an exhausted tool-use retry budget).
    #[error("agent error: {message}")]
    AgentsError {
        /// Human-readable description of the failure.
        message: String,
        /// Forensic snapshot of the run, when one is available.
        details: Option<Box<RunErrorDetails>>,
    },

    /// An error surfaced by an external collaborator (a [`Model`], [`Session`],
    /// or [`Mcp`] implementation) that this crate does not itself interpret.
    ///
    /// [`Model`]: crate::model::Model
    /// [`Session`]: crate::session::Session
    /// [`Mcp`]: crate::mcp::Mcp
    #[error("runtime error: {0}")]
    Runtime(#[source] Arc<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Create a [`Error::UserError`].
    #[must_use]
    pub fn user(message: impl Into<String>) -> Self {
        Self::UserError(message.into())
    }

    /// Create a [`Error::AgentsError`] with no forensic details attached.
    #[must_use]
    pub fn agent(message: impl Into<String>) -> Self {
        Self::AgentsError {
            message: message.into(),
            details: None,
        }
    }

    /// Create a [`Error::AgentsError`] carrying forensic details.
    #[must_use]
    pub fn agent_with_details(message: impl Into<String>, details: RunErrorDetails) -> Self {
        Self::AgentsError {
            message: message.into(),
            details: Some(Box::new(details)),
        }
    }

    /// Create a [`Error::ModelBehaviorError`].
    #[must_use]
    pub fn model_behavior(message: impl Into<String>) -> Self {
        Self::ModelBehaviorError(message.into())
    }

    /// Alias for [`Error::model_behavior`], matching the vocabulary used by
    /// callers that think of this as "the model/provider misbehaved".
    #[must_use]
    pub fn model(message: impl Into<String>) -> Self {
        Self::model_behavior(message)
    }

    /// Create a [`Error::MaxTurnsExceededError`].
    #[must_use]
    pub fn max_turns(max_turns: usize, details: RunErrorDetails) -> Self {
        Self::MaxTurnsExceededError {
            max_turns,
            details: Box::new(details),
        }
    }

    /// Alias kept for call sites that think in terms of "steps" rather than
    /// "turns" — both refer to the same turn-loop iteration count.
    #[must_use]
    pub fn max_steps(max_turns: usize, details: RunErrorDetails) -> Self {
        Self::max_turns(max_turns, details)
    }

    /// Wrap an external collaborator error as [`Error::Runtime`].
    pub fn runtime(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Runtime(Arc::new(err))
    }

    /// Returns `true` if this error represents a tripped guardrail.
    #[must_use]
    pub const fn is_guardrail_tripwire(&self) -> bool {
        matches!(
            self,
            Self::InputGuardrailTripwireTriggered(_) | Self::OutputGuardrailTripwireTriggered(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::model_behavior(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_error_formats_message() {
        let err = Error::user("bad agent name");
        assert_eq!(err.to_string(), "invalid usage: bad agent name");
    }

    #[test]
    fn agent_error_without_details() {
        let err = Error::agent("boom");
        assert!(matches!(err, Error::AgentsError { details: None, .. }));
    }

    #[test]
    fn guardrail_tripwire_detection() {
        let result = InputGuardrailResult {
            guardrail_name: "pii".into(),
            output: crate::guardrail::GuardrailOutput::tripwire("found ssn"),
        };
        let err = Error::InputGuardrailTripwireTriggered(result);
        assert!(err.is_guardrail_tripwire());
        assert!(!Error::user("x").is_guardrail_tripwire());
    }

    #[test]
    fn serde_json_error_converts_to_model_behavior() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::ModelBehaviorError(_)));
    }

    #[test]
    fn max_steps_is_alias_for_max_turns() {
        let details = RunErrorDetails {
            input: Input::Text("hi".into()),
            new_items: Vec::new(),
            raw_responses: Vec::new(),
            last_agent: "triage".into(),
            input_guardrail_results: Vec::new(),
            output_guardrail_results: Vec::new(),
        };
        let err = Error::max_steps(10, details);
        assert!(matches!(
            err,
            Error::MaxTurnsExceededError { max_turns: 10, .. }
        ));
    }
}
