//! Drives the turn loop to completion.
//!
//! A [`Runner`] wraps a [`ModelProvider`](crate::model::ModelProvider) and
//! exposes [`Runner::run`], which repeatedly calls the model, classifies its
//! response via [`processor::process_response`], runs the response's side
//! effects via [`executor::execute_side_effects`], and acts on the resulting
//! [`NextStep`](crate::executor::NextStep) until a final output is produced
//! or [`RunConfig::max_turns`] is exceeded.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use futures::future::join_all;
use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::agent::{AgentRef, HandoffInputFilter, ModelSettings};
use crate::callback::{NoopRunHooks, RunContext, SharedRunHooks};
use crate::error::{Error, Result, RunErrorDetails};
use crate::executor::{self, NextStep};
use crate::guardrail::{InputGuardrail, InputGuardrailResult, OutputGuardrail, OutputGuardrailResult};
use crate::message::{to_input_list, Input, InputItem, Message, RunItem};
use crate::model::{ModelEvent, ModelRequest, ModelResponse, SharedModel, SharedModelProvider, ToolChoice};
use crate::processor;
use crate::session::SharedSession;
use crate::stream::{RunResultStreaming, StreamSink};
use crate::trace::{traced_result, NoopTracer, SharedTracer, TraceContext};
use crate::usage::Usage;

/// Configures one call to [`Runner::run`].
///
/// Every field is an override on top of the agent's own configuration, or a
/// run-scoped concern (session, tracing, turn budget) the agent itself
/// knows nothing about.
#[derive(Clone)]
pub struct RunConfig {
    /// Overrides every agent's `model` field for this run.
    pub model: Option<String>,
    /// Overlaid on top of each agent's `model_settings`, field by field.
    pub model_settings: Option<ModelSettings>,
    /// Runs only when a handoff has no per-handoff filter of its own.
    pub handoff_input_filter: Option<HandoffInputFilter>,
    /// Guardrails run in addition to each agent's own, on the initial input.
    pub input_guardrails: Vec<InputGuardrail>,
    /// Guardrails run in addition to each agent's own, on the final output.
    pub output_guardrails: Vec<OutputGuardrail>,
    /// Maximum number of turns before the run fails with
    /// [`Error::MaxTurnsExceededError`].
    pub max_turns: usize,
    /// Conversation memory, consulted before the first turn and updated
    /// after a successful final output.
    pub session: Option<SharedSession>,
    /// Caps how many prior session items are loaded, if set.
    pub session_input_limit: Option<usize>,
    /// Run-level lifecycle hooks.
    pub run_hooks: SharedRunHooks,
    /// Tracer used to open a span per turn, model call, and tool/handoff
    /// invocation.
    pub tracer: SharedTracer,
    /// Disables span creation entirely when `true`, regardless of `tracer`.
    pub trace_disabled: bool,
    /// Name surfaced on every span opened for this run.
    pub workflow_name: Option<String>,
    /// Groups spans from multiple related runs under one id.
    pub group_id: Option<String>,
    /// Arbitrary metadata attached to every span opened for this run.
    pub metadata: Option<serde_json::Value>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model: None,
            model_settings: None,
            handoff_input_filter: None,
            input_guardrails: Vec::new(),
            output_guardrails: Vec::new(),
            max_turns: crate::agent::DEFAULT_MAX_TURNS,
            session: None,
            session_input_limit: None,
            run_hooks: Arc::new(NoopRunHooks),
            tracer: Arc::new(NoopTracer),
            trace_disabled: false,
            workflow_name: None,
            group_id: None,
            metadata: None,
        }
    }
}

impl RunConfig {
    /// Bundle this run's tracer and `trace_disabled` flag so spans can be
    /// opened without threading the whole config around.
    #[must_use]
    fn trace_context(&self) -> TraceContext {
        TraceContext::new(Arc::clone(&self.tracer), self.trace_disabled)
    }

    /// The name the root trace span is opened under: `workflow_name` if
    /// set, otherwise a generic default.
    fn trace_name(&self) -> &str {
        self.workflow_name.as_deref().unwrap_or("agent_run")
    }
}

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// The final output value, as the last agent's turn produced it.
    pub final_output: serde_json::Value,
    /// The agent that was active when the run finished.
    pub last_agent: AgentRef,
    /// Every run-item generated over the course of the run, in order.
    pub new_items: Vec<RunItem>,
    /// Every raw model response collected over the course of the run.
    pub raw_responses: Vec<ModelResponse>,
    /// Input guardrail results, if any ran.
    pub input_guardrail_results: Vec<InputGuardrailResult>,
    /// Output guardrail results, if any ran.
    pub output_guardrail_results: Vec<OutputGuardrailResult>,
    /// Cumulative token usage across every model call in the run.
    pub usage: Usage,
}

impl RunResult {
    /// Project this result's new items into the input list a follow-up run
    /// should start from, given the original input it was run with.
    #[must_use]
    pub fn to_input_list(&self, original_input: &Input) -> Vec<InputItem> {
        to_input_list(original_input, &self.new_items)
    }
}

/// Drives agent runs to completion against a configured [`ModelProvider`](crate::model::ModelProvider).
pub struct Runner {
    provider: SharedModelProvider,
}

impl Runner {
    /// Create a runner that resolves models through `provider`.
    #[must_use]
    pub const fn new(provider: SharedModelProvider) -> Self {
        Self { provider }
    }

    /// Run `agent` against `input`, looping turns until a final output is
    /// produced or `config.max_turns` is exceeded.
    ///
    /// # Errors
    ///
    /// Returns an error if a guardrail tripwire fires, the turn budget is
    /// exceeded, the model produces unrecognized tool/handoff names, or an
    /// external collaborator (model, session, MCP server) fails.
    pub async fn run(
        &self,
        agent: AgentRef,
        input: impl Into<Input>,
        config: &RunConfig,
    ) -> Result<RunResult> {
        let original_input: Input = input.into();
        if config.session.is_some() && original_input.is_items() {
            return Err(Error::user(
                "cannot pass a list of input items when a session is configured: \
                 it is ambiguous whether they should append to or replace history",
            ));
        }
        let session_prefix = match &config.session {
            Some(session) => session.get_items(config.session_input_limit).await?,
            None => Vec::new(),
        };

        let root_span = config.trace_context().span(config.trace_name());
        let result = traced_result(
            root_span,
            self.run_inner(agent, original_input.clone(), session_prefix, config)
                .await,
        );

        if let Err(err) = &result {
            config
                .run_hooks
                .on_error(&RunContext::new(), "unknown", err)
                .await;
        }
        result
    }

    /// Run `agent` against `input` the same way [`Self::run`] does, except
    /// the turn loop runs in a background task and semantic events are
    /// published to the returned [`RunResultStreaming`] as they happen.
    ///
    /// # Errors
    ///
    /// Returns an error immediately, before any task is spawned, if the
    /// input/session combination is ambiguous or the session fails to load
    /// its prior items. Errors that occur once the run is underway are
    /// instead delivered through the handle's
    /// [`stream_events`](crate::stream::RunResultStreaming::stream_events)
    /// call.
    pub async fn run_streamed(
        &self,
        agent: AgentRef,
        input: impl Into<Input>,
        config: &RunConfig,
    ) -> Result<RunResultStreaming> {
        let original_input: Input = input.into();
        if config.session.is_some() && original_input.is_items() {
            return Err(Error::user(
                "cannot pass a list of input items when a session is configured: \
                 it is ambiguous whether they should append to or replace history",
            ));
        }
        let session_prefix = match &config.session {
            Some(session) => session.get_items(config.session_input_limit).await?,
            None => Vec::new(),
        };

        let (sink, receiver, snapshot) = StreamSink::new();
        let complete = Arc::new(AtomicBool::new(false));
        let provider = Arc::clone(&self.provider);
        let config = config.clone();

        let task = tokio::spawn(async move {
            let root_span = config.trace_context().span(config.trace_name());
            let result = traced_result(
                root_span,
                run_streamed_inner(&provider, agent, original_input, session_prefix, &config, &sink).await,
            );
            if let Err(err) = &result {
                config.run_hooks.on_error(&RunContext::new(), "unknown", err).await;
            }
            sink.done(result).await;
        });

        Ok(RunResultStreaming::new(receiver, snapshot, complete, task))
    }

    async fn run_inner(
        &self,
        mut current_agent: AgentRef,
        original_input: Input,
        session_prefix: Vec<InputItem>,
        config: &RunConfig,
    ) -> Result<RunResult> {
        let mut effective_input = original_input.clone();
        let mut new_items: Vec<RunItem> = Vec::new();
        let mut raw_responses: Vec<ModelResponse> = Vec::new();
        let mut input_guardrail_results: Vec<InputGuardrailResult> = Vec::new();
        let mut output_guardrail_results: Vec<OutputGuardrailResult> = Vec::new();
        let mut forced_tool_used: HashMap<String, bool> = HashMap::new();
        let mut is_first_turn_for_agent = true;
        let mut context = RunContext::new().with_agent_name(current_agent.name.clone());
        let mut turn = 0usize;

        loop {
            turn += 1;
            if turn > config.max_turns {
                error!(agent = %current_agent.name, max_turns = config.max_turns, "max turns exceeded");
                return Err(Error::max_turns(
                    config.max_turns,
                    RunErrorDetails {
                        input: original_input,
                        new_items,
                        raw_responses,
                        last_agent: current_agent.name.clone(),
                        input_guardrail_results,
                        output_guardrail_results,
                    },
                ));
            }
            context.set_agent_name(current_agent.name.clone());
            context = context.with_step(turn);
            debug!(agent = %current_agent.name, turn, "starting turn");

            if is_first_turn_for_agent {
                config
                    .run_hooks
                    .on_agent_start(&context, &current_agent.name)
                    .await;
                if let Some(hooks) = &current_agent.hooks {
                    hooks.on_start(&context).await;
                }
                is_first_turn_for_agent = false;
            }

            let instructions = current_agent.resolve_instructions(&context).await;

            let model = self.provider.get_model(
                config
                    .model
                    .as_deref()
                    .or(current_agent.model.as_deref()),
            )?;

            let mut settings = current_agent.model_settings.clone();
            if let Some(overrides) = &config.model_settings {
                settings = settings.merge(overrides);
            }
            if current_agent.reset_tool_choice
                && forced_tool_used.get(&current_agent.name).copied().unwrap_or(false)
                && matches!(settings.tool_choice, Some(ToolChoice::Required) | Some(ToolChoice::Function(_)))
            {
                settings.tool_choice = Some(ToolChoice::Auto);
            }

            let agent_span = config.trace_context().span(&format!("agent:{}", current_agent.name));
            let setup: Result<(Vec<_>, Vec<_>)> = async {
                let mut tool_defs: Vec<_> = current_agent.tools.iter().map(|t| t.definition()).collect();
                for server in &current_agent.mcp_servers {
                    tool_defs.extend(server.list_tools().await?);
                }
                let handoff_defs: Vec<_> = current_agent
                    .resolve_enabled_handoffs(&context)
                    .await
                    .iter()
                    .map(crate::agent::Handoff::to_tool_definition)
                    .collect();
                Ok((tool_defs, handoff_defs))
            }
            .await;
            let (tool_defs, handoff_defs) = traced_result(agent_span, setup)?;

            let turn_input: Vec<InputItem> = session_prefix
                .iter()
                .cloned()
                .chain(effective_input.to_items())
                .chain(new_items.iter().map(RunItem::to_input_item))
                .collect();

            let mut request = ModelRequest::new(turn_input.clone())
                .model_settings(settings)
                .tools(tool_defs)
                .handoffs(handoff_defs);
            if let Some(sys) = &instructions {
                request = request.system_instructions(sys.clone());
            }
            if let Some(schema) = &current_agent.output_type {
                request = request.output_type(schema.clone());
            }

            let response = if turn == 1 {
                self.run_first_turn(
                    &current_agent,
                    &context,
                    config,
                    &model,
                    &request,
                    &turn_input,
                    &mut input_guardrail_results,
                )
                .await?
            } else {
                self.call_model(&current_agent, &context, config, &model, &request)
                    .await?
            };

            context.add_usage(response.usage);
            raw_responses.push(response.clone());

            let processed = processor::process_response(
                &current_agent,
                &current_agent,
                &response,
                current_agent.output_type.as_ref(),
            )?;

            forced_tool_used.insert(
                current_agent.name.clone(),
                !processed.function_calls.is_empty() || !processed.mcp_calls.is_empty(),
            );

            let pre_handoff_items = new_items.clone();
            new_items.extend(processed.new_items.clone());

            let exec_result = executor::execute_side_effects(
                &current_agent,
                &current_agent,
                processed,
                &context,
                &config.run_hooks,
                config.handoff_input_filter.as_ref(),
                &effective_input,
                &pre_handoff_items,
                &config.trace_context(),
            )
            .await?;

            new_items.extend(exec_result.items);

            match exec_result.next_step {
                NextStep::RunAgain => continue,
                NextStep::Handoff(target) => {
                    if let Some(filtered) = exec_result.handoff_input {
                        effective_input = filtered.input_history;
                        new_items = filtered
                            .pre_handoff_items
                            .into_iter()
                            .chain(filtered.new_items)
                            .collect();
                    }
                    info!(from = %current_agent.name, to = %target.name, "handoff");
                    current_agent = target;
                    is_first_turn_for_agent = true;
                }
                NextStep::FinalOutput(value) => {
                    let guardrail_span = config.trace_context().span("guardrail:output");
                    let combined_output_guardrails: Vec<&OutputGuardrail> = config
                        .output_guardrails
                        .iter()
                        .chain(current_agent.output_guardrails.iter())
                        .collect();
                    let checks = combined_output_guardrails
                        .iter()
                        .map(|g| g.run(&context, &current_agent.name, &value));
                    let results: Vec<OutputGuardrailResult> =
                        join_all(checks).await.into_iter().collect::<Result<_>>()?;
                    if let Some(tripped) = results.iter().find(|r| r.is_triggered()) {
                        warn!(guardrail = %tripped.guardrail_name, "output guardrail tripwire triggered");
                        guardrail_span.error(&format!("tripwire: {}", tripped.guardrail_name));
                        return Err(Error::OutputGuardrailTripwireTriggered(tripped.clone()));
                    }
                    guardrail_span.finish();
                    output_guardrail_results.extend(results);

                    config
                        .run_hooks
                        .on_agent_end(&context, &current_agent.name, &value)
                        .await;
                    if let Some(hooks) = &current_agent.hooks {
                        hooks.on_end(&context, &value).await;
                    }

                    if let Some(session) = &config.session {
                        let to_persist = to_input_list(&original_input, &new_items);
                        session.add_items(to_persist).await?;
                    }

                    info!(agent = %current_agent.name, turns = turn, "run completed");
                    return Ok(RunResult {
                        final_output: value,
                        last_agent: current_agent,
                        new_items,
                        raw_responses,
                        input_guardrail_results,
                        output_guardrail_results,
                        usage: context.usage().to_owned(),
                    });
                }
            }
        }
    }

    async fn run_first_turn(
        &self,
        agent: &AgentRef,
        context: &RunContext,
        config: &RunConfig,
        model: &crate::model::SharedModel,
        request: &ModelRequest,
        turn_input: &[InputItem],
        input_guardrail_results: &mut Vec<InputGuardrailResult>,
    ) -> Result<ModelResponse> {
        let combined: Vec<&InputGuardrail> = config
            .input_guardrails
            .iter()
            .chain(agent.input_guardrails.iter())
            .collect();
        let messages = items_to_messages(turn_input);

        let (sequential, parallel): (Vec<_>, Vec<_>) =
            combined.into_iter().partition(|g| !g.is_parallel());

        let sequential_span = config.trace_context().span("guardrail:input:sequential");
        let sequential_results: Result<Vec<InputGuardrailResult>> = join_all(
            sequential
                .iter()
                .map(|g| g.run(context, &agent.name, &messages)),
        )
        .await
        .into_iter()
        .collect();
        let sequential_results = traced_result(sequential_span, sequential_results)?;
        if let Some(tripped) = sequential_results.iter().find(|r| r.is_triggered()) {
            warn!(guardrail = %tripped.guardrail_name, "input guardrail tripwire triggered");
            return Err(Error::InputGuardrailTripwireTriggered(tripped.clone()));
        }
        input_guardrail_results.extend(sequential_results);

        let parallel_span = config.trace_context().span("guardrail:input:parallel");
        let model_call = self.call_model(agent, context, config, model, request);
        let parallel_checks = join_all(parallel.iter().map(|g| g.run(context, &agent.name, &messages)));

        let (response, parallel_results) = tokio::join!(model_call, parallel_checks);
        let response = response?;
        let parallel_results: Result<Vec<InputGuardrailResult>> = parallel_results.into_iter().collect();
        let parallel_results = traced_result(parallel_span, parallel_results)?;
        if let Some(tripped) = parallel_results.iter().find(|r| r.is_triggered()) {
            return Err(Error::InputGuardrailTripwireTriggered(tripped.clone()));
        }
        input_guardrail_results.extend(parallel_results);

        Ok(response)
    }

    async fn call_model(
        &self,
        agent: &AgentRef,
        context: &RunContext,
        config: &RunConfig,
        model: &crate::model::SharedModel,
        request: &ModelRequest,
    ) -> Result<ModelResponse> {
        config
            .run_hooks
            .on_llm_start(
                context,
                &agent.name,
                request.system_instructions.as_deref(),
                &request.input,
            )
            .await;
        if let Some(hooks) = &agent.hooks {
            hooks
                .on_llm_start(context, request.system_instructions.as_deref(), &request.input)
                .await;
        }

        let generation_span = config.trace_context().span("generation");
        let response = traced_result(generation_span, model.get_response(request).await)?;

        config
            .run_hooks
            .on_llm_end(context, &agent.name, &response)
            .await;
        if let Some(hooks) = &agent.hooks {
            hooks.on_llm_end(context, &response).await;
        }

        Ok(response)
    }
}

/// Background-task body for [`Runner::run_streamed`]. Mirrors
/// [`Runner::run_inner`]'s turn loop exactly — same
/// [`processor::process_response`]/[`executor::execute_side_effects`] calls,
/// same handoff/guardrail/max-turns handling — publishing a
/// [`RunStreamEvent`](crate::stream::RunStreamEvent) through `sink` at every
/// point the blocking loop would have nothing to report.
async fn run_streamed_inner(
    provider: &SharedModelProvider,
    mut current_agent: AgentRef,
    original_input: Input,
    session_prefix: Vec<InputItem>,
    config: &RunConfig,
    sink: &StreamSink,
) -> Result<RunResult> {
    let mut effective_input = original_input.clone();
    let mut new_items: Vec<RunItem> = Vec::new();
    let mut raw_responses: Vec<ModelResponse> = Vec::new();
    let mut input_guardrail_results: Vec<InputGuardrailResult> = Vec::new();
    let mut output_guardrail_results: Vec<OutputGuardrailResult> = Vec::new();
    let mut forced_tool_used: HashMap<String, bool> = HashMap::new();
    let mut is_first_turn_for_agent = true;
    let mut context = RunContext::new().with_agent_name(current_agent.name.clone());
    let mut turn = 0usize;

    loop {
        turn += 1;
        sink.snapshot().set_turn(turn);
        if turn > config.max_turns {
            error!(agent = %current_agent.name, max_turns = config.max_turns, "streamed run exceeded max turns");
            return Err(Error::max_turns(
                config.max_turns,
                RunErrorDetails {
                    input: original_input,
                    new_items,
                    raw_responses,
                    last_agent: current_agent.name.clone(),
                    input_guardrail_results,
                    output_guardrail_results,
                },
            ));
        }
        context.set_agent_name(current_agent.name.clone());
        context = context.with_step(turn);
        debug!(agent = %current_agent.name, turn, "starting streamed turn");

        if is_first_turn_for_agent {
            config
                .run_hooks
                .on_agent_start(&context, &current_agent.name)
                .await;
            if let Some(hooks) = &current_agent.hooks {
                hooks.on_start(&context).await;
            }
            is_first_turn_for_agent = false;
        }

        let instructions = current_agent.resolve_instructions(&context).await;

        let model = provider.get_model(config.model.as_deref().or(current_agent.model.as_deref()))?;

        let mut settings = current_agent.model_settings.clone();
        if let Some(overrides) = &config.model_settings {
            settings = settings.merge(overrides);
        }
        if current_agent.reset_tool_choice
            && forced_tool_used.get(&current_agent.name).copied().unwrap_or(false)
            && matches!(settings.tool_choice, Some(ToolChoice::Required) | Some(ToolChoice::Function(_)))
        {
            settings.tool_choice = Some(ToolChoice::Auto);
        }

        let agent_span = config.trace_context().span(&format!("agent:{}", current_agent.name));
        let setup: Result<(Vec<_>, Vec<_>)> = async {
            let mut tool_defs: Vec<_> = current_agent.tools.iter().map(|t| t.definition()).collect();
            for server in &current_agent.mcp_servers {
                tool_defs.extend(server.list_tools().await?);
            }
            let handoff_defs: Vec<_> = current_agent
                .resolve_enabled_handoffs(&context)
                .await
                .iter()
                .map(crate::agent::Handoff::to_tool_definition)
                .collect();
            Ok((tool_defs, handoff_defs))
        }
        .await;
        let (tool_defs, handoff_defs) = traced_result(agent_span, setup)?;

        let turn_input: Vec<InputItem> = session_prefix
            .iter()
            .cloned()
            .chain(effective_input.to_items())
            .chain(new_items.iter().map(RunItem::to_input_item))
            .collect();

        let mut request = ModelRequest::new(turn_input.clone())
            .model_settings(settings)
            .tools(tool_defs)
            .handoffs(handoff_defs);
        if let Some(sys) = &instructions {
            request = request.system_instructions(sys.clone());
        }
        if let Some(schema) = &current_agent.output_type {
            request = request.output_type(schema.clone());
        }

        let response = if turn == 1 {
            stream_first_turn(
                &current_agent,
                &context,
                config,
                &model,
                &request,
                &turn_input,
                &mut input_guardrail_results,
                sink,
            )
            .await?
        } else {
            stream_one_turn(&current_agent, &context, config, &model, &request, sink).await?
        };

        context.add_usage(response.usage);
        sink.record_response(&response);
        raw_responses.push(response.clone());

        let processed = processor::process_response(
            &current_agent,
            &current_agent,
            &response,
            current_agent.output_type.as_ref(),
        )?;

        forced_tool_used.insert(
            current_agent.name.clone(),
            !processed.function_calls.is_empty() || !processed.mcp_calls.is_empty(),
        );

        for item in &processed.new_items {
            if !sink.run_item(item.clone()).await {
                return Err(Error::agent("streamed run was cancelled"));
            }
        }

        let pre_handoff_items = new_items.clone();
        new_items.extend(processed.new_items.clone());

        let exec_result = executor::execute_side_effects(
            &current_agent,
            &current_agent,
            processed,
            &context,
            &config.run_hooks,
            config.handoff_input_filter.as_ref(),
            &effective_input,
            &pre_handoff_items,
            &config.trace_context(),
        )
        .await?;

        for item in &exec_result.items {
            if !sink.run_item(item.clone()).await {
                return Err(Error::agent("streamed run was cancelled"));
            }
        }
        new_items.extend(exec_result.items);

        match exec_result.next_step {
            NextStep::RunAgain => continue,
            NextStep::Handoff(target) => {
                if let Some(filtered) = exec_result.handoff_input {
                    effective_input = filtered.input_history;
                    new_items = filtered
                        .pre_handoff_items
                        .into_iter()
                        .chain(filtered.new_items)
                        .collect();
                }
                info!(from = %current_agent.name, to = %target.name, "streamed handoff");
                current_agent = target;
                if !sink.agent_updated(Arc::clone(&current_agent)).await {
                    return Err(Error::agent("streamed run was cancelled"));
                }
                is_first_turn_for_agent = true;
            }
            NextStep::FinalOutput(value) => {
                let guardrail_span = config.trace_context().span("guardrail:output");
                let combined_output_guardrails: Vec<&OutputGuardrail> = config
                    .output_guardrails
                    .iter()
                    .chain(current_agent.output_guardrails.iter())
                    .collect();
                let checks = combined_output_guardrails
                    .iter()
                    .map(|g| g.run(&context, &current_agent.name, &value));
                let results: Vec<OutputGuardrailResult> =
                    join_all(checks).await.into_iter().collect::<Result<_>>()?;
                if let Some(tripped) = results.iter().find(|r| r.is_triggered()) {
                    warn!(guardrail = %tripped.guardrail_name, "streamed output guardrail tripwire triggered");
                    guardrail_span.error(&format!("tripwire: {}", tripped.guardrail_name));
                    return Err(Error::OutputGuardrailTripwireTriggered(tripped.clone()));
                }
                guardrail_span.finish();
                sink.record_output_guardrails(&results);
                output_guardrail_results.extend(results);
                sink.record_final_output(&value);

                config
                    .run_hooks
                    .on_agent_end(&context, &current_agent.name, &value)
                    .await;
                if let Some(hooks) = &current_agent.hooks {
                    hooks.on_end(&context, &value).await;
                }

                if let Some(session) = &config.session {
                    let to_persist = to_input_list(&original_input, &new_items);
                    session.add_items(to_persist).await?;
                }

                info!(agent = %current_agent.name, turns = turn, "streamed run completed");
                return Ok(RunResult {
                    final_output: value,
                    last_agent: current_agent,
                    new_items,
                    raw_responses,
                    input_guardrail_results,
                    output_guardrail_results,
                    usage: context.usage().to_owned(),
                });
            }
        }
    }
}

async fn stream_first_turn(
    agent: &AgentRef,
    context: &RunContext,
    config: &RunConfig,
    model: &SharedModel,
    request: &ModelRequest,
    turn_input: &[InputItem],
    input_guardrail_results: &mut Vec<InputGuardrailResult>,
    sink: &StreamSink,
) -> Result<ModelResponse> {
    let combined: Vec<&InputGuardrail> = config
        .input_guardrails
        .iter()
        .chain(agent.input_guardrails.iter())
        .collect();
    let messages = items_to_messages(turn_input);

    let (sequential, parallel): (Vec<_>, Vec<_>) = combined.into_iter().partition(|g| !g.is_parallel());

    let sequential_span = config.trace_context().span("guardrail:input:sequential");
    let sequential_results: Result<Vec<InputGuardrailResult>> = join_all(
        sequential
            .iter()
            .map(|g| g.run(context, &agent.name, &messages)),
    )
    .await
    .into_iter()
    .collect();
    let sequential_results = traced_result(sequential_span, sequential_results)?;
    if let Some(tripped) = sequential_results.iter().find(|r| r.is_triggered()) {
        return Err(Error::InputGuardrailTripwireTriggered(tripped.clone()));
    }
    sink.record_input_guardrails(&sequential_results);
    input_guardrail_results.extend(sequential_results);

    let parallel_span = config.trace_context().span("guardrail:input:parallel");
    let model_call = stream_one_turn(agent, context, config, model, request, sink);
    let parallel_checks = join_all(parallel.iter().map(|g| g.run(context, &agent.name, &messages)));

    let (response, parallel_results) = tokio::join!(model_call, parallel_checks);
    let response = response?;
    let parallel_results: Result<Vec<InputGuardrailResult>> = parallel_results.into_iter().collect();
    let parallel_results = traced_result(parallel_span, parallel_results)?;
    if let Some(tripped) = parallel_results.iter().find(|r| r.is_triggered()) {
        return Err(Error::InputGuardrailTripwireTriggered(tripped.clone()));
    }
    sink.record_input_guardrails(&parallel_results);
    input_guardrail_results.extend(parallel_results);

    Ok(response)
}

/// Runs one turn's model call through [`crate::model::Model::stream_response`],
/// forwarding every [`ModelEvent`] to `sink` as it arrives and reconstructing
/// the turn's [`ModelResponse`] from the terminal `Completed` event.
async fn stream_one_turn(
    agent: &AgentRef,
    context: &RunContext,
    config: &RunConfig,
    model: &SharedModel,
    request: &ModelRequest,
    sink: &StreamSink,
) -> Result<ModelResponse> {
    config
        .run_hooks
        .on_llm_start(
            context,
            &agent.name,
            request.system_instructions.as_deref(),
            &request.input,
        )
        .await;
    if let Some(hooks) = &agent.hooks {
        hooks
            .on_llm_start(context, request.system_instructions.as_deref(), &request.input)
            .await;
    }

    let generation_span = config.trace_context().span("generation");
    let mut events = match model.stream_response(request).await {
        Ok(events) => events,
        Err(err) => {
            generation_span.error(&err.to_string());
            return Err(err);
        }
    };
    let mut completed: Option<ModelResponse> = None;
    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                generation_span.error(&err.to_string());
                return Err(err);
            }
        };
        if let ModelEvent::Completed { response } = &event {
            completed = Some(response.clone());
        }
        let delivered = sink.raw(event).await;
        if !delivered {
            generation_span.error("streamed run was cancelled");
            return Err(Error::agent("streamed run was cancelled"));
        }
    }
    let response = match completed {
        Some(response) => {
            generation_span.finish();
            response
        }
        None => {
            let err = Error::model_behavior("model stream ended without a Completed event");
            generation_span.error(&err.to_string());
            return Err(err);
        }
    };

    config
        .run_hooks
        .on_llm_end(context, &agent.name, &response)
        .await;
    if let Some(hooks) = &agent.hooks {
        hooks.on_llm_end(context, &response).await;
    }

    Ok(response)
}

fn items_to_messages(items: &[InputItem]) -> Vec<Message> {
    items
        .iter()
        .filter_map(|item| match item {
            InputItem::Message(m) => Some(m.clone()),
            _ => None,
        })
        .collect()
}
