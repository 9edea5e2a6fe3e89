//! The streaming runtime: semantic events published to a consumer while the
//! turn loop runs in the background, plus [`RunResultStreaming`], the
//! consumer-visible handle used to pull those events, cancel the run, and
//! inspect partial state.
//!
//! [`Runner::run_streamed`](crate::runner::Runner::run_streamed) spawns the
//! turn loop as a background task and returns a [`RunResultStreaming`]
//! immediately, mirroring [`Runner::run`]'s turn-by-turn behavior exactly —
//! the two entry points share [`processor::process_response`] and
//! [`executor::execute_side_effects`]; only how a turn's model call and its
//! resulting events reach the caller differs.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::agent::AgentRef;
use crate::error::{Error, Result};
use crate::guardrail::{InputGuardrailResult, OutputGuardrailResult};
use crate::message::RunItem;
use crate::model::{ModelEvent, ModelResponse};
use crate::runner::RunResult;
use crate::usage::Usage;

/// Capacity of a streamed run's internal event channel.
///
/// Bounded so a slow consumer applies backpressure to the background turn
/// loop rather than letting it buffer an unbounded amount of raw model
/// events in memory.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A semantic event published while a streamed run is in progress.
///
/// Ordering is guaranteed within one run: the raw events of a turn precede
/// that turn's [`RunStreamEvent::RunItem`] events, which in turn precede any
/// [`RunStreamEvent::AgentUpdated`] event the turn's handoff produces.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum RunStreamEvent {
    /// One incremental event straight from the model backend, pushed as
    /// soon as it arrives.
    RawResponses(ModelEvent),
    /// One new run-item the current turn produced — a message, tool call,
    /// tool output, handoff call/output, or reasoning block — in the order
    /// the response processor and side-effects executor produced them.
    RunItem(RunItem),
    /// Control transferred to a new agent. Published after the handoff's
    /// side effects have run and before that agent's first turn begins.
    AgentUpdated {
        /// The agent now in control.
        new_agent: AgentRef,
    },
}

/// Sent over the run's internal channel: either one more event, or the
/// run's terminal outcome.
///
/// `Done` is this channel's explicit end-of-stream sentinel. Relying on the
/// channel merely closing would lose whatever error ended the run, or (on
/// success) the final [`RunResult`] — both need to travel alongside the
/// close, not be inferred from it.
enum StreamMessage {
    /// One more event for the consumer.
    Event(RunStreamEvent),
    /// The run is over; this is the result the blocking [`Runner::run`]
    /// would have returned for the same input.
    ///
    /// [`Runner::run`]: crate::runner::Runner::run
    Done(Result<RunResult>),
}

/// Live snapshot of a streamed run's progress, updated by the background
/// turn loop after every turn and read concurrently by
/// [`RunResultStreaming`]'s accessor methods.
#[derive(Debug, Default)]
pub(crate) struct StreamingSnapshot {
    current_turn: AtomicUsize,
    state: Mutex<SnapshotState>,
}

#[derive(Debug, Default, Clone)]
struct SnapshotState {
    last_agent: Option<AgentRef>,
    new_items: Vec<RunItem>,
    raw_responses: Vec<ModelResponse>,
    input_guardrail_results: Vec<InputGuardrailResult>,
    output_guardrail_results: Vec<OutputGuardrailResult>,
    final_output: Option<Value>,
    usage: Usage,
}

impl StreamingSnapshot {
    pub(crate) fn set_turn(&self, turn: usize) {
        self.current_turn.store(turn, Ordering::SeqCst);
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut SnapshotState)) {
        let mut guard = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard);
    }

    fn snapshot(&self) -> SnapshotState {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

/// The sending half of a streamed run's event channel, held by the
/// background turn loop.
///
/// Wraps the raw [`mpsc::Sender`] with the snapshot it keeps in sync, so
/// every call site that pushes an event also records it for the atomic
/// accessors in one place.
pub(crate) struct StreamSink {
    sender: mpsc::Sender<StreamMessage>,
    snapshot: Arc<StreamingSnapshot>,
}

impl StreamSink {
    pub(crate) fn new() -> (Self, mpsc::Receiver<StreamMessage>, Arc<StreamingSnapshot>) {
        let (sender, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let snapshot = Arc::new(StreamingSnapshot::default());
        (
            Self {
                sender,
                snapshot: Arc::clone(&snapshot),
            },
            receiver,
            snapshot,
        )
    }

    pub(crate) fn snapshot(&self) -> &StreamingSnapshot {
        &self.snapshot
    }

    /// Push a raw model event. Returns `false` once the consumer has
    /// dropped the receiver (cancellation in progress); the caller should
    /// stop driving the turn loop when this happens.
    pub(crate) async fn raw(&self, event: ModelEvent) -> bool {
        self.sender
            .send(StreamMessage::Event(RunStreamEvent::RawResponses(event)))
            .await
            .is_ok()
    }

    pub(crate) async fn run_item(&self, item: RunItem) -> bool {
        self.snapshot.update(|s| s.new_items.push(item.clone()));
        self.sender
            .send(StreamMessage::Event(RunStreamEvent::RunItem(item)))
            .await
            .is_ok()
    }

    pub(crate) async fn agent_updated(&self, new_agent: AgentRef) -> bool {
        self.snapshot.update(|s| s.last_agent = Some(Arc::clone(&new_agent)));
        self.sender
            .send(StreamMessage::Event(RunStreamEvent::AgentUpdated { new_agent }))
            .await
            .is_ok()
    }

    pub(crate) fn record_response(&self, response: &ModelResponse) {
        self.snapshot.update(|s| {
            s.raw_responses.push(response.clone());
            s.usage += response.usage;
        });
    }

    pub(crate) fn record_input_guardrails(&self, results: &[InputGuardrailResult]) {
        self.snapshot
            .update(|s| s.input_guardrail_results.extend_from_slice(results));
    }

    pub(crate) fn record_output_guardrails(&self, results: &[OutputGuardrailResult]) {
        self.snapshot
            .update(|s| s.output_guardrail_results.extend_from_slice(results));
    }

    pub(crate) fn record_final_output(&self, value: &Value) {
        self.snapshot.update(|s| s.final_output = Some(value.clone()));
    }

    pub(crate) async fn done(&self, result: Result<RunResult>) {
        let _ignored = self.sender.send(StreamMessage::Done(result)).await;
    }
}

/// Consumer-visible handle to a run in progress.
///
/// Produced by [`Runner::run_streamed`](crate::runner::Runner::run_streamed).
/// Pull events with [`Self::stream_events`]; stop the run early with
/// [`Self::cancel`], which is safe to call at any point, including from
/// inside the `stream_events` callback, and idempotent. The snapshot
/// accessors below are safe to call concurrently with an in-progress
/// `stream_events` call.
pub struct RunResultStreaming {
    receiver: tokio::sync::Mutex<mpsc::Receiver<StreamMessage>>,
    snapshot: Arc<StreamingSnapshot>,
    complete: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl RunResultStreaming {
    pub(crate) fn new(
        receiver: mpsc::Receiver<StreamMessage>,
        snapshot: Arc<StreamingSnapshot>,
        complete: Arc<AtomicBool>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            receiver: tokio::sync::Mutex::new(receiver),
            snapshot,
            complete,
            task,
        }
    }

    /// Pull every event as the background turn loop produces it, calling
    /// `on_event` for each. Returns the same [`RunResult`]
    /// [`Runner::run`](crate::runner::Runner::run) would have returned for
    /// an equivalent blocking call, once the loop finishes.
    ///
    /// # Errors
    ///
    /// Propagates whatever error ended the run, whatever error `on_event`
    /// returns to stop early (the run is cancelled in that case), or an
    /// [`Error::AgentsError`] if the run was cancelled before it produced a
    /// result.
    pub async fn stream_events<F>(&self, mut on_event: F) -> Result<RunResult>
    where
        F: FnMut(RunStreamEvent) -> Result<()>,
    {
        let mut receiver = self.receiver.lock().await;
        loop {
            match receiver.recv().await {
                Some(StreamMessage::Event(event)) => {
                    if let Err(err) = on_event(event) {
                        drop(receiver);
                        self.cancel();
                        return Err(err);
                    }
                }
                Some(StreamMessage::Done(result)) => return result,
                None => {
                    return Err(Error::agent(
                        "streamed run was cancelled before it produced a result",
                    ));
                }
            }
        }
    }

    /// Cancel the run.
    ///
    /// Two-phase: first marks the result complete (so a racing
    /// `stream_events` caller sees `is_complete() == true` even before the
    /// task finishes unwinding), then aborts the background task and every
    /// tool/guardrail/model call it was awaiting. Idempotent — a second
    /// call is a no-op. Calling this before any event has been pulled
    /// means `stream_events` yields zero events.
    pub fn cancel(&self) {
        if self.complete.swap(true, Ordering::SeqCst) {
            return;
        }
        self.task.abort();
    }

    /// Whether the run has finished (successfully, with an error, or via
    /// [`Self::cancel`]).
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::SeqCst)
    }

    /// The turn currently in progress, or the last one completed.
    #[must_use]
    pub fn current_turn(&self) -> usize {
        self.snapshot.current_turn.load(Ordering::SeqCst)
    }

    /// The agent last known to be in control.
    #[must_use]
    pub fn last_agent(&self) -> Option<AgentRef> {
        self.snapshot.snapshot().last_agent
    }

    /// Every run-item produced so far, in order.
    #[must_use]
    pub fn new_items(&self) -> Vec<RunItem> {
        self.snapshot.snapshot().new_items
    }

    /// Every raw model response collected so far.
    #[must_use]
    pub fn raw_responses(&self) -> Vec<ModelResponse> {
        self.snapshot.snapshot().raw_responses
    }

    /// Input guardrail results collected so far.
    #[must_use]
    pub fn input_guardrail_results(&self) -> Vec<InputGuardrailResult> {
        self.snapshot.snapshot().input_guardrail_results
    }

    /// Output guardrail results collected so far.
    #[must_use]
    pub fn output_guardrail_results(&self) -> Vec<OutputGuardrailResult> {
        self.snapshot.snapshot().output_guardrail_results
    }

    /// The final output, once the run has produced one (before guardrails
    /// on it have necessarily passed — check [`Self::is_complete`] and the
    /// result of [`Self::stream_events`] for the authoritative outcome).
    #[must_use]
    pub fn final_output(&self) -> Option<Value> {
        self.snapshot.snapshot().final_output
    }

    /// Cumulative token usage across every model call so far.
    #[must_use]
    pub fn usage(&self) -> Usage {
        self.snapshot.snapshot().usage
    }
}

impl std::fmt::Debug for RunResultStreaming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunResultStreaming")
            .field("current_turn", &self.current_turn())
            .field("is_complete", &self.is_complete())
            .finish_non_exhaustive()
    }
}
