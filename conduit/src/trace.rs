//! Tracing span interface.
//!
//! This crate does not implement a tracing backend — spans are an external
//! collaborator's concern, just like the [`Model`](crate::model::Model) and
//! [`Session`](crate::session::Session) interfaces. The turn driver opens a
//! [`Span`] around each agent turn, model call, and tool/handoff invocation
//! and lets the caller's implementation decide where that goes (in-process
//! `tracing` spans, an OpenTelemetry exporter, or nothing at all via
//! [`NoopSpan`]).

use std::sync::Arc;

/// A single traced unit of work (a turn, a model call, a tool invocation).
///
/// Implementations are expected to be cheap to create and to finish
/// exactly once; the turn driver always pairs a `start` with either
/// `finish` or `error`, never both.
pub trait Span: Send + Sync {
    /// Mark the span as finished successfully.
    fn finish(&self);

    /// Mark the span as finished with an error, recording its message.
    fn error(&self, message: &str);
}

/// Creates [`Span`]s for named units of work.
///
/// An implementation typically wraps a `tracing::Span` or an OpenTelemetry
/// tracer; the turn driver only needs `start`.
pub trait Tracer: Send + Sync {
    /// Start a new span with the given name.
    fn start(&self, name: &str) -> Box<dyn Span>;
}

/// A [`Span`] that discards everything, used when no tracer is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSpan;

impl Span for NoopSpan {
    fn finish(&self) {}
    fn error(&self, _message: &str) {}
}

/// A [`Tracer`] that produces only [`NoopSpan`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn start(&self, _name: &str) -> Box<dyn Span> {
        Box::new(NoopSpan)
    }
}

/// A shared [`Tracer`] trait object.
pub type SharedTracer = Arc<dyn Tracer>;

/// Bundles a [`SharedTracer`] with [`RunConfig::trace_disabled`](crate::runner::RunConfig::trace_disabled)
/// so a span can be opened without threading the whole run config through
/// [`executor`](crate::executor) and [`guardrail`](crate::guardrail) call sites.
#[derive(Clone)]
pub struct TraceContext {
    tracer: SharedTracer,
    disabled: bool,
}

impl TraceContext {
    /// Build a trace context from a tracer and the run's disabled flag.
    #[must_use]
    pub fn new(tracer: SharedTracer, disabled: bool) -> Self {
        Self { tracer, disabled }
    }

    /// Open a span named `name`, or a [`NoopSpan`] when tracing is disabled
    /// for this run.
    #[must_use]
    pub fn span(&self, name: &str) -> Box<dyn Span> {
        if self.disabled {
            Box::new(NoopSpan)
        } else {
            self.tracer.start(name)
        }
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new(Arc::new(NoopTracer), false)
    }
}

/// Runs `fut` under `span`, finishing it on success or recording the
/// error's message on failure, then returns the result unchanged.
pub async fn traced<T>(
    span: Box<dyn Span>,
    fut: impl std::future::Future<Output = crate::error::Result<T>>,
) -> crate::error::Result<T> {
    match fut.await {
        Ok(value) => {
            span.finish();
            Ok(value)
        }
        Err(err) => {
            span.error(&err.to_string());
            Err(err)
        }
    }
}

/// Synchronous counterpart of [`traced`], for a result already in hand.
pub fn traced_result<T>(span: Box<dyn Span>, result: crate::error::Result<T>) -> crate::error::Result<T> {
    match result {
        Ok(value) => {
            span.finish();
            Ok(value)
        }
        Err(err) => {
            span.error(&err.to_string());
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_span_accepts_finish_and_error() {
        let span = NoopSpan;
        span.finish();
        span.error("boom");
    }

    #[test]
    fn noop_tracer_produces_spans() {
        let tracer = NoopTracer;
        let span = tracer.start("turn");
        span.finish();
    }

    #[test]
    fn disabled_trace_context_yields_a_span_regardless_of_tracer() {
        let trace = TraceContext::new(Arc::new(NoopTracer), true);
        let span = trace.span("turn");
        span.finish();
    }

    #[derive(Default)]
    struct RecordingSpan {
        finished: std::sync::atomic::AtomicBool,
        errored: std::sync::Mutex<Option<String>>,
    }

    impl RecordingSpan {
        fn finish_impl(&self) {
            self.finished.store(true, std::sync::atomic::Ordering::SeqCst);
        }
        fn error_impl(&self, message: &str) {
            *self.errored.lock().unwrap() = Some(message.to_owned());
        }
    }

    impl Span for Arc<RecordingSpan> {
        fn finish(&self) {
            self.finish_impl();
        }
        fn error(&self, message: &str) {
            self.error_impl(message);
        }
    }

    #[tokio::test]
    async fn traced_finishes_the_span_on_success() {
        let span = Arc::new(RecordingSpan::default());
        let result: crate::error::Result<u32> =
            traced(Box::new(Arc::clone(&span)), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert!(span.finished.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn traced_result_records_the_error_message_on_failure() {
        let span = Arc::new(RecordingSpan::default());
        let result: crate::error::Result<u32> =
            traced_result(Box::new(Arc::clone(&span)), Err(crate::error::Error::user("bad input")));
        assert!(result.is_err());
        assert!(span.errored.lock().unwrap().as_deref().unwrap().contains("bad input"));
    }
}
