//! Conversation memory, prepended transparently to a run's input.
//!
//! A [`Session`] is an external collaborator, just like [`Model`](crate::model::Model)
//! and [`Mcp`](crate::mcp::Mcp): this crate defines the contract (load prior
//! items, append new ones, close) without committing to a storage engine.
//! The turn driver reads a session exactly once, before the first turn, and
//! writes to it exactly once, after the run produces a final output.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::message::{Input, InputItem};

/// Opaque store of prior input items, addressable by session id.
///
/// Implementations own their storage (in-memory, SQLite, Redis, ...); the
/// turn driver only ever calls these three operations.
#[async_trait]
pub trait Session: Send + Sync {
    /// Load prior items, oldest first, keeping at most the last `limit`
    /// when given.
    async fn get_items(&self, limit: Option<usize>) -> Result<Vec<InputItem>>;

    /// Append items to the session's history.
    async fn add_items(&self, items: Vec<InputItem>) -> Result<()>;

    /// Release any resources held by this session (a connection, a file
    /// handle). The default implementation does nothing.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A boxed [`Session`] trait object.
pub type BoxedSession = Box<dyn Session>;
/// A shared [`Session`] trait object.
pub type SharedSession = std::sync::Arc<dyn Session>;

/// An in-memory [`Session`], useful for tests and single-process use.
///
/// History is lost when the process exits; nothing here is persisted.
#[derive(Debug)]
pub struct InMemorySession {
    id: String,
    items: Mutex<Vec<InputItem>>,
}

impl InMemorySession {
    /// Create a new, empty in-memory session identified by `id`.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            items: Mutex::new(Vec::new()),
        }
    }

    /// The id this session was created with.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Session for InMemorySession {
    async fn get_items(&self, limit: Option<usize>) -> Result<Vec<InputItem>> {
        let items = self.items.lock().await;
        match limit {
            None => Ok(items.clone()),
            Some(n) => Ok(items.iter().rev().take(n).rev().cloned().collect()),
        }
    }

    async fn add_items(&self, new_items: Vec<InputItem>) -> Result<()> {
        self.items.lock().await.extend(new_items);
        Ok(())
    }
}

/// Resolve the input a turn should actually see: the session's prior
/// items (if configured) prepended to the caller's own input.
///
/// Rejects [`Input::Items`] when a session is configured — whether that
/// list should append to or replace the session's history is ambiguous, so
/// the caller must pass [`Input::Text`] (or no session) instead.
///
/// # Errors
///
/// Returns [`Error::UserError`] if `input` is [`Input::Items`] and a
/// session is configured.
pub async fn prepare_input(
    session: Option<&SharedSession>,
    input: &Input,
    limit: Option<usize>,
) -> Result<Vec<InputItem>> {
    let Some(session) = session else {
        return Ok(input.to_items());
    };
    if input.is_items() {
        return Err(Error::user(
            "cannot pass a list of input items when a session is configured: \
             it is ambiguous whether they should append to or replace history",
        ));
    }
    let mut items = session.get_items(limit).await?;
    items.extend(input.to_items());
    Ok(items)
}
