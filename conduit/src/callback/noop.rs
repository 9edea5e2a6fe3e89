//! No-op (empty) implementations of hook traits.
//!
//! These types provide zero-overhead default implementations for both
//! [`RunHooks`] and [`AgentHooks`]. They are used as the default when
//! no custom hooks are configured.
//!
//! # Design
//!
//! Since both traits already have default no-op implementations for every
//! method, `NoopRunHooks` and `NoopAgentHooks` simply rely on those defaults.
//! The structs exist as concrete types so they can be used as default values
//! in builder patterns and `Option<BoxedRunHooks>` scenarios.

use async_trait::async_trait;

use super::hooks::{AgentHooks, RunHooks};

/// A no-op implementation of [`RunHooks`] that does nothing.
///
/// This is the default hook used when no custom run hooks are configured.
/// All methods are inherited from the trait defaults (empty bodies).
///
/// # Example
///
/// ```rust
/// use conduit::callback::NoopRunHooks;
///
/// let hooks = NoopRunHooks;
/// // All hook methods do nothing — zero overhead.
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRunHooks;

#[async_trait]
impl RunHooks for NoopRunHooks {}

/// A no-op implementation of [`AgentHooks`] that does nothing.
///
/// This is the default hook used when no custom agent hooks are configured.
/// All methods are inherited from the trait defaults (empty bodies).
///
/// # Example
///
/// ```rust
/// use conduit::callback::NoopAgentHooks;
///
/// let hooks = NoopAgentHooks;
/// // All hook methods do nothing — zero overhead.
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAgentHooks;

#[async_trait]
impl AgentHooks for NoopAgentHooks {}
