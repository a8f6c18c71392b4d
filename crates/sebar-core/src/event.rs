//! Named event registry
//!
//! External code hooks node-level occurrences (health checks, custom triggers)
//! by registering a handler under an event name. Names are normalized (trimmed
//! and lowercased), so `"  HealthCheck "` and `"healthcheck"` are the same event.

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use sebar_common::{HEALTHCHECK_EVENT, SebarError};

use crate::node::Node;

/// Normalized event name
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventName(String);

impl EventName {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_lowercase())
    }

    /// Event fired on every tick of the run loop
    pub fn healthcheck() -> Self {
        Self(HEALTHCHECK_EVENT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for EventName {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<&String> for EventName {
    fn from(name: &String) -> Self {
        Self::new(name)
    }
}

/// Outcome flag of a dispatched event
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventStatus {
    #[default]
    Ok,
    Error,
}

/// Result returned by an event handler
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventResult {
    pub status: EventStatus,
    pub message: String,
    pub data: Value,
}

impl EventResult {
    /// Empty success
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn with_data(data: Value) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: EventStatus::Error,
            message: message.into(),
            data: Value::Null,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == EventStatus::Ok
    }

    pub fn is_error(&self) -> bool {
        self.status == EventStatus::Error
    }
}

impl From<SebarError> for EventResult {
    fn from(err: SebarError) -> Self {
        Self::error(err.to_string())
    }
}

/// Context handed to a handler on dispatch
pub struct EventContext<'a> {
    /// Node that dispatched the event
    pub server: &'a Node,
    /// Normalized name the handler was registered under
    pub event: &'a EventName,
    /// Caller supplied payload, `Value::Null` for run-loop events
    pub payload: Value,
}

/// Handler invoked synchronously on the dispatching task
pub type EventHandler = Arc<dyn Fn(&EventContext<'_>) -> Option<EventResult> + Send + Sync>;

/// Mapping of event name to handler.
///
/// Only the map is guarded. Handlers are cloned out and invoked after the
/// guard is released, so concurrent dispatches of different events interleave
/// and a handler may re-enter the registry.
#[derive(Default)]
pub struct EventRegistry {
    handlers: RwLock<HashMap<EventName, EventHandler>>,
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("events", &self.names())
            .finish()
    }
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous handler of the same name
    pub fn register<F>(&self, name: impl Into<EventName>, handler: F)
    where
        F: Fn(&EventContext<'_>) -> Option<EventResult> + Send + Sync + 'static,
    {
        let name = name.into();
        info!(event = %name, "Registering handler for event '{}'", name);
        self.handlers.write().insert(name, Arc::new(handler));
    }

    /// Remove a handler, returns whether one was registered
    pub fn unregister(&self, name: impl Into<EventName>) -> bool {
        let name = name.into();
        let removed = self.handlers.write().remove(&name).is_some();
        if removed {
            info!(event = %name, "Unregistered handler for event '{}'", name);
        }
        removed
    }

    pub fn contains(&self, name: impl Into<EventName>) -> bool {
        self.handlers.read().contains_key(&name.into())
    }

    /// Registered event names, sorted
    pub fn names(&self) -> Vec<EventName> {
        let mut names: Vec<EventName> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Invoke the handler registered under `name` exactly once.
    ///
    /// An unknown name is logged at warn and yields an error-flagged result
    /// naming the event. A handler returning `None` yields an empty success.
    pub fn dispatch(&self, server: &Node, name: impl Into<EventName>, payload: Value) -> EventResult {
        let name = name.into();
        match self.try_dispatch(server, &name, payload) {
            Some(result) => result,
            None => {
                let err = SebarError::UnknownEvent(name.to_string());
                warn!(event = %name, "{}", err);
                err.into()
            }
        }
    }

    /// Like [`dispatch`](Self::dispatch), but returns `None` without logging
    /// when no handler is registered under `name`.
    pub fn try_dispatch(&self, server: &Node, name: &EventName, payload: Value) -> Option<EventResult> {
        let handler = self.handlers.read().get(name).cloned()?;

        let context = EventContext {
            server,
            event: name,
            payload,
        };
        Some(handler(&context).unwrap_or_default())
    }
}
