//! Change notifications for target-tree edits.
//!
//! Setters on [`crate::target::TargetTree`] publish a [`TargetEvent`] on the
//! tree's [`ChangeBus`] after the mutation has been applied. Callbacks run
//! synchronously on the mutating thread, in registration order.

use std::fmt;

use serde::Serialize;

use crate::target::{FilterAmbiguity, Params, TargetId};

/// Which property of a node changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetProperty {
    Name,
    Hidden,
    Href,
    Loaded,
    FilterAmbiguity,
    Includes,
    Excludes,
    Required,
    Transport,
    TransportParams,
    Packager,
    PackagerParams,
    Children,
}

/// Snapshot of a property value carried by a change event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    None,
    Bool(bool),
    Text(String),
    Patterns(Vec<String>),
    Params(Params),
    Ambiguity(FilterAmbiguity),
    Children(Vec<TargetId>),
}

impl From<Option<String>> for PropertyValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(PropertyValue::None, PropertyValue::Text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum TargetEvent {
    /// A single property of `target` changed from `old` to `new`.
    Changed {
        target: TargetId,
        property: TargetProperty,
        old: PropertyValue,
        new: PropertyValue,
    },
    /// The whole tree was swapped for a freshly opened one. Previously held
    /// ids are no longer meaningful.
    TreeReplaced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback = Box<dyn Fn(&TargetEvent) + Send + Sync>;

#[derive(Default)]
pub struct ChangeBus {
    next_id: u64,
    listeners: Vec<(ListenerId, Callback)>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, callback: F) -> ListenerId
    where
        F: Fn(&TargetEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(callback)));
        id
    }

    /// Returns false when `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn publish(&self, event: &TargetEvent) {
        tracing::debug!(listeners = self.listeners.len(), ?event, "target_event");
        for (_, callback) in &self.listeners {
            callback(event);
        }
    }
}

impl fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
