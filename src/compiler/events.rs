//! Event logging for the compile pipeline.
//!
//! Every graph transformation, every pass execution and every collaborator decision can
//! be recorded as an [`Event`] in an [`EventLog`]. Events are plain data; the log can be
//! inspected after compilation through [`Program::events`](crate::Program::events) or
//! safely ignored.
//!
//! # Architecture
//!
//! - [`Event`] - one recorded event
//! - [`EventLog`] - append-only collection with query and summary helpers
//! - [`EventBuilder`] - fluent API returned by [`EventLog::record`], appends on drop
//!
//! # Example
//!
//! ```rust
//! use nngraph::compiler::{EventKind, EventLog};
//!
//! let log = EventLog::new();
//! log.record(EventKind::ConstantFolded)
//!     .pass("propagate_constants")
//!     .message("folded conv_weights");
//! log.info("pipeline finished");
//!
//! assert_eq!(log.len(), 2);
//! assert_eq!(log.summary(), "1 constant folded");
//! ```

use std::fmt;

use strum::IntoEnumIterator;

use crate::graph::NodeId;

/// What an [`EventKind`] is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    /// The graph changed.
    Transformation,
    /// Pipeline progress: passes, binding, memory analysis.
    Engine,
    /// Free-form messages.
    Diagnostic,
}

/// Kinds of recorded events, in summary order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::EnumIter)]
pub enum EventKind {
    /// A node was removed from the graph.
    NodeRemoved,
    /// A node was inserted between existing nodes.
    NodeInserted,
    /// A node took over the place of another.
    NodeReplaced,
    /// A node identifier changed.
    NodeRenamed,
    /// A constant subgraph was replaced by its precomputed value.
    ConstantFolded,
    /// An activation was fused into its producer.
    PrimitiveFused,
    /// A node was set up to work in place in another node's buffer.
    BufferFused,
    /// Output padding was requested from a dependency.
    PaddingApplied,
    /// A format or data type conversion was inserted.
    LayoutConverted,
    /// The processing order changed.
    OrderChanged,
    /// A split was expanded into crops.
    SplitExpanded,
    /// A pass started.
    PassStarted,
    /// A pass completed.
    PassCompleted,
    /// An implementation was bound to a node.
    ImplementationBound,
    /// The memory dependency graph was computed.
    MemoryDependenciesComputed,
    /// Informational message.
    Info,
    /// Something unexpected but recoverable.
    Warning,
    /// Something failed.
    Error,
    /// Debug build diagnostics.
    Debug,
}

impl EventKind {
    /// Lower case name, also the default message of an event.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::NodeRemoved => "node removed",
            Self::NodeInserted => "node inserted",
            Self::NodeReplaced => "node replaced",
            Self::NodeRenamed => "node renamed",
            Self::ConstantFolded => "constant folded",
            Self::PrimitiveFused => "primitive fused",
            Self::BufferFused => "buffer fused",
            Self::PaddingApplied => "padding applied",
            Self::LayoutConverted => "layout converted",
            Self::OrderChanged => "order changed",
            Self::SplitExpanded => "split expanded",
            Self::PassStarted => "pass started",
            Self::PassCompleted => "pass completed",
            Self::ImplementationBound => "implementation bound",
            Self::MemoryDependenciesComputed => "memory dependencies computed",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Debug => "debug",
        }
    }

    /// The category of this kind.
    #[must_use]
    pub fn category(&self) -> EventCategory {
        match self {
            Self::PassStarted
            | Self::PassCompleted
            | Self::ImplementationBound
            | Self::MemoryDependenciesComputed => EventCategory::Engine,
            Self::Info | Self::Warning | Self::Error | Self::Debug => EventCategory::Diagnostic,
            _ => EventCategory::Transformation,
        }
    }

    /// Returns `true` if this kind records a graph change.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        self.category() == EventCategory::Transformation
    }

    /// Returns `true` if this kind is a free-form message.
    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        self.category() == EventCategory::Diagnostic
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone)]
pub struct Event {
    /// The type of event.
    pub kind: EventKind,
    /// The node the event is about (if applicable).
    pub node: Option<NodeId>,
    /// Human-readable description.
    pub message: String,
    /// Associated pass name (if from a pass).
    pub pass: Option<&'static str>,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pass {
            Some(pass) => write!(f, "[{}] {}: {}", self.kind, pass, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// Builder for creating events with a fluent API.
///
/// Created by [`EventLog::record`]. The event is added to the log when the builder is
/// dropped.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    node: Option<NodeId>,
    message: Option<String>,
    pass: Option<&'static str>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            kind,
            node: None,
            message: None,
            pass: None,
        }
    }

    /// Sets the node the event is about.
    pub fn node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }

    /// Sets a custom message describing the event.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Associates this event with a specific pass.
    pub fn pass(mut self, pass_name: &'static str) -> Self {
        self.pass = Some(pass_name);
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());

        self.log.events.push(Event {
            kind: self.kind,
            node: self.node.take(),
            message,
            pass: self.pass.take(),
        });
    }
}

/// Collection of events from one compilation.
///
/// Appending only needs a shared reference, so the log can be handed to passes and
/// collaborators alongside a mutable graph.
#[derive(Debug, Default)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        let copy = Self::new();
        copy.merge(self);
        copy
    }
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts building a new event of the given kind.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Records an [`EventKind::Info`] message.
    pub fn info(&self, message: impl Into<String>) {
        self.record(EventKind::Info).message(message);
    }

    /// Records an [`EventKind::Warning`] message.
    pub fn warn(&self, message: impl Into<String>) {
        self.record(EventKind::Warning).message(message);
    }

    /// Records an [`EventKind::Error`] message.
    pub fn error(&self, message: impl Into<String>) {
        self.record(EventKind::Error).message(message);
    }

    /// Records an [`EventKind::Debug`] message.
    pub fn debug(&self, message: impl Into<String>) {
        self.record(EventKind::Debug).message(message);
    }

    /// Appends all events of `other`.
    pub fn merge(&self, other: &EventLog) {
        for event in other {
            self.events.push(event.clone());
        }
    }

    /// Returns `true` if an event of `kind` was recorded.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.iter().any(|e| e.kind == kind)
    }

    /// Number of events of `kind`.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.filter_kind(kind).count()
    }

    /// All events in recording order.
    pub fn iter(&self) -> Events<'_> {
        self.into_iter()
    }

    /// Events of one kind.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.kind == kind)
    }

    /// Events recorded by the pass named `pass`.
    pub fn filter_pass<'a>(&'a self, pass: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.iter().filter(move |e| e.pass == Some(pass))
    }

    /// Events about `node`, in recording order.
    pub fn for_node(&self, node: NodeId) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.node == Some(node))
    }

    /// Transformation counts in [`EventKind`] order, e.g. `"1 node removed, 2 constant
    /// folded"`.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }
        let parts: Vec<String> = EventKind::iter()
            .filter(EventKind::is_transformation)
            .filter_map(|kind| match self.count_kind(kind) {
                0 => None,
                n => Some(format!("{n} {kind}")),
            })
            .collect();
        if parts.is_empty() {
            return format!("{} events", self.len());
        }
        parts.join(", ")
    }
}

/// Iterator over the events of an [`EventLog`].
pub struct Events<'a> {
    inner: boxcar::Iter<'a, Event>,
}

impl<'a> Iterator for Events<'a> {
    type Item = &'a Event;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, e)| e)
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Event;
    type IntoIter = Events<'a>;

    fn into_iter(self) -> Self::IntoIter {
        Events {
            inner: self.events.iter(),
        }
    }
}
