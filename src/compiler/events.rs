//! Event logging for the optimizer and the structurer.
//!
//! Every transformation a pass performs, and every diagnostic the engine
//! raises, can be recorded as an [`Event`]. Events can be inspected for
//! debugging or safely ignored when not needed.
//!
//! # Architecture
//!
//! - [`Event`] - A single recorded event (change, warning, info, etc.)
//! - [`EventLog`] - Append-only collection with query and summary helpers
//! - [`EventBuilder`] - Fluent API for creating events; records on drop
//!
//! The log only needs a shared reference to append, so passes can record
//! events while the function they work on is mutably borrowed elsewhere.
//!
//! # Example
//!
//! ```rust,ignore
//! use decompcore::compiler::{EventKind, EventLog};
//!
//! let log = EventLog::new();
//!
//! log.record(EventKind::ConstantPropagated)
//!     .at(0x401000, 0x401010)
//!     .message("eax_1 = 4");
//!
//! log.warn("unresolved jump at 0x401020");
//! println!("{}", log.summary());
//! ```

use std::{collections::HashMap, fmt};

/// Categories of events that can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A literal value replaced a use of its definition.
    ConstantPropagated,
    /// A single-use definition was substituted into its consumer.
    CopyPropagated,
    /// A register value was propagated into a memory write address.
    DereferencePropagated,
    /// A dead definition was removed.
    DefinitionPruned,
    /// A call was hoisted out of an assignment whose result is unused.
    CallResultExtracted,
    /// A self-referential phi definition was removed.
    PhiPruned,
    /// The simplifier rewrote a statement.
    ExpressionSimplified,
    /// A backward jump was turned into a loop.
    LoopStructured,
    /// A branch was linked to its continuation block.
    BranchLinked,
    /// A jump could not be classified and was left in place.
    EdgeUnresolved,

    /// A pass started a sweep.
    PassStarted,
    /// A pass finished a sweep.
    PassCompleted,

    /// Informational message.
    Info,
    /// Warning message.
    Warning,
    /// Error message.
    Error,
}

impl EventKind {
    /// Returns a short human-readable description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::ConstantPropagated => "constant propagated",
            Self::CopyPropagated => "copy propagated",
            Self::DereferencePropagated => "dereference propagated",
            Self::DefinitionPruned => "definition pruned",
            Self::CallResultExtracted => "call result extracted",
            Self::PhiPruned => "phi pruned",
            Self::ExpressionSimplified => "expression simplified",
            Self::LoopStructured => "loop structured",
            Self::BranchLinked => "branch linked",
            Self::EdgeUnresolved => "edge unresolved",
            Self::PassStarted => "pass started",
            Self::PassCompleted => "pass completed",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Returns true if this kind records a change to the IR.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            Self::ConstantPropagated
                | Self::CopyPropagated
                | Self::DereferencePropagated
                | Self::DefinitionPruned
                | Self::CallResultExtracted
                | Self::PhiPruned
                | Self::ExpressionSimplified
                | Self::LoopStructured
                | Self::BranchLinked
        )
    }

    /// Returns true if this is a diagnostic (info, warning, error).
    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::Info | Self::Warning | Self::Error)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single recorded event.
#[derive(Debug, Clone)]
pub struct Event {
    /// What happened.
    pub kind: EventKind,
    /// Address of the function it happened in.
    pub function: Option<u64>,
    /// Address of the statement or block involved.
    pub location: Option<u64>,
    /// Free-form detail.
    pub message: String,
    /// Name of the pass that recorded it.
    pub pass: Option<String>,
}

impl Event {
    fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            function: None,
            location: None,
            message: message.into(),
            pass: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(location) = self.location {
            write!(f, " {:#x}:", location)?;
        }
        write!(f, " {}", self.message)
    }
}

/// Builder for a single event. The event is appended to the log when the
/// builder is dropped.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    function: Option<u64>,
    location: Option<u64>,
    message: Option<String>,
    pass: Option<String>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            kind,
            function: None,
            location: None,
            message: None,
            pass: None,
        }
    }

    /// Sets both the function and the location.
    pub fn at(mut self, function: u64, location: u64) -> Self {
        self.function = Some(function);
        self.location = Some(location);
        self
    }

    /// Sets the function.
    pub fn function(mut self, function: u64) -> Self {
        self.function = Some(function);
        self
    }

    /// Sets the location.
    pub fn location(mut self, location: u64) -> Self {
        self.location = Some(location);
        self
    }

    /// Sets the message. Without one, the kind's description is used.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Sets the recording pass.
    pub fn pass(mut self, pass_name: impl Into<String>) -> Self {
        self.pass = Some(pass_name.into());
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
            function: self.function.take(),
            location: self.location.take(),
            message,
            pass: self.pass.take(),
        });
    }
}

/// Append-only collection of events.
#[derive(Debug)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        self.iter().cloned().collect()
    }
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts recording an event of the given kind.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Info, message));
    }

    /// Records a warning.
    pub fn warn(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Warning, message));
    }

    /// Records an error.
    pub fn error(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Error, message));
    }

    /// Appends copies of all events of `other`.
    pub fn merge(&self, other: &EventLog) {
        for event in other {
            self.events.push(event.clone());
        }
    }

    /// Returns true if an event of `kind` was recorded.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.iter().any(|e| e.kind == kind)
    }

    /// Returns true if an event of any of `kinds` was recorded.
    #[must_use]
    pub fn has_any(&self, kinds: &[EventKind]) -> bool {
        self.iter().any(|e| kinds.contains(&e.kind))
    }

    /// Number of events of `kind`.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.filter_kind(kind).count()
    }

    /// Iterates over all events in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Iterates over events of `kind`.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.kind == kind)
    }

    /// Iterates over events recorded for the function at `address`.
    pub fn filter_function(&self, address: u64) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.function == Some(address))
    }

    /// Iterates over transformation events.
    pub fn transformations(&self) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(|e| e.kind.is_transformation())
    }

    /// Iterates over diagnostics.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(|e| e.kind.is_diagnostic())
    }

    /// Iterates over warnings.
    pub fn warnings(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::Warning)
    }

    /// Iterates over errors.
    pub fn errors(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::Error)
    }

    /// Number of events per kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for event in self {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Number of transformation events.
    #[must_use]
    pub fn transformation_count(&self) -> usize {
        self.transformations().count()
    }

    /// One-line summary of the transformations, e.g.
    /// `"2 constant propagated, 3 definition pruned"`.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let mut parts: Vec<String> = self
            .count_by_kind()
            .iter()
            .filter(|(k, _)| k.is_transformation())
            .map(|(kind, count)| format!("{} {}", count, kind.description()))
            .collect();

        if parts.is_empty() {
            return format!("{} events", self.len());
        }

        parts.sort();
        parts.join(", ")
    }
}

/// Iterator over the events of an [`EventLog`].
pub struct EventLogIter<'a> {
    inner: boxcar::Iter<'a, Event>,
}

impl<'a> Iterator for EventLogIter<'a> {
    type Item = &'a Event;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, e)| e)
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Event;
    type IntoIter = EventLogIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        EventLogIter {
            inner: self.events.iter(),
        }
    }
}

impl Extend<Event> for EventLog {
    fn extend<T: IntoIterator<Item = Event>>(&mut self, iter: T) {
        for event in iter {
            self.events.push(event);
        }
    }
}

impl FromIterator<Event> for EventLog {
    fn from_iter<T: IntoIterator<Item = Event>>(iter: T) -> Self {
        let log = Self::new();
        for event in iter {
            log.events.push(event);
        }
        log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_on_drop() {
        let log = EventLog::new();
        assert!(log.is_empty());

        log.record(EventKind::ConstantPropagated)
            .at(0x1000, 0x1004)
            .pass("propagate_constants");
        log.record(EventKind::DefinitionPruned).message("eax_1 = 0");

        assert_eq!(log.len(), 2);
        let first = log.iter().next().unwrap();
        assert_eq!(first.function, Some(0x1000));
        assert_eq!(first.location, Some(0x1004));
        assert_eq!(first.message, "constant propagated");
        assert_eq!(first.pass.as_deref(), Some("propagate_constants"));
        assert_eq!(first.to_string(), "[constant propagated] 0x1004: constant propagated");
    }

    #[test]
    fn test_queries() {
        let log = EventLog::new();
        log.record(EventKind::DefinitionPruned).function(0x10);
        log.record(EventKind::DefinitionPruned).function(0x20);
        log.record(EventKind::PhiPruned).function(0x10);
        log.warn("unresolved");
        log.info("done");

        assert!(log.has(EventKind::PhiPruned));
        assert!(!log.has(EventKind::LoopStructured));
        assert!(log.has_any(&[EventKind::LoopStructured, EventKind::Warning]));
        assert_eq!(log.count_kind(EventKind::DefinitionPruned), 2);
        assert_eq!(log.filter_function(0x10).count(), 2);
        assert_eq!(log.transformation_count(), 3);
        assert_eq!(log.diagnostics().count(), 2);
        assert_eq!(log.warnings().count(), 1);
        assert_eq!(log.errors().count(), 0);
        assert_eq!(log.count_by_kind()[&EventKind::DefinitionPruned], 2);
    }

    #[test]
    fn test_summary() {
        let log = EventLog::new();
        assert_eq!(log.summary(), "no events");

        log.info("starting");
        assert_eq!(log.summary(), "1 events");

        log.record(EventKind::DefinitionPruned);
        log.record(EventKind::DefinitionPruned);
        log.record(EventKind::ConstantPropagated);
        assert_eq!(log.summary(), "1 constant propagated, 2 definition pruned");
    }

    #[test]
    fn test_merge_and_collect() {
        let a = EventLog::new();
        a.record(EventKind::LoopStructured);
        let b = EventLog::new();
        b.warn("w");
        b.merge(&a);
        assert_eq!(b.len(), 2);

        let copied: EventLog = b.iter().cloned().collect();
        assert_eq!(copied.len(), 2);

        let mut extended = EventLog::new();
        extended.extend(b.clone().iter().cloned());
        assert_eq!(extended.len(), 2);
    }
}
