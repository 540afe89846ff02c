//! Event fan-out for run observability.
//!
//! Nodes and the run manager emit [`Event`]s over a flume channel; the bus
//! drains the channel into configured [`EventSink`]s on a background task.
//! Sinks are presentation-side observers only; they never participate in
//! node execution.

use std::io;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scope attached to the final diagnostic event of a run's stream.
pub const STREAM_END_SCOPE: &str = "__codeloom_stream_end__";

/// An observable event emitted during run execution.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Event {
    Node(NodeEvent),
    Diagnostic(DiagnosticEvent),
}

impl Event {
    /// A node-scoped event without node metadata.
    pub fn node_message(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Node(NodeEvent {
            node_id: None,
            step: None,
            scope: scope.into(),
            message: message.into(),
            when: Utc::now(),
        })
    }

    /// A node-scoped event carrying the node id and step.
    pub fn node_message_with_meta(
        node_id: impl Into<String>,
        step: u64,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Event::Node(NodeEvent {
            node_id: Some(node_id.into()),
            step: Some(step),
            scope: scope.into(),
            message: message.into(),
            when: Utc::now(),
        })
    }

    /// A diagnostic event from the run manager itself.
    pub fn diagnostic(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Diagnostic(DiagnosticEvent {
            scope: scope.into(),
            message: message.into(),
            when: Utc::now(),
        })
    }

    /// The event's scope label.
    #[must_use]
    pub fn scope_label(&self) -> &str {
        match self {
            Event::Node(e) => &e.scope,
            Event::Diagnostic(e) => &e.scope,
        }
    }

    /// The event's message text.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Event::Node(e) => &e.message,
            Event::Diagnostic(e) => &e.message,
        }
    }
}

/// Event emitted by a workflow node.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeEvent {
    pub node_id: Option<String>,
    pub step: Option<u64>,
    pub scope: String,
    pub message: String,
    pub when: DateTime<Utc>,
}

/// Event emitted by the runtime outside any node.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticEvent {
    pub scope: String,
    pub message: String,
    pub when: DateTime<Utc>,
}

/// Destination for drained events.
pub trait EventSink: Send + 'static {
    fn handle(&mut self, event: &Event) -> io::Result<()>;
}

/// Sink that logs events through `tracing`.
#[derive(Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn handle(&mut self, event: &Event) -> io::Result<()> {
        match event {
            Event::Node(e) => tracing::info!(
                target: "codeloom::events",
                node = e.node_id.as_deref().unwrap_or("-"),
                step = e.step.unwrap_or_default(),
                scope = %e.scope,
                "{}",
                e.message
            ),
            Event::Diagnostic(e) => tracing::info!(
                target: "codeloom::events",
                scope = %e.scope,
                "{}",
                e.message
            ),
        }
        Ok(())
    }
}

/// Sink that retains events in memory for inspection (tests, dashboards).
#[derive(Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all events handled so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().expect("memory sink poisoned").clone()
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, event: &Event) -> io::Result<()> {
        self.events
            .lock()
            .expect("memory sink poisoned")
            .push(event.clone());
        Ok(())
    }
}

/// Sink that forwards events into a flume channel, for streaming consumers.
pub struct ChannelSink {
    sender: flume::Sender<Event>,
}

impl ChannelSink {
    #[must_use]
    pub fn new(sender: flume::Sender<Event>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, event: &Event) -> io::Result<()> {
        // A dropped receiver just means the consumer went away.
        let _ = self.sender.send(event.clone());
        Ok(())
    }
}

/// Fan-out hub: one ingress channel, many sinks.
///
/// Cloneable; clones share the ingress channel and sink set.
#[derive(Clone)]
pub struct EventBus {
    sender: flume::Sender<Event>,
    receiver: flume::Receiver<Event>,
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_sinks(vec![Box::new(TracingSink)])
    }
}

impl EventBus {
    /// Creates a bus with the given sinks.
    #[must_use]
    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            sender,
            receiver,
            sinks: Arc::new(Mutex::new(sinks)),
        }
    }

    /// Sender handle for node contexts.
    #[must_use]
    pub fn sender(&self) -> flume::Sender<Event> {
        self.sender.clone()
    }

    /// Add a sink after construction, before or during execution.
    pub fn add_sink(&self, sink: impl EventSink) {
        self.sinks
            .lock()
            .expect("event bus sinks poisoned")
            .push(Box::new(sink));
    }

    /// Emit an event directly onto the bus.
    pub fn emit(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    /// Spawn the background drain task.
    ///
    /// The task ends when every sender handle (including the bus's own,
    /// once dropped) is gone and the channel is drained.
    pub fn listen_for_events(&self) -> tokio::task::JoinHandle<()> {
        let receiver = self.receiver.clone();
        let sinks = Arc::clone(&self.sinks);
        tokio::spawn(async move {
            while let Ok(event) = receiver.recv_async().await {
                let mut sinks = sinks.lock().expect("event bus sinks poisoned");
                for sink in sinks.iter_mut() {
                    if let Err(err) = sink.handle(&event) {
                        tracing::warn!(error = %err, "event sink failed to handle event");
                    }
                }
            }
        })
    }
}
