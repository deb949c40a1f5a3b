//! Per-run publish/subscribe bus for one-shot event notification.
//!
//! A [`SignalBus`] is constructed per engine instance and stamped with that
//! engine's [`EngineId`]. Handlers run synchronously inside
//! [`send`](SignalBus::send); a failing handler aborts delivery and the
//! error propagates to the sender.

use std::collections::VecDeque;
use std::fmt;

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::trace;

use crate::error::SignalError;
use crate::id::{EngineId, HandlerId};
use crate::signal::{Signal, SignalKind};
use crate::Day;

/// A signal in flight, tagged with its sender scope and the simulated day.
#[derive(Clone, Copy, Debug)]
pub struct Envelope<'a> {
    /// Engine instance that sent the signal.
    pub scope: EngineId,
    /// Simulated day on which it was sent.
    pub day: Day,
    /// The signal itself.
    pub signal: &'a Signal,
}

type Handler = Box<dyn FnMut(&Envelope<'_>) -> Result<(), SignalError>>;

/// Synchronous signal bus scoped to one engine instance.
pub struct SignalBus {
    scope: EngineId,
    handlers: IndexMap<SignalKind, SmallVec<[(HandlerId, Handler); 2]>>,
    next_handler: u64,
}

impl SignalBus {
    /// Create a bus owned by the engine instance `scope`.
    pub fn new(scope: EngineId) -> Self {
        Self {
            scope,
            handlers: IndexMap::new(),
            next_handler: 0,
        }
    }

    /// The engine instance this bus belongs to.
    pub fn scope(&self) -> EngineId {
        self.scope
    }

    /// Connect `handler` to `kind`. Returns an id for [`disconnect`](Self::disconnect).
    pub fn connect<F>(&mut self, kind: SignalKind, handler: F) -> HandlerId
    where
        F: FnMut(&Envelope<'_>) -> Result<(), SignalError> + 'static,
    {
        let id = HandlerId(self.next_handler);
        self.next_handler += 1;
        self.handlers
            .entry(kind)
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Disconnect a handler. Returns `false` if it was not connected.
    pub fn disconnect(&mut self, id: HandlerId) -> bool {
        for list in self.handlers.values_mut() {
            if let Some(pos) = list.iter().position(|(h, _)| *h == id) {
                drop(list.remove(pos));
                return true;
            }
        }
        false
    }

    /// Number of handlers connected to `kind`.
    pub fn handler_count(&self, kind: SignalKind) -> usize {
        self.handlers.get(&kind).map_or(0, |l| l.len())
    }

    /// Send `signal` from this bus's own scope.
    ///
    /// Returns the number of handlers invoked.
    pub fn send(&mut self, day: Day, signal: &Signal) -> Result<usize, SignalError> {
        let envelope = Envelope {
            scope: self.scope,
            day,
            signal,
        };
        self.deliver(&envelope)
    }

    /// Deliver an envelope to every handler connected to its topic.
    ///
    /// Envelopes from another engine's scope are dropped without invoking
    /// any handler.
    pub fn deliver(&mut self, envelope: &Envelope<'_>) -> Result<usize, SignalError> {
        if envelope.scope != self.scope {
            trace!(
                bus = %self.scope,
                sender = %envelope.scope,
                "dropping signal from foreign scope"
            );
            return Ok(0);
        }
        let kind = envelope.signal.kind();
        let Some(list) = self.handlers.get_mut(&kind) else {
            return Ok(0);
        };
        for (_, handler) in list.iter_mut() {
            handler(envelope)?;
        }
        trace!(topic = %kind, handlers = list.len(), day = %envelope.day, "signal delivered");
        Ok(list.len())
    }
}

impl fmt::Debug for SignalBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: IndexMap<SignalKind, usize> =
            self.handlers.iter().map(|(k, l)| (*k, l.len())).collect();
        f.debug_struct("SignalBus")
            .field("scope", &self.scope)
            .field("handlers", &counts)
            .finish()
    }
}

// ── Outbox ─────────────────────────────────────────────────────

/// FIFO of signals raised during a phase, dispatched by the engine once
/// every component has run that phase.
#[derive(Clone, Debug, Default)]
pub struct Outbox {
    queue: VecDeque<Signal>,
}

impl Outbox {
    /// Create an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a signal.
    pub fn send(&mut self, signal: Signal) {
        self.queue.push_back(signal);
    }

    /// Take the oldest queued signal.
    pub fn pop(&mut self) -> Option<Signal> {
        self.queue.pop_front()
    }

    /// Number of queued signals.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queued signals, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Signal> {
        self.queue.iter()
    }

    /// Move every queued signal out, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = Signal> + '_ {
        self.queue.drain(..)
    }
}
