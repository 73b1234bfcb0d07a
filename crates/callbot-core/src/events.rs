//! The typed publish/subscribe event bus described in spec.md §4.1.
//!
//! `emit` is synchronous: subscribers run in subscription order on the
//! caller's thread, and a panicking subscriber is isolated so later
//! subscribers still run. The registry is mutated under an exclusive lock;
//! emission iterates a snapshot taken under that lock, so a subscriber that
//! subscribes or unsubscribes during dispatch never deadlocks or observes a
//! torn registry.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::call::CallId;
use crate::recorder::SpeechSegment;

/// The closed set of lifecycle event tags named in spec.md §2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTag {
    CallAnswered,
    CallDisconnected,
    RecordingStarted,
    RecordingPaused,
    RecordingResumed,
    RecordingStopped,
    SpeechDetected,
    SpeechSegmentComplete,
    AudioPlaying,
    AudioEnded,
    AccountRegistered,
    AgentStarted,
    AgentStopping,
    AgentStopped,
}

/// A fully-formed event, carrying the `agent_id`/`timestamp` every event
/// requires plus whatever tag-specific fields spec.md §6 lists.
#[derive(Debug, Clone)]
pub enum Event {
    CallAnswered {
        agent_id: String,
        timestamp: DateTime<Utc>,
        call_id: CallId,
    },
    CallDisconnected {
        agent_id: String,
        timestamp: DateTime<Utc>,
        call_id: CallId,
        duration: f64,
    },
    RecordingStarted {
        agent_id: String,
        timestamp: DateTime<Utc>,
        call_id: CallId,
        path: String,
    },
    RecordingPaused {
        agent_id: String,
        timestamp: DateTime<Utc>,
        call_id: CallId,
    },
    RecordingResumed {
        agent_id: String,
        timestamp: DateTime<Utc>,
        call_id: CallId,
    },
    RecordingStopped {
        agent_id: String,
        timestamp: DateTime<Utc>,
        call_id: CallId,
        path: String,
        duration: f64,
    },
    SpeechDetected {
        agent_id: String,
        timestamp: DateTime<Utc>,
        call_id: CallId,
        start_ms: i64,
    },
    SpeechSegmentComplete {
        agent_id: String,
        timestamp: DateTime<Utc>,
        call_id: CallId,
        segment: SpeechSegment,
        path: String,
    },
    AudioPlaying {
        agent_id: String,
        timestamp: DateTime<Utc>,
        call_id: CallId,
        file_path: String,
        duration: f64,
    },
    AudioEnded {
        agent_id: String,
        timestamp: DateTime<Utc>,
        call_id: CallId,
        file_path: String,
    },
    AccountRegistered {
        agent_id: String,
        timestamp: DateTime<Utc>,
        status: String,
    },
    AgentStarted {
        agent_id: String,
        timestamp: DateTime<Utc>,
    },
    AgentStopping {
        agent_id: String,
        timestamp: DateTime<Utc>,
    },
    AgentStopped {
        agent_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    /// The tag this event was emitted under.
    pub fn tag(&self) -> EventTag {
        match self {
            Event::CallAnswered { .. } => EventTag::CallAnswered,
            Event::CallDisconnected { .. } => EventTag::CallDisconnected,
            Event::RecordingStarted { .. } => EventTag::RecordingStarted,
            Event::RecordingPaused { .. } => EventTag::RecordingPaused,
            Event::RecordingResumed { .. } => EventTag::RecordingResumed,
            Event::RecordingStopped { .. } => EventTag::RecordingStopped,
            Event::SpeechDetected { .. } => EventTag::SpeechDetected,
            Event::SpeechSegmentComplete { .. } => EventTag::SpeechSegmentComplete,
            Event::AudioPlaying { .. } => EventTag::AudioPlaying,
            Event::AudioEnded { .. } => EventTag::AudioEnded,
            Event::AccountRegistered { .. } => EventTag::AccountRegistered,
            Event::AgentStarted { .. } => EventTag::AgentStarted,
            Event::AgentStopping { .. } => EventTag::AgentStopping,
            Event::AgentStopped { .. } => EventTag::AgentStopped,
        }
    }

    /// The `agent_id` carried by every event.
    pub fn agent_id(&self) -> &str {
        match self {
            Event::CallAnswered { agent_id, .. }
            | Event::CallDisconnected { agent_id, .. }
            | Event::RecordingStarted { agent_id, .. }
            | Event::RecordingPaused { agent_id, .. }
            | Event::RecordingResumed { agent_id, .. }
            | Event::RecordingStopped { agent_id, .. }
            | Event::SpeechDetected { agent_id, .. }
            | Event::SpeechSegmentComplete { agent_id, .. }
            | Event::AudioPlaying { agent_id, .. }
            | Event::AudioEnded { agent_id, .. }
            | Event::AccountRegistered { agent_id, .. }
            | Event::AgentStarted { agent_id, .. }
            | Event::AgentStopping { agent_id, .. }
            | Event::AgentStopped { agent_id, .. } => agent_id,
        }
    }

    /// The call this event pertains to, if any (agent-lifecycle and
    /// account-registration events have none).
    pub fn call_id(&self) -> Option<&str> {
        match self {
            Event::CallAnswered { call_id, .. }
            | Event::CallDisconnected { call_id, .. }
            | Event::RecordingStarted { call_id, .. }
            | Event::RecordingPaused { call_id, .. }
            | Event::RecordingResumed { call_id, .. }
            | Event::RecordingStopped { call_id, .. }
            | Event::SpeechDetected { call_id, .. }
            | Event::SpeechSegmentComplete { call_id, .. }
            | Event::AudioPlaying { call_id, .. }
            | Event::AudioEnded { call_id, .. } => Some(call_id.as_str()),
            _ => None,
        }
    }
}

type Subscriber = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscription {
    id: Uuid,
    handler: Subscriber,
}

/// Process-wide (or per-agent, see [`crate::agent::AgentEventBus`]) typed
/// publish/subscribe hub.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<EventTag, Vec<Subscription>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `tag`. Returns a subscription id usable with
    /// [`EventBus::unsubscribe`].
    pub fn subscribe<F>(&self, tag: EventTag, handler: F) -> Uuid
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        let mut subscribers = self.subscribers.write().unwrap();
        subscribers.entry(tag).or_default().push(Subscription {
            id,
            handler: Arc::new(handler),
        });
        id
    }

    /// Remove a previously registered subscription. Returns `true` if a
    /// subscription with that id was found under `tag`.
    pub fn unsubscribe(&self, tag: EventTag, id: Uuid) -> bool {
        let mut subscribers = self.subscribers.write().unwrap();
        if let Some(subs) = subscribers.get_mut(&tag) {
            let before = subs.len();
            subs.retain(|s| s.id != id);
            return subs.len() != before;
        }
        false
    }

    /// Fill in a missing `timestamp` and deliver the event synchronously, in
    /// subscription order, to every subscriber registered under its tag. A
    /// panicking subscriber is caught and logged; later subscribers still
    /// run. A tag with no subscribers is a no-op.
    pub fn emit(&self, event: Event) {
        let tag = event.tag();
        let snapshot: Vec<Subscriber> = {
            let subscribers = self.subscribers.read().unwrap();
            subscribers
                .get(&tag)
                .map(|subs| subs.iter().map(|s| s.handler.clone()).collect())
                .unwrap_or_default()
        };

        for handler in snapshot {
            let result = panic::catch_unwind(AssertUnwindSafe(|| handler(&event)));
            if let Err(payload) = result {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "subscriber panicked".to_string());
                tracing::error!(tag = ?tag, %message, "event subscriber failed; continuing");
            }
        }
    }

    /// Number of subscribers currently registered across all tags.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap().values().map(Vec::len).sum()
    }
}

/// Stamp a missing timestamp with the current wall-clock time.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emit_with_no_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.emit(Event::AgentStarted {
            agent_id: "a1".into(),
            timestamp: now(),
        });
    }

    #[test]
    fn subscribers_run_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let o1 = order.clone();
        bus.subscribe(EventTag::AgentStarted, move |_| o1.lock().unwrap().push(1));
        let o2 = order.clone();
        bus.subscribe(EventTag::AgentStarted, move |_| o2.lock().unwrap().push(2));

        bus.emit(Event::AgentStarted {
            agent_id: "a1".into(),
            timestamp: now(),
        });

        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn panicking_subscriber_does_not_block_siblings() {
        let bus = EventBus::new();
        let ran = Arc::new(AtomicUsize::new(0));

        bus.subscribe(EventTag::AgentStarted, |_| panic!("boom"));
        let ran2 = ran.clone();
        bus.subscribe(EventTag::AgentStarted, move |_| {
            ran2.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(Event::AgentStarted {
            agent_id: "a1".into(),
            timestamp: now(),
        });

        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        let id = bus.subscribe(EventTag::AgentStopped, move |_| {
            ran2.fetch_add(1, Ordering::SeqCst);
        });

        assert!(bus.unsubscribe(EventTag::AgentStopped, id));
        bus.emit(Event::AgentStopped {
            agent_id: "a1".into(),
            timestamp: now(),
        });
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
