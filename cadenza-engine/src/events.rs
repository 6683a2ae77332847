//! Engine notifications.
//!
//! State changes that happen inside `render` (a source starting on its
//! scheduled frame, a buffer running out, a crossfade finishing) cannot be
//! returned to a caller, so they are queued here and drained with
//! `AudioEngine::poll_events`. The queue is bounded; on overflow the oldest
//! event is dropped and counted. Pushing never logs, since it happens on the
//! render path; `poll_events` reports the count instead.

use std::collections::VecDeque;

use serde::Serialize;

use crate::clock::TransportState;
use crate::effects::EffectKind;
use crate::source::SourceId;

/// Why a source stopped.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    /// The buffer ran out.
    Exhausted,
    /// `stop()`, a hard-cut `play()`, a seek that cut a crossfade, or `destroy()`.
    Stopped,
    /// Faded out by a completed crossfade.
    FadedOut,
}

/// Times are engine-clock seconds.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    SourceStarted { id: SourceId, at: f64 },
    SourceEnded { id: SourceId, at: f64, reason: EndReason },
    CrossfadeStarted { outgoing: SourceId, incoming: SourceId, at: f64, duration: f64 },
    CrossfadeCompleted { outgoing: SourceId, incoming: SourceId, at: f64 },
    CrossfadeCancelled { outgoing: SourceId, incoming: SourceId, at: f64 },
    /// `effect` is the module now in the slot (`None` after a removal).
    EffectRewired { effect: Option<EffectKind>, at: f64 },
    TransportChanged { state: TransportState, at: f64 },
}

#[derive(Clone, Debug)]
pub struct EventQueue {
    events: VecDeque<EngineEvent>,
    capacity: usize,
    dropped: u64,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { events: VecDeque::with_capacity(capacity), capacity, dropped: 0 }
    }

    pub fn push(&mut self, event: EngineEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<EngineEvent> {
        self.events.drain(..).collect()
    }

    #[inline] pub fn is_empty(&self) -> bool { self.events.is_empty() }
    #[inline] pub fn capacity(&self) -> usize { self.capacity }

    /// Events lost to overflow since the last call; resets the count.
    pub fn take_dropped(&mut self) -> u64 {
        std::mem::take(&mut self.dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_drops_oldest() {
        let mut q = EventQueue::new(2);
        for id in 0..3 {
            q.push(EngineEvent::SourceStarted { id, at: 0.0 });
        }
        assert_eq!(q.take_dropped(), 1);
        assert_eq!(q.take_dropped(), 0);
        let got = q.drain();
        assert_eq!(
            got,
            vec![
                EngineEvent::SourceStarted { id: 1, at: 0.0 },
                EngineEvent::SourceStarted { id: 2, at: 0.0 },
            ]
        );
        assert!(q.is_empty());
    }

    #[test]
    fn overflow_count_accumulates_until_taken() {
        let mut q = EventQueue::new(1);
        for id in 0..5 {
            q.push(EngineEvent::SourceStarted { id, at: 0.0 });
        }
        assert_eq!(q.drain(), vec![EngineEvent::SourceStarted { id: 4, at: 0.0 }]);
        assert_eq!(q.take_dropped(), 4);
        q.push(EngineEvent::SourceStarted { id: 5, at: 0.0 });
        assert_eq!(q.take_dropped(), 0);
        assert_eq!(q.capacity(), 1);
    }

    #[test]
    fn events_serialize_tagged() {
        let e = EngineEvent::TransportChanged { state: TransportState::Paused, at: 1.5 };
        let json = serde_json::to_string(&e).unwrap();
        assert_eq!(json, r#"{"event":"transport_changed","state":"paused","at":1.5}"#);
    }
}
