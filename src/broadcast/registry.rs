//! Per-chat stream senders and the single-active-stream rule.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use teloxide::types::ChatId;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::broadcast::sender::{IntervalRange, PeriodicSender, SenderKey, StreamKind};
use crate::broadcast::timer::TimerQueue;

/// Registry shared by the inbound loop and the scheduler.
pub type SharedRegistry = Arc<Mutex<StreamRegistry>>;

/// Stream kinds instantiated for every chat.
pub const CHAT_STREAMS: &[StreamKind] = &[StreamKind::News];

/// What a toggle changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Toggle {
    pub started: Vec<StreamKind>,
    pub stopped: Vec<StreamKind>,
}

/// Owns every `PeriodicSender` and the timers that drive them.
///
/// At most one sender per chat is active at a time.
pub struct StreamRegistry {
    chats: HashMap<ChatId, HashMap<StreamKind, PeriodicSender>>,
    timers: TimerQueue,
    interval: IntervalRange,
    streams: Vec<StreamKind>,
}

impl StreamRegistry {
    pub fn new(interval: IntervalRange) -> Self {
        Self::with_streams(interval, CHAT_STREAMS)
    }

    /// Registry whose chats each get one sender per kind in `streams`.
    pub fn with_streams(interval: IntervalRange, streams: &[StreamKind]) -> Self {
        let mut streams = streams.to_vec();
        streams.sort();
        streams.dedup();
        Self {
            chats: HashMap::new(),
            timers: TimerQueue::new(),
            interval,
            streams,
        }
    }

    pub fn shared(self) -> SharedRegistry {
        Arc::new(Mutex::new(self))
    }

    /// Create the chat's senders if missing. Returns `true` when created.
    pub fn ensure_chat(&mut self, chat_id: ChatId) -> bool {
        if self.chats.contains_key(&chat_id) {
            return false;
        }
        let senders = self
            .streams
            .iter()
            .map(|&kind| (kind, PeriodicSender::new(SenderKey::new(chat_id, kind), self.interval)))
            .collect();
        self.chats.insert(chat_id, senders);
        info!("Registered streams for chat {}", chat_id.0);
        true
    }

    pub fn is_registered(&self, chat_id: ChatId) -> bool {
        self.chats.contains_key(&chat_id)
    }

    /// Start `requested` (if inactive) and stop every other active stream of
    /// the chat. `None`, or a kind the chat has no sender for, only stops.
    ///
    /// Returns `None` when the chat has no streams yet.
    pub fn toggle(&mut self, chat_id: ChatId, requested: Option<StreamKind>, now: DateTime<Utc>) -> Option<Toggle> {
        let senders = self.chats.get_mut(&chat_id)?;
        let mut toggle = Toggle::default();
        for (&kind, sender) in senders.iter_mut() {
            if Some(kind) == requested {
                if let Some(due) = sender.start(now) {
                    // A sender still firing is queued by `finish_fire`.
                    if !sender.is_firing() {
                        self.timers.schedule(sender.key(), due);
                    }
                    toggle.started.push(kind);
                }
            } else if sender.stop() {
                self.timers.cancel(&sender.key());
                toggle.stopped.push(kind);
            }
        }
        Some(toggle)
    }

    /// Claim every sender due at `now`, marking each as firing.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<SenderKey> {
        let keys = self.timers.pop_due(now);
        let due: Vec<SenderKey> = keys
            .into_iter()
            .filter(|key| {
                self.chats
                    .get_mut(&key.chat_id)
                    .and_then(|senders| senders.get_mut(&key.kind))
                    .is_some_and(|sender| sender.begin_fire(now))
            })
            .collect();
        if !due.is_empty() {
            debug!("{} sender(s) due", due.len());
        }
        due
    }

    /// Complete a fire and queue the next one unless the sender was stopped.
    pub fn finish_fire(&mut self, key: SenderKey, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let sender = self.chats.get_mut(&key.chat_id)?.get_mut(&key.kind)?;
        let due = sender.finish_fire(now)?;
        self.timers.schedule(key, due);
        Some(due)
    }

    pub fn sender(&self, chat_id: ChatId, kind: StreamKind) -> Option<&PeriodicSender> {
        self.chats.get(&chat_id)?.get(&kind)
    }

    /// The chat's active stream, if any.
    pub fn active_stream(&self, chat_id: ChatId) -> Option<StreamKind> {
        self.chats
            .get(&chat_id)?
            .iter()
            .find(|(_, sender)| sender.is_active())
            .map(|(&kind, _)| kind)
    }

    pub fn active_count(&self, chat_id: ChatId) -> usize {
        self.chats
            .get(&chat_id)
            .map_or(0, |senders| senders.values().filter(|s| s.is_active()).count())
    }

    pub fn next_fire_at(&self, chat_id: ChatId, kind: StreamKind) -> Option<DateTime<Utc>> {
        self.sender(chat_id, kind)?.next_fire_at()
    }

    /// Earliest pending due time across all chats.
    pub fn next_due(&mut self) -> Option<DateTime<Utc>> {
        self.timers.next_due()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const CHAT: ChatId = ChatId(-1001);

    fn registry() -> StreamRegistry {
        let mut r = StreamRegistry::new(IntervalRange::NEWS);
        r.ensure_chat(CHAT);
        r
    }

    #[test]
    fn test_ensure_chat_is_idempotent() {
        let mut r = StreamRegistry::new(IntervalRange::NEWS);
        assert!(r.ensure_chat(CHAT));
        let now = Utc::now();
        r.toggle(CHAT, Some(StreamKind::News), now);
        assert!(!r.ensure_chat(CHAT));
        assert_eq!(r.active_stream(CHAT), Some(StreamKind::News));
    }

    #[test]
    fn test_toggle_unknown_chat() {
        let mut r = StreamRegistry::new(IntervalRange::NEWS);
        assert_eq!(r.toggle(CHAT, Some(StreamKind::News), Utc::now()), None);
    }

    #[test]
    fn test_toggle_starts_requested_stream() {
        let mut r = registry();
        let now = Utc::now();
        let toggle = r.toggle(CHAT, Some(StreamKind::News), now).unwrap();
        assert_eq!(toggle.started, vec![StreamKind::News]);
        let due = r.next_fire_at(CHAT, StreamKind::News).unwrap();
        assert!(due >= now + Duration::seconds(5400));
        assert!(due <= now + Duration::seconds(14400));
    }

    #[test]
    fn test_toggle_same_stream_is_idempotent() {
        let mut r = registry();
        let now = Utc::now();
        r.toggle(CHAT, Some(StreamKind::News), now);
        let due = r.next_fire_at(CHAT, StreamKind::News);
        let toggle = r.toggle(CHAT, Some(StreamKind::News), now + Duration::seconds(60)).unwrap();
        assert_eq!(toggle, Toggle::default());
        assert_eq!(r.next_fire_at(CHAT, StreamKind::News), due);
    }

    #[test]
    fn test_toggle_none_stops_everything() {
        let mut r = registry();
        let now = Utc::now();
        r.toggle(CHAT, Some(StreamKind::News), now);
        let toggle = r.toggle(CHAT, None, now).unwrap();
        assert_eq!(toggle.stopped, vec![StreamKind::News]);
        assert_eq!(r.active_stream(CHAT), None);
        assert!(r.take_due(now + Duration::days(1)).is_empty());
    }

    #[test]
    fn test_toggle_unregistered_kind_stops_and_starts_nothing() {
        let mut r = registry();
        let now = Utc::now();
        r.toggle(CHAT, Some(StreamKind::News), now);
        let toggle = r.toggle(CHAT, Some(StreamKind::Talk), now).unwrap();
        assert!(toggle.started.is_empty());
        assert_eq!(toggle.stopped, vec![StreamKind::News]);
        assert_eq!(r.active_count(CHAT), 0);
    }

    #[test]
    fn test_take_due_and_finish_fire() {
        let mut r = registry();
        let now = Utc::now();
        r.toggle(CHAT, Some(StreamKind::News), now);
        let due = r.next_fire_at(CHAT, StreamKind::News).unwrap();

        assert!(r.take_due(due - Duration::seconds(1)).is_empty());
        let taken = r.take_due(due);
        assert_eq!(taken, vec![SenderKey::new(CHAT, StreamKind::News)]);
        assert!(r.sender(CHAT, StreamKind::News).unwrap().is_firing());
        // Not handed out twice while in flight.
        assert!(r.take_due(due + Duration::days(1)).is_empty());

        let next = r.finish_fire(taken[0], due).unwrap();
        assert!(next > due);
        assert_eq!(r.next_due(), Some(next));
    }

    #[test]
    fn test_stop_while_firing_is_not_rescheduled() {
        let mut r = registry();
        let now = Utc::now();
        r.toggle(CHAT, Some(StreamKind::News), now);
        let due = r.next_fire_at(CHAT, StreamKind::News).unwrap();
        let taken = r.take_due(due);

        r.toggle(CHAT, None, due);
        assert_eq!(r.finish_fire(taken[0], due), None);
        assert_eq!(r.next_due(), None);
        assert_eq!(r.active_stream(CHAT), None);
    }

    fn two_stream_registry() -> StreamRegistry {
        let mut r = StreamRegistry::with_streams(IntervalRange::NEWS, &[StreamKind::News, StreamKind::Talk]);
        r.ensure_chat(CHAT);
        r
    }

    #[test]
    fn test_with_streams_creates_each_kind() {
        let r = two_stream_registry();
        assert!(r.sender(CHAT, StreamKind::News).is_some());
        assert!(r.sender(CHAT, StreamKind::Talk).is_some());
        assert!(r.sender(CHAT, StreamKind::Swear).is_none());
    }

    #[test]
    fn test_starting_other_stream_stops_active_one() {
        let mut r = two_stream_registry();
        let now = Utc::now();
        r.toggle(CHAT, Some(StreamKind::News), now);

        let toggle = r.toggle(CHAT, Some(StreamKind::Talk), now).unwrap();
        assert_eq!(toggle.started, vec![StreamKind::Talk]);
        assert_eq!(toggle.stopped, vec![StreamKind::News]);
        assert_eq!(r.active_stream(CHAT), Some(StreamKind::Talk));
        assert_eq!(r.active_count(CHAT), 1);
        assert_eq!(r.next_fire_at(CHAT, StreamKind::News), None);

        // Only the talk timer is left.
        let talk_due = r.next_fire_at(CHAT, StreamKind::Talk).unwrap();
        assert_eq!(r.next_due(), Some(talk_due));
        assert_eq!(
            r.take_due(now + Duration::days(1)),
            vec![SenderKey::new(CHAT, StreamKind::Talk)]
        );
    }

    #[test]
    fn test_retoggling_active_stream_keeps_its_schedule() {
        let mut r = two_stream_registry();
        let now = Utc::now();
        r.toggle(CHAT, Some(StreamKind::Talk), now);
        let due = r.next_fire_at(CHAT, StreamKind::Talk);

        let toggle = r.toggle(CHAT, Some(StreamKind::Talk), now + Duration::seconds(30)).unwrap();
        assert_eq!(toggle, Toggle::default());
        assert_eq!(r.next_fire_at(CHAT, StreamKind::Talk), due);
        assert_eq!(r.active_count(CHAT), 1);
    }

    #[test]
    fn test_restart_during_fire_is_never_claimed_twice() {
        let mut r = registry();
        let now = Utc::now();
        r.toggle(CHAT, Some(StreamKind::News), now);
        let due = r.next_fire_at(CHAT, StreamKind::News).unwrap();
        let first = r.take_due(due);
        assert_eq!(first.len(), 1);

        r.toggle(CHAT, None, due);
        r.toggle(CHAT, Some(StreamKind::News), due);
        let restarted = r.next_fire_at(CHAT, StreamKind::News).unwrap();
        assert!(r.take_due(restarted + Duration::days(1)).is_empty());
        assert_eq!(r.next_due(), None);

        assert_eq!(r.finish_fire(first[0], due + Duration::seconds(5)), Some(restarted));
        assert_eq!(r.next_due(), Some(restarted));
        assert_eq!(r.take_due(restarted), first);
    }

    #[test]
    fn test_chats_are_independent() {
        let mut r = registry();
        let other = ChatId(77);
        r.ensure_chat(other);
        let now = Utc::now();
        r.toggle(CHAT, Some(StreamKind::News), now);
        r.toggle(other, Some(StreamKind::News), now);
        r.toggle(CHAT, None, now);
        assert_eq!(r.active_stream(CHAT), None);
        assert_eq!(r.active_stream(other), Some(StreamKind::News));
    }
}
