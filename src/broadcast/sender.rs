//! Scheduling state machine for one (chat, stream) pair.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use teloxide::types::ChatId;
use tracing::info;

/// Kind of autonomous output a chat can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamKind {
    News,
    Talk,
    Swear,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::News => "news",
            StreamKind::Talk => "talk",
            StreamKind::Swear => "swear",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identity of a sender, used to key timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SenderKey {
    pub chat_id: ChatId,
    pub kind: StreamKind,
}

impl SenderKey {
    pub fn new(chat_id: ChatId, kind: StreamKind) -> Self {
        Self { chat_id, kind }
    }
}

impl fmt::Display for SenderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chat_id.0, self.kind)
    }
}

/// Inclusive bounds, in seconds, for the delay between two fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalRange {
    min_secs: u64,
    max_secs: u64,
}

impl IntervalRange {
    /// 90 minutes to 4 hours.
    pub const NEWS: IntervalRange = IntervalRange {
        min_secs: 90 * 60,
        max_secs: 240 * 60,
    };

    /// Returns `None` unless `0 < min_secs <= max_secs`. A zero delay would
    /// let a fire be rescheduled at its own finish time.
    pub fn new(min_secs: u64, max_secs: u64) -> Option<Self> {
        (min_secs > 0 && min_secs <= max_secs).then_some(Self { min_secs, max_secs })
    }

    pub fn min_secs(&self) -> u64 {
        self.min_secs
    }

    pub fn max_secs(&self) -> u64 {
        self.max_secs
    }

    /// Uniformly sample a delay.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let secs = rng.random_range(self.min_secs..=self.max_secs);
        Duration::seconds(secs as i64)
    }
}

/// What happens once the fire in flight completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterFire {
    /// Sample a fresh delay from the finish time.
    Reschedule,
    /// Stopped during the fire.
    Stop,
    /// Stopped and started again during the fire; `due` was sampled at the
    /// restart.
    Resume { due: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Inactive,
    /// Waiting for `due`.
    Scheduled { due: DateTime<Utc> },
    /// Taken by the scheduler; the fire is in flight. Nothing can claim the
    /// sender again until `finish_fire`.
    Firing { then: AfterFire },
}

/// Periodic sender for one chat and stream kind.
///
/// While active there is exactly one pending fire: either a due time
/// (`Scheduled`) or the fire currently running (`Firing`). Start and stop
/// during a fire only change what `finish_fire` does next.
#[derive(Debug, Clone)]
pub struct PeriodicSender {
    key: SenderKey,
    interval: IntervalRange,
    state: SenderState,
}

impl PeriodicSender {
    pub fn new(key: SenderKey, interval: IntervalRange) -> Self {
        Self {
            key,
            interval,
            state: SenderState::Inactive,
        }
    }

    pub fn key(&self) -> SenderKey {
        self.key
    }

    pub fn interval(&self) -> IntervalRange {
        self.interval
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        !matches!(
            self.state,
            SenderState::Inactive | SenderState::Firing { then: AfterFire::Stop }
        )
    }

    pub fn is_firing(&self) -> bool {
        matches!(self.state, SenderState::Firing { .. })
    }

    /// Due time of the pending fire. For a sender restarted mid-fire this is
    /// the due time it resumes with.
    pub fn next_fire_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            SenderState::Scheduled { due } => Some(due),
            SenderState::Firing { then: AfterFire::Resume { due } } => Some(due),
            _ => None,
        }
    }

    /// Activate and sample the first due time. Returns it, or `None` if the
    /// sender was already active. During a fire the due time only takes
    /// effect once the fire completes.
    pub fn start(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.start_with(now, &mut rand::rng())
    }

    pub fn start_with<R: Rng + ?Sized>(&mut self, now: DateTime<Utc>, rng: &mut R) -> Option<DateTime<Utc>> {
        if self.is_active() {
            return None;
        }
        let due = now + self.interval.sample(rng);
        self.state = match self.state {
            SenderState::Firing { .. } => SenderState::Firing { then: AfterFire::Resume { due } },
            _ => SenderState::Scheduled { due },
        };
        info!("Started {} messages for chat {}, first at {}", self.key.kind, self.key.chat_id.0, due);
        Some(due)
    }

    /// Deactivate. Returns `true` if the sender was active. A fire already in
    /// flight still completes, but nothing is scheduled after it.
    pub fn stop(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.state = match self.state {
            SenderState::Firing { .. } => SenderState::Firing { then: AfterFire::Stop },
            _ => SenderState::Inactive,
        };
        info!("Stopped {} messages for chat {}", self.key.kind, self.key.chat_id.0);
        true
    }

    /// Claim a due fire. Only succeeds when scheduled and `now >= due`.
    pub fn begin_fire(&mut self, now: DateTime<Utc>) -> bool {
        match self.state {
            SenderState::Scheduled { due } if now >= due => {
                self.state = SenderState::Firing { then: AfterFire::Reschedule };
                true
            }
            _ => false,
        }
    }

    /// Close out the fire in flight and return the next due time, if any.
    ///
    /// A stop during the fire leaves the sender inactive. A restart during
    /// the fire keeps the due time sampled at the restart, unless it has
    /// already passed.
    pub fn finish_fire(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.finish_fire_with(now, &mut rand::rng())
    }

    pub fn finish_fire_with<R: Rng + ?Sized>(&mut self, now: DateTime<Utc>, rng: &mut R) -> Option<DateTime<Utc>> {
        let SenderState::Firing { then } = self.state else {
            return None;
        };
        let due = match then {
            AfterFire::Stop => {
                self.state = SenderState::Inactive;
                return None;
            }
            AfterFire::Resume { due } if due > now => due,
            AfterFire::Resume { .. } | AfterFire::Reschedule => now + self.interval.sample(rng),
        };
        self.state = SenderState::Scheduled { due };
        info!(
            "Scheduled next {} message for chat {} in {} seconds",
            self.key.kind,
            self.key.chat_id.0,
            (due - now).num_seconds()
        );
        Some(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sender() -> PeriodicSender {
        PeriodicSender::new(SenderKey::new(ChatId(42), StreamKind::News), IntervalRange::NEWS)
    }

    fn within_news_range(now: DateTime<Utc>, due: DateTime<Utc>) -> bool {
        due >= now + Duration::seconds(5400) && due <= now + Duration::seconds(14400)
    }

    #[test]
    fn test_starts_inactive() {
        let s = sender();
        assert!(!s.is_active());
        assert_eq!(s.next_fire_at(), None);
    }

    #[test]
    fn test_start_schedules_within_range() {
        let now = Utc::now();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let mut s = sender();
            let due = s.start_with(now, &mut rng).expect("should start");
            assert!(within_news_range(now, due));
            assert_eq!(s.next_fire_at(), Some(due));
        }
    }

    #[test]
    fn test_start_is_noop_when_active() {
        let now = Utc::now();
        let mut s = sender();
        let due = s.start(now).unwrap();
        assert_eq!(s.start(now + Duration::seconds(10)), None);
        assert_eq!(s.next_fire_at(), Some(due));
    }

    #[test]
    fn test_start_then_stop_clears_pending_fire() {
        let now = Utc::now();
        let mut s = sender();
        s.start(now);
        assert!(s.stop());
        assert!(!s.is_active());
        assert_eq!(s.next_fire_at(), None);
        assert!(!s.stop());
    }

    #[test]
    fn test_begin_fire_requires_due() {
        let now = Utc::now();
        let mut s = sender();
        let due = s.start(now).unwrap();
        assert!(!s.begin_fire(due - Duration::seconds(1)));
        assert!(s.begin_fire(due));
        assert!(s.is_firing());
        assert!(s.is_active());
        // Already in flight.
        assert!(!s.begin_fire(due + Duration::hours(10)));
    }

    #[test]
    fn test_inactive_never_fires() {
        let mut s = sender();
        assert!(!s.begin_fire(Utc::now() + Duration::days(1)));
    }

    #[test]
    fn test_finish_fire_reschedules() {
        let now = Utc::now();
        let mut s = sender();
        let due = s.start(now).unwrap();
        s.begin_fire(due);
        let next = s.finish_fire(due).expect("should reschedule");
        assert!(next > due);
        assert!(within_news_range(due, next));
        assert!(s.is_active());
    }

    #[test]
    fn test_stop_during_fire_prevents_reschedule() {
        let now = Utc::now();
        let mut s = sender();
        let due = s.start(now).unwrap();
        s.begin_fire(due);
        assert!(s.stop());
        assert!(!s.is_active());
        assert!(s.is_firing());
        assert_eq!(s.finish_fire(due), None);
        assert_eq!(s.state(), SenderState::Inactive);
    }

    #[test]
    fn test_restart_during_fire_waits_for_fire_to_finish() {
        let now = Utc::now();
        let mut s = sender();
        let due = s.start(now).unwrap();
        assert!(s.begin_fire(due));
        s.stop();
        let restarted = s.start(due).unwrap();

        // The old fire still owns the sender: it cannot be claimed again.
        assert!(s.is_active());
        assert!(s.is_firing());
        assert!(!s.begin_fire(restarted + Duration::days(1)));
        assert_eq!(s.next_fire_at(), Some(restarted));

        assert_eq!(s.finish_fire(due + Duration::seconds(3)), Some(restarted));
        assert_eq!(s.state(), SenderState::Scheduled { due: restarted });
        // Closing again is a no-op.
        assert_eq!(s.finish_fire(due + Duration::seconds(4)), None);
    }

    #[test]
    fn test_restart_due_passed_during_fire_is_resampled() {
        let now = Utc::now();
        let mut s = sender();
        let due = s.start(now).unwrap();
        s.begin_fire(due);
        s.stop();
        let restarted = s.start(due).unwrap();

        let finished = restarted + Duration::seconds(1);
        let next = s.finish_fire(finished).unwrap();
        assert!(within_news_range(finished, next));
    }

    #[test]
    fn test_stop_start_stop_during_fire_ends_inactive() {
        let now = Utc::now();
        let mut s = sender();
        let due = s.start(now).unwrap();
        s.begin_fire(due);
        assert!(s.stop());
        assert!(!s.stop());
        s.start(due);
        assert!(s.stop());
        assert_eq!(s.finish_fire(due), None);
        assert_eq!(s.state(), SenderState::Inactive);
    }

    #[test]
    fn test_interval_range_validation() {
        assert!(IntervalRange::new(10, 5).is_none());
        assert!(IntervalRange::new(0, 0).is_none());
        assert!(IntervalRange::new(0, 60).is_none());
        let r = IntervalRange::new(3, 3).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(r.sample(&mut rng), Duration::seconds(3));
    }

    #[test]
    fn test_sender_key_display() {
        let key = SenderKey::new(ChatId(-100), StreamKind::News);
        assert_eq!(key.to_string(), "-100/news");
    }
}
