//! Append-only, bounded turn store with synchronous fan-out.
//!
//! The bus owns every [`Turn`] once appended. Detection and healing outcomes are
//! attached as annotations keyed by [`TurnId`], so the turn record itself never
//! changes. Subscribers run on the appending thread, one at a time, each behind its
//! own failure boundary.

pub mod metrics;

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::domain::error::DetectedError;
use crate::domain::healing::HealingResult;
use crate::domain::turn::{ConversationId, Turn, TurnId};
use crate::errors::DomainError;

pub use metrics::{BusMetrics, ErrorTypeCount};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A turn plus everything recorded about it after append.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnRecord {
    pub turn: Arc<Turn>,
    pub errors: Vec<DetectedError>,
    pub healing: Vec<HealingResult>,
}

impl TurnRecord {
    pub fn had_error(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn was_healed(&self) -> bool {
        self.healing.iter().any(|result| result.success)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TelemetryEvent {
    TurnAppended(Arc<Turn>),
    ErrorsDetected { turn_id: TurnId, conversation_id: ConversationId, errors: Vec<DetectedError> },
    HealingRecorded { turn_id: TurnId, conversation_id: ConversationId, result: HealingResult },
}

impl TelemetryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TurnAppended(_) => "turn_appended",
            Self::ErrorsDetected { .. } => "errors_detected",
            Self::HealingRecorded { .. } => "healing_recorded",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("subscriber failed: {0}")]
pub struct SubscriberError(pub String);

pub trait TelemetrySubscriber: Send + Sync {
    fn on_event(&self, event: &TelemetryEvent) -> Result<(), SubscriberError>;
}

impl<F> TelemetrySubscriber for F
where
    F: Fn(&TelemetryEvent) -> Result<(), SubscriberError> + Send + Sync,
{
    fn on_event(&self, event: &TelemetryEvent) -> Result<(), SubscriberError> {
        self(event)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct SubscriberRegistry {
    next_id: AtomicU64,
    entries: Mutex<Vec<(SubscriptionId, Arc<dyn TelemetrySubscriber>)>>,
}

impl SubscriberRegistry {
    fn entries(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Arc<dyn TelemetrySubscriber>)>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }
}

/// Handle returned by [`TelemetryBus::subscribe`]. Dropping it keeps the
/// subscription alive; call [`Subscription::unsubscribe`] to end it.
pub struct Subscription {
    id: SubscriptionId,
    registry: Weak<SubscriberRegistry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn unsubscribe(self) -> bool {
        self.registry.upgrade().is_some_and(|registry| registry.remove(self.id))
    }
}

pub struct TelemetryBus {
    capacity: usize,
    clock: Arc<dyn Clock>,
    records: Mutex<VecDeque<TurnRecord>>,
    subscribers: Arc<SubscriberRegistry>,
    events: broadcast::Sender<TelemetryEvent>,
}

impl TelemetryBus {
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            capacity: capacity.max(1),
            clock,
            records: Mutex::new(VecDeque::with_capacity(capacity.clamp(1, 4096))),
            subscribers: Arc::new(SubscriberRegistry::default()),
            events,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock_records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn append(&self, turn: Turn) -> Arc<Turn> {
        let turn = Arc::new(turn);
        {
            let mut records = self.lock_records();
            records.push_back(TurnRecord {
                turn: Arc::clone(&turn),
                errors: Vec::new(),
                healing: Vec::new(),
            });
            while records.len() > self.capacity {
                if let Some(evicted) = records.pop_front() {
                    debug!(
                        event_name = "telemetry.turn.evicted",
                        turn_id = %evicted.turn.id,
                        "evicted oldest turn record"
                    );
                }
            }
        }
        self.publish(TelemetryEvent::TurnAppended(Arc::clone(&turn)));
        turn
    }

    pub fn record_errors(
        &self,
        turn_id: &TurnId,
        errors: &[DetectedError],
    ) -> Result<(), DomainError> {
        let conversation_id = self.with_record(turn_id, |record| {
            record.errors.extend_from_slice(errors);
            record.turn.conversation_id.clone()
        })?;
        if !errors.is_empty() {
            self.publish(TelemetryEvent::ErrorsDetected {
                turn_id: turn_id.clone(),
                conversation_id,
                errors: errors.to_vec(),
            });
        }
        Ok(())
    }

    pub fn record_healing(&self, result: &HealingResult) -> Result<(), DomainError> {
        self.with_record(&result.turn_id, |record| record.healing.push(result.clone()))?;
        self.publish(TelemetryEvent::HealingRecorded {
            turn_id: result.turn_id.clone(),
            conversation_id: result.conversation_id.clone(),
            result: result.clone(),
        });
        Ok(())
    }

    pub fn contains(&self, turn_id: &TurnId) -> bool {
        self.lock_records().iter().rev().any(|record| &record.turn.id == turn_id)
    }

    pub fn get(&self, turn_id: &TurnId) -> Option<TurnRecord> {
        self.lock_records().iter().rev().find(|record| &record.turn.id == turn_id).cloned()
    }

    /// Newest `limit` records, oldest first.
    pub fn records(&self, limit: usize) -> Vec<TurnRecord> {
        let records = self.lock_records();
        let skip = records.len().saturating_sub(limit);
        records.iter().skip(skip).cloned().collect()
    }

    pub fn conversation(&self, conversation_id: &ConversationId) -> Vec<TurnRecord> {
        self.lock_records()
            .iter()
            .filter(|record| &record.turn.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    pub fn metrics(&self, period: Duration) -> BusMetrics {
        let now = self.clock.now();
        let since = now - period;
        let records = self.lock_records();
        let window: Vec<&TurnRecord> =
            records.iter().filter(|record| record.turn.recorded_at >= since).collect();
        metrics::aggregate(&window, period, now)
    }

    pub fn subscribe(&self, subscriber: impl TelemetrySubscriber + 'static) -> Subscription {
        self.subscribe_arc(Arc::new(subscriber))
    }

    pub fn subscribe_arc(&self, subscriber: Arc<dyn TelemetrySubscriber>) -> Subscription {
        let id = SubscriptionId(self.subscribers.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.entries().push((id, subscriber));
        Subscription { id, registry: Arc::downgrade(&self.subscribers) }
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.remove(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.entries().len()
    }

    /// Asynchronous view of the same events. Slow receivers lag rather than block.
    pub fn channel(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.events.subscribe()
    }

    fn with_record<T>(
        &self,
        turn_id: &TurnId,
        update: impl FnOnce(&mut TurnRecord) -> T,
    ) -> Result<T, DomainError> {
        let mut records = self.lock_records();
        records
            .iter_mut()
            .rev()
            .find(|record| &record.turn.id == turn_id)
            .map(update)
            .ok_or_else(|| DomainError::UnknownTurn(turn_id.clone()))
    }

    fn publish(&self, event: TelemetryEvent) {
        // Snapshot so callbacks may subscribe or unsubscribe without deadlocking.
        let subscribers: Vec<(SubscriptionId, Arc<dyn TelemetrySubscriber>)> =
            self.subscribers.entries().clone();

        for (id, subscriber) in subscribers {
            match panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_event(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => warn!(
                    event_name = "telemetry.subscriber.failed",
                    subscription_id = id.0,
                    telemetry_event = event.name(),
                    error = %error,
                    "telemetry subscriber returned an error"
                ),
                Err(_) => warn!(
                    event_name = "telemetry.subscriber.panicked",
                    subscription_id = id.0,
                    telemetry_event = event.name(),
                    "telemetry subscriber panicked"
                ),
            }
        }

        let _ = self.events.send(event);
    }

    fn lock_records(&self) -> MutexGuard<'_, VecDeque<TurnRecord>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use super::test_support::turn;
    use super::{SubscriberError, TelemetryBus, TelemetryEvent};
    use crate::clock::ManualClock;
    use crate::domain::error::{DetectedError, ErrorType};
    use crate::domain::turn::TurnId;
    use crate::errors::DomainError;

    fn bus(capacity: usize) -> (TelemetryBus, Arc<ManualClock>) {
        let start = Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).single().unwrap_or_default();
        let clock = Arc::new(ManualClock::new(start));
        (TelemetryBus::new(capacity, clock.clone()), clock)
    }

    #[test]
    fn evicts_exactly_the_oldest_record() {
        let (bus, clock) = bus(3);
        let now = clock_now(&clock);
        for sequence in 1..=4 {
            bus.append(turn("c-1", sequence, now));
        }

        assert_eq!(bus.len(), 3);
        let ids: Vec<String> = bus.records(10).iter().map(|record| record.turn.id.0.clone()).collect();
        assert_eq!(ids, vec!["c-1#2", "c-1#3", "c-1#4"]);
        assert!(!bus.contains(&TurnId("c-1#1".to_string())));
    }

    #[test]
    fn annotating_an_evicted_turn_fails() {
        let (bus, clock) = bus(1);
        let now = clock_now(&clock);
        let first = bus.append(turn("c-1", 1, now));
        bus.append(turn("c-1", 2, now));

        let error = DetectedError::new(
            first.id.clone(),
            first.conversation_id.clone(),
            ErrorType::Timeout,
            ErrorType::Timeout.base_severity(),
            1.0,
            vec![],
            "slow",
            now,
        );
        assert_eq!(
            bus.record_errors(&first.id, &[error]),
            Err(DomainError::UnknownTurn(first.id.clone()))
        );
    }

    #[test]
    fn failing_and_panicking_subscribers_do_not_block_others() {
        let (bus, clock) = bus(10);
        let delivered = Arc::new(AtomicUsize::new(0));

        bus.subscribe(|_: &TelemetryEvent| -> Result<(), SubscriberError> {
            Err(SubscriberError("sink offline".to_string()))
        });
        bus.subscribe(|_: &TelemetryEvent| -> Result<(), SubscriberError> {
            panic!("subscriber bug")
        });
        let counter = Arc::clone(&delivered);
        bus.subscribe(move |_: &TelemetryEvent| -> Result<(), SubscriberError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.append(turn("c-1", 1, clock_now(&clock)));
        bus.append(turn("c-1", 2, clock_now(&clock)));

        assert_eq!(delivered.load(Ordering::SeqCst), 2);
        assert_eq!(bus.len(), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let (bus, clock) = bus(10);
        let delivered = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&delivered);
        let subscription = bus.subscribe(move |_: &TelemetryEvent| -> Result<(), SubscriberError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.append(turn("c-1", 1, clock_now(&clock)));
        let id = subscription.id();
        assert!(subscription.unsubscribe());
        assert!(!bus.unsubscribe(id));
        bus.append(turn("c-1", 2, clock_now(&clock)));

        assert_eq!(delivered.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn channel_receives_appended_turns() {
        let (bus, clock) = bus(10);
        let mut receiver = bus.channel();
        bus.append(turn("c-9", 1, clock_now(&clock)));

        let event = receiver.recv().await;
        assert!(matches!(event, Ok(TelemetryEvent::TurnAppended(appended)) if appended.id.0 == "c-9#1"));
    }

    #[test]
    fn metrics_only_cover_the_trailing_window() {
        let (bus, clock) = bus(10);
        let start = clock_now(&clock);
        bus.append(turn("old", 1, start));
        clock.advance(Duration::hours(30));
        let recent = bus.append(turn("new", 1, clock_now(&clock)));
        let error = DetectedError::new(
            recent.id.clone(),
            recent.conversation_id.clone(),
            ErrorType::ParsingFailure,
            ErrorType::ParsingFailure.base_severity(),
            0.7,
            vec![],
            "re-asked",
            clock_now(&clock),
        );
        assert!(bus.record_errors(&recent.id, &[error]).is_ok());

        let metrics = bus.metrics(Duration::hours(24));
        assert_eq!(metrics.turn_count, 1);
        assert_eq!(metrics.conversation_count, 1);
        assert!((metrics.error_rate - 1.0).abs() < f64::EPSILON);
        assert_eq!(metrics.top_error_types[0].error_type, ErrorType::ParsingFailure);

        let before = bus.records(10);
        let _ = bus.metrics(Duration::hours(48));
        assert_eq!(before, bus.records(10));
    }

    fn clock_now(clock: &ManualClock) -> chrono::DateTime<Utc> {
        use crate::clock::Clock;
        clock.now()
    }
}
