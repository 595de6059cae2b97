use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

/// Named deferred actions. Scheduling a key that is already pending replaces its deadline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKey {
    LayoutResize,
    ZoomSettle,
    AssetSettled,
    CardRemoval(String),
}

/// Single-threaded timer table driven by the tokio clock.
///
/// The owner polls [`Scheduler::take_due`] (or awaits [`Scheduler::wait_next`]) and fires the
/// returned keys itself, so no borrow of component state is held while sleeping.
#[derive(Debug, Default)]
pub struct Scheduler {
    deadlines: RefCell<HashMap<TimerKey, Instant>>,
    changed: Notify,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self, key: TimerKey, delay: Duration) {
        self.deadlines
            .borrow_mut()
            .insert(key, Instant::now() + delay);
        self.changed.notify_one();
    }

    /// Resolves once something was scheduled since the last wakeup.
    ///
    /// A host that sleeps until [`Scheduler::next_deadline`] races this so a newly scheduled,
    /// earlier deadline is not missed.
    pub async fn changed(&self) {
        self.changed.notified().await;
    }

    pub fn cancel(&self, key: &TimerKey) -> bool {
        self.deadlines.borrow_mut().remove(key).is_some()
    }

    pub fn is_pending(&self, key: &TimerKey) -> bool {
        self.deadlines.borrow().contains_key(key)
    }

    pub fn pending_len(&self) -> usize {
        self.deadlines.borrow().len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.borrow().values().min().copied()
    }

    /// Removes and returns every key whose deadline has passed, earliest first.
    pub fn take_due(&self) -> Vec<TimerKey> {
        let now = Instant::now();
        let mut deadlines = self.deadlines.borrow_mut();
        let mut due: Vec<(Instant, TimerKey)> = deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, deadline)| (*deadline, key.clone()))
            .collect();
        due.sort();
        for (_, key) in &due {
            deadlines.remove(key);
        }
        due.into_iter().map(|(_, key)| key).collect()
    }

    /// Sleeps until at least one key is due; empty when nothing is scheduled.
    pub async fn wait_next(&self) -> Vec<TimerKey> {
        loop {
            let Some(deadline) = self.next_deadline() else {
                return Vec::new();
            };
            tokio::time::sleep_until(deadline).await;
            let due = self.take_due();
            if !due.is_empty() {
                return due;
            }
        }
    }
}
