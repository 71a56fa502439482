//! The discrete-event scheduler.  Devices model their operations as
//! a series of service callbacks, each scheduled some number of
//! ticks (instructions) in the future.
use std::collections::BTreeSet;

use tracing::{event, Level};

use base::collections::pq::KeyedReversePriorityQueue;

use crate::context::Tick;
use crate::types::DeviceId;

/// Identifies a scheduled callback.  A device may have several units
/// (for example the drives of a disk controller) each with its own
/// pending callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScheduleKey {
    pub device: DeviceId,
    pub unit: u8,
}

/// Entries which fall due at the same tick fire in the order they
/// were scheduled.
#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    items: KeyedReversePriorityQueue<ScheduleKey, (Tick, u64)>,
    keys: BTreeSet<ScheduleKey>,
    sequence: u64,
}

impl Scheduler {
    pub(crate) fn new() -> Scheduler {
        Scheduler::default()
    }

    /// Schedule `key` at `when`, replacing any existing entry for it.
    pub(crate) fn schedule(&mut self, key: ScheduleKey, when: Tick) {
        self.sequence += 1;
        if let Some((previous, _)) = self.items.push(key, (when, self.sequence)) {
            event!(
                Level::TRACE,
                "{} unit {} rescheduled from {previous} to {when}",
                key.device,
                key.unit
            );
        }
        self.keys.insert(key);
    }

    pub(crate) fn cancel(&mut self, key: &ScheduleKey) -> bool {
        self.keys.remove(key);
        self.items.remove(key).is_some()
    }

    /// Cancel every callback belonging to `device`.
    pub(crate) fn cancel_device(&mut self, device: DeviceId) -> usize {
        let doomed: Vec<ScheduleKey> = self
            .keys
            .iter()
            .filter(|k| k.device == device)
            .copied()
            .collect();
        for key in doomed.iter() {
            self.cancel(key);
        }
        doomed.len()
    }

    pub(crate) fn is_scheduled(&self, key: &ScheduleKey) -> bool {
        self.items.contains(key)
    }

    /// The time at which the next callback falls due.
    pub(crate) fn next_due(&self) -> Option<Tick> {
        self.items.peek().map(|(_, (when, _))| *when)
    }

    /// Remove and return the earliest entry, if it is due at `now`.
    pub(crate) fn pop_due(&mut self, now: Tick) -> Option<ScheduleKey> {
        match self.next_due() {
            Some(when) if when <= now => {
                let (key, _) = self.items.pop()?;
                self.keys.remove(&key);
                Some(key)
            }
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(device: usize, unit: u8) -> ScheduleKey {
        ScheduleKey {
            device: DeviceId(device),
            unit,
        }
    }

    #[test]
    fn test_empty() {
        let mut s = Scheduler::new();
        assert!(s.is_empty());
        assert_eq!(s.next_due(), None);
        assert_eq!(s.pop_due(1000), None);
    }

    #[test]
    fn test_fires_in_time_order() {
        let mut s = Scheduler::new();
        s.schedule(key(1, 0), 30);
        s.schedule(key(2, 0), 10);
        s.schedule(key(3, 0), 20);
        assert_eq!(s.next_due(), Some(10));
        assert_eq!(s.pop_due(5), None);
        assert_eq!(s.pop_due(25), Some(key(2, 0)));
        assert_eq!(s.pop_due(25), Some(key(3, 0)));
        assert_eq!(s.pop_due(25), None);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_ties_fire_in_scheduling_order() {
        let mut s = Scheduler::new();
        s.schedule(key(5, 0), 10);
        s.schedule(key(1, 0), 10);
        s.schedule(key(3, 0), 10);
        assert_eq!(s.pop_due(10), Some(key(5, 0)));
        assert_eq!(s.pop_due(10), Some(key(1, 0)));
        assert_eq!(s.pop_due(10), Some(key(3, 0)));
    }

    #[test]
    fn test_reschedule_replaces() {
        let mut s = Scheduler::new();
        s.schedule(key(1, 0), 10);
        s.schedule(key(1, 0), 50);
        assert_eq!(s.len(), 1);
        assert_eq!(s.pop_due(10), None);
        assert_eq!(s.pop_due(50), Some(key(1, 0)));
    }

    #[test]
    fn test_cancel_device() {
        let mut s = Scheduler::new();
        s.schedule(key(1, 0), 10);
        s.schedule(key(1, 1), 20);
        s.schedule(key(2, 0), 30);
        assert_eq!(s.cancel_device(DeviceId(1)), 2);
        assert!(!s.is_scheduled(&key(1, 1)));
        assert!(s.is_scheduled(&key(2, 0)));
        assert!(!s.cancel(&key(1, 0)));
        assert_eq!(s.len(), 1);
    }
}
