use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

/// In-process set of armed reminder entries, keyed by reminder id.
///
/// The reconciling loop keeps this mirror equal to the store's active set;
/// the dispatcher drains due entries every second. Purely in-memory — a
/// restart rebuilds it from the store on the first reconcile tick.
#[derive(Default)]
pub struct TimeWheel {
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl TimeWheel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) an entry. Returns the previously armed instant.
    pub fn arm(&self, reminder_id: &str, fire_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.entries
            .lock()
            .unwrap()
            .insert(reminder_id.to_string(), fire_at)
    }

    pub fn disarm(&self, reminder_id: &str) -> bool {
        self.entries.lock().unwrap().remove(reminder_id).is_some()
    }

    pub fn contains(&self, reminder_id: &str) -> bool {
        self.entries.lock().unwrap().contains_key(reminder_id)
    }

    pub fn armed_ids(&self) -> Vec<String> {
        self.entries.lock().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Remove and return every entry due at `now`, oldest first.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<(String, DateTime<Utc>)> {
        let mut entries = self.entries.lock().unwrap();
        let due_ids: Vec<String> = entries
            .iter()
            .filter(|(_, fire_at)| **fire_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        let mut due: Vec<(String, DateTime<Utc>)> = due_ids
            .into_iter()
            .filter_map(|id| entries.remove(&id).map(|at| (id, at)))
            .collect();
        due.sort_by_key(|(_, at)| *at);
        due
    }

    /// Drop everything (shutdown path).
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn due_entries_are_drained_in_order() {
        let wheel = TimeWheel::new();
        let now = Utc::now();
        wheel.arm("late", now - Duration::seconds(1));
        wheel.arm("later", now - Duration::seconds(10));
        wheel.arm("future", now + Duration::seconds(60));

        let due = wheel.take_due(now);
        let ids: Vec<&str> = due.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["later", "late"]);
        assert_eq!(wheel.len(), 1);
        assert!(wheel.contains("future"));
    }

    #[test]
    fn rearm_replaces_the_instant() {
        let wheel = TimeWheel::new();
        let now = Utc::now();
        assert!(wheel.arm("r", now).is_none());
        assert_eq!(wheel.arm("r", now + Duration::seconds(5)), Some(now));
        assert_eq!(wheel.len(), 1);
    }
}
