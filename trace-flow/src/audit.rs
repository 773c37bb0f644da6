use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Warning,
    Info,
}

/// Operator-facing history record, distinct from the agent-execution trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub user: String,
    pub status: AuditStatus,
}

/// Prepend-only audit log, newest first, with a retention cap.
pub struct AuditTrail {
    entries: Mutex<Vec<AuditEntry>>,
    capacity: usize,
}

impl AuditTrail {
    pub const DEFAULT_CAPACITY: usize = 500;

    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Append entries at the tail, used to seed startup history.
    pub fn seed(&self, seed: Vec<AuditEntry>) {
        let mut entries = self.entries.lock().unwrap();
        entries.extend(seed);
        let capacity = self.capacity;
        entries.truncate(capacity);
    }

    pub fn record(&self, event: impl Into<String>, user: impl Into<String>, status: AuditStatus) {
        let entry = AuditEntry {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event: event.into(),
            user: user.into(),
            status,
        };
        let mut entries = self.entries.lock().unwrap();
        entries.insert(0, entry);
        let capacity = self.capacity;
        entries.truncate(capacity);
    }

    /// Newest-first snapshot, optionally filtered by status.
    pub fn entries(&self, status: Option<AuditStatus>) -> Vec<AuditEntry> {
        let entries = self.entries.lock().unwrap();
        match status {
            None => entries.clone(),
            Some(wanted) => entries
                .iter()
                .filter(|e| e.status == wanted)
                .cloned()
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_entry_comes_first() {
        let trail = AuditTrail::default();
        trail.record("first", "kernel", AuditStatus::Info);
        trail.record("second", "operator", AuditStatus::Success);

        let entries = trail.entries(None);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event, "second");
        assert_eq!(entries[1].event, "first");
    }

    #[test]
    fn capacity_drops_oldest() {
        let trail = AuditTrail::new(3);
        for i in 0..5 {
            trail.record(format!("event {i}"), "operator", AuditStatus::Info);
        }
        let entries = trail.entries(None);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].event, "event 4");
        assert_eq!(entries[2].event, "event 2");
    }

    #[test]
    fn filter_by_status() {
        let trail = AuditTrail::default();
        trail.record("ok", "operator", AuditStatus::Success);
        trail.record("bad", "operator", AuditStatus::Warning);

        let warnings = trail.entries(Some(AuditStatus::Warning));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].event, "bad");
    }
}
