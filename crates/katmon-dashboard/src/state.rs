//! Latest published snapshot, shared between the event loop and handlers.

use std::sync::Arc;

use katmon_cmc::MonitorSnapshot;
use parking_lot::RwLock;

/// Cheap to clone; every clone sees the same published snapshot.
#[derive(Clone, Default)]
pub struct DashboardState {
    latest: Arc<RwLock<Arc<MonitorSnapshot>>>,
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the published snapshot.
    pub fn publish(&self, snapshot: MonitorSnapshot) {
        *self.latest.write() = Arc::new(snapshot);
    }

    /// The latest snapshot. Readers hold it without blocking the publisher.
    pub fn snapshot(&self) -> Arc<MonitorSnapshot> {
        Arc::clone(&self.latest.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_replaces_snapshot_for_all_clones() {
        let state = DashboardState::new();
        let reader = state.clone();
        let before = reader.snapshot();
        assert!(before.cmcs.is_empty());

        let mut next = MonitorSnapshot::default();
        next.generated_at = before.generated_at + chrono::Duration::seconds(1);
        state.publish(next);

        assert!(reader.snapshot().generated_at > before.generated_at);
        // Readers holding the old snapshot keep it.
        assert!(before.cmcs.is_empty());
    }
}
