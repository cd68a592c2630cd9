use tokio::sync::broadcast;

use crate::dao::models::DuelRecord;

/// Broadcast hub emitting a duel snapshot on every lifecycle change.
///
/// Consumers observe a stream of whole-record snapshots instead of wiring ad
/// hoc callbacks into the lifecycle manager.
pub struct DuelHub {
    sender: broadcast::Sender<DuelRecord>,
}

impl DuelHub {
    /// Construct a hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent snapshots.
    pub fn subscribe(&self) -> broadcast::Receiver<DuelRecord> {
        self.sender.subscribe()
    }

    /// Publish a snapshot to all current subscribers, ignoring delivery errors.
    pub fn publish(&self, snapshot: DuelRecord) {
        let _ = self.sender.send(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::DuelStatus;

    #[tokio::test]
    async fn subscribers_receive_snapshots_in_order() {
        let hub = DuelHub::new(8);
        let mut receiver = hub.subscribe();

        let mut duel = DuelRecord::new("a", "b", 100, DuelStatus::Waiting);
        hub.publish(duel.clone());
        duel.status = DuelStatus::InProgress;
        hub.publish(duel.clone());

        assert_eq!(receiver.recv().await.unwrap().status, DuelStatus::Waiting);
        assert_eq!(
            receiver.recv().await.unwrap().status,
            DuelStatus::InProgress
        );
    }
}
