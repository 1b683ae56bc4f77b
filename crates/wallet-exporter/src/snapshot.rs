//! The published view of the last completed collection cycle.

use crate::model::{
    EntityKind,
    EntityRecord,
};
use chrono::{
    DateTime,
    Utc,
};
use parking_lot::RwLock;
use std::sync::Arc;

/// Records of one cycle, in publication order, plus when they were captured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    records: Vec<EntityRecord>,
    captured_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn new(records: Vec<EntityRecord>, captured_at: DateTime<Utc>) -> Self {
        Self {
            records,
            captured_at: Some(captured_at),
        }
    }

    pub fn records(&self) -> &[EntityRecord] {
        &self.records
    }

    /// `None` until the first cycle has been published.
    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        self.captured_at
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &EntityRecord> {
        self.records.iter().filter(move |record| record.kind == kind)
    }
}

/// Holds the current [`Snapshot`].
///
/// Writers build a whole new snapshot and swap the pointer; readers clone the
/// `Arc` and keep reading their generation even while a newer one is
/// installed.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `snapshot` and returns the generation now being served.
    pub fn replace(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        *self.current.write() = snapshot.clone();
        snapshot
    }

    pub fn read(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WalletKind;
    use alloy::primitives::Address;

    fn record(byte: u8, kind: WalletKind) -> EntityRecord {
        EntityRecord::wallet(Address::repeat_byte(byte), format!("w{byte}"), kind)
    }

    #[test]
    fn starts_empty_and_never_captured() {
        let store = SnapshotStore::new();
        let snapshot = store.read();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.captured_at(), None);
    }

    #[test]
    fn readers_keep_their_generation() {
        let store = SnapshotStore::new();
        let installed =
            store.replace(Snapshot::new(vec![record(1, WalletKind::Client)], Utc::now()));
        let old = store.read();
        assert!(Arc::ptr_eq(&installed, &old));

        store.replace(Snapshot::new(
            vec![record(2, WalletKind::Other), record(3, WalletKind::Operator)],
            Utc::now(),
        ));

        assert_eq!(old.len(), 1);
        assert_eq!(old.records()[0].address, Address::repeat_byte(1));
        assert_eq!(store.read().len(), 2);
    }

    #[test]
    fn filters_by_kind() {
        let snapshot = Snapshot::new(
            vec![
                record(1, WalletKind::Client),
                record(2, WalletKind::Other),
                record(3, WalletKind::Client),
            ],
            Utc::now(),
        );
        assert_eq!(snapshot.of_kind(EntityKind::Client).count(), 2);
        assert_eq!(snapshot.of_kind(EntityKind::Provider).count(), 0);
    }

    #[test]
    fn concurrent_readers_see_whole_generations() {
        let store = Arc::new(SnapshotStore::new());
        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for n in 1..=50u8 {
                    let records = (0..n).map(|b| record(b, WalletKind::Other)).collect();
                    store.replace(Snapshot::new(records, Utc::now()));
                }
            })
        };

        for _ in 0..200 {
            let snapshot = store.read();
            // generation n holds records 0..n
            for (i, record) in snapshot.records().iter().enumerate() {
                assert_eq!(record.address, Address::repeat_byte(i as u8));
            }
        }
        writer.join().unwrap();
        assert_eq!(store.read().len(), 50);
    }
}
