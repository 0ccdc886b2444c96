use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a storage unit (one tank, battery, or container slot) in a
    /// craft's storage.
    pub struct UnitId;
}

/// Identifies an interned broker in the [`BrokerRegistry`](crate::broker::BrokerRegistry).
/// Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BrokerId(pub u32);

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn broker_id_equality() {
        assert_eq!(BrokerId(3), BrokerId(3));
        assert_ne!(BrokerId(3), BrokerId(4));
    }

    #[test]
    fn broker_ids_are_ordered() {
        let mut ids = vec![BrokerId(7), BrokerId(1), BrokerId(4)];
        ids.sort();
        assert_eq!(ids, vec![BrokerId(1), BrokerId(4), BrokerId(7)]);
    }

    #[test]
    fn unit_ids_are_distinct() {
        let mut units = SlotMap::<UnitId, ()>::with_key();
        let a = units.insert(());
        let b = units.insert(());
        assert_ne!(a, b);
    }
}
