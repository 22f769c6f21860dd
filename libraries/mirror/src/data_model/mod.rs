#[path = "1-record.rs"]
mod record;

#[path = "2-principal.rs"]
mod principal;

#[path = "3-pending.rs"]
mod pending;

#[path = "4-outbox.rs"]
mod outbox;

#[path = "5-dirty-tracker.rs"]
mod dirty_tracker;

#[path = "6-mirrored-map.rs"]
mod mirrored_map;

#[path = "7-sync-state.rs"]
mod sync_state;

pub use dirty_tracker::*;
pub use mirrored_map::*;
pub use outbox::*;
pub use pending::*;
pub use principal::*;
pub use record::*;
pub use sync_state::*;

#[cfg_attr(target_arch = "wasm32", wasm_bindgen::prelude::wasm_bindgen)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ListenerKey(pub(crate) slotmap::DefaultKey);

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_outbox_keeps_latest_task_per_key() {
        let mut outbox: Outbox<u32> = Outbox::default();
        let t0 = Utc.timestamp_millis_opt(0).unwrap();
        let t1 = Utc.timestamp_millis_opt(1_000).unwrap();

        outbox.enqueue("dog".to_string(), Pending::Upsert(1), t0);
        outbox.enqueue("cat".to_string(), Pending::Upsert(7), t0);
        outbox.enqueue("dog".to_string(), Pending::Upsert(2), t1);

        assert_eq!(outbox.len(), 2);
        assert_eq!(outbox.superseded(), 1);

        let dog = outbox.get("dog").unwrap();
        assert_eq!(dog.pending, Pending::Upsert(2));
        assert_eq!(dog.queued_at, t1);
    }

    #[test]
    fn test_outbox_delete_replaces_upsert() {
        let mut outbox: Outbox<u32> = Outbox::default();
        let now = Utc::now();

        outbox.enqueue("dog".to_string(), Pending::Upsert(1), now);
        outbox.enqueue("dog".to_string(), Pending::Delete, now);

        let drained = outbox.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].0, "dog");
        assert_eq!(drained[0].1.pending, Pending::Delete);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_drain_is_ordered_by_key() {
        let mut outbox: Outbox<u32> = Outbox::default();
        let now = Utc::now();
        for key in ["pear", "apple", "fig"] {
            outbox.enqueue(key.to_string(), Pending::Delete, now);
        }

        let keys: Vec<String> = outbox.drain().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["apple", "fig", "pear"]);
    }

    #[test]
    fn test_principal_column_values() {
        let user = Principal::User("abc".to_string());
        let device = Principal::Device("xyz".to_string());

        assert_eq!(user.column_value(), "abc");
        assert_eq!(device.column_value(), "device:xyz");
        assert!(user.is_authenticated());
        assert!(!device.is_authenticated());
        assert_eq!(device.id(), "xyz");
        assert_eq!(user.to_string(), "user abc");
        assert_eq!(device.to_string(), "device xyz");
    }
}
