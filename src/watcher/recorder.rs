use std::sync::Arc;
use tracing::{error, info};

use crate::db::{ActivityStore, StoreError};

/// Chat event reduced to what the activity table cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Left(u64),
    Joined(Vec<u64>),
    Activity(u64),
}

impl ChatEvent {
    /// A leave wins over a join, which wins over the plain sender.
    pub fn classify(left: Option<u64>, joined: &[u64], sender: Option<u64>) -> Option<Self> {
        if let Some(member) = left {
            return Some(ChatEvent::Left(member));
        }
        if !joined.is_empty() {
            return Some(ChatEvent::Joined(joined.to_vec()));
        }
        sender.map(ChatEvent::Activity)
    }
}

/// Turns chat events into activity table mutations.
#[derive(Clone)]
pub struct Recorder {
    store: Arc<dyn ActivityStore>,
}

impl Recorder {
    pub fn new(store: Arc<dyn ActivityStore>) -> Self {
        Self { store }
    }

    /// Apply an event to the store.
    ///
    /// Every affected member is attempted; each failure is logged with its own
    /// member id and the first one is returned.
    pub fn apply(&self, event: &ChatEvent, now: i64) -> Result<(), StoreError> {
        match event {
            ChatEvent::Left(member_id) => self.remove_member(*member_id),
            ChatEvent::Joined(members) => {
                let mut first_err = None;
                for &member_id in members {
                    info!(member_id, now, "update member (joined)");
                    if let Err(e) = self.touch_member(member_id, now) {
                        first_err.get_or_insert(e);
                    }
                }
                first_err.map_or(Ok(()), Err)
            }
            ChatEvent::Activity(member_id) => {
                info!(member_id = *member_id, now, "update member");
                self.touch_member(*member_id, now)
            }
        }
    }

    /// Apply an event; failures are logged by `apply` and go no further.
    pub fn handle(&self, event: &ChatEvent, now: i64) {
        let _ = self.apply(event, now);
    }

    fn touch_member(&self, member_id: u64, now: i64) -> Result<(), StoreError> {
        self.store.upsert(member_id, now).inspect_err(|e| {
            error!(op = "upsert", member_id, "failed to record activity: {e}");
        })
    }

    fn remove_member(&self, member_id: u64) -> Result<(), StoreError> {
        match self.store.remove(member_id) {
            Ok(true) => info!(member_id, "remove member"),
            Ok(false) => info!(member_id, "remove member: member not tracked"),
            Err(e) => {
                error!(op = "remove", member_id, "failed to record leave: {e}");
                return Err(e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, MemberActivity};
    use std::sync::Mutex;

    fn setup() -> (Arc<Database>, Recorder) {
        let db = Arc::new(Database::open(":memory:").unwrap());
        let recorder = Recorder::new(db.clone());
        (db, recorder)
    }

    #[test]
    fn classify_prefers_leave_then_join_then_sender() {
        assert_eq!(ChatEvent::classify(Some(1), &[2], Some(3)), Some(ChatEvent::Left(1)));
        assert_eq!(ChatEvent::classify(None, &[2, 4], Some(3)), Some(ChatEvent::Joined(vec![2, 4])));
        assert_eq!(ChatEvent::classify(None, &[], Some(3)), Some(ChatEvent::Activity(3)));
        assert_eq!(ChatEvent::classify(None, &[], None), None);
    }

    #[test]
    fn join_then_message_updates_single_record() {
        let (db, recorder) = setup();
        recorder.apply(&ChatEvent::Joined(vec![10]), 100).unwrap();
        recorder.apply(&ChatEvent::Activity(10), 3700).unwrap();

        assert_eq!(
            db.list_all_sorted_by_activity().unwrap(),
            vec![MemberActivity { member_id: 10, last_activity: 3700 }]
        );
    }

    #[test]
    fn every_joined_member_is_recorded() {
        let (db, recorder) = setup();
        recorder.apply(&ChatEvent::Joined(vec![1, 2, 3]), 50).unwrap();
        assert_eq!(db.count_active(50).unwrap(), 3);
    }

    #[test]
    fn leave_deletes_record() {
        let (db, recorder) = setup();
        recorder.apply(&ChatEvent::Activity(10), 100).unwrap();
        recorder.apply(&ChatEvent::Left(10), 200).unwrap();

        assert!(db.list_all_sorted_by_activity().unwrap().is_empty());
    }

    #[test]
    fn leave_of_unknown_member_is_fine() {
        let (_db, recorder) = setup();
        recorder.apply(&ChatEvent::Left(77), 200).unwrap();
    }

    struct BrokenStore {
        upserts: Mutex<Vec<u64>>,
    }

    impl ActivityStore for BrokenStore {
        fn upsert(&self, member_id: u64, _timestamp: i64) -> Result<(), StoreError> {
            self.upserts.lock().unwrap().push(member_id);
            if member_id == 1 || member_id == 12 {
                return Err(StoreError::Poisoned);
            }
            Ok(())
        }
        fn remove(&self, _member_id: u64) -> Result<bool, StoreError> {
            Err(StoreError::Poisoned)
        }
        fn find_stale(&self, _threshold: i64) -> Result<Vec<MemberActivity>, StoreError> {
            Ok(vec![])
        }
        fn count_active(&self, _threshold: i64) -> Result<u64, StoreError> {
            Ok(0)
        }
        fn list_all_sorted_by_activity(&self) -> Result<Vec<MemberActivity>, StoreError> {
            Ok(vec![])
        }
    }

    #[test]
    fn store_failure_does_not_stop_later_events() {
        let store = Arc::new(BrokenStore { upserts: Mutex::new(vec![]) });
        let recorder = Recorder::new(store.clone());

        recorder.handle(&ChatEvent::Activity(1), 10);
        recorder.handle(&ChatEvent::Left(5), 11);
        recorder.handle(&ChatEvent::Activity(2), 12);

        assert_eq!(*store.upserts.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn failed_join_upsert_does_not_skip_other_members() {
        let store = Arc::new(BrokenStore { upserts: Mutex::new(vec![]) });
        let recorder = Recorder::new(store.clone());

        let result = recorder.apply(&ChatEvent::Joined(vec![11, 12, 13]), 10);

        assert!(matches!(result, Err(StoreError::Poisoned)));
        assert_eq!(*store.upserts.lock().unwrap(), vec![11, 12, 13]);
    }

    #[test]
    fn joined_members_after_a_failure_are_recorded() {
        let store = Arc::new(BrokenStore { upserts: Mutex::new(vec![]) });
        let recorder = Recorder::new(store.clone());

        recorder.handle(&ChatEvent::Joined(vec![1, 2, 3]), 10);

        assert_eq!(*store.upserts.lock().unwrap(), vec![1, 2, 3]);
    }
}
