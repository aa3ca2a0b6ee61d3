//! Subscription bookkeeping for one listener
//!
//! Tracks, per CAN ID or topic, whether routing wants it subscribed and
//! whether the listener's writer has it temporarily suspended while it emits
//! a message on that key. The methods return whether the caller has to touch
//! the transport; the lock is never held across that I/O.

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    wanted: bool,
    suspended: bool,
}

/// Set of subscribed keys with suspend/resume around self-emitted messages
#[derive(Debug)]
pub struct SubscriptionSet<K> {
    slots: Mutex<HashMap<K, Slot>>,
}

impl<K: Eq + Hash + Clone> SubscriptionSet<K> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Mark `key` wanted; true if the transport must subscribe now
    pub fn subscribe(&self, key: K) -> bool {
        let mut slots = self.slots.lock();
        let slot = slots.entry(key).or_default();
        let newly = !slot.wanted && !slot.suspended;
        slot.wanted = true;
        newly
    }

    /// Mark `key` unwanted; true if the transport must unsubscribe now
    ///
    /// A suspended key needs no transport call: it is already unsubscribed
    /// and [`resume`](Self::resume) will leave it that way.
    pub fn unsubscribe(&self, key: &K) -> bool {
        let mut slots = self.slots.lock();
        match slots.get_mut(key) {
            Some(slot) if slot.suspended => {
                slot.wanted = false;
                false
            }
            Some(slot) => {
                let was_wanted = slot.wanted;
                slots.remove(key);
                was_wanted
            }
            None => false,
        }
    }

    /// Start a suspend window; true if the transport must unsubscribe now
    ///
    /// Returns false for keys that are not actively subscribed, in which case
    /// no [`resume`](Self::resume) is needed either.
    pub fn suspend(&self, key: &K) -> bool {
        let mut slots = self.slots.lock();
        match slots.get_mut(key) {
            Some(slot) if slot.wanted && !slot.suspended => {
                slot.suspended = true;
                true
            }
            _ => false,
        }
    }

    /// End a suspend window; true if the transport must resubscribe now
    ///
    /// Only keys still wanted are resubscribed, so a route removed during the
    /// window stays gone.
    pub fn resume(&self, key: &K) -> bool {
        let mut slots = self.slots.lock();
        match slots.get_mut(key) {
            Some(slot) if slot.suspended => {
                slot.suspended = false;
                if slot.wanted {
                    true
                } else {
                    slots.remove(key);
                    false
                }
            }
            _ => false,
        }
    }

    /// Actively subscribed (wanted and not suspended)
    pub fn contains(&self, key: &K) -> bool {
        self.slots
            .lock()
            .get(key)
            .map(|slot| slot.wanted && !slot.suspended)
            .unwrap_or(false)
    }

    pub fn is_wanted(&self, key: &K) -> bool {
        self.slots
            .lock()
            .get(key)
            .map(|slot| slot.wanted)
            .unwrap_or(false)
    }

    /// Wanted keys, suspended or not
    pub fn wanted(&self) -> Vec<K> {
        self.slots
            .lock()
            .iter()
            .filter(|(_, slot)| slot.wanted)
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().values().filter(|slot| slot.wanted).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Clone> Default for SubscriptionSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_unsubscribe() {
        let set = SubscriptionSet::new();
        assert!(set.subscribe(1u32));
        assert!(!set.subscribe(1));
        assert!(set.contains(&1));
        assert_eq!(set.len(), 1);

        assert!(set.unsubscribe(&1));
        assert!(!set.unsubscribe(&1));
        assert!(!set.contains(&1));
        assert!(set.is_empty());
    }

    #[test]
    fn test_suspend_window() {
        let set = SubscriptionSet::new();
        set.subscribe("t".to_string());

        assert!(set.suspend(&"t".to_string()));
        assert!(!set.contains(&"t".to_string()));
        assert!(set.is_wanted(&"t".to_string()));
        // nested suspend is a no-op
        assert!(!set.suspend(&"t".to_string()));

        assert!(set.resume(&"t".to_string()));
        assert!(set.contains(&"t".to_string()));
    }

    #[test]
    fn test_suspend_unknown_key() {
        let set: SubscriptionSet<u32> = SubscriptionSet::new();
        assert!(!set.suspend(&7));
        assert!(!set.resume(&7));
    }

    #[test]
    fn test_unsubscribe_during_window() {
        let set = SubscriptionSet::new();
        set.subscribe(5u32);
        assert!(set.suspend(&5));

        // already unsubscribed at the transport
        assert!(!set.unsubscribe(&5));
        // and must not come back
        assert!(!set.resume(&5));
        assert!(!set.contains(&5));
        assert!(set.is_empty());
    }

    #[test]
    fn test_resubscribe_during_window() {
        let set = SubscriptionSet::new();
        set.subscribe(5u32);
        set.suspend(&5);
        set.unsubscribe(&5);

        // re-added by a new route while suspended: the resume subscribes
        assert!(!set.subscribe(5));
        assert!(set.resume(&5));
        assert!(set.contains(&5));
    }
}
