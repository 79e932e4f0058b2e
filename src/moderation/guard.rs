// Per-entity action locks
//
// The lock table is the single source of truth for "action in progress" on a row.
// Check-and-set is synchronous, so it completes before the caller's first await.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::moderation::types::{Action, EntityKey};

/// Who holds an entity: the action plus the claim that took it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Holder {
    action: Action,
    claim: u64,
}

/// Lock table mapping each entity to the action currently held for it
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyGuard {
    table: Arc<Mutex<HashMap<EntityKey, Holder>>>,
    claims: Arc<AtomicU64>,
}

impl ConcurrencyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<EntityKey, Holder>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `entity` for `action`. Fails if any action is already held for it.
    pub fn try_acquire(&self, entity: EntityKey, action: Action) -> bool {
        self.claim(entity, action).is_ok()
    }

    pub fn release(&self, entity: EntityKey) -> Option<Action> {
        let released = self.table().remove(&entity).map(|holder| holder.action);
        if let Some(action) = released {
            debug!(entity = %entity, action = %action, "Released action lock");
        }
        released
    }

    /// Release `entity` only if it is still held by `claim`
    fn release_claim(&self, entity: EntityKey, claim: u64) -> bool {
        let mut table = self.table();
        match table.entry(entity) {
            Entry::Occupied(held) if held.get().claim == claim => {
                let holder = held.remove();
                debug!(entity = %entity, action = %holder.action, "Released action lock");
                true
            }
            _ => {
                debug!(entity = %entity, "Lease no longer holds the lock, leaving it in place");
                false
            }
        }
    }

    pub fn current_action(&self, entity: EntityKey) -> Option<Action> {
        self.table().get(&entity).map(|holder| holder.action)
    }

    pub fn is_busy(&self, entity: EntityKey) -> bool {
        self.table().contains_key(&entity)
    }

    /// Number of entities with an action in flight
    pub fn in_flight(&self) -> usize {
        self.table().len()
    }

    /// Claim `entity` and return a lease that releases it on drop.
    /// `Err` carries the action already holding the entity.
    pub fn lease(&self, entity: EntityKey, action: Action) -> Result<ActionLease, Action> {
        let claim = self.claim(entity, action)?;
        Ok(ActionLease {
            guard: self.clone(),
            entity,
            action,
            claim,
            released: false,
        })
    }

    fn claim(&self, entity: EntityKey, action: Action) -> Result<u64, Action> {
        match self.table().entry(entity) {
            Entry::Occupied(held) => {
                debug!(
                    entity = %entity,
                    requested = %action,
                    held = %held.get().action,
                    "Action lock busy"
                );
                Err(held.get().action)
            }
            Entry::Vacant(slot) => {
                let claim = self.claims.fetch_add(1, Ordering::Relaxed);
                slot.insert(Holder { action, claim });
                debug!(entity = %entity, action = %action, "Acquired action lock");
                Ok(claim)
            }
        }
    }
}

/// Held lock for one entity; released exactly once, explicitly or on drop
#[derive(Debug)]
pub struct ActionLease {
    guard: ConcurrencyGuard,
    entity: EntityKey,
    action: Action,
    claim: u64,
    released: bool,
}

impl ActionLease {
    pub fn entity(&self) -> EntityKey {
        self.entity
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.guard.release_claim(self.entity, self.claim);
        }
    }
}

impl Drop for ActionLease {
    fn drop(&mut self) {
        self.release_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_on_same_entity_fails() {
        let guard = ConcurrencyGuard::new();
        let novel = EntityKey::novel(1);

        assert!(guard.try_acquire(novel, Action::Hide));
        assert!(!guard.try_acquire(novel, Action::Archive));
        assert!(!guard.try_acquire(novel, Action::Hide));
        assert_eq!(guard.current_action(novel), Some(Action::Hide));

        assert_eq!(guard.release(novel), Some(Action::Hide));
        assert_eq!(guard.current_action(novel), None);
        assert!(guard.try_acquire(novel, Action::Archive));
    }

    #[test]
    fn test_distinct_entities_do_not_contend() {
        let guard = ConcurrencyGuard::new();

        assert!(guard.try_acquire(EntityKey::novel(1), Action::Approve));
        assert!(guard.try_acquire(EntityKey::novel(2), Action::Approve));
        // Same id, different kind: a different entity
        assert!(guard.try_acquire(EntityKey::category(1), Action::ToggleStatus));
        assert_eq!(guard.in_flight(), 3);
    }

    #[test]
    fn test_release_of_idle_entity_is_a_no_op() {
        let guard = ConcurrencyGuard::new();
        assert_eq!(guard.release(EntityKey::novel(5)), None);
        assert!(!guard.is_busy(EntityKey::novel(5)));
    }

    #[test]
    fn test_lease_releases_on_drop() {
        let guard = ConcurrencyGuard::new();
        let category = EntityKey::category(4);

        {
            let lease = guard.lease(category, Action::HardDelete).unwrap();
            assert_eq!(lease.action(), Action::HardDelete);
            assert_eq!(guard.lease(category, Action::SoftDelete).unwrap_err(), Action::HardDelete);
        }

        assert!(!guard.is_busy(category));
    }

    #[test]
    fn test_explicit_release_does_not_free_a_later_holder() {
        let guard = ConcurrencyGuard::new();
        let novel = EntityKey::novel(8);

        let lease = guard.lease(novel, Action::Hide).unwrap();
        lease.release();
        assert!(guard.try_acquire(novel, Action::Archive));
        assert_eq!(guard.current_action(novel), Some(Action::Archive));
    }

    #[test]
    fn test_dropped_lease_leaves_a_newer_claim_in_place() {
        let guard = ConcurrencyGuard::new();
        let novel = EntityKey::novel(9);

        let stale_lease = guard.lease(novel, Action::Hide).unwrap();
        // Lock freed from outside, then re-taken for the same action
        assert_eq!(guard.release(novel), Some(Action::Hide));
        let current = guard.lease(novel, Action::Hide).unwrap();

        drop(stale_lease);
        assert_eq!(guard.current_action(novel), Some(Action::Hide));
        assert_eq!(guard.lease(novel, Action::Archive).unwrap_err(), Action::Hide);

        drop(current);
        assert!(!guard.is_busy(novel));
    }

    #[test]
    fn test_clones_share_one_table() {
        let guard = ConcurrencyGuard::new();
        let view_side = guard.clone();

        assert!(guard.try_acquire(EntityKey::novel(3), Action::Reject));
        assert!(view_side.is_busy(EntityKey::novel(3)));
    }
}
