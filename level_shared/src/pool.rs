//! Entity pool.
//!
//! Recycles deactivated entity instances by category instead of allocating
//! new ones. Each slot is in exactly one of three states:
//! - `Pooled`: inactive and on the free list.
//! - `Claimed`: handed out by [`EntityPool::acquire`], not yet activated.
//! - `Active`: live in the level.
//!
//! Exhaustion is not an error: `acquire` returns `None` and the caller
//! skips its spawn.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::{
    entity::{Entity, EntityCategory},
    math::Vec2,
};

/// Stable handle to a pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityHandle(usize);

/// Lifecycle state of a pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Pooled,
    Claimed,
    Active,
}

struct Slot {
    entity: Entity,
    state: SlotState,
}

/// Category-keyed reuse cache.
#[derive(Default)]
pub struct EntityPool {
    slots: Vec<Slot>,
    free: HashMap<EntityCategory, Vec<EntityHandle>>,
}

impl EntityPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cold-start population: adds `count` inactive instances of `category`.
    pub fn populate(&mut self, category: EntityCategory, count: usize) {
        for _ in 0..count {
            let handle = EntityHandle(self.slots.len());
            self.slots.push(Slot {
                entity: Entity::new(category),
                state: SlotState::Pooled,
            });
            self.free.entry(category).or_default().push(handle);
        }
    }

    /// Claims a pooled instance of `category`, if one is free.
    pub fn acquire(&mut self, category: EntityCategory) -> Option<EntityHandle> {
        let handle = self.free.get_mut(&category)?.pop()?;
        self.slots[handle.0].state = SlotState::Claimed;
        trace!(?handle, ?category, "Claimed pooled entity");
        Some(handle)
    }

    /// Activates a claimed instance at `position`, resetting its transform.
    ///
    /// Returns `false` if the handle is not currently claimed.
    pub fn activate(&mut self, handle: EntityHandle, position: Vec2) -> bool {
        let Some(slot) = self.slots.get_mut(handle.0) else {
            return false;
        };
        if slot.state != SlotState::Claimed {
            return false;
        }
        slot.entity.place(position);
        slot.state = SlotState::Active;
        true
    }

    /// Acquires and activates in one step. `None` when the pool is exhausted.
    pub fn spawn(&mut self, category: EntityCategory, position: Vec2) -> Option<EntityHandle> {
        let Some(handle) = self.acquire(category) else {
            debug!(?category, "Pool exhausted, spawn dropped");
            return None;
        };
        self.activate(handle, position);
        Some(handle)
    }

    /// Returns an instance to the pool. Releasing a pooled instance is a no-op.
    pub fn release(&mut self, handle: EntityHandle) {
        let Some(slot) = self.slots.get_mut(handle.0) else {
            return;
        };
        if slot.state == SlotState::Pooled {
            return;
        }
        slot.entity.active = false;
        slot.state = SlotState::Pooled;
        self.free
            .entry(slot.entity.category)
            .or_default()
            .push(handle);
    }

    /// Deactivates every active instance of `category`.
    pub fn release_all(&mut self, category: EntityCategory) {
        let handles: Vec<EntityHandle> = self.active(category).collect();
        for h in handles {
            self.release(h);
        }
    }

    /// Handles of active instances of `category`, in slot order.
    pub fn active(&self, category: EntityCategory) -> impl Iterator<Item = EntityHandle> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(move |(_, s)| s.state == SlotState::Active && s.entity.category == category)
            .map(|(i, _)| EntityHandle(i))
    }

    /// Number of pooled instances ready for `acquire`.
    pub fn available(&self, category: EntityCategory) -> usize {
        self.free.get(&category).map_or(0, Vec::len)
    }

    pub fn state(&self, handle: EntityHandle) -> Option<SlotState> {
        self.slots.get(handle.0).map(|s| s.state)
    }

    pub fn get(&self, handle: EntityHandle) -> Option<&Entity> {
        self.slots.get(handle.0).map(|s| &s.entity)
    }

    pub fn get_mut(&mut self, handle: EntityHandle) -> Option<&mut Entity> {
        self.slots.get_mut(handle.0).map(|s| &mut s.entity)
    }

    /// Moves every active enemy and missile along its travel direction.
    pub fn advance_movers(&mut self, dt_sec: f32) {
        for slot in &mut self.slots {
            if slot.state == SlotState::Active {
                slot.entity.advance(dt_sec);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Transform;

    #[test]
    fn exhausted_pool_returns_none() {
        let mut pool = EntityPool::new();
        assert!(pool.acquire(EntityCategory::Coin).is_none());
        assert!(pool.spawn(EntityCategory::Coin, Vec2::ZERO).is_none());
        assert_eq!(pool.active(EntityCategory::Coin).count(), 0);
    }

    #[test]
    fn acquire_claims_without_activating() {
        let mut pool = EntityPool::new();
        pool.populate(EntityCategory::Enemy, 1);
        let h = pool.acquire(EntityCategory::Enemy).unwrap();
        assert_eq!(pool.state(h), Some(SlotState::Claimed));
        assert!(!pool.get(h).unwrap().active);
        assert_eq!(pool.available(EntityCategory::Enemy), 0);
    }

    #[test]
    fn activation_resets_transform() {
        let mut pool = EntityPool::new();
        pool.populate(EntityCategory::Coin, 1);
        let h = pool.spawn(EntityCategory::Coin, Vec2::new(1.0, 1.0)).unwrap();
        pool.get_mut(h).unwrap().transform.rotation = 90.0;
        pool.release(h);

        let h2 = pool.spawn(EntityCategory::Coin, Vec2::new(2.0, 3.0)).unwrap();
        assert_eq!(h, h2);
        assert_eq!(
            pool.get(h2).unwrap().transform,
            Transform::at(Vec2::new(2.0, 3.0))
        );
    }

    #[test]
    fn activate_requires_claim() {
        let mut pool = EntityPool::new();
        pool.populate(EntityCategory::Coin, 1);
        let h = pool.spawn(EntityCategory::Coin, Vec2::ZERO).unwrap();
        assert!(!pool.activate(h, Vec2::new(5.0, 5.0)));
        assert_eq!(pool.get(h).unwrap().transform.position, Vec2::ZERO);
    }

    #[test]
    fn double_release_keeps_single_free_entry() {
        let mut pool = EntityPool::new();
        pool.populate(EntityCategory::Missile, 1);
        let h = pool.spawn(EntityCategory::Missile, Vec2::ZERO).unwrap();
        pool.release(h);
        pool.release(h);
        assert_eq!(pool.available(EntityCategory::Missile), 1);
        assert_eq!(pool.state(h), Some(SlotState::Pooled));
    }

    #[test]
    fn categories_are_isolated() {
        let mut pool = EntityPool::new();
        pool.populate(EntityCategory::Enemy, 2);
        assert!(pool.acquire(EntityCategory::Missile).is_none());
        pool.spawn(EntityCategory::Enemy, Vec2::ZERO);
        pool.spawn(EntityCategory::Enemy, Vec2::ZERO);
        assert_eq!(pool.active(EntityCategory::Enemy).count(), 2);
        pool.release_all(EntityCategory::Enemy);
        assert_eq!(pool.active(EntityCategory::Enemy).count(), 0);
        assert_eq!(pool.available(EntityCategory::Enemy), 2);
    }
}
