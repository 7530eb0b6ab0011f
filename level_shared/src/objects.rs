//! Registry of networked entities.
//!
//! Coins created as room objects and player avatars live here, keyed by
//! their [`NetworkId`]. Iteration is in id order so every peer walks the
//! registry the same way.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::{
    entity::{Entity, EntityCategory, NetworkId, PeerOrdinal},
    math::Vec2,
};

/// Who created a networked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// Created by the authority on behalf of the room.
    Room,
    Peer(PeerOrdinal),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkObject {
    pub entity: Entity,
    pub owner: Owner,
}

#[derive(Debug, Default)]
pub struct NetworkObjects {
    objects: BTreeMap<NetworkId, NetworkObject>,
}

impl NetworkObjects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) the entity for `id`, active at `position`.
    pub fn spawn(&mut self, id: NetworkId, category: EntityCategory, position: Vec2, owner: Owner) {
        let mut entity = Entity::new(category);
        entity.network_id = Some(id);
        entity.place(position);
        if self.objects.insert(id, NetworkObject { entity, owner }).is_some() {
            debug!(?id, "Network object re-instantiated");
        }
        trace!(?id, ?category, ?owner, "Network object spawned");
    }

    /// Destroys `id`. Returns `false` if it was already gone.
    pub fn destroy(&mut self, id: NetworkId) -> bool {
        self.objects.remove(&id).is_some()
    }

    pub fn contains(&self, id: NetworkId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn get(&self, id: NetworkId) -> Option<&NetworkObject> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: NetworkId) -> Option<&mut NetworkObject> {
        self.objects.get_mut(&id)
    }

    /// Ids of every object of `category`, in id order.
    pub fn ids(&self, category: EntityCategory) -> Vec<NetworkId> {
        self.objects
            .iter()
            .filter(|(_, o)| o.entity.category == category)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Ids of objects owned by `ordinal`.
    pub fn owned_by(&self, ordinal: PeerOrdinal) -> Vec<NetworkId> {
        self.objects
            .iter()
            .filter(|(_, o)| o.owner == Owner::Peer(ordinal))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Drops every object owned by a peer that left the room.
    pub fn remove_owned_by(&mut self, ordinal: PeerOrdinal) -> usize {
        let before = self.objects.len();
        self.objects.retain(|_, o| o.owner != Owner::Peer(ordinal));
        before - self.objects.len()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }
}
