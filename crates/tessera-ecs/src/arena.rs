//! The entity arena: slot table, free list and liveness authority.
//!
//! Every entity lives in a *slot*. A slot carries a generation counter and an
//! occupied flag; together they tell apart every entity that ever lived in it.
//!
//! Generation policy: a new slot starts at generation 0, allocation leaves the
//! generation untouched, and freeing a slot increments it. Every handle minted
//! while the slot held the previous occupant therefore stops resolving the
//! moment the slot is freed, and stays dead after the slot is reused.
//!
//! A slot whose generation has reached `u32::MAX` is retired when it is freed
//! instead of wrapping; it is never handed out again.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::accessor::{ComponentSet, EntityMut, EntityRef};
use crate::component::ComponentRegistry;
use crate::entity::{ConstEntityHandle, EntityHandle};
use crate::EcsError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Which free slot [`EntityArena::create`] reuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReusePolicy {
    /// Reuse the free slot with the lowest index. Keeps the table compact.
    #[default]
    LowestIndex,
    /// Reuse the slot that was freed longest ago, spreading generation bumps
    /// over the whole table instead of concentrating them on one hot slot.
    Fifo,
}

/// Arena construction parameters.
///
/// Deserializable so hosts can load it alongside their other settings; any
/// field left out takes its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Number of slots to reserve up front. Default: 64.
    pub initial_capacity: usize,
    /// Free-slot reuse order. Default: [`ReusePolicy::LowestIndex`].
    pub reuse_policy: ReusePolicy,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 64,
            reuse_policy: ReusePolicy::LowestIndex,
        }
    }
}

// ---------------------------------------------------------------------------
// FreeList
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum FreeList {
    LowestIndex(BinaryHeap<Reverse<u32>>),
    Fifo(VecDeque<u32>),
}

impl FreeList {
    fn new(policy: ReusePolicy) -> Self {
        match policy {
            ReusePolicy::LowestIndex => FreeList::LowestIndex(BinaryHeap::new()),
            ReusePolicy::Fifo => FreeList::Fifo(VecDeque::new()),
        }
    }

    fn push(&mut self, index: u32) {
        match self {
            FreeList::LowestIndex(heap) => heap.push(Reverse(index)),
            FreeList::Fifo(queue) => queue.push_back(index),
        }
    }

    fn pop(&mut self) -> Option<u32> {
        match self {
            FreeList::LowestIndex(heap) => heap.pop().map(|Reverse(index)| index),
            FreeList::Fifo(queue) => queue.pop_front(),
        }
    }

    fn len(&self) -> usize {
        match self {
            FreeList::LowestIndex(heap) => heap.len(),
            FreeList::Fifo(queue) => queue.len(),
        }
    }

    /// Free indices in the order they would be reused.
    fn to_vec(&self) -> Vec<u32> {
        match self {
            FreeList::LowestIndex(heap) => {
                let mut indices: Vec<u32> = heap.iter().map(|Reverse(index)| *index).collect();
                indices.sort_unstable();
                indices
            }
            FreeList::Fifo(queue) => queue.iter().copied().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

/// One addressable entity storage location.
#[derive(Debug, Default)]
pub(crate) struct Slot {
    pub(crate) generation: u32,
    pub(crate) occupied: bool,
    pub(crate) components: ComponentSet,
}

// ---------------------------------------------------------------------------
// EntityArena
// ---------------------------------------------------------------------------

/// Owns the slot table and is the single source of truth for which
/// `(slot, generation)` pairs are live.
///
/// ```
/// use tessera_ecs::prelude::*;
///
/// let mut arena = EntityArena::new();
/// let h1 = arena.create().create_reference();
/// arena.destroy(h1).unwrap();
/// let h2 = arena.create().create_reference();
///
/// assert_eq!(h1.index(), h2.index());
/// assert!(arena.resolve(h1).is_none());
/// assert!(arena.resolve(h2).is_some());
/// ```
pub struct EntityArena {
    slots: Vec<Slot>,
    free: FreeList,
    live: usize,
    registry: Arc<ComponentRegistry>,
    config: ArenaConfig,
}

impl EntityArena {
    /// Create an arena with the default configuration and the global
    /// component registry.
    pub fn new() -> Self {
        Self::with_config(ArenaConfig::default())
    }

    /// Create an arena using the global component registry.
    pub fn with_config(config: ArenaConfig) -> Self {
        Self::with_registry(config, Arc::clone(ComponentRegistry::global()))
    }

    /// Create an arena whose components are keyed by ids from `registry`.
    pub fn with_registry(config: ArenaConfig, registry: Arc<ComponentRegistry>) -> Self {
        Self {
            slots: Vec::with_capacity(config.initial_capacity),
            free: FreeList::new(config.reuse_policy),
            live: 0,
            registry,
            config,
        }
    }

    /// Rebuild an arena from raw parts. Callers have validated consistency.
    pub(crate) fn from_parts(
        slots: Vec<Slot>,
        free_slots: &[u32],
        config: ArenaConfig,
        registry: Arc<ComponentRegistry>,
    ) -> Self {
        let mut free = FreeList::new(config.reuse_policy);
        for &index in free_slots {
            free.push(index);
        }
        let live = slots.iter().filter(|slot| slot.occupied).count();
        Self {
            slots,
            free,
            live,
            registry,
            config,
        }
    }

    /// The registry component ids are drawn from.
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// The configuration the arena was built with.
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    // -- lifecycle ----------------------------------------------------------

    /// Create an entity and return an accessor bound to its slot.
    ///
    /// # Panics
    ///
    /// Panics if the slot table cannot grow (allocation failure or no 32-bit
    /// slot index left). Resource exhaustion is not recoverable.
    pub fn create(&mut self) -> EntityMut<'_> {
        let index = self.allocate_slot();
        EntityMut::new(self, index)
    }

    fn allocate_slot(&mut self) -> u32 {
        let index = match self.free.pop() {
            Some(index) => index,
            None => self.grow(),
        };
        let slot = &mut self.slots[index as usize];
        debug_assert!(!slot.occupied, "free list handed out an occupied slot");
        slot.occupied = true;
        self.live += 1;
        tracing::trace!(index, generation = slot.generation, "entity created");
        index
    }

    fn grow(&mut self) -> u32 {
        let index = match u32::try_from(self.slots.len()) {
            Ok(index) if index < u32::MAX => index,
            _ => panic!("entity arena exhausted: no 32-bit slot index left"),
        };
        let capacity_before = self.slots.capacity();
        if let Err(err) = self.slots.try_reserve(1) {
            panic!("entity arena cannot grow its slot table: {err}");
        }
        self.slots.push(Slot::default());
        if self.slots.capacity() != capacity_before {
            tracing::debug!(
                slots = self.slots.len(),
                capacity = self.slots.capacity(),
                "entity arena grew slot table"
            );
        }
        index
    }

    /// Destroy the entity `handle` refers to.
    ///
    /// Returns [`EcsError::StaleEntity`] if the handle no longer resolves; the
    /// slot's current occupant, if any, is left untouched.
    pub fn destroy(&mut self, handle: EntityHandle) -> Result<(), EcsError> {
        if !self.is_alive(handle) {
            return Err(EcsError::StaleEntity { entity: handle });
        }
        self.free_slot(handle.index());
        Ok(())
    }

    /// Destroy whatever entity occupies slot `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range or the slot is already free. Both
    /// indicate corrupted bookkeeping in the caller.
    pub fn destroy_slot(&mut self, index: u32) {
        let slot_count = self.slots.len();
        let Some(slot) = self.slots.get(index as usize) else {
            panic!("destroy_slot: slot {index} out of range ({slot_count} slots)");
        };
        assert!(
            slot.occupied,
            "destroy_slot: slot {index} is already free (double free of entity identity)"
        );
        self.free_slot(index);
    }

    /// Free an occupied slot: bump its generation, then drop its components.
    pub(crate) fn free_slot(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.occupied, "freeing a slot that is not occupied");
        slot.occupied = false;
        self.live -= 1;
        let components = std::mem::take(&mut slot.components);

        match slot.generation.checked_add(1) {
            Some(next) => {
                slot.generation = next;
                self.free.push(index);
                tracing::trace!(index, generation = next, "entity destroyed");
            }
            None => {
                tracing::warn!(index, "slot generation exhausted, retiring slot");
            }
        }

        // Component destructors run last: a panicking `Drop` must find the
        // slot already freed and its generation bumped.
        drop(components);
    }

    /// Destroy every live entity. Outstanding handles all go stale.
    pub fn clear(&mut self) {
        for index in 0..self.slots.len() {
            if self.slots[index].occupied {
                self.free_slot(index as u32);
            }
        }
    }

    // -- resolution ---------------------------------------------------------

    /// Whether `handle` refers to a live entity: slot in range, occupied, and
    /// holding the same generation the handle captured.
    pub fn is_alive(&self, handle: EntityHandle) -> bool {
        self.slots
            .get(handle.index() as usize)
            .is_some_and(|slot| slot.occupied && slot.generation == handle.generation())
    }

    /// Resolve a handle to a mutable accessor, or `None` if it is stale.
    pub fn resolve(&mut self, handle: EntityHandle) -> Option<EntityMut<'_>> {
        if self.check(handle) {
            Some(EntityMut::new(self, handle.index()))
        } else {
            None
        }
    }

    /// Resolve a handle to a read-only accessor, or `None` if it is stale.
    pub fn resolve_ref(&self, handle: EntityHandle) -> Option<EntityRef<'_>> {
        if self.check(handle) {
            Some(EntityRef::new(self, handle.index()))
        } else {
            None
        }
    }

    /// Resolve a read-only handle, or `None` if it is stale.
    pub fn resolve_const(&self, handle: ConstEntityHandle) -> Option<EntityRef<'_>> {
        self.resolve_ref(handle.handle())
    }

    fn check(&self, handle: EntityHandle) -> bool {
        if handle.index() as usize >= self.slots.len() {
            tracing::warn!(
                entity = %handle,
                slots = self.slots.len(),
                "handle points past the slot table; was it minted by another arena?"
            );
            return false;
        }
        self.is_alive(handle)
    }

    // -- queries ------------------------------------------------------------

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether no entity is alive.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of slots ever allocated (live, free and retired).
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots waiting to be reused.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Current generation of slot `index`, or `None` if out of range.
    pub fn generation_of(&self, index: u32) -> Option<u32> {
        self.slots.get(index as usize).map(|slot| slot.generation)
    }

    /// Handles to every live entity, in ascending slot order.
    pub fn handles(&self) -> impl Iterator<Item = EntityHandle> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.occupied)
            .map(|(index, slot)| EntityHandle::new(index as u32, slot.generation))
    }

    /// Read-only accessors for every live entity, in ascending slot order.
    pub fn iter(&self) -> impl Iterator<Item = EntityRef<'_>> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.occupied)
            .map(move |(index, _)| EntityRef::new(self, index as u32))
    }

    // -- crate internals ----------------------------------------------------

    pub(crate) fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub(crate) fn free_slots(&self) -> Vec<u32> {
        self.free.to_vec()
    }

    pub(crate) fn slot(&self, index: u32) -> &Slot {
        &self.slots[index as usize]
    }

    pub(crate) fn slot_mut(&mut self, index: u32) -> &mut Slot {
        &mut self.slots[index as usize]
    }
}

impl Default for EntityArena {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EntityArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityArena")
            .field("live", &self.live)
            .field("slots", &self.slots.len())
            .field("free", &self.free.len())
            .field("reuse_policy", &self.config.reuse_policy)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
