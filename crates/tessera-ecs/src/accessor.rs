//! Entity accessors and per-entity component storage.
//!
//! An accessor is a transient view bound to a slot the arena has just
//! allocated or validated. It borrows the arena, so the entity cannot be
//! destroyed out from under it:
//!
//! - [`EntityRef`] borrows the arena shared; any number may coexist.
//! - [`EntityMut`] borrows the arena exclusively and may add, replace and
//!   remove components, mint handles, or destroy the entity.
//!
//! Components are stored type-erased, one box per component class, indexed
//! by the dense [`ComponentTypeId`] of the arena's registry.

use std::any::Any;
use std::fmt;

use crate::arena::{EntityArena, Slot};
use crate::component::ComponentTypeId;
use crate::entity::{ConstEntityHandle, EntityHandle};

type DynComponent = dyn Any + Send + Sync + 'static;
type BoxedComponent = Box<DynComponent>;

// ---------------------------------------------------------------------------
// ComponentSet
// ---------------------------------------------------------------------------

/// The components attached to one entity, indexed by [`ComponentTypeId`].
#[derive(Default)]
pub(crate) struct ComponentSet {
    columns: Vec<Option<BoxedComponent>>,
    len: usize,
}

impl ComponentSet {
    fn insert(&mut self, id: ComponentTypeId, value: BoxedComponent) -> Option<BoxedComponent> {
        let idx = id.index();
        if idx >= self.columns.len() {
            self.columns.resize_with(idx + 1, || None);
        }
        let previous = self.columns[idx].replace(value);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    fn get(&self, id: ComponentTypeId) -> Option<&DynComponent> {
        self.columns.get(id.index())?.as_deref()
    }

    fn get_mut(&mut self, id: ComponentTypeId) -> Option<&mut DynComponent> {
        self.columns.get_mut(id.index())?.as_deref_mut()
    }

    fn remove(&mut self, id: ComponentTypeId) -> Option<BoxedComponent> {
        let removed = self.columns.get_mut(id.index())?.take();
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    fn ids(&self) -> impl Iterator<Item = ComponentTypeId> + '_ {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.is_some())
            .map(|(idx, _)| ComponentTypeId(idx as u32))
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Drop every component.
    pub(crate) fn clear(&mut self) {
        self.columns.clear();
        self.len = 0;
    }
}

impl fmt::Debug for ComponentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

// ---------------------------------------------------------------------------
// EntityRef
// ---------------------------------------------------------------------------

/// Read-only view of a live entity.
#[derive(Clone, Copy)]
pub struct EntityRef<'a> {
    arena: &'a EntityArena,
    index: u32,
}

impl<'a> EntityRef<'a> {
    pub(crate) fn new(arena: &'a EntityArena, index: u32) -> Self {
        Self { arena, index }
    }

    fn slot(&self) -> &'a Slot {
        self.arena.slot(self.index)
    }

    /// Slot index of the entity.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Current generation of the entity's slot.
    pub fn generation(&self) -> u32 {
        self.slot().generation
    }

    /// Mint a handle that can only be resolved to read-only access.
    pub fn create_const_reference(&self) -> ConstEntityHandle {
        ConstEntityHandle::new(self.index, self.generation())
    }

    /// The component of type `T`, if attached.
    pub fn get<T: 'static>(&self) -> Option<&'a T> {
        let id = self.arena.registry().lookup::<T>()?;
        self.slot().components.get(id)?.downcast_ref::<T>()
    }

    /// Whether a component of type `T` is attached.
    pub fn has<T: 'static>(&self) -> bool {
        self.get::<T>().is_some()
    }

    /// Number of components attached.
    pub fn component_count(&self) -> usize {
        self.slot().components.len()
    }

    /// Ids of the attached component classes, ascending.
    pub fn component_ids(&self) -> Vec<ComponentTypeId> {
        self.slot().components.ids().collect()
    }
}

impl fmt::Debug for EntityRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRef")
            .field("index", &self.index)
            .field("generation", &self.generation())
            .field("components", &self.slot().components)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EntityMut
// ---------------------------------------------------------------------------

/// Read/write view of a live entity.
pub struct EntityMut<'a> {
    arena: &'a mut EntityArena,
    index: u32,
}

impl<'a> EntityMut<'a> {
    pub(crate) fn new(arena: &'a mut EntityArena, index: u32) -> Self {
        Self { arena, index }
    }

    fn slot(&self) -> &Slot {
        self.arena.slot(self.index)
    }

    fn slot_mut(&mut self) -> &mut Slot {
        self.arena.slot_mut(self.index)
    }

    /// Slot index of the entity.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Current generation of the entity's slot.
    pub fn generation(&self) -> u32 {
        self.slot().generation
    }

    /// Mint a handle capturing the slot's current generation.
    pub fn create_reference(&self) -> EntityHandle {
        EntityHandle::new(self.index, self.generation())
    }

    /// Mint a handle that can only be resolved to read-only access.
    pub fn create_const_reference(&self) -> ConstEntityHandle {
        ConstEntityHandle::new(self.index, self.generation())
    }

    /// Attach `value`, registering `T` with the arena's registry on first use.
    ///
    /// Returns the component it replaced, if any.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        let id = self.arena.registry().register::<T>();
        self.slot_mut()
            .components
            .insert(id, Box::new(value))
            .and_then(|previous| previous.downcast::<T>().ok())
            .map(|previous| *previous)
    }

    /// The component of type `T`, if attached.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        let id = self.arena.registry().lookup::<T>()?;
        self.slot().components.get(id)?.downcast_ref::<T>()
    }

    /// Mutable access to the component of type `T`, if attached.
    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        let id = self.arena.registry().lookup::<T>()?;
        self.slot_mut().components.get_mut(id)?.downcast_mut::<T>()
    }

    /// Detach and return the component of type `T`.
    pub fn remove<T: 'static>(&mut self) -> Option<T> {
        let id = self.arena.registry().lookup::<T>()?;
        let removed = self.slot_mut().components.remove(id)?;
        removed.downcast::<T>().ok().map(|value| *value)
    }

    /// Whether a component of type `T` is attached.
    pub fn has<T: 'static>(&self) -> bool {
        self.get::<T>().is_some()
    }

    /// Number of components attached.
    pub fn component_count(&self) -> usize {
        self.slot().components.len()
    }

    /// Reborrow as a read-only view.
    pub fn as_readonly(&self) -> EntityRef<'_> {
        EntityRef::new(&*self.arena, self.index)
    }

    /// Give up write access, keeping a read-only view for the same borrow.
    pub fn into_readonly(self) -> EntityRef<'a> {
        EntityRef::new(self.arena, self.index)
    }

    /// Destroy the entity. Its components are dropped and every handle to it
    /// goes stale.
    pub fn destroy(self) {
        self.arena.free_slot(self.index);
    }
}

impl fmt::Debug for EntityMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMut")
            .field("index", &self.index)
            .field("generation", &self.generation())
            .field("components", &self.slot().components)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaConfig;
    use crate::component::ComponentRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    fn arena() -> EntityArena {
        EntityArena::with_registry(ArenaConfig::default(), Arc::new(ComponentRegistry::new()))
    }

    #[test]
    fn insert_and_get() {
        let mut arena = arena();
        let mut e = arena.create();
        assert_eq!(e.insert(Position { x: 1.0, y: 2.0 }), None);
        assert_eq!(e.get::<Position>(), Some(&Position { x: 1.0, y: 2.0 }));
        assert!(e.has::<Position>());
        assert!(!e.has::<Velocity>());
        assert_eq!(e.component_count(), 1);
    }

    #[test]
    fn insert_replaces_and_returns_previous() {
        let mut arena = arena();
        let mut e = arena.create();
        e.insert(Position { x: 1.0, y: 2.0 });
        let previous = e.insert(Position { x: 9.0, y: 9.0 });
        assert_eq!(previous, Some(Position { x: 1.0, y: 2.0 }));
        assert_eq!(e.get::<Position>(), Some(&Position { x: 9.0, y: 9.0 }));
        assert_eq!(e.component_count(), 1);
    }

    #[test]
    fn get_mut_modifies_in_place() {
        let mut arena = arena();
        let h = {
            let mut e = arena.create();
            e.insert(Position { x: 0.0, y: 0.0 });
            e.create_reference()
        };
        if let Some(pos) = arena.resolve(h).unwrap().get_mut::<Position>() {
            pos.x = 42.0;
        }
        let e = arena.resolve_ref(h).unwrap();
        assert_eq!(e.get::<Position>().map(|p| p.x), Some(42.0));
    }

    #[test]
    fn remove_detaches_component() {
        let mut arena = arena();
        let mut e = arena.create();
        e.insert(Position { x: 1.0, y: 2.0 });
        e.insert(Velocity { dx: 3.0, dy: 4.0 });
        assert_eq!(e.remove::<Velocity>(), Some(Velocity { dx: 3.0, dy: 4.0 }));
        assert_eq!(e.remove::<Velocity>(), None);
        assert!(!e.has::<Velocity>());
        assert_eq!(e.component_count(), 1);
    }

    #[test]
    fn unregistered_type_is_absent() {
        let mut arena = arena();
        let mut e = arena.create();
        assert_eq!(e.get::<Velocity>(), None);
        assert_eq!(e.get_mut::<Velocity>(), None);
        assert_eq!(e.remove::<Velocity>(), None);
        assert!(arena.registry().is_empty());
    }

    #[test]
    fn component_ids_follow_registry() {
        let mut arena = arena();
        let mut e = arena.create();
        e.insert(Velocity { dx: 0.0, dy: 0.0 });
        e.insert(Position { x: 0.0, y: 0.0 });
        let view = e.into_readonly();
        let ids: Vec<usize> = view.component_ids().iter().map(|id| id.index()).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn references_capture_current_generation() {
        let mut arena = arena();
        let first = arena.create().create_reference();
        arena.destroy(first).unwrap();
        let e = arena.create();
        let h = e.create_reference();
        let c = e.create_const_reference();
        assert_eq!(h.generation(), 1);
        assert_eq!(c.generation(), 1);
        assert_eq!(c, ConstEntityHandle::from(h));
    }

    #[test]
    fn const_reference_resolves_read_only() {
        let mut arena = arena();
        let c = {
            let mut e = arena.create();
            e.insert(Position { x: 5.0, y: 6.0 });
            e.as_readonly().create_const_reference()
        };
        let view = arena.resolve_const(c).unwrap();
        assert_eq!(view.get::<Position>(), Some(&Position { x: 5.0, y: 6.0 }));
    }

    #[test]
    fn many_readers_coexist() {
        let mut arena = arena();
        let h = arena.create().create_reference();
        let a = arena.resolve_ref(h).unwrap();
        let b = arena.resolve_ref(h).unwrap();
        let c = a;
        assert_eq!(a.index(), b.index());
        assert_eq!(b.generation(), c.generation());
    }

    #[test]
    fn destroy_drops_components() {
        struct DropCounter(Arc<AtomicUsize>);
        impl Drop for DropCounter {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        let mut arena = arena();
        let mut e = arena.create();
        e.insert(DropCounter(Arc::clone(&drops)));
        let h = e.create_reference();
        e.destroy();

        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(!arena.is_alive(h));

        // Reused slot starts with no components.
        let e = arena.create();
        assert_eq!(e.index(), h.index());
        assert_eq!(e.component_count(), 0);
    }
}
