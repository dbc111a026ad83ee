//! Tessera ECS -- generational entity identity and component class ids.
//!
//! This crate is the identity core of the Tessera engine. An
//! [`EntityArena`](arena::EntityArena) hands out slots for dynamically created
//! entities and stamps each with a generation counter; [`EntityHandle`]s
//! capture `(slot, generation)` and can be held across frames, then resolved
//! back to an accessor or found stale once the entity is gone and its slot
//! reused. A [`ComponentRegistry`](component::ComponentRegistry) gives each
//! component type a dense integer id used to key per-entity storage.
//!
//! # Quick Start
//!
//! ```
//! use tessera_ecs::prelude::*;
//!
//! #[derive(Debug, PartialEq)]
//! struct Position { x: f32, y: f32 }
//!
//! let mut arena = EntityArena::new();
//! let mut entity = arena.create();
//! entity.insert(Position { x: 0.0, y: 0.0 });
//! let handle = entity.create_reference();
//!
//! assert_eq!(
//!     arena.resolve_ref(handle).and_then(|e| e.get::<Position>()),
//!     Some(&Position { x: 0.0, y: 0.0 })
//! );
//!
//! arena.destroy(handle).unwrap();
//! assert!(arena.resolve(handle).is_none());
//! ```

#![deny(unsafe_code)]

pub mod accessor;
pub mod arena;
pub mod component;
pub mod entity;
pub mod snapshot;
#[allow(unsafe_code)]
pub mod sync;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
///
/// Stale handles met during lookup are not errors (lookups return `Option`);
/// this type covers operations that were asked to act on something that is
/// no longer there, and persistence failures. Contract violations such as a
/// double free of a slot panic instead.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity does not exist (destroyed, slot reused, or never allocated).
    #[error("entity {entity:?} does not exist (stale or never allocated)")]
    StaleEntity { entity: entity::EntityHandle },

    /// An arena snapshot failed consistency checks.
    #[error("invalid arena snapshot: {details}")]
    InvalidSnapshot { details: String },

    /// A snapshot could not be (de)serialized.
    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::accessor::{EntityMut, EntityRef};
    pub use crate::arena::{ArenaConfig, EntityArena, ReusePolicy};
    pub use crate::component::{
        ComponentClass, ComponentInfo, ComponentRegistry, ComponentTypeId, MAX_COMPONENT_TYPES,
    };
    pub use crate::entity::{ConstEntityHandle, EntityHandle};
    pub use crate::snapshot::ArenaSnapshot;
    pub use crate::sync::{SharedArena, SpinLock};
    pub use crate::EcsError;
}

pub use entity::EntityHandle;

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::prelude::*;
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

    #[derive(Debug, Clone, PartialEq)]
    struct Health(u32);

    fn setup_arena() -> EntityArena {
        EntityArena::with_registry(ArenaConfig::default(), Arc::new(ComponentRegistry::new()))
    }

    fn spawn_pos_vel(arena: &mut EntityArena, x: f32, y: f32) -> EntityHandle {
        let mut e = arena.create();
        e.insert(Position { x, y });
        e.insert(Velocity { dx: 1.0, dy: -1.0 });
        e.create_reference()
    }

    #[test]
    fn spawn_with_components_and_read_back() {
        let mut arena = setup_arena();
        let h = spawn_pos_vel(&mut arena, 1.0, 2.0);
        let e = arena.resolve_ref(h).unwrap();
        assert_eq!(e.get::<Position>(), Some(&Position { x: 1.0, y: 2.0 }));
        assert_eq!(e.get::<Velocity>(), Some(&Velocity { dx: 1.0, dy: -1.0 }));
        assert_eq!(e.get::<Health>(), None);
    }

    #[test]
    fn destroy_entity_verify_gone() {
        let mut arena = setup_arena();
        let h = spawn_pos_vel(&mut arena, 0.0, 0.0);
        arena.destroy(h).unwrap();
        assert!(!arena.is_alive(h));
        assert!(arena.resolve_ref(h).is_none());
        assert!(arena.is_empty());
    }

    #[test]
    fn stale_destroy_returns_error() {
        let mut arena = setup_arena();
        let h = spawn_pos_vel(&mut arena, 0.0, 0.0);
        arena.destroy(h).unwrap();
        let err = arena.destroy(h).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn entities_keep_independent_data() {
        let mut arena = setup_arena();
        let h1 = spawn_pos_vel(&mut arena, 1.0, 1.0);
        let h2 = spawn_pos_vel(&mut arena, 2.0, 2.0);
        let h3 = spawn_pos_vel(&mut arena, 3.0, 3.0);

        arena.destroy(h2).unwrap();
        assert_eq!(arena.len(), 2);
        assert_eq!(
            arena.resolve_ref(h1).unwrap().get::<Position>(),
            Some(&Position { x: 1.0, y: 1.0 })
        );
        assert_eq!(
            arena.resolve_ref(h3).unwrap().get::<Position>(),
            Some(&Position { x: 3.0, y: 3.0 })
        );
    }

    #[test]
    fn mutate_through_resolved_accessor() {
        let mut arena = setup_arena();
        let handles: Vec<_> = (0..10)
            .map(|i| spawn_pos_vel(&mut arena, i as f32, 0.0))
            .collect();

        for &h in &handles {
            let mut e = arena.resolve(h).unwrap();
            let vel = e.get::<Velocity>().cloned().unwrap();
            let pos = e.get_mut::<Position>().unwrap();
            pos.x += vel.dx;
            pos.y += vel.dy;
        }

        for (i, &h) in handles.iter().enumerate() {
            let e = arena.resolve_ref(h).unwrap();
            assert_eq!(
                e.get::<Position>(),
                Some(&Position { x: i as f32 + 1.0, y: -1.0 })
            );
        }
    }

    #[test]
    fn scale_10k_entities() {
        let mut arena = setup_arena();
        let handles: Vec<_> = (0..10_000)
            .map(|i| {
                let mut e = arena.create();
                e.insert(Health(i));
                e.create_reference()
            })
            .collect();
        assert_eq!(arena.len(), 10_000);

        for h in handles.iter().take(5_000) {
            arena.destroy(*h).unwrap();
        }
        assert_eq!(arena.len(), 5_000);

        for (i, h) in handles.iter().enumerate() {
            let resolved = arena.resolve_ref(*h).and_then(|e| e.get::<Health>().cloned());
            if i < 5_000 {
                assert_eq!(resolved, None);
            } else {
                assert_eq!(resolved, Some(Health(i as u32)));
            }
        }

        // Refill: every freed slot is reused before the table grows.
        for _ in 0..5_000 {
            arena.create();
        }
        assert_eq!(arena.slot_count(), 10_000);
        for h in handles.iter().take(5_000) {
            assert!(arena.resolve_ref(*h).is_none());
        }
    }
}
