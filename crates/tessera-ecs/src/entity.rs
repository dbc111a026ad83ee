//! Entity handles.
//!
//! An [`EntityHandle`] is a 64-bit weak reference that packs a *generation*
//! counter in the high 32 bits and a *slot index* in the low 32 bits. Handles
//! never own their entity; they are resolved through the
//! [`EntityArena`](crate::arena::EntityArena), which rejects them once the slot
//! has been freed (its generation no longer matches).
//!
//! Handles are minted only by accessors
//! ([`EntityMut::create_reference`](crate::accessor::EntityMut::create_reference)
//! and [`EntityRef::create_const_reference`](crate::accessor::EntityRef::create_const_reference)),
//! so a freshly minted handle always names a generation that was live at the
//! moment of creation.
//!
//! The one other way in is `Deserialize`, which exists so handles can be
//! persisted next to an [`ArenaSnapshot`](crate::snapshot::ArenaSnapshot).
//! It accepts any raw `u64`. That is sound because resolution never trusts a
//! handle: a deserialized or forged value resolves only if its exact
//! `(index, generation)` pair is live in the arena it is resolved against, and
//! is otherwise indistinguishable from any other stale handle.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// EntityHandle
// ---------------------------------------------------------------------------

/// A generational weak reference to an entity.
///
/// Layout: `[generation: u32 | index: u32]`. Two handles are equal iff both
/// the slot index and the generation match.
///
/// Serializes as the raw `u64`. Deserializing accepts any value; see the
/// [module docs](self) for why that cannot reach a dead entity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityHandle(u64);

impl EntityHandle {
    #[inline]
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self((generation as u64) << 32 | index as u64)
    }

    /// The slot index (low 32 bits).
    #[inline]
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    /// The generation captured when the handle was minted (high 32 bits).
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Raw `u64` representation, e.g. for use as a hash key across an FFI
    /// boundary.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityHandle({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// ConstEntityHandle
// ---------------------------------------------------------------------------

/// A weak reference that can only ever be resolved to read-only access.
///
/// Produced by [`EntityRef::create_const_reference`](crate::accessor::EntityRef::create_const_reference),
/// or by downgrading an [`EntityHandle`]. There is no way back to a mutable
/// handle.
///
/// Serializes exactly like [`EntityHandle`], and deserializing one grants
/// read-only resolution only.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConstEntityHandle(EntityHandle);

impl ConstEntityHandle {
    #[inline]
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self(EntityHandle::new(index, generation))
    }

    /// The slot index.
    #[inline]
    pub fn index(self) -> u32 {
        self.0.index()
    }

    /// The generation captured when the handle was minted.
    #[inline]
    pub fn generation(self) -> u32 {
        self.0.generation()
    }

    #[inline]
    pub(crate) fn handle(self) -> EntityHandle {
        self.0
    }
}

impl From<EntityHandle> for ConstEntityHandle {
    fn from(handle: EntityHandle) -> Self {
        Self(handle)
    }
}

impl fmt::Debug for ConstEntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConstEntityHandle({}v{})", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
