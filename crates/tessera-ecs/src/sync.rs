//! Synchronization primitives for sharing identity state between threads.
//!
//! - [`SpinLock`] guards very short critical sections (component-class id
//!   allocation). It never parks the thread.
//! - [`SharedArena`] puts an [`EntityArena`] behind a reader-writer lock so
//!   that many threads can resolve handles at once while creation and
//!   destruction are serialized.

use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::accessor::{EntityMut, EntityRef};
use crate::arena::EntityArena;
use crate::entity::EntityHandle;
use crate::EcsError;

// ---------------------------------------------------------------------------
// SpinLock
// ---------------------------------------------------------------------------

/// A test-and-test-and-set spin lock.
///
/// Only suitable for critical sections of a few instructions; contended
/// waiters busy-loop with [`std::hint::spin_loop`].
pub struct SpinLock<T: ?Sized> {
    locked: AtomicBool,
    value: UnsafeCell<T>,
}

// SAFETY: access to `value` is serialized by `locked`.
unsafe impl<T: ?Sized + Send> Send for SpinLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Create an unlocked lock around `value`.
    pub const fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Consume the lock, returning the protected value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: ?Sized> SpinLock<T> {
    /// Acquire the lock, spinning until it is free.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            while self.locked.load(Ordering::Relaxed) {
                std::hint::spin_loop();
            }
        }
    }

    /// Acquire the lock if nobody holds it.
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        self.locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SpinLockGuard {
                lock: self,
                _marker: PhantomData,
            })
    }

    /// Whether the lock is currently held. Racy; for diagnostics only.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// Mutable access without locking; the borrow checker proves exclusivity.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinLock")
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

/// RAII guard returned by [`SpinLock::lock`]; releases the lock on drop.
pub struct SpinLockGuard<'a, T: ?Sized> {
    lock: &'a SpinLock<T>,
    _marker: PhantomData<&'a mut T>,
}

impl<T: ?Sized> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard holds the lock.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard holds the lock exclusively.
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T: ?Sized> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// SharedArena
// ---------------------------------------------------------------------------

/// A cloneable, thread-safe handle on one [`EntityArena`].
///
/// Reads (`with_entity`, `is_alive`, `read`) share the lock; writes (`create*`,
/// `destroy`, `with_entity_mut`, `write`) are exclusive. A destroy that has
/// returned is visible to every resolve that starts afterwards.
#[derive(Clone)]
pub struct SharedArena {
    inner: Arc<RwLock<EntityArena>>,
}

impl SharedArena {
    /// Wrap an arena for sharing.
    pub fn new(arena: EntityArena) -> Self {
        Self {
            inner: Arc::new(RwLock::new(arena)),
        }
    }

    /// Shared access to the arena. Blocks while a writer holds it.
    pub fn read(&self) -> RwLockReadGuard<'_, EntityArena> {
        self.inner.read()
    }

    /// Exclusive access to the arena.
    pub fn write(&self) -> RwLockWriteGuard<'_, EntityArena> {
        self.inner.write()
    }

    /// Create an empty entity and return a handle to it.
    pub fn create(&self) -> EntityHandle {
        self.create_with(|_| {})
    }

    /// Create an entity, let `init` attach components while the write lock is
    /// held, and return a handle to it.
    pub fn create_with<F>(&self, init: F) -> EntityHandle
    where
        F: FnOnce(&mut EntityMut<'_>),
    {
        let mut arena = self.write();
        let mut entity = arena.create();
        init(&mut entity);
        entity.create_reference()
    }

    /// Destroy the entity `handle` refers to.
    ///
    /// Returns [`EcsError::StaleEntity`] if it is already gone.
    pub fn destroy(&self, handle: EntityHandle) -> Result<(), EcsError> {
        self.write().destroy(handle)
    }

    /// Run `f` against a read-only view of the entity, if it is still alive.
    pub fn with_entity<R, F>(&self, handle: EntityHandle, f: F) -> Option<R>
    where
        F: FnOnce(EntityRef<'_>) -> R,
    {
        let arena = self.read();
        arena.resolve_ref(handle).map(f)
    }

    /// Run `f` against a mutable view of the entity, if it is still alive.
    pub fn with_entity_mut<R, F>(&self, handle: EntityHandle, f: F) -> Option<R>
    where
        F: FnOnce(EntityMut<'_>) -> R,
    {
        let mut arena = self.write();
        arena.resolve(handle).map(f)
    }

    /// Whether `handle` still refers to a live entity.
    pub fn is_alive(&self, handle: EntityHandle) -> bool {
        self.read().is_alive(handle)
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no entity is alive.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<EntityArena> for SharedArena {
    fn from(arena: EntityArena) -> Self {
        Self::new(arena)
    }
}

impl Default for SharedArena {
    fn default() -> Self {
        Self::new(EntityArena::new())
    }
}

impl fmt::Debug for SharedArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_read() {
            Some(arena) => f.debug_tuple("SharedArena").field(&*arena).finish(),
            None => f.write_str("SharedArena(<locked>)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
