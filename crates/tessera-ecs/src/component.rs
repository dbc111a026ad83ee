//! Component class registration.
//!
//! Every component type attached to an entity is identified by a dense
//! [`ComponentTypeId`] handed out by a [`ComponentRegistry`]. Ids start at 0,
//! follow first-registration order, and are never reused: the registry only
//! ever grows.
//!
//! There are two ways to obtain an id:
//!
//! - through an explicit registry ([`ComponentRegistry::register`]), which can
//!   be created per arena and injected, or
//! - through a [`ComponentClass`] static, which registers its type in the
//!   process-wide [`ComponentRegistry::global`] registry on first use and then
//!   answers without taking any lock.
//!
//! ```
//! use tessera_ecs::component::{ComponentClass, ComponentRegistry};
//!
//! struct Position;
//! static POSITION: ComponentClass<Position> = ComponentClass::new();
//!
//! let id = POSITION.id();
//! assert_eq!(ComponentRegistry::global().lookup::<Position>(), Some(id));
//! ```

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::sync::SpinLock;

/// Hard upper bound on the number of distinct component types per registry.
///
/// Registering more types than this is a configuration error and panics.
pub const MAX_COMPONENT_TYPES: usize = 1 << 16;

// ---------------------------------------------------------------------------
// ComponentTypeId
// ---------------------------------------------------------------------------

/// Opaque, lightweight identifier for a registered component type.
///
/// Only a [`ComponentRegistry`] can create one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(pub(crate) u32);

impl ComponentTypeId {
    /// The dense index of this id, suitable for indexing per-type tables.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentInfo
// ---------------------------------------------------------------------------

/// Metadata about a registered component type.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    /// Unique ID assigned at registration time.
    pub id: ComponentTypeId,
    /// Human-readable name. Defaults to `std::any::type_name::<T>()`.
    pub name: String,
    /// `std::mem::size_of::<T>()`
    pub size: usize,
    /// `std::mem::align_of::<T>()`
    pub align: usize,
    /// Rust `TypeId` the id was assigned for.
    pub type_id: TypeId,
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RegistryTables {
    by_type: HashMap<TypeId, ComponentTypeId>,
    /// First type to claim a name keeps it.
    by_name: HashMap<String, ComponentTypeId>,
    /// Indexed by `ComponentTypeId.0`. Its length is the next id to hand out.
    infos: Vec<ComponentInfo>,
}

/// Registry mapping Rust types to [`ComponentTypeId`]s and their metadata.
///
/// Safe to share between threads. Lookups only take the shared side of a
/// reader-writer lock. Claiming a new id runs inside a short spin-guarded
/// critical section, so concurrent first-time registration of the same type
/// from several threads yields exactly one id.
pub struct ComponentRegistry {
    tables: RwLock<RegistryTables>,
    /// Serializes id claims. Lookups never touch it.
    claim: SpinLock<()>,
    max_types: usize,
}

static GLOBAL_REGISTRY: OnceLock<Arc<ComponentRegistry>> = OnceLock::new();

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(RegistryTables::default()),
            claim: SpinLock::new(()),
            max_types: MAX_COMPONENT_TYPES,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_type_limit(max_types: usize) -> Self {
        Self {
            max_types,
            ..Self::new()
        }
    }

    /// The process-wide registry.
    ///
    /// Created on first access and never reset. [`ComponentClass`] statics and
    /// [`EntityArena::new`](crate::arena::EntityArena::new) use it.
    pub fn global() -> &'static Arc<ComponentRegistry> {
        GLOBAL_REGISTRY.get_or_init(|| Arc::new(ComponentRegistry::new()))
    }

    /// Register `T`, or return its id if it is already registered.
    ///
    /// The recorded name is `std::any::type_name::<T>()`. That string is not
    /// guaranteed to be unique, so when another type already holds it the new
    /// type still gets its own id but stays reachable by type only.
    pub fn register<T: 'static>(&self) -> ComponentTypeId {
        self.claim_id::<T>(std::any::type_name::<T>(), false)
    }

    /// Register `T` under the given `name`.
    ///
    /// If the type has already been registered, the existing
    /// [`ComponentTypeId`] is returned and `name` is ignored.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already taken by a different type, or if the
    /// registry already holds [`MAX_COMPONENT_TYPES`] types.
    pub fn register_named<T: 'static>(&self, name: &str) -> ComponentTypeId {
        self.claim_id::<T>(name, true)
    }

    fn claim_id<T: 'static>(&self, name: &str, exclusive_name: bool) -> ComponentTypeId {
        if let Some(existing) = self.lookup::<T>() {
            return existing;
        }

        let rust_type_id = TypeId::of::<T>();
        let claim = self.claim.lock();
        let (name_taken, next) = {
            let tables = self.tables.read();
            // Another thread may have won the claim since the fast path.
            if let Some(&existing) = tables.by_type.get(&rust_type_id) {
                return existing;
            }
            (tables.by_name.contains_key(name), tables.infos.len())
        };
        if name_taken && exclusive_name {
            drop(claim);
            panic!(
                "component name '{}' is already registered for a different type",
                name
            );
        }
        if next >= self.max_types {
            drop(claim);
            panic!(
                "component registry exhausted: at most {} component types are supported",
                self.max_types
            );
        }

        let id = ComponentTypeId(next as u32);
        {
            let mut tables = self.tables.write();
            tables.infos.push(ComponentInfo {
                id,
                name: name.to_owned(),
                size: std::mem::size_of::<T>(),
                align: std::mem::align_of::<T>(),
                type_id: rust_type_id,
            });
            tables.by_type.insert(rust_type_id, id);
            if !name_taken {
                tables.by_name.insert(name.to_owned(), id);
            }
        }
        drop(claim);

        if name_taken {
            tracing::debug!(
                component = %name,
                id = id.0,
                "registered component class; name already taken, reachable by type only"
            );
        } else {
            tracing::debug!(component = %name, id = id.0, "registered component class");
        }
        id
    }

    /// Look up a component type by its Rust type.
    pub fn lookup<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.tables.read().by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Look up a component type by its registered name.
    pub fn lookup_by_name(&self, name: &str) -> Option<ComponentTypeId> {
        self.tables.read().by_name.get(name).copied()
    }

    /// Get the [`ComponentInfo`] for a registered component type ID.
    pub fn get_info(&self, id: ComponentTypeId) -> Option<ComponentInfo> {
        self.tables.read().infos.get(id.index()).cloned()
    }

    /// Total number of registered component types.
    pub fn len(&self) -> usize {
        self.tables.read().infos.len()
    }

    /// Whether any component types have been registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the recorded names of all registered component types, sorted.
    ///
    /// A name shows up once per type recorded under it.
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables
            .read()
            .infos
            .iter()
            .map(|info| info.name.clone())
            .collect();
        names.sort();
        names
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("len", &self.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ComponentClass
// ---------------------------------------------------------------------------

/// A static, lazily-initialized handle on the global id of component type `T`.
///
/// The first call to [`id`](Self::id) registers `T` in
/// [`ComponentRegistry::global`]; every later call is a lock-free read of the
/// cached id.
pub struct ComponentClass<T: 'static> {
    id: OnceLock<ComponentTypeId>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> ComponentClass<T> {
    /// Create an uninitialized class cell. Usable in `static` items.
    pub const fn new() -> Self {
        Self {
            id: OnceLock::new(),
            _marker: PhantomData,
        }
    }

    /// The global id of `T`, registering it on first use.
    pub fn id(&self) -> ComponentTypeId {
        *self
            .id
            .get_or_init(|| ComponentRegistry::global().register::<T>())
    }

    /// Whether [`id`](Self::id) has been called on this cell yet.
    pub fn is_initialized(&self) -> bool {
        self.id.get().is_some()
    }
}

impl<T: 'static> Default for ComponentClass<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> fmt::Debug for ComponentClass<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentClass")
            .field("type", &std::any::type_name::<T>())
            .field("id", &self.id.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
