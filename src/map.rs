//! Map: keyed index over messages whose key lives inside the payload.
//!
//! Each payload embeds a [`MapLink<K>`] holding the key, the hash computed
//! at insert time, and the id of the map it is linked into. The index is a
//! `hashbrown::HashTable` of message pointers, each carrying one count.
//!
//! Hasher and rehashing invariants
//! - The hash is computed once, on insert, and cached in the slot.
//!   Rehashing and `erase_obj` use the cached hash; `K: Hash` is never
//!   invoked for an entry after insertion.
//! - Keys are immutable while linked. `MapLink` only exposes `&K`; the
//!   `&mut` path requires exclusive access to the payload, which a linked
//!   message never grants (the map itself holds a count).

use crate::error::{InsertError, LinkError};
use crate::msg_ptr::{Msg, MsgPtr};
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::marker::PhantomData;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use hashbrown::hash_table::Entry;
use hashbrown::HashTable;
use std::collections::hash_map::RandomState;

/// Embedded map-entry slot: the key plus bookkeeping for the owning map.
pub struct MapLink<K> {
    key: K,
    hash: AtomicU64,
    // Id of the owning map; 0 while unlinked.
    owner: AtomicUsize,
}

impl<K> MapLink<K> {
    pub const fn new(key: K) -> Self {
        Self {
            key,
            hash: AtomicU64::new(0),
            owner: AtomicUsize::new(0),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// Replace the key of an unlinked slot, returning the old key.
    pub fn set_key(&mut self, key: K) -> K {
        debug_assert!(!self.is_linked(), "key changed while linked into a map");
        core::mem::replace(&mut self.key, key)
    }

    pub fn is_linked(&self) -> bool {
        self.owner.load(Ordering::Acquire) != 0
    }

    #[inline]
    fn owner(&self) -> usize {
        self.owner.load(Ordering::Acquire)
    }

    #[inline]
    fn cached_hash(&self) -> u64 {
        self.hash.load(Ordering::Relaxed)
    }

    #[inline]
    fn try_claim(&self, owner: usize, hash: u64) -> bool {
        let claimed = self
            .owner
            .compare_exchange(0, owner, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if claimed {
            self.hash.store(hash, Ordering::Relaxed);
        }
        claimed
    }

    #[inline]
    fn reset(&self) {
        self.owner.store(0, Ordering::Release);
    }
}

impl<K: fmt::Debug> fmt::Debug for MapLink<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapLink")
            .field("key", &self.key)
            .field("linked", &self.is_linked())
            .finish()
    }
}

/// Selects which embedded [`MapLink`] of `Object` a map indexes by.
pub trait MapAdapter {
    type Object;
    type Key: Eq + Hash;

    fn map_link(obj: &Self::Object) -> &MapLink<Self::Key>;
}

/// Declare a [`MapAdapter`] for one `MapLink<K>` field of a struct.
///
/// ```
/// use object_msg::{map_adapter, MapLink};
///
/// struct Session {
///     by_name: MapLink<String>,
/// }
///
/// map_adapter!(ByName = Session { by_name: String });
/// ```
#[macro_export]
macro_rules! map_adapter {
    ($(#[$attr:meta])* $vis:vis $name:ident = $obj:ty { $field:ident : $key:ty }) => {
        $(#[$attr])*
        $vis struct $name;

        impl $crate::MapAdapter for $name {
            type Object = $obj;
            type Key = $key;

            #[inline]
            fn map_link(obj: &$obj) -> &$crate::MapLink<$key> {
                &obj.$field
            }
        }
    };
}

fn next_map_id() -> usize {
    static NEXT: AtomicUsize = AtomicUsize::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

pub struct Map<A: MapAdapter, S = RandomState> {
    hasher: S,
    index: HashTable<NonNull<Msg<A::Object>>>,
    id: usize,
    _adapter: PhantomData<fn() -> A>,
    _owns: PhantomData<MsgPtr<A::Object>>,
}

// Entries are shared exactly like `MsgPtr`s; the index owns nothing else.
unsafe impl<A: MapAdapter, S: Send> Send for Map<A, S> where MsgPtr<A::Object>: Send {}
unsafe impl<A: MapAdapter, S: Sync> Sync for Map<A, S> where MsgPtr<A::Object>: Sync {}

impl<A: MapAdapter> Map<A> {
    pub fn new() -> Self {
        Self::with_hasher(Default::default())
    }
}

impl<A: MapAdapter> Default for Map<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: MapAdapter, S: BuildHasher> Map<A, S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            hasher,
            index: HashTable::new(),
            id: next_map_id(),
            _adapter: PhantomData,
            _owns: PhantomData,
        }
    }

    #[inline]
    fn make_hash<Q>(&self, q: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(q)
    }

    #[inline]
    fn link_of(ptr: &NonNull<Msg<A::Object>>) -> &MapLink<A::Key> {
        // Every pointer in the index holds a count on its message.
        A::map_link(unsafe { ptr.as_ref() })
    }

    #[inline]
    fn key_is<Q>(ptr: &NonNull<Msg<A::Object>>, q: &Q) -> bool
    where
        A::Key: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        <A::Key as Borrow<Q>>::borrow(Self::link_of(ptr).key()) == q
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Link `msg` under its embedded key. The map keeps the handle's count.
    pub fn insert(&mut self, msg: MsgPtr<A::Object>) -> Result<(), InsertError<A::Object>> {
        let Ok(m) = msg.as_msg() else {
            return Err(InsertError::Null);
        };
        let ptr = NonNull::from(m);
        let link = Self::link_of(&ptr);
        let hash = self.make_hash(link.key());
        match self.index.entry(
            hash,
            |p| Self::link_of(p).key() == link.key(),
            |p| Self::link_of(p).cached_hash(),
        ) {
            Entry::Occupied(_) => {
                tracing::trace!("rejected insert of a duplicate key");
                Err(InsertError::DuplicateKey(msg))
            }
            Entry::Vacant(slot) => {
                if !link.try_claim(self.id, hash) {
                    return Err(InsertError::AlreadyLinked(msg));
                }
                slot.insert(ptr);
                // The count now belongs to the map.
                let _ = msg.into_raw();
                Ok(())
            }
        }
    }

    /// Borrow the entry with key `q`. No count is taken.
    pub fn find<Q>(&self, q: &Q) -> Option<&Msg<A::Object>>
    where
        A::Key: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.make_hash(q);
        self.index
            .find(hash, |p| Self::key_is(p, q))
            .map(|p| unsafe { p.as_ref() })
    }

    /// A new handle to the entry with key `q`.
    pub fn get<Q>(&self, q: &Q) -> Option<MsgPtr<A::Object>>
    where
        A::Key: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.find(q).map(Msg::acquire)
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        A::Key: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.find(q).is_some()
    }

    /// Unlink the entry with key `q` and hand back the map's reference.
    pub fn erase<Q>(&mut self, q: &Q) -> Option<MsgPtr<A::Object>>
    where
        A::Key: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.make_hash(q);
        let entry = self
            .index
            .find_entry(hash, |p| Self::key_is(p, q))
            .ok()?;
        let (ptr, _) = entry.remove();
        Some(unsafe { Self::release(ptr) })
    }

    /// Unlink `obj` itself, located through its cached hash.
    pub fn erase_obj(&mut self, obj: &A::Object) -> Result<MsgPtr<A::Object>, LinkError> {
        let link = A::map_link(obj);
        match link.owner() {
            0 => return Err(LinkError::NotLinked),
            id if id != self.id => return Err(LinkError::ForeignContainer),
            _ => {}
        }
        let target: *const A::Object = obj;
        let entry = self
            .index
            .find_entry(link.cached_hash(), |p| Msg::value_ptr(*p) == target)
            .map_err(|_| LinkError::NotLinked)?;
        let (ptr, _) = entry.remove();
        Ok(unsafe { Self::release(ptr) })
    }

    /// Unlink every entry and release the map's references.
    pub fn clear(&mut self) {
        let index = core::mem::replace(&mut self.index, HashTable::new());
        for ptr in index {
            drop(unsafe { Self::release(ptr) });
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Msg<A::Object>> + '_ {
        self.index.iter().map(|p| unsafe { p.as_ref() })
    }

    /// # Safety
    ///
    /// `ptr` must have just been removed from this map's index.
    unsafe fn release(ptr: NonNull<Msg<A::Object>>) -> MsgPtr<A::Object> {
        Self::link_of(&ptr).reset();
        MsgPtr::from_raw(ptr)
    }
}

impl<A: MapAdapter, S> Drop for Map<A, S> {
    fn drop(&mut self) {
        let index = core::mem::replace(&mut self.index, HashTable::new());
        for ptr in index {
            // Same as `release`, which needs the `BuildHasher` bound.
            A::map_link(unsafe { ptr.as_ref() }).reset();
            drop(unsafe { MsgPtr::from_raw(ptr) });
        }
    }
}

impl<A: MapAdapter, S> fmt::Debug for Map<A, S>
where
    A::Key: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(
                self.index
                    .iter()
                    .map(|p| A::map_link(unsafe { p.as_ref() }).key()),
            )
            .finish()
    }
}
