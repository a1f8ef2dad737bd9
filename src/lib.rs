//! object-msg: reference-counted messages and the intrusive containers
//! that hold them.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: let one heap object be shared by many threads and be a member
//!   of several containers at once, without the containers allocating
//!   nodes of their own.
//! - Layers:
//!   - MsgPtr<T>: owning handle to a `Msg<T>` allocation that carries an
//!     atomic reference count next to the payload.
//!   - ListLink + List<A>: link slots embedded in the payload and an
//!     unsynchronized doubly linked list threaded through one of them.
//!     `A` is an adapter naming which slot the list uses.
//!   - MutexedList<A>: `List` behind a `parking_lot::Mutex`, one lock
//!     acquisition per operation.
//!   - ConditionList<A>: `MutexedList` plus a condition variable and a
//!     terminal close, for producer/consumer queues.
//!   - MapLink<K> + Map<A, S>: a keyed index whose key lives inside the
//!     payload.
//!   - FlatField<M>: a tagged inline union for small payload members.
//!
//! Constraints
//! - A container holds one reference per member, so a linked message is
//!   never freed under the container. Unlinking hands that reference back
//!   as a `MsgPtr`.
//! - Each link slot belongs to at most one container at a time. Claims are
//!   atomic, so a second container is refused instead of corrupting links.
//! - `List`, `Map` and `FlatField` are not synchronized; writers need
//!   `&mut`. Only `MutexedList` and `ConditionList` lock internally.
//! - Payload destructors never run while a container lock is held.
//!
//! Reentrancy
//! - `parking_lot` mutexes are not reentrant. In debug builds the guarded
//!   lists remember the holding thread and panic on a nested lock from the
//!   same thread (e.g. from a `with_list` closure) instead of deadlocking.
//!
//! Overflow semantics
//! - Reference-count overflow aborts the process, matching `Arc`.
//!
//! Hasher and rehashing invariants
//! - `Map` stores each entry's hash when it is inserted and only uses the
//!   stored hash afterwards. `K: Hash` is never invoked after insertion.
//!
//! Notes and non-goals
//! - No weak handles.
//! - `ConditionList` cannot be reopened once closed.
//! - Containers are not `Clone`.

mod condition_list;
mod error;
mod flat;
mod link;
mod list;
mod map;
mod msg_ptr;
mod mutexed_list;
mod reentrancy;

// Public surface
pub use condition_list::{ConditionList, ListStatus};
pub use error::{
    AllocError, ClosedError, FlatError, InsertError, LinkError, NullAccess, PushError,
};
pub use flat::{FlatField, FlatTag, InlineBytes, FLAT_BYTES_CAPACITY};
pub use link::{ListAdapter, ListLink};
pub use list::{IntoIter, Iter, List};
pub use map::{Map, MapAdapter, MapLink};
pub use msg_ptr::{Global, Msg, MsgAlloc, MsgPtr};
pub use mutexed_list::{MutexedList, PopResult};
