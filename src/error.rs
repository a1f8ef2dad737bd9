//! Error types shared by the handle and container layers.
//!
//! Errors that reject an owned [`MsgPtr`] hand it back to the caller so a
//! failed push or insert never silently releases a reference.

use crate::flat::FlatTag;
use crate::msg_ptr::MsgPtr;
use core::fmt;
use thiserror::Error;

/// A null [`MsgPtr`] was dereferenced.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Error)]
#[error("dereferenced a null message handle")]
pub struct NullAccess;

/// The allocator hook could not provide memory for a new message.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Error)]
#[error("failed to allocate {size} bytes for a message")]
pub struct AllocError {
    pub size: usize,
}

/// A push was attempted on a closed [`ConditionList`](crate::ConditionList).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Error)]
#[error("condition list is closed")]
pub struct ClosedError;

/// Erase or reorder of an object that is not a member of this container.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Error)]
pub enum LinkError {
    /// The object's link field is not linked anywhere.
    #[error("object is not linked into any container")]
    NotLinked,
    /// The object's link field belongs to another container instance.
    #[error("object is linked into a different container")]
    ForeignContainer,
}

/// Error for pushing a message into a list.
#[derive(Error)]
pub enum PushError<T> {
    /// The handle was null.
    #[error("cannot link a null message handle")]
    Null,
    /// The link field used by this list is already linked somewhere.
    #[error("message is already linked through this field")]
    AlreadyLinked(MsgPtr<T>),
    /// The list has been closed.
    #[error("list is closed")]
    Closed(MsgPtr<T>),
}

impl<T> PushError<T> {
    /// Recover the rejected handle, if there was one.
    pub fn into_inner(self) -> Option<MsgPtr<T>> {
        match self {
            PushError::Null => None,
            PushError::AlreadyLinked(msg) | PushError::Closed(msg) => Some(msg),
        }
    }
}

/// Error for inserting a message into a [`Map`](crate::Map).
#[derive(Error)]
pub enum InsertError<T> {
    /// The handle was null.
    #[error("cannot insert a null message handle")]
    Null,
    /// The map slot of this message is already linked into a map.
    #[error("message is already linked through this field")]
    AlreadyLinked(MsgPtr<T>),
    /// A live entry with the same key exists.
    #[error("a live entry with this key already exists")]
    DuplicateKey(MsgPtr<T>),
}

impl<T> InsertError<T> {
    /// Recover the rejected handle, if there was one.
    pub fn into_inner(self) -> Option<MsgPtr<T>> {
        match self {
            InsertError::Null => None,
            InsertError::AlreadyLinked(msg) | InsertError::DuplicateKey(msg) => Some(msg),
        }
    }
}

// Debug does not require `T: Debug`; the payload is elided.
impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Null => f.write_str("Null"),
            PushError::AlreadyLinked(_) => f.write_str("AlreadyLinked(..)"),
            PushError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> fmt::Debug for InsertError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertError::Null => f.write_str("Null"),
            InsertError::AlreadyLinked(_) => f.write_str("AlreadyLinked(..)"),
            InsertError::DuplicateKey(_) => f.write_str("DuplicateKey(..)"),
        }
    }
}

/// Errors reading or writing a [`FlatField`](crate::FlatField).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Error)]
pub enum FlatError {
    #[error("flat field holds {found:?}, not {expected:?}")]
    TypeMismatch { expected: FlatTag, found: FlatTag },
    #[error("{len} bytes exceed the inline capacity of {capacity}")]
    CapacityExceeded { len: usize, capacity: usize },
}
