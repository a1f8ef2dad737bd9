//! FlatField: a tagged inline union for small payload members.
//!
//! Holds one of a few scalar cases, a short byte string stored inline, or
//! a flat message `M` by value. Nothing here allocates. Access is not
//! synchronized; every write takes `&mut self`.

use crate::error::FlatError;
use core::fmt;

/// Inline capacity of [`FlatField::set_bytes`].
pub const FLAT_BYTES_CAPACITY: usize = 32;

/// The active case of a [`FlatField`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlatTag {
    Empty,
    Bool,
    I64,
    U64,
    F64,
    Bytes,
    Msg,
}

/// Up to [`FLAT_BYTES_CAPACITY`] bytes stored inline.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct InlineBytes {
    len: u8,
    buf: [u8; FLAT_BYTES_CAPACITY],
}

impl InlineBytes {
    pub fn new(bytes: &[u8]) -> Result<Self, FlatError> {
        if bytes.len() > FLAT_BYTES_CAPACITY {
            return Err(FlatError::CapacityExceeded {
                len: bytes.len(),
                capacity: FLAT_BYTES_CAPACITY,
            });
        }
        let mut buf = [0u8; FLAT_BYTES_CAPACITY];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            len: bytes.len() as u8,
            buf,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for InlineBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InlineBytes").field(&self.as_bytes()).finish()
    }
}

#[derive(Clone, PartialEq)]
enum Repr<M> {
    Empty,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    Bytes(InlineBytes),
    Msg(M),
}

/// Tagged inline union. `M` is the embedded message type; `()` when the
/// field never holds one.
#[derive(Clone, PartialEq)]
pub struct FlatField<M = ()> {
    repr: Repr<M>,
}

impl<M> FlatField<M> {
    pub const fn new() -> Self {
        Self { repr: Repr::Empty }
    }

    pub fn tag(&self) -> FlatTag {
        match self.repr {
            Repr::Empty => FlatTag::Empty,
            Repr::Bool(_) => FlatTag::Bool,
            Repr::I64(_) => FlatTag::I64,
            Repr::U64(_) => FlatTag::U64,
            Repr::F64(_) => FlatTag::F64,
            Repr::Bytes(_) => FlatTag::Bytes,
            Repr::Msg(_) => FlatTag::Msg,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.repr, Repr::Empty)
    }

    #[inline]
    fn mismatch(&self, expected: FlatTag) -> FlatError {
        FlatError::TypeMismatch {
            expected,
            found: self.tag(),
        }
    }

    pub fn get_bool(&self) -> Result<bool, FlatError> {
        match self.repr {
            Repr::Bool(v) => Ok(v),
            _ => Err(self.mismatch(FlatTag::Bool)),
        }
    }

    pub fn get_i64(&self) -> Result<i64, FlatError> {
        match self.repr {
            Repr::I64(v) => Ok(v),
            _ => Err(self.mismatch(FlatTag::I64)),
        }
    }

    pub fn get_u64(&self) -> Result<u64, FlatError> {
        match self.repr {
            Repr::U64(v) => Ok(v),
            _ => Err(self.mismatch(FlatTag::U64)),
        }
    }

    pub fn get_f64(&self) -> Result<f64, FlatError> {
        match self.repr {
            Repr::F64(v) => Ok(v),
            _ => Err(self.mismatch(FlatTag::F64)),
        }
    }

    pub fn get_bytes(&self) -> Result<&[u8], FlatError> {
        match &self.repr {
            Repr::Bytes(b) => Ok(b.as_bytes()),
            _ => Err(self.mismatch(FlatTag::Bytes)),
        }
    }

    pub fn get_msg(&self) -> Result<&M, FlatError> {
        match &self.repr {
            Repr::Msg(m) => Ok(m),
            _ => Err(self.mismatch(FlatTag::Msg)),
        }
    }

    /// Mutable access to the embedded message without switching cases.
    pub fn msg_mut(&mut self) -> Result<&mut M, FlatError> {
        let found = self.tag();
        match &mut self.repr {
            Repr::Msg(m) => Ok(m),
            _ => Err(FlatError::TypeMismatch {
                expected: FlatTag::Msg,
                found,
            }),
        }
    }

    pub fn set_bool(&mut self, v: bool) {
        self.repr = Repr::Bool(v);
    }

    pub fn set_i64(&mut self, v: i64) {
        self.repr = Repr::I64(v);
    }

    pub fn set_u64(&mut self, v: u64) {
        self.repr = Repr::U64(v);
    }

    pub fn set_f64(&mut self, v: f64) {
        self.repr = Repr::F64(v);
    }

    /// On error the field keeps its previous case and value.
    pub fn set_bytes(&mut self, bytes: &[u8]) -> Result<(), FlatError> {
        self.repr = Repr::Bytes(InlineBytes::new(bytes)?);
        Ok(())
    }

    pub fn set_msg(&mut self, msg: M) {
        self.repr = Repr::Msg(msg);
    }

    /// Take the embedded message, leaving the field `Empty`.
    pub fn take_msg(&mut self) -> Result<M, FlatError> {
        match core::mem::replace(&mut self.repr, Repr::Empty) {
            Repr::Msg(m) => Ok(m),
            other => {
                self.repr = other;
                Err(self.mismatch(FlatTag::Msg))
            }
        }
    }

    pub fn clear(&mut self) {
        self.repr = Repr::Empty;
    }
}

impl<M: Default> FlatField<M> {
    /// Switch to the `Msg` case, default-initialising it if another case
    /// was active, and return it for writing.
    pub fn mutable_msg(&mut self) -> &mut M {
        if !matches!(self.repr, Repr::Msg(_)) {
            self.repr = Repr::Msg(M::default());
        }
        match &mut self.repr {
            Repr::Msg(m) => m,
            _ => unreachable!("switched to Msg above"),
        }
    }
}

impl<M> Default for FlatField<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: fmt::Debug> fmt::Debug for FlatField<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Empty => f.write_str("Empty"),
            Repr::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Repr::I64(v) => f.debug_tuple("I64").field(v).finish(),
            Repr::U64(v) => f.debug_tuple("U64").field(v).finish(),
            Repr::F64(v) => f.debug_tuple("F64").field(v).finish(),
            Repr::Bytes(b) => f.debug_tuple("Bytes").field(&b.as_bytes()).finish(),
            Repr::Msg(m) => f.debug_tuple("Msg").field(m).finish(),
        }
    }
}
