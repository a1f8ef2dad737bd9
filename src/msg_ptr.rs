//! Reference-counted message objects.
//!
//! A [`Msg<T>`] is a single heap allocation holding an atomic strong count,
//! the allocator hook that produced it, and the payload `T`. [`MsgPtr<T>`]
//! is the owning handle. Containers that link a message hold one count of
//! their own, so a message outlives every container membership.

use crate::error::{AllocError, NullAccess};
use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;
use core::ops::Deref;
use core::ptr::{self, NonNull};
use core::sync::atomic::{self, AtomicUsize, Ordering};

/// Counts above this abort, as `std::sync::Arc` does.
const MAX_REFCOUNT: usize = isize::MAX as usize;

/// Allocator hook used to materialize message objects.
///
/// # Safety
///
/// `allocate` must return memory valid for `layout` that stays valid until
/// `deallocate` is called with the same pointer and layout.
pub unsafe trait MsgAlloc: Send + Sync {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// # Safety
    ///
    /// `ptr` must come from `allocate` on this allocator with `layout`.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The process-global allocator.
#[derive(Debug, Default, Copy, Clone)]
pub struct Global;

unsafe impl MsgAlloc for Global {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        // Message layouts always contain the header, so they are never zero-sized.
        let raw = unsafe { std::alloc::alloc(layout) };
        NonNull::new(raw).ok_or(AllocError {
            size: layout.size(),
        })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        std::alloc::dealloc(ptr.as_ptr(), layout)
    }
}

static GLOBAL: Global = Global;

/// The heap allocation behind a [`MsgPtr`].
///
/// Containers hand out `&Msg<T>` borrows; [`Msg::acquire`] turns such a
/// borrow into an owning handle.
#[repr(C)]
pub struct Msg<T> {
    refcount: AtomicUsize,
    alloc: &'static dyn MsgAlloc,
    value: T,
}

impl<T> Msg<T> {
    /// Take a new counted reference to this message.
    pub fn acquire(&self) -> MsgPtr<T> {
        self.inc();
        MsgPtr {
            ptr: Some(NonNull::from(self)),
            _owns: PhantomData,
        }
    }

    /// Current number of counted references, including container-held ones.
    pub fn ref_count(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    #[inline]
    fn inc(&self) {
        let old = self.refcount.fetch_add(1, Ordering::Relaxed);
        if old > MAX_REFCOUNT {
            std::process::abort();
        }
    }

    /// Raw pointer to the payload, keeping the provenance of the whole allocation.
    #[inline]
    pub(crate) fn value_ptr(msg: NonNull<Msg<T>>) -> *const T {
        unsafe { ptr::addr_of!((*msg.as_ptr()).value) }
    }

    /// Recover the allocation from a payload pointer.
    ///
    /// # Safety
    ///
    /// `value` must point at the payload of a live `Msg<T>`.
    #[inline]
    pub(crate) unsafe fn from_value_ptr(value: *const T) -> NonNull<Msg<T>> {
        let offset = core::mem::offset_of!(Msg<T>, value);
        NonNull::new_unchecked((value as *const u8).sub(offset) as *mut Msg<T>)
    }

    /// Drop the payload and return the memory to its allocator.
    ///
    /// # Safety
    ///
    /// The count must have reached zero and `msg` must not be used again.
    unsafe fn destroy(msg: NonNull<Msg<T>>) {
        let alloc = (*msg.as_ptr()).alloc;
        ptr::drop_in_place(msg.as_ptr());
        alloc.deallocate(msg.cast(), Layout::new::<Msg<T>>());
    }
}

impl<T> Deref for Msg<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Msg<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Msg")
            .field("refcount", &self.ref_count())
            .field("value", &self.value)
            .finish()
    }
}

/// Shared-ownership handle to a heap message.
///
/// Clone increments the embedded count, drop decrements it, and the last
/// release destroys the message. The default handle is null and holds no
/// reference.
pub struct MsgPtr<T> {
    ptr: Option<NonNull<Msg<T>>>,
    _owns: PhantomData<Msg<T>>,
}

unsafe impl<T: Send + Sync> Send for MsgPtr<T> {}
unsafe impl<T: Send + Sync> Sync for MsgPtr<T> {}

impl<T> MsgPtr<T> {
    /// Allocate a message with the global allocator.
    pub fn new(value: T) -> Result<Self, AllocError> {
        Self::new_in(value, &GLOBAL)
    }

    /// Allocate a message through a caller-supplied allocator hook.
    ///
    /// On failure `value` is dropped and the error is returned; no retry is
    /// attempted.
    pub fn new_in(value: T, alloc: &'static dyn MsgAlloc) -> Result<Self, AllocError> {
        let layout = Layout::new::<Msg<T>>();
        let raw = match alloc.allocate(layout) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(size = layout.size(), "message allocation failed");
                return Err(e);
            }
        };
        let ptr = raw.cast::<Msg<T>>();
        unsafe {
            ptr.as_ptr().write(Msg {
                refcount: AtomicUsize::new(1),
                alloc,
                value,
            });
        }
        Ok(Self {
            ptr: Some(ptr),
            _owns: PhantomData,
        })
    }

    pub const fn null() -> Self {
        Self {
            ptr: None,
            _owns: PhantomData,
        }
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    /// Borrow the payload, or `NullAccess` for a null handle.
    pub fn try_get(&self) -> Result<&T, NullAccess> {
        self.as_msg().map(|m| &m.value)
    }

    /// Borrow the backing allocation.
    pub fn as_msg(&self) -> Result<&Msg<T>, NullAccess> {
        match self.ptr {
            Some(p) => Ok(unsafe { p.as_ref() }),
            None => Err(NullAccess),
        }
    }

    /// Number of counted references; 0 for a null handle.
    pub fn ref_count(&self) -> usize {
        self.as_msg().map(Msg::ref_count).unwrap_or(0)
    }

    /// Exclusive access to the payload when this is the only reference.
    ///
    /// Every container membership holds a reference, so a message reached
    /// through here is linked nowhere.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        let p = self.ptr?;
        if unsafe { p.as_ref() }.refcount.load(Ordering::Acquire) != 1 {
            return None;
        }
        Some(unsafe { &mut (*p.as_ptr()).value })
    }

    /// Whether both handles point at the same message. Two null handles are equal.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        a.ptr == b.ptr
    }

    /// Move the reference out, leaving a null handle behind.
    pub fn take(&mut self) -> Self {
        core::mem::take(self)
    }

    /// Release the reference now and become null.
    pub fn reset(&mut self) {
        drop(self.take());
    }

    /// Give up the handle without releasing its count.
    pub(crate) fn into_raw(self) -> Option<NonNull<Msg<T>>> {
        let ptr = self.ptr;
        core::mem::forget(self);
        ptr
    }

    /// Re-adopt a count previously given up with `into_raw`.
    ///
    /// # Safety
    ///
    /// `ptr` must carry exactly one count that nobody else will release.
    pub(crate) unsafe fn from_raw(ptr: NonNull<Msg<T>>) -> Self {
        Self {
            ptr: Some(ptr),
            _owns: PhantomData,
        }
    }
}

impl<T> Clone for MsgPtr<T> {
    fn clone(&self) -> Self {
        match self.as_msg() {
            Ok(msg) => msg.acquire(),
            Err(NullAccess) => Self::null(),
        }
    }
}

impl<T> Drop for MsgPtr<T> {
    fn drop(&mut self) {
        let Some(ptr) = self.ptr else { return };
        if unsafe { ptr.as_ref() }.refcount.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }
        // Synchronize with every other release before tearing down.
        atomic::fence(Ordering::Acquire);
        unsafe { Msg::destroy(ptr) }
    }
}

impl<T> Default for MsgPtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> Deref for MsgPtr<T> {
    type Target = T;

    /// # Panics
    ///
    /// Panics on a null handle.
    fn deref(&self) -> &T {
        match self.try_get() {
            Ok(v) => v,
            Err(e) => panic!("{e}"),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for MsgPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_get() {
            Ok(v) => f.debug_tuple("MsgPtr").field(v).finish(),
            Err(NullAccess) => f.write_str("MsgPtr(null)"),
        }
    }
}
