//! Embedded list linkage.
//!
//! A payload type embeds one [`ListLink`] per list it may join and names
//! each with a [`ListAdapter`], usually generated by [`list_adapter!`].
//!
//! All three pointers are atomics. Lists read and write `prev`/`next` with
//! `Relaxed` ordering under their own exclusion (`&mut List` or the list
//! mutex); `owner` is claimed with a compare-exchange so two containers
//! racing to link the same field cannot both succeed.

use core::fmt;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

/// Intrusive prev/next pair plus the identity of the list it is linked into.
pub struct ListLink {
    prev: AtomicPtr<ListLink>,
    next: AtomicPtr<ListLink>,
    // Sentinel of the owning list; null while unlinked.
    owner: AtomicPtr<ListLink>,
}

impl ListLink {
    pub const fn new() -> Self {
        Self {
            prev: AtomicPtr::new(ptr::null_mut()),
            next: AtomicPtr::new(ptr::null_mut()),
            owner: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Whether this field is currently linked into some list.
    pub fn is_linked(&self) -> bool {
        !self.owner.load(Ordering::Acquire).is_null()
    }

    #[inline]
    pub(crate) fn prev(&self) -> *mut ListLink {
        self.prev.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn next(&self) -> *mut ListLink {
        self.next.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_prev(&self, p: *mut ListLink) {
        self.prev.store(p, Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_next(&self, p: *mut ListLink) {
        self.next.store(p, Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn owner(&self) -> *mut ListLink {
        self.owner.load(Ordering::Acquire)
    }

    /// Move an already linked field to another owner (splicing).
    #[inline]
    pub(crate) fn set_owner(&self, owner: *mut ListLink) {
        self.owner.store(owner, Ordering::Release)
    }

    /// Mark the field as owned by `owner` if it is currently unlinked.
    #[inline]
    pub(crate) fn try_claim(&self, owner: *mut ListLink) -> bool {
        self.owner
            .compare_exchange(ptr::null_mut(), owner, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Clear both pointers, then release ownership.
    #[inline]
    pub(crate) fn reset(&self) {
        self.prev.store(ptr::null_mut(), Ordering::Relaxed);
        self.next.store(ptr::null_mut(), Ordering::Relaxed);
        self.owner.store(ptr::null_mut(), Ordering::Release);
    }
}

impl Default for ListLink {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ListLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListLink")
            .field("linked", &self.is_linked())
            .finish()
    }
}

/// Selects which embedded [`ListLink`] of `Object` a list uses.
///
/// # Safety
///
/// `LINK_OFFSET` must be the byte offset of a `ListLink` field inside
/// `Object`. Use [`list_adapter!`] to derive it.
pub unsafe trait ListAdapter {
    type Object;

    const LINK_OFFSET: usize;

    #[inline]
    fn link(obj: &Self::Object) -> &ListLink {
        unsafe { &*Self::link_ptr(obj) }
    }

    /// # Safety
    ///
    /// `obj` must point at a live `Object`.
    #[inline]
    unsafe fn link_ptr(obj: *const Self::Object) -> *const ListLink {
        (obj as *const u8).add(Self::LINK_OFFSET) as *const ListLink
    }

    /// # Safety
    ///
    /// `link` must be the adapter's field inside a live `Object`.
    #[inline]
    unsafe fn object_ptr(link: *const ListLink) -> *const Self::Object {
        (link as *const u8).sub(Self::LINK_OFFSET) as *const Self::Object
    }
}

/// Declare a [`ListAdapter`] for one `ListLink` field of a struct.
///
/// ```
/// use object_msg::{list_adapter, ListLink};
///
/// struct Job {
///     id: u64,
///     run_queue: ListLink,
/// }
///
/// list_adapter!(RunQueue = Job { run_queue });
/// ```
///
/// The field must hold the `ListLink` inline. A link behind a pointer is
/// rejected at compile time:
///
/// ```compile_fail
/// use object_msg::{list_adapter, ListLink};
///
/// struct Boxed {
///     link: Box<ListLink>,
///     a: u64,
/// }
///
/// list_adapter!(BoxedLink = Boxed { link });
/// ```
///
/// ```compile_fail
/// use object_msg::{list_adapter, ListLink};
///
/// struct Borrowed {
///     link: &'static ListLink,
/// }
///
/// list_adapter!(BorrowedLink = Borrowed { link });
/// ```
#[macro_export]
macro_rules! list_adapter {
    ($(#[$attr:meta])* $vis:vis $name:ident = $obj:ty { $field:ident }) => {
        $(#[$attr])*
        $vis struct $name;

        // Raw pointers do not deref-coerce, so only a `ListLink` stored
        // inline passes.
        const _: () = {
            #[allow(dead_code)]
            fn field_is_a_list_link(obj: *const $obj) -> *const $crate::ListLink {
                unsafe { ::core::ptr::addr_of!((*obj).$field) }
            }
        };

        unsafe impl $crate::ListAdapter for $name {
            type Object = $obj;
            const LINK_OFFSET: usize = ::core::mem::offset_of!($obj, $field);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Node {
        _tag: u32,
        a: ListLink,
        b: ListLink,
    }

    list_adapter!(ByA = Node { a });
    list_adapter!(ByB = Node { b });

    #[test]
    fn adapters_address_distinct_fields() {
        let n = Node {
            _tag: 1,
            a: ListLink::new(),
            b: ListLink::new(),
        };
        assert!(ptr::eq(ByA::link(&n), &n.a));
        assert!(ptr::eq(ByB::link(&n), &n.b));
        let back = unsafe { ByB::object_ptr(&n.b) };
        assert!(ptr::eq(back, &n));
    }

    #[test]
    fn claim_is_exclusive_until_reset() {
        let l = ListLink::new();
        let mut owner_a = ListLink::new();
        let mut owner_b = ListLink::new();
        let (a, b) = (&mut owner_a as *mut ListLink, &mut owner_b as *mut ListLink);
        assert!(!l.is_linked());
        assert!(l.try_claim(a));
        assert!(!l.try_claim(b));
        assert_eq!(l.owner(), a);
        l.reset();
        assert!(!l.is_linked());
        assert!(l.prev().is_null() && l.next().is_null());
        assert!(l.try_claim(b));
    }
}
