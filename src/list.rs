//! List: unguarded intrusive doubly linked ring.
//!
//! The ring is closed by a heap sentinel whose address never changes, so a
//! list can be moved freely and the sentinel address doubles as the list's
//! identity in each member's `owner` pointer. Every member holds one count
//! of its message; the count is handed back on pop/erase and released when
//! the list is cleared or dropped.

use crate::error::{LinkError, PushError};
use crate::link::{ListAdapter, ListLink};
use crate::msg_ptr::{Msg, MsgPtr};
use core::fmt;
use core::iter::FusedIterator;
use core::marker::PhantomData;
use core::ptr::NonNull;

pub struct List<A: ListAdapter> {
    sentinel: NonNull<ListLink>,
    len: usize,
    _adapter: PhantomData<fn() -> A>,
    _owns: PhantomData<MsgPtr<A::Object>>,
}

// The sentinel is owned by the list; members are shared exactly like `MsgPtr`s.
unsafe impl<A: ListAdapter> Send for List<A> where MsgPtr<A::Object>: Send {}
unsafe impl<A: ListAdapter> Sync for List<A> where MsgPtr<A::Object>: Sync {}

impl<A: ListAdapter> List<A> {
    pub fn new() -> Self {
        let sentinel = NonNull::from(Box::leak(Box::new(ListLink::new())));
        let s = unsafe { sentinel.as_ref() };
        s.set_next(sentinel.as_ptr());
        s.set_prev(sentinel.as_ptr());
        Self {
            sentinel,
            len: 0,
            _adapter: PhantomData,
            _owns: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn sentinel(&self) -> &ListLink {
        unsafe { self.sentinel.as_ref() }
    }

    #[inline]
    fn sentinel_ptr(&self) -> *mut ListLink {
        self.sentinel.as_ptr()
    }

    /// Whether `obj` is linked into this list through the adapter's field.
    pub fn contains(&self, obj: &A::Object) -> bool {
        A::link(obj).owner() == self.sentinel_ptr()
    }

    // ========================================================================
    // Push / pop
    // ========================================================================

    pub fn push_back(&mut self, msg: MsgPtr<A::Object>) -> Result<(), PushError<A::Object>> {
        let link = self.claim(msg)?;
        let tail = self.sentinel().prev();
        unsafe { self.link_between(link, tail, self.sentinel_ptr()) };
        self.len += 1;
        Ok(())
    }

    pub fn push_front(&mut self, msg: MsgPtr<A::Object>) -> Result<(), PushError<A::Object>> {
        let link = self.claim(msg)?;
        let head = self.sentinel().next();
        unsafe { self.link_between(link, self.sentinel_ptr(), head) };
        self.len += 1;
        Ok(())
    }

    pub fn pop_front(&mut self) -> Option<MsgPtr<A::Object>> {
        if self.is_empty() {
            return None;
        }
        let head = self.sentinel().next();
        Some(unsafe { self.unlink(head) })
    }

    pub fn pop_back(&mut self) -> Option<MsgPtr<A::Object>> {
        if self.is_empty() {
            return None;
        }
        let tail = self.sentinel().prev();
        Some(unsafe { self.unlink(tail) })
    }

    /// Unlink `obj` and hand back the list's reference to it.
    ///
    /// Fails with `NotLinked` if the field is unlinked and with
    /// `ForeignContainer` if it belongs to another list.
    pub fn erase(&mut self, obj: &A::Object) -> Result<MsgPtr<A::Object>, LinkError> {
        let link = self.member_link(obj)?;
        Ok(unsafe { self.unlink(link) })
    }

    // ========================================================================
    // Peek / reorder
    // ========================================================================

    pub fn front(&self) -> Option<&Msg<A::Object>> {
        if self.is_empty() {
            return None;
        }
        Some(unsafe { Self::msg_ref(self.sentinel().next()) })
    }

    pub fn back(&self) -> Option<&Msg<A::Object>> {
        if self.is_empty() {
            return None;
        }
        Some(unsafe { Self::msg_ref(self.sentinel().prev()) })
    }

    /// Move a member to the front of this list. O(1).
    pub fn move_to_front(&mut self, obj: &A::Object) -> Result<(), LinkError> {
        let link = self.member_link(obj)?;
        unsafe {
            Self::detach(link);
            let head = self.sentinel().next();
            self.link_between(link, self.sentinel_ptr(), head);
        }
        Ok(())
    }

    /// Move a member to the back of this list. O(1).
    pub fn move_to_back(&mut self, obj: &A::Object) -> Result<(), LinkError> {
        let link = self.member_link(obj)?;
        unsafe {
            Self::detach(link);
            let tail = self.sentinel().prev();
            self.link_between(link, tail, self.sentinel_ptr());
        }
        Ok(())
    }

    // ========================================================================
    // Bulk
    // ========================================================================

    /// Splice every member of `other` onto the back of this list, leaving
    /// `other` empty. Each moved field is relabelled to this list, so the
    /// cost is linear in `other.len()`.
    pub fn append(&mut self, other: &mut List<A>) {
        if other.is_empty() {
            return;
        }
        let me = self.sentinel_ptr();
        let mut cur = other.sentinel().next();
        while cur != other.sentinel_ptr() {
            let link = unsafe { &*cur };
            link.set_owner(me);
            cur = link.next();
        }

        let first = other.sentinel().next();
        let last = other.sentinel().prev();
        let tail = self.sentinel().prev();
        unsafe {
            (*tail).set_next(first);
            (*first).set_prev(tail);
            (*last).set_next(me);
        }
        self.sentinel().set_prev(last);

        other.sentinel().set_next(other.sentinel_ptr());
        other.sentinel().set_prev(other.sentinel_ptr());
        self.len += other.len;
        other.len = 0;
    }

    /// Unlink every member and release the list's references.
    pub fn clear(&mut self) {
        while self.pop_front().is_some() {}
    }

    pub fn iter(&self) -> Iter<'_, A> {
        Iter {
            head: self.sentinel().next(),
            tail: self.sentinel().prev(),
            remaining: self.len,
            _list: PhantomData,
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Take ownership of `msg`'s count and claim its field for this list.
    fn claim(&self, msg: MsgPtr<A::Object>) -> Result<*mut ListLink, PushError<A::Object>> {
        let Ok(m) = msg.as_msg() else {
            return Err(PushError::Null);
        };
        let raw = NonNull::from(m);
        let link = unsafe { A::link_ptr(Msg::value_ptr(raw)) } as *mut ListLink;
        if !unsafe { &*link }.try_claim(self.sentinel_ptr()) {
            return Err(PushError::AlreadyLinked(msg));
        }
        // The count now belongs to the list.
        let _ = msg.into_raw();
        Ok(link)
    }

    /// Resolve `obj`'s field if it is a member of this list.
    ///
    /// The returned pointer is re-read from the neighbour so that it carries
    /// the provenance of the whole message allocation.
    fn member_link(&self, obj: &A::Object) -> Result<*mut ListLink, LinkError> {
        let link = A::link(obj);
        let owner = link.owner();
        if owner.is_null() {
            return Err(LinkError::NotLinked);
        }
        if owner != self.sentinel_ptr() {
            return Err(LinkError::ForeignContainer);
        }
        Ok(unsafe { (*link.prev()).next() })
    }

    /// # Safety
    ///
    /// `prev` and `next` must be adjacent in this ring and `link` must be
    /// claimed by this list.
    #[inline]
    unsafe fn link_between(&self, link: *mut ListLink, prev: *mut ListLink, next: *mut ListLink) {
        (*link).set_prev(prev);
        (*link).set_next(next);
        (*prev).set_next(link);
        (*next).set_prev(link);
    }

    /// Bridge `link`'s neighbours over it without touching its ownership.
    ///
    /// # Safety
    ///
    /// `link` must be a member of this ring.
    #[inline]
    unsafe fn detach(link: *mut ListLink) {
        let prev = (*link).prev();
        let next = (*link).next();
        (*prev).set_next(next);
        (*next).set_prev(prev);
    }

    /// # Safety
    ///
    /// `link` must be a member of this list (not the sentinel).
    unsafe fn unlink(&mut self, link: *mut ListLink) -> MsgPtr<A::Object> {
        Self::detach(link);
        (*link).reset();
        self.len -= 1;
        let value = A::object_ptr(link);
        MsgPtr::from_raw(Msg::from_value_ptr(value))
    }

    /// # Safety
    ///
    /// `link` must be a member of a list that outlives `'a`.
    #[inline]
    unsafe fn msg_ref<'a>(link: *mut ListLink) -> &'a Msg<A::Object> {
        Msg::from_value_ptr(A::object_ptr(link)).as_ref()
    }
}

impl<A: ListAdapter> Default for List<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: ListAdapter> Drop for List<A> {
    fn drop(&mut self) {
        self.clear();
        drop(unsafe { Box::from_raw(self.sentinel.as_ptr()) });
    }
}

impl<A: ListAdapter> fmt::Debug for List<A>
where
    A::Object: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter().map(Msg::get)).finish()
    }
}

/// Borrowing iterator over list members, front to back.
///
/// Cloning yields an independent cursor from the same position; calling
/// [`List::iter`] again restarts from the front.
pub struct Iter<'a, A: ListAdapter> {
    head: *mut ListLink,
    tail: *mut ListLink,
    remaining: usize,
    _list: PhantomData<&'a List<A>>,
}

// The cursors only yield `&Msg`, so thread-safety follows the items.
unsafe impl<A: ListAdapter> Send for Iter<'_, A> where A::Object: Sync {}
unsafe impl<A: ListAdapter> Sync for Iter<'_, A> where A::Object: Sync {}

impl<'a, A: ListAdapter> Iterator for Iter<'a, A> {
    type Item = &'a Msg<A::Object>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let link = self.head;
        self.remaining -= 1;
        unsafe {
            self.head = (*link).next();
            Some(List::<A>::msg_ref(link))
        }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, A: ListAdapter> DoubleEndedIterator for Iter<'a, A> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let link = self.tail;
        self.remaining -= 1;
        unsafe {
            self.tail = (*link).prev();
            Some(List::<A>::msg_ref(link))
        }
    }
}

impl<'a, A: ListAdapter> ExactSizeIterator for Iter<'a, A> {}
impl<'a, A: ListAdapter> FusedIterator for Iter<'a, A> {}

impl<'a, A: ListAdapter> Clone for Iter<'a, A> {
    fn clone(&self) -> Self {
        Self {
            head: self.head,
            tail: self.tail,
            remaining: self.remaining,
            _list: PhantomData,
        }
    }
}

impl<'a, A: ListAdapter> IntoIterator for &'a List<A> {
    type Item = &'a Msg<A::Object>;
    type IntoIter = Iter<'a, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Owning iterator that pops members from the front.
pub struct IntoIter<A: ListAdapter> {
    list: List<A>,
}

impl<A: ListAdapter> Iterator for IntoIter<A> {
    type Item = MsgPtr<A::Object>;

    fn next(&mut self) -> Option<Self::Item> {
        self.list.pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.list.len(), Some(self.list.len()))
    }
}

impl<A: ListAdapter> DoubleEndedIterator for IntoIter<A> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.list.pop_back()
    }
}

impl<A: ListAdapter> ExactSizeIterator for IntoIter<A> {}

impl<A: ListAdapter> IntoIterator for List<A> {
    type Item = MsgPtr<A::Object>;
    type IntoIter = IntoIter<A>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter { list: self }
    }
}
