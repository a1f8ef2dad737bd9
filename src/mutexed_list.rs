//! MutexedList: a [`List`] behind one `parking_lot::Mutex`.
//!
//! Every operation holds the lock for exactly its own duration through a
//! scoped guard, so the lock is released on every exit path including
//! unwinding. Messages released by an operation are dropped after the lock
//! is gone, which keeps payload destructors out of the critical section.

use crate::error::{LinkError, PushError};
use crate::link::ListAdapter;
use crate::list::List;
use crate::msg_ptr::MsgPtr;
use crate::reentrancy::{DebugReentrancy, ReentrancyGuard};
use core::fmt;
use core::ops::{Deref, DerefMut};
use parking_lot::{Mutex, MutexGuard};

/// Outcome of a pop on a guarded list. Callers are expected to match on it
/// exhaustively; none of these is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub enum PopResult<I> {
    /// An item was taken.
    Item(I),
    /// The list was empty and the call does not wait.
    WouldBlock,
    /// The list is closed and drained.
    Closed,
    /// The wait deadline passed with the list still empty.
    Timeout,
}

impl<I> PopResult<I> {
    pub fn item(self) -> Option<I> {
        match self {
            PopResult::Item(i) => Some(i),
            _ => None,
        }
    }

    pub fn is_item(&self) -> bool {
        matches!(self, PopResult::Item(_))
    }
}

pub struct MutexedList<A: ListAdapter> {
    list: Mutex<List<A>>,
    reentrancy: DebugReentrancy,
}

/// Locked view of the inner list. The reentrancy mark is cleared before the
/// mutex is released (fields drop in declaration order).
pub(crate) struct ListGuard<'a, A: ListAdapter> {
    mark: ReentrancyGuard<'a>,
    pub(crate) lock: MutexGuard<'a, List<A>>,
}

impl<A: ListAdapter> ListGuard<'_, A> {
    /// Call after any wait that released the lock.
    pub(crate) fn rearm(&self) {
        self.mark.rearm();
    }
}

impl<A: ListAdapter> Deref for ListGuard<'_, A> {
    type Target = List<A>;

    fn deref(&self) -> &List<A> {
        &self.lock
    }
}

impl<A: ListAdapter> DerefMut for ListGuard<'_, A> {
    fn deref_mut(&mut self) -> &mut List<A> {
        &mut self.lock
    }
}

impl<A: ListAdapter> MutexedList<A> {
    pub fn new() -> Self {
        Self::from_list(List::new())
    }

    /// Wrap an existing list.
    pub fn from_list(list: List<A>) -> Self {
        Self {
            list: Mutex::new(list),
            reentrancy: DebugReentrancy::new(),
        }
    }

    pub(crate) fn lock(&self) -> ListGuard<'_, A> {
        self.reentrancy.check();
        let lock = self.list.lock();
        ListGuard {
            mark: self.reentrancy.enter(),
            lock,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, obj: &A::Object) -> bool {
        self.lock().contains(obj)
    }

    pub fn push_back(&self, msg: MsgPtr<A::Object>) -> Result<(), PushError<A::Object>> {
        self.lock().push_back(msg)
    }

    pub fn push_front(&self, msg: MsgPtr<A::Object>) -> Result<(), PushError<A::Object>> {
        self.lock().push_front(msg)
    }

    pub fn pop_front(&self) -> Option<MsgPtr<A::Object>> {
        self.lock().pop_front()
    }

    pub fn pop_back(&self) -> Option<MsgPtr<A::Object>> {
        self.lock().pop_back()
    }

    /// Pop without waiting: `Item` or `WouldBlock`.
    pub fn pop_front_nonblocking(&self) -> PopResult<MsgPtr<A::Object>> {
        match self.lock().pop_front() {
            Some(msg) => PopResult::Item(msg),
            None => PopResult::WouldBlock,
        }
    }

    pub fn erase(&self, obj: &A::Object) -> Result<MsgPtr<A::Object>, LinkError> {
        self.lock().erase(obj)
    }

    /// A new handle to the front member.
    pub fn front(&self) -> Option<MsgPtr<A::Object>> {
        self.lock().front().map(|m| m.acquire())
    }

    /// A new handle to the back member.
    pub fn back(&self) -> Option<MsgPtr<A::Object>> {
        self.lock().back().map(|m| m.acquire())
    }

    pub fn move_to_front(&self, obj: &A::Object) -> Result<(), LinkError> {
        self.lock().move_to_front(obj)
    }

    pub fn move_to_back(&self, obj: &A::Object) -> Result<(), LinkError> {
        self.lock().move_to_back(obj)
    }

    /// Splice all of `src` onto the back under a single lock acquisition.
    pub fn move_from(&self, src: &mut List<A>) {
        self.lock().append(src);
    }

    /// Splice everything onto the back of `dst`, returning how many moved.
    pub fn move_to(&self, dst: &mut List<A>) -> usize {
        let mut list = self.lock();
        let n = list.len();
        dst.append(&mut list);
        n
    }

    /// Run `f` with the list locked, e.g. to iterate it.
    ///
    /// In debug builds, calling back into this list from `f` panics.
    pub fn with_list<R>(&self, f: impl FnOnce(&List<A>) -> R) -> R {
        f(&self.lock())
    }

    /// Unlink every member; the references are released after unlocking.
    pub fn clear(&self) {
        let mut drained = List::new();
        self.move_to(&mut drained);
        drop(drained);
    }

    pub fn into_inner(self) -> List<A> {
        self.list.into_inner()
    }
}

impl<A: ListAdapter> Default for MutexedList<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: ListAdapter> fmt::Debug for MutexedList<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.list.try_lock() {
            Some(list) => f.debug_struct("MutexedList").field("len", &list.len()).finish(),
            None => f.debug_struct("MutexedList").field("len", &"<locked>").finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::ListLink;
    use std::sync::Arc;
    use std::thread;

    struct Task {
        id: usize,
        link: ListLink,
    }

    crate::list_adapter!(TaskLink = Task { link });

    fn task(id: usize) -> MsgPtr<Task> {
        MsgPtr::new(Task {
            id,
            link: ListLink::new(),
        })
        .unwrap()
    }

    #[test]
    fn nonblocking_pop_reports_would_block() {
        let l: MutexedList<TaskLink> = MutexedList::new();
        assert_eq!(l.pop_front_nonblocking().item().map(|t| t.id), None);
        assert!(matches!(l.pop_front_nonblocking(), PopResult::WouldBlock));
        l.push_back(task(1)).unwrap();
        match l.pop_front_nonblocking() {
            PopResult::Item(t) => assert_eq!(t.id, 1),
            other => panic!("unexpected {:?}", other.is_item()),
        }
    }

    #[test]
    fn same_operations_as_the_plain_list() {
        let l: MutexedList<TaskLink> = MutexedList::default();
        let a = task(1);
        l.push_back(a.clone()).unwrap();
        l.push_back(task(2)).unwrap();
        l.push_front(task(0)).unwrap();
        assert_eq!(l.len(), 3);
        assert!(l.contains(&a));
        assert_eq!(l.front().map(|t| t.id), Some(0));
        assert_eq!(l.back().map(|t| t.id), Some(2));
        l.move_to_front(&a).unwrap();
        assert_eq!(l.front().map(|t| t.id), Some(1));
        l.move_to_back(&a).unwrap();
        assert_eq!(l.back().map(|t| t.id), Some(1));
        assert_eq!(l.erase(&a).map(|t| t.id), Ok(1));
        assert_eq!(l.erase(&a).err(), Some(LinkError::NotLinked));
        assert_eq!(l.pop_back().map(|t| t.id), Some(2));
        assert_eq!(l.pop_front().map(|t| t.id), Some(0));
        assert!(l.is_empty());
    }

    #[test]
    fn batches_move_in_and_out() {
        let l: MutexedList<TaskLink> = MutexedList::new();
        let mut batch = List::new();
        for i in 0..4 {
            batch.push_back(task(i)).unwrap();
        }
        l.move_from(&mut batch);
        assert!(batch.is_empty());
        assert_eq!(l.len(), 4);

        let seen = l.with_list(|list| list.iter().map(|t| t.id).collect::<Vec<_>>());
        assert_eq!(seen, vec![0, 1, 2, 3]);

        let mut out = List::new();
        assert_eq!(l.move_to(&mut out), 4);
        assert!(l.is_empty());
        assert_eq!(out.len(), 4);

        l.move_from(&mut out);
        l.clear();
        assert!(l.is_empty());
        assert!(l.into_inner().is_empty());
    }

    #[test]
    fn concurrent_pushes_and_pops_lose_nothing() {
        let l: Arc<MutexedList<TaskLink>> = Arc::new(MutexedList::new());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let l = l.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        l.push_back(task(p * 1000 + i)).unwrap();
                    }
                })
            })
            .collect();
        for h in producers {
            h.join().unwrap();
        }
        let mut ids = Vec::new();
        while let PopResult::Item(t) = l.pop_front_nonblocking() {
            ids.push(t.id);
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 1000);
    }

    #[cfg(debug_assertions)]
    #[test]
    fn reentering_from_with_list_panics_instead_of_deadlocking() {
        let l: MutexedList<TaskLink> = MutexedList::new();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            l.with_list(|_| l.len())
        }));
        assert!(res.is_err());
        // The lock was released during unwinding.
        assert_eq!(l.len(), 0);
    }
}
