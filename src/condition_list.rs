//! ConditionList: a [`MutexedList`] with a condition variable and a
//! terminal close.
//!
//! State machine: `Open -> Closing -> Closed`. The status is only written
//! while the list lock is held, and every waiter re-checks "item available,
//! closed, deadline passed" after each wake, so spurious wakeups and wakeups
//! stolen by another waiter are harmless.

use crate::error::{ClosedError, LinkError, PushError};
use crate::link::ListAdapter;
use crate::list::List;
use crate::msg_ptr::MsgPtr;
use crate::mutexed_list::{MutexedList, PopResult};
use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};
use parking_lot::Condvar;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListStatus {
    Open,
    Closing,
    Closed,
}

impl ListStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ListStatus::Open,
            1 => ListStatus::Closing,
            _ => ListStatus::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ListStatus::Open => 0,
            ListStatus::Closing => 1,
            ListStatus::Closed => 2,
        }
    }
}

pub struct ConditionList<A: ListAdapter> {
    list: MutexedList<A>,
    status: AtomicU8,
    cond: Condvar,
}

impl<A: ListAdapter> ConditionList<A> {
    pub fn new() -> Self {
        Self {
            list: MutexedList::new(),
            status: AtomicU8::new(ListStatus::Open.as_u8()),
            cond: Condvar::new(),
        }
    }

    pub fn status(&self) -> ListStatus {
        ListStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_closed(&self) -> bool {
        self.status() == ListStatus::Closed
    }

    // Callers hold the list lock.
    fn set_status(&self, status: ListStatus) {
        self.status.store(status.as_u8(), Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn push_back(&self, msg: MsgPtr<A::Object>) -> Result<(), PushError<A::Object>> {
        self.push_with(msg, List::push_back)
    }

    pub fn push_front(&self, msg: MsgPtr<A::Object>) -> Result<(), PushError<A::Object>> {
        self.push_with(msg, List::push_front)
    }

    /// Link `msg` while open and wake one waiter.
    fn push_with(
        &self,
        msg: MsgPtr<A::Object>,
        push: impl FnOnce(&mut List<A>, MsgPtr<A::Object>) -> Result<(), PushError<A::Object>>,
    ) -> Result<(), PushError<A::Object>> {
        // Null is rejected first so `Closed` always carries a real handle.
        if msg.is_null() {
            return Err(PushError::Null);
        }
        let mut list = self.list.lock();
        if self.status() != ListStatus::Open {
            return Err(PushError::Closed(msg));
        }
        push(&mut *list, msg)?;
        self.cond.notify_one();
        Ok(())
    }

    /// Splice a local batch in and wake every waiter.
    pub fn move_from(&self, src: &mut List<A>) -> Result<usize, ClosedError> {
        let mut list = self.list.lock();
        if self.status() != ListStatus::Open {
            return Err(ClosedError);
        }
        let n = src.len();
        list.append(src);
        if n > 0 {
            self.cond.notify_all();
        }
        Ok(n)
    }

    /// Pop without waiting: `Item`, `WouldBlock`, or `Closed` once closed
    /// and drained.
    pub fn pop_front_nonblocking(&self) -> PopResult<MsgPtr<A::Object>> {
        let mut list = self.list.lock();
        match list.pop_front() {
            Some(msg) => PopResult::Item(msg),
            None if self.is_closed() => PopResult::Closed,
            None => PopResult::WouldBlock,
        }
    }

    /// Pop the front item, waiting while the list is empty and open.
    ///
    /// `None` waits without a deadline. Returns `Item`, `Closed` when the
    /// list is closed and drained, or `Timeout` when the deadline passes.
    pub fn pop_front_blocking(&self, timeout: Option<Duration>) -> PopResult<MsgPtr<A::Object>> {
        self.wait_for(timeout, |list| list.pop_front())
    }

    /// Move the whole backlog onto `dst` once at least one item is
    /// available, returning how many moved.
    pub fn move_to_blocking(&self, dst: &mut List<A>, timeout: Option<Duration>) -> PopResult<usize> {
        self.wait_for(timeout, |list| {
            let n = list.len();
            if n == 0 {
                return None;
            }
            dst.append(list);
            Some(n)
        })
    }

    fn wait_for<R>(
        &self,
        timeout: Option<Duration>,
        mut take: impl FnMut(&mut List<A>) -> Option<R>,
    ) -> PopResult<R> {
        // A deadline too far out to represent is treated as no deadline.
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut list = self.list.lock();
        let mut timed_out = false;
        loop {
            if let Some(r) = take(&mut *list) {
                return PopResult::Item(r);
            }
            if self.is_closed() {
                return PopResult::Closed;
            }
            if timed_out {
                tracing::trace!(?timeout, "condition list wait timed out");
                return PopResult::Timeout;
            }
            match deadline {
                Some(deadline) => {
                    timed_out = self.cond.wait_until(&mut list.lock, deadline).timed_out();
                }
                None => self.cond.wait(&mut list.lock),
            }
            list.rearm();
        }
    }

    /// Close the list and wake every waiter. Idempotent and terminal.
    ///
    /// Items already queued stay poppable; later pushes fail with
    /// `PushError::Closed`.
    pub fn close(&self) {
        {
            let list = self.list.lock();
            if self.status() != ListStatus::Open {
                return;
            }
            self.set_status(ListStatus::Closing);
            // Pushes serialize on this lock, so every admitted push is already linked.
            self.set_status(ListStatus::Closed);
            tracing::debug!(pending = list.len(), "condition list closed");
        }
        self.cond.notify_all();
    }

    /// Take the back item without waiting. `None` when empty, whatever the
    /// status.
    pub fn pop_back(&self) -> Option<MsgPtr<A::Object>> {
        self.list.pop_back()
    }

    pub fn erase(&self, obj: &A::Object) -> Result<MsgPtr<A::Object>, LinkError> {
        self.list.erase(obj)
    }

    pub fn contains(&self, obj: &A::Object) -> bool {
        self.list.contains(obj)
    }

    pub fn front(&self) -> Option<MsgPtr<A::Object>> {
        self.list.front()
    }

    pub fn back(&self) -> Option<MsgPtr<A::Object>> {
        self.list.back()
    }

    pub fn move_to_front(&self, obj: &A::Object) -> Result<(), LinkError> {
        self.list.move_to_front(obj)
    }

    pub fn move_to_back(&self, obj: &A::Object) -> Result<(), LinkError> {
        self.list.move_to_back(obj)
    }

    /// Run `f` with the list locked. Waiters are not woken.
    pub fn with_list<R>(&self, f: impl FnOnce(&List<A>) -> R) -> R {
        self.list.with_list(f)
    }

    /// Drop every queued item. The status is left unchanged.
    pub fn clear(&self) {
        self.list.clear()
    }
}

impl<A: ListAdapter> Default for ConditionList<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: ListAdapter> fmt::Debug for ConditionList<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionList")
            .field("status", &self.status())
            .field("list", &self.list)
            .finish()
    }
}
