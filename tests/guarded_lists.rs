// Guarded list tests across threads.
//
// - MutexedList: N producers push unique tokens while consumers pop;
//   every token is observed exactly once and the list ends empty.
// - ConditionList: a blocked pop receives an item pushed later by another
//   thread; close() wakes every blocked waiter with Closed; producers and
//   consumers shut down cleanly through close().
use object_msg::{list_adapter, ConditionList, ListLink, MsgPtr, MutexedList, PopResult, PushError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

struct Token {
    value: usize,
    link: ListLink,
}

list_adapter!(TokenLink = Token { link });

fn token(value: usize) -> MsgPtr<Token> {
    MsgPtr::new(Token {
        value,
        link: ListLink::new(),
    })
    .unwrap()
}

#[test]
fn mutexed_list_every_token_seen_once() {
    const PRODUCERS: usize = 4;
    const PER: usize = 500;
    let list: Arc<MutexedList<TokenLink>> = Arc::new(MutexedList::new());
    let done = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let list = list.clone();
            let done = done.clone();
            thread::spawn(move || {
                for i in 0..PER {
                    list.push_back(token(p * PER + i)).unwrap();
                }
                done.fetch_add(1, Ordering::Release);
            })
        })
        .collect();

    let consumers: Vec<_> = (0..2)
        .map(|_| {
            let list = list.clone();
            let done = done.clone();
            thread::spawn(move || {
                let mut seen = Vec::new();
                loop {
                    match list.pop_front_nonblocking() {
                        PopResult::Item(t) => seen.push(t.value),
                        _ if done.load(Ordering::Acquire) == PRODUCERS && list.is_empty() => break,
                        _ => thread::yield_now(),
                    }
                }
                seen
            })
        })
        .collect();

    for h in producers {
        h.join().unwrap();
    }
    let mut all = HashSet::new();
    for h in consumers {
        for v in h.join().unwrap() {
            assert!(all.insert(v), "token {v} popped twice");
        }
    }
    assert_eq!(all.len(), PRODUCERS * PER);
    assert!(list.is_empty());
}

#[test]
fn blocked_pop_receives_a_later_push() {
    let q: Arc<ConditionList<TokenLink>> = Arc::new(ConditionList::new());
    let consumer = {
        let q = q.clone();
        thread::spawn(move || q.pop_front_blocking(Some(Duration::from_secs(10))))
    };
    thread::sleep(Duration::from_millis(20));
    q.push_back(token(42)).unwrap();
    match consumer.join().unwrap() {
        PopResult::Item(t) => assert_eq!(t.value, 42),
        _ => panic!("expected the pushed item"),
    }
}

#[test]
fn close_wakes_every_waiter() {
    const WAITERS: usize = 8;
    let q: Arc<ConditionList<TokenLink>> = Arc::new(ConditionList::new());
    let ready = Arc::new(Barrier::new(WAITERS + 1));
    let waiters: Vec<_> = (0..WAITERS)
        .map(|_| {
            let q = q.clone();
            let ready = ready.clone();
            thread::spawn(move || {
                ready.wait();
                matches!(q.pop_front_blocking(None), PopResult::Closed)
            })
        })
        .collect();

    ready.wait();
    thread::sleep(Duration::from_millis(20));
    let start = Instant::now();
    q.close();
    for h in waiters {
        assert!(h.join().unwrap());
    }
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(matches!(q.push_back(token(1)), Err(PushError::Closed(_))));
}

#[test]
fn producers_and_consumers_drain_before_close_is_observed() {
    const ITEMS: usize = 1000;
    let q: Arc<ConditionList<TokenLink>> = Arc::new(ConditionList::new());

    let consumers: Vec<_> = (0..3)
        .map(|_| {
            let q = q.clone();
            thread::spawn(move || {
                let mut seen = Vec::new();
                loop {
                    match q.pop_front_blocking(Some(Duration::from_secs(10))) {
                        PopResult::Item(t) => seen.push(t.value),
                        PopResult::Closed => return seen,
                        PopResult::Timeout | PopResult::WouldBlock => {
                            panic!("consumer starved")
                        }
                    }
                }
            })
        })
        .collect();

    for i in 0..ITEMS {
        q.push_back(token(i)).unwrap();
    }
    q.close();

    let mut all: Vec<usize> = consumers
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    all.sort_unstable();
    assert_eq!(all, (0..ITEMS).collect::<Vec<_>>());
}
