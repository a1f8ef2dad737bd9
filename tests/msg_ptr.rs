// MsgPtr lifetime across threads.
//
// - k handles to one message released by k threads run the destructor
//   exactly once, after the last release.
// - A message linked into a list and a map at the same time stays alive
//   until the last handle and the last container let go.
use object_msg::{list_adapter, map_adapter, List, ListLink, Map, MapLink, MsgPtr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

struct Payload {
    drops: Arc<AtomicUsize>,
}

impl Drop for Payload {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn concurrent_release_destroys_once() {
    for _ in 0..20 {
        let drops = Arc::new(AtomicUsize::new(0));
        let msg = MsgPtr::new(Payload {
            drops: drops.clone(),
        })
        .unwrap();
        const K: usize = 8;
        let handles: Vec<_> = (0..K).map(|_| msg.clone()).collect();
        drop(msg);
        let gate = Arc::new(Barrier::new(K));
        let threads: Vec<_> = handles
            .into_iter()
            .map(|h| {
                let gate = gate.clone();
                thread::spawn(move || {
                    gate.wait();
                    drop(h);
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}

struct Session {
    name: MapLink<String>,
    idle: ListLink,
    drops: Arc<AtomicUsize>,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

list_adapter!(IdleLink = Session { idle });
map_adapter!(ByName = Session { name: String });

#[test]
fn list_and_map_membership_keep_the_object_alive() {
    let drops = Arc::new(AtomicUsize::new(0));
    let mut idle: List<IdleLink> = List::new();
    let mut by_name: Map<ByName> = Map::new();

    let s = MsgPtr::new(Session {
        name: MapLink::new("alpha".to_string()),
        idle: ListLink::new(),
        drops: drops.clone(),
    })
    .unwrap();
    idle.push_back(s.clone()).unwrap();
    by_name.insert(s.clone()).unwrap();
    assert_eq!(s.ref_count(), 3);
    drop(s);
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    // Look up through the map, unlink from the list through the same object.
    let found = by_name.get("alpha").unwrap();
    let from_list = idle.erase(&found).unwrap();
    assert!(MsgPtr::ptr_eq(&found, &from_list));
    drop(from_list);
    drop(found);
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    assert!(idle.is_empty());

    drop(by_name);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}
