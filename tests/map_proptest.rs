// Map property tests.
//
// Model: a HashMap from key to the id of the object inserted under it.
//  - Objects: a fixed pool, several objects share each key so duplicate
//    inserts happen often.
//  - Operations: insert, erase by key, erase by object, lookup.
//  - Invariant after every step: len() matches, find(key) returns the very
//    object the model names, and an object's slot is linked iff the model
//    holds it.
use object_msg::{map_adapter, InsertError, LinkError, Map, MapLink, MsgPtr};
use proptest::prelude::*;
use std::collections::HashMap;

struct Record {
    id: usize,
    key: MapLink<String>,
}

map_adapter!(ByKey = Record { key: String });

proptest! {
    #[test]
    fn prop_map_matches_hashmap(keys in 1usize..=4, ops in proptest::collection::vec((0u8..=3u8, 0usize..100usize), 1..120)) {
        let pool: Vec<MsgPtr<Record>> = (0..keys * 3)
            .map(|id| MsgPtr::new(Record { id, key: MapLink::new(format!("k{}", id % keys)) }).unwrap())
            .collect();
        let mut m: Map<ByKey> = Map::new();
        let mut model: HashMap<String, usize> = HashMap::new();

        for (op, raw) in ops {
            let obj = &pool[raw % pool.len()];
            let key = obj.key.key().clone();
            match op {
                0 => match m.insert(obj.clone()) {
                    Ok(()) => {
                        prop_assert!(!model.contains_key(&key));
                        model.insert(key.clone(), obj.id);
                    }
                    // Re-inserting a linked object also hits its own key first.
                    Err(InsertError::DuplicateKey(_)) => {
                        prop_assert!(model.contains_key(&key));
                    }
                    Err(InsertError::AlreadyLinked(_)) => {
                        prop_assert!(false, "a single map reports duplicates before links");
                    }
                    Err(InsertError::Null) => prop_assert!(false, "pool handles are never null"),
                },
                1 => {
                    let got = m.erase(key.as_str()).map(|r| r.id);
                    prop_assert_eq!(got, model.remove(&key));
                }
                2 => {
                    let got = m.erase_obj(obj).map(|r| r.id);
                    if model.get(&key) == Some(&obj.id) {
                        model.remove(&key);
                        prop_assert_eq!(got, Ok(obj.id));
                    } else {
                        prop_assert_eq!(got, Err(LinkError::NotLinked));
                    }
                }
                3 => {
                    let got = m.find(key.as_str()).map(|r| r.id);
                    prop_assert_eq!(got, model.get(&key).copied());
                }
                _ => unreachable!(),
            }

            prop_assert_eq!(m.len(), model.len());
            for obj in &pool {
                let held = model.get(obj.key.key()) == Some(&obj.id);
                prop_assert_eq!(obj.key.is_linked(), held);
                prop_assert_eq!(obj.ref_count(), if held { 2 } else { 1 });
            }
        }
    }
}
