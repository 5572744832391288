use bson::doc;
use docgate::sequence::{self, SEQUENCE_ENTITY};
use docgate::store::memory::MemoryStore;
use docgate::store::Store;
use std::collections::HashSet;
use std::sync::Arc;

#[test]
fn first_allocation_is_one_and_values_increase() {
    let store = MemoryStore::new();
    assert_eq!(sequence::next(&store, "notes").unwrap(), 1);
    assert_eq!(sequence::next(&store, "notes").unwrap(), 2);
    assert_eq!(sequence::next(&store, "notes").unwrap(), 3);
}

#[test]
fn entities_have_independent_counters() {
    let store = MemoryStore::new();
    assert_eq!(sequence::next(&store, "a").unwrap(), 1);
    assert_eq!(sequence::next(&store, "b").unwrap(), 1);
    assert_eq!(sequence::next(&store, "a").unwrap(), 2);
}

#[test]
fn counter_document_lives_in_the_sequence_entity() {
    let store = MemoryStore::new();
    sequence::next(&store, "notes").unwrap();
    let counter =
        store.find_one(SEQUENCE_ENTITY, &doc! { "_id": "notes" }, &[]).unwrap().unwrap();
    assert_eq!(counter.get_i64("seq").unwrap(), 1);
}

#[test]
fn concurrent_allocations_are_pairwise_distinct() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 25;

    let store = Arc::new(MemoryStore::new());
    let mut handles = Vec::new();
    for _ in 0..THREADS {
        let store = store.clone();
        handles.push(std::thread::spawn(move || {
            let mut got = Vec::with_capacity(PER_THREAD);
            for _ in 0..PER_THREAD {
                got.push(sequence::next(store.as_ref(), "shared").unwrap());
            }
            got
        }));
    }

    let mut seen = HashSet::new();
    for h in handles {
        for v in h.join().unwrap() {
            assert!(seen.insert(v), "duplicate sequence value {v}");
        }
    }
    assert_eq!(seen.len(), THREADS * PER_THREAD);
    assert_eq!(seen.iter().max(), Some(&((THREADS * PER_THREAD) as i64)));
}
