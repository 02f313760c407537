//! Benchmark utilities.

use entigraph_core::{Object, Slot, Store, WorkingCopy};
use entigraph_testkit::{account, register_fixture_types, GRAPH_TYPE, NODE_TYPE};
use rand::Rng;

/// Opens an in-memory store with the fixture types registered.
pub fn fixture_store() -> Store {
    let store = Store::in_memory();
    register_fixture_types(&store).expect("register fixture types");
    store
}

/// Generates `count` new accounts with random balances.
pub fn random_accounts(count: usize) -> Vec<WorkingCopy> {
    let mut rng = rand::thread_rng();
    (0..count).map(|_| account(rng.gen_range(0..10_000))).collect()
}

/// Fills a store with `count` accounts and returns their ids.
pub fn populated(count: usize) -> (Store, Vec<Slot>) {
    let store = fixture_store();
    let ids = store
        .save_all(&random_accounts(count))
        .expect("seed accounts")
        .iter()
        .map(|copy| copy.get("id").clone())
        .collect();
    (store, ids)
}

/// Builds a graph root with `width` embedded nodes, each pointing at the
/// next and carrying a payload of `payload` bytes.
pub fn chain_graph(width: usize, payload: usize) -> WorkingCopy {
    let mut rng = rand::thread_rng();
    let mut copy = WorkingCopy::new(Object::new(GRAPH_TYPE).with("label", "chain"));
    let mut previous = copy.root();
    for i in 0..width {
        let bytes: Vec<u8> = (0..payload).map(|_| rng.gen()).collect();
        let node = copy.add(
            Object::new(NODE_TYPE)
                .with("position", i as i64)
                .with("payload", Slot::Bytes(bytes)),
        );
        if let Some(object) = copy.object_mut(previous) {
            object.set("next", node);
        }
        previous = node;
    }
    copy
}
