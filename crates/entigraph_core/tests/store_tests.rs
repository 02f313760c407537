//! Behaviour of the store through its public operations.

use entigraph_core::{
    graphs_equal, CoreError, EntityData, IdFinder, IdKind, IdManager, Object, Slot, Store,
    TypeDescriptor, TypeName, VersionKind, WorkingCopy,
};
use entigraph_testkit::{account, customer, order, TestStore};
use std::sync::Arc;
use std::thread;

fn account_store() -> Store {
    let store = Store::in_memory();
    store
        .register(
            TypeDescriptor::entity("Account")
                .id("id", IdKind::Int)
                .version("version", VersionKind::Long)
                .build()
                .unwrap(),
        )
        .unwrap();
    store
}

fn balance(copy: &WorkingCopy) -> Option<i64> {
    copy.get("balance").as_int()
}

#[test]
fn account_scenario() {
    let store = account_store();

    let saved = store
        .save(&WorkingCopy::new(Object::new("Account").with("balance", 10)))
        .unwrap();
    assert_eq!(saved.get("id"), &Slot::Int(0));
    assert_eq!(saved.get("version"), &Slot::Int(1));

    let mut loaded = store.find_by_id("Account", 0).unwrap().unwrap();
    loaded.set("balance", 9);
    let saved = store.save(&loaded).unwrap();
    assert_eq!(saved.get("version"), &Slot::Int(2));

    let first = store.find_by_id("Account", 0).unwrap().unwrap();
    let mut second = store.find_by_id("Account", 0).unwrap().unwrap();
    let saved = store.save(&first).unwrap();
    assert_eq!(saved.get("version"), &Slot::Int(3));

    second.set("balance", 100);
    let err = store.save(&second).unwrap_err();
    assert!(matches!(err, CoreError::VersionConflict { .. }));
    assert!(err.is_conflict());

    let stored = store.find_by_id("Account", 0).unwrap().unwrap();
    assert_eq!(balance(&stored), Some(9));
    assert_eq!(stored.get("version"), &Slot::Int(3));
}

#[test]
fn equal_values_are_distinct_members() {
    let store = account_store();
    store
        .save_all(&[
            WorkingCopy::new(Object::new("Account").with("balance", 5)),
            WorkingCopy::new(Object::new("Account").with("balance", 5)),
        ])
        .unwrap();
    assert_eq!(store.count("Account").unwrap(), 2);
}

#[test]
fn copies_are_isolated_from_storage() {
    let store = account_store();
    store
        .save(&WorkingCopy::new(Object::new("Account").with("balance", 10)))
        .unwrap();

    let mut copy = store.find_by_id("Account", 0).unwrap().unwrap();
    let again = store.find_by_id("Account", 0).unwrap().unwrap();
    assert!(graphs_equal(copy.heap(), copy.root(), again.heap(), again.root()));

    copy.set("balance", 999);
    let root = copy.root();
    copy.object_mut(root).unwrap().set("extra", "field");

    let fresh = store.find_by_id("Account", 0).unwrap().unwrap();
    assert_eq!(balance(&fresh), Some(10));
    assert!(fresh.get("extra").is_null());
}

#[test]
fn ensure_id_is_idempotent() {
    let ids = IdManager::new(TypeName::new("Account"), "id", IdKind::Long.setter());
    let mut data = EntityData::new(TypeName::new("Account"));
    let mut object = Object::new("Account");

    let first = ids.ensure_id(&mut object, &mut data).unwrap();
    let cursor = data.last_id().cloned();
    let second = ids.ensure_id(&mut object, &mut data).unwrap();

    assert_eq!(first, second);
    assert_eq!(data.last_id().cloned(), cursor);
}

#[test]
fn reachable_entities_are_admitted() {
    let test_store = TestStore::memory();
    let saved = test_store.save(&order("carol@example.com", &[2, 3])).unwrap();

    assert!(!saved.get("id").is_null());
    let owner = test_store
        .find_by_id("Customer", "carol@example.com")
        .unwrap()
        .unwrap();
    assert_eq!(owner.get("version"), &Slot::Int(1));
    assert_eq!(test_store.count("Customer").unwrap(), 1);
    // embedded lines are not entities
    assert!(matches!(
        test_store.count("OrderLine"),
        Err(CoreError::TypeNotRegistered { .. })
    ));
}

#[test]
fn shared_entities_keep_one_identity() {
    let test_store = TestStore::memory();
    test_store
        .save(&customer("dana@example.com", "Dana", "Oslo"))
        .unwrap();

    let mut first = WorkingCopy::new(Object::new("Order").with("status", "open"));
    let owner = first.add(
        Object::new("Customer")
            .with("email", "dana@example.com")
            .with("name", "Dana")
            .with("version", 1),
    );
    first.set("customer", owner);
    test_store.save(&first).unwrap();

    assert_eq!(test_store.count("Customer").unwrap(), 1);
    assert_eq!(test_store.count("Order").unwrap(), 1);
}

#[test]
fn concurrent_saves_lose_no_update() {
    let store = Arc::new(account_store());
    let seeded: Vec<WorkingCopy> = (0..100)
        .map(|_| WorkingCopy::new(Object::new("Account").with("balance", 0)))
        .collect();
    store.save_all(&seeded).unwrap();

    let handles: Vec<_> = (0..100)
        .map(|id| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let mut copy = store.find_by_id("Account", id).unwrap().unwrap();
                let current = copy.get("balance").as_int().unwrap();
                copy.set("balance", current + 1);
                store.save(&copy).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let total: i64 = store
        .find_all("Account")
        .unwrap()
        .iter()
        .filter_map(balance)
        .sum();
    assert_eq!(total, 100);
    for copy in store.find_all("Account").unwrap() {
        assert_eq!(copy.get("version"), &Slot::Int(2));
    }
}

#[test]
fn update_by_supplied_id_merges_into_member() {
    let test_store = TestStore::memory();
    test_store
        .save(&customer("erin@example.com", "Erin", "Rome"))
        .unwrap();

    let mut detached = customer("erin@example.com", "Erin B.", "Rome");
    detached.set("version", 1);
    let saved = test_store.save(&detached).unwrap();

    assert_eq!(saved.get("version"), &Slot::Int(2));
    assert_eq!(saved.get("name").as_text(), Some("Erin B."));
    assert_eq!(test_store.count("Customer").unwrap(), 1);

    let stale = customer("erin@example.com", "Stale", "Rome");
    assert!(matches!(
        test_store.save(&stale),
        Err(CoreError::InvalidVersionState { .. })
    ));
}

#[test]
fn supplied_ids_are_required() {
    let test_store = TestStore::memory();
    let nameless = WorkingCopy::new(Object::new("Customer").with("name", "Nobody"));
    assert!(matches!(
        test_store.save(&nameless),
        Err(CoreError::MissingId { .. })
    ));
    assert_eq!(test_store.count("Customer").unwrap(), 0);
}

#[test]
fn batch_with_one_bad_copy_writes_nothing() {
    let test_store = TestStore::memory();
    let good = account(5);
    let bad = account(-1);
    let err = test_store.save_all(&[good, bad]).unwrap_err();

    assert!(matches!(err, CoreError::Validation { .. }));
    assert_eq!(test_store.count("Account").unwrap(), 0);
    assert_eq!(test_store.stats().unwrap().objects, 0);

    let saved = test_store.save(&account(5)).unwrap();
    assert_eq!(saved.get("id"), &Slot::Int(0));
}

#[test]
fn same_copy_twice_in_a_batch_is_rejected() {
    let test_store = TestStore::memory();
    let saved = test_store.save(&account(1)).unwrap();
    let mut a = saved.clone();
    let mut b = saved;
    a.set("balance", 2);
    b.set("balance", 3);

    assert!(matches!(
        test_store.save_all(&[a, b]),
        Err(CoreError::InvalidBatch { .. })
    ));
    let stored = test_store.find_by_id("Account", 0).unwrap().unwrap();
    assert_eq!(balance(&stored), Some(1));
}

#[test]
fn immutable_fields_keep_their_stored_value() {
    let test_store = TestStore::memory();
    test_store.save(&account(1)).unwrap();

    let mut copy = test_store.find_by_id("Account", 0).unwrap().unwrap();
    copy.set("opened", "1999-12-31");
    copy.set("balance", 2);
    let saved = test_store.save(&copy).unwrap();

    assert_eq!(saved.get("opened").as_text(), Some("2024-01-01"));
    assert_eq!(balance(&saved), Some(2));
}

#[test]
fn transient_fields_are_not_stored() {
    let test_store = TestStore::memory();
    let mut draft = order("fay@example.com", &[1]);
    draft.set("draft_note", "call back");
    let saved = test_store.save(&draft).unwrap();
    assert!(saved.get("draft_note").is_null());
}

#[test]
fn deleted_entities_disappear_from_reads() {
    let test_store = TestStore::memory();
    let saved = test_store.save(&account(1)).unwrap();
    test_store.save(&account(2)).unwrap();

    assert!(test_store.delete(&saved).unwrap());
    assert!(!test_store.delete(&saved).unwrap());
    assert!(!test_store.exists_by_id("Account", 0).unwrap());
    assert_eq!(test_store.count("Account").unwrap(), 1);

    let freed = test_store.collect_garbage().unwrap();
    assert_eq!(freed, 1);
}

#[test]
fn find_variants() {
    let test_store = TestStore::memory();
    test_store
        .save_all(&[account(1), account(20), account(300)])
        .unwrap();

    let rich = test_store
        .find_by("Account", |a| a.get("balance").as_int() > Some(10))
        .unwrap();
    assert_eq!(rich.len(), 2);

    let some = test_store.find_all_by_id("Account", [0, 2, 7]).unwrap();
    let balances: Vec<_> = some.iter().filter_map(balance).collect();
    assert_eq!(balances, vec![1, 300]);

    assert_eq!(test_store.find_all("Account").unwrap().len(), 3);
    assert!(test_store.find_by_id("Account", 9).unwrap().is_none());
}

#[test]
fn custom_id_getter_is_used_for_lookups() {
    let test_store = TestStore::memory();
    test_store
        .save(&customer("gus@example.com", "Gus", "Lima"))
        .unwrap();

    let by_name = IdFinder::new("name", |o| Some(o.get("name").clone()));
    test_store.set_id_getter("Customer", Some(by_name)).unwrap();
    assert!(test_store.exists_by_id("Customer", "Gus").unwrap());
    assert!(!test_store.exists_by_id("Customer", "gus@example.com").unwrap());
}

#[test]
fn colliding_id_getter_is_rejected() {
    let test_store = TestStore::memory();
    test_store
        .save_all(&[
            customer("h1@example.com", "Hal", "Kyiv"),
            customer("h2@example.com", "Hal", "Kyiv"),
        ])
        .unwrap();

    let by_name = IdFinder::new("name", |o| Some(o.get("name").clone()));
    assert!(matches!(
        test_store.set_id_getter("Customer", Some(by_name)),
        Err(CoreError::DuplicateId { .. })
    ));
    assert!(test_store
        .exists_by_id("Customer", "h2@example.com")
        .unwrap());
}

#[test]
fn saving_an_unregistered_type_fails() {
    let store = account_store();
    let ghost = WorkingCopy::new(Object::new("Ghost"));
    assert!(matches!(
        store.save(&ghost),
        Err(CoreError::UnsupportedType { .. })
    ));
}

#[test]
fn replaced_customer_blocks_orders_still_holding_the_old_one() {
    let test_store = TestStore::memory();
    let saved = test_store.save(&order("a@x", &[1])).unwrap();
    assert!(test_store.delete_by_id("Customer", "a@x").unwrap());

    // the order keeps the deleted customer alive in storage
    test_store.save(&customer("a@x", "Replacement", "Kyiv")).unwrap();

    let mut again = saved;
    again.set("status", "paid");
    assert!(matches!(
        test_store.save(&again),
        Err(CoreError::DuplicateId { .. })
    ));

    let stored = test_store.find_by_id("Order", again.get("id").clone()).unwrap().unwrap();
    assert_eq!(stored.get("status").as_text(), Some("open"));
    let current = test_store.find_by_id("Customer", "a@x").unwrap().unwrap();
    assert_eq!(current.get("name").as_text(), Some("Replacement"));
    assert_eq!(test_store.count("Customer").unwrap(), 1);
}
