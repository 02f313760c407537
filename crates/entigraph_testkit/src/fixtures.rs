//! Test fixtures and store helpers.
//!
//! Provides the fixture types used across the test suites and convenience
//! functions for setting up stores.

use entigraph_core::{
    Config, Constraint, CoreResult, IdKind, Object, Slot, Store, TypeDescriptor, VersionKind,
    WorkingCopy,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Log file name used by file-backed test stores.
pub const LOG_FILE: &str = "store.log";

/// `Account`: generated long ids, long versions, immutable `opened`.
pub fn account_type() -> TypeDescriptor {
    TypeDescriptor::entity("Account")
        .id("id", IdKind::Long)
        .version("version", VersionKind::Long)
        .immutable("opened")
        .constraint("balance", Constraint::Min(0))
        .build()
        .expect("account descriptor")
}

/// `Customer`: caller-supplied `email` ids, int versions, an `Address`.
pub fn customer_type() -> TypeDescriptor {
    TypeDescriptor::entity("Customer")
        .id("email", IdKind::Supplied)
        .version("version", VersionKind::Int)
        .constraint("name", Constraint::NotBlank)
        .build()
        .expect("customer descriptor")
}

/// `Address`: embedded in customers.
pub fn address_type() -> TypeDescriptor {
    TypeDescriptor::embedded("Address")
        .build()
        .expect("address descriptor")
}

/// `Order`: uuid ids, long versions, a `customer` reference and `lines`.
pub fn order_type() -> TypeDescriptor {
    TypeDescriptor::entity("Order")
        .id("id", IdKind::Uuid)
        .version("version", VersionKind::Long)
        .transient("draft_note")
        .build()
        .expect("order descriptor")
}

/// `OrderLine`: embedded in orders.
pub fn order_line_type() -> TypeDescriptor {
    TypeDescriptor::embedded("OrderLine")
        .constraint("quantity", Constraint::Min(1))
        .build()
        .expect("order line descriptor")
}

/// Registers every fixture type.
///
/// # Errors
///
/// Registration errors, e.g. when a type is already registered.
pub fn register_fixture_types(store: &Store) -> CoreResult<()> {
    for descriptor in [
        account_type(),
        customer_type(),
        address_type(),
        order_type(),
        order_line_type(),
    ] {
        store.register(descriptor)?;
    }
    Ok(())
}

/// A new, unsaved account.
pub fn account(balance: i64) -> WorkingCopy {
    WorkingCopy::new(
        Object::new("Account")
            .with("balance", balance)
            .with("opened", "2024-01-01"),
    )
}

/// A new, unsaved customer with an embedded address.
pub fn customer(email: &str, name: &str, city: &str) -> WorkingCopy {
    let mut copy = WorkingCopy::new(
        Object::new("Customer")
            .with("email", email)
            .with("name", name),
    );
    let address = copy.add(Object::new("Address").with("city", city));
    copy.set("address", address);
    copy
}

/// A new, unsaved order referencing a new customer, with one line per
/// quantity.
pub fn order(email: &str, quantities: &[i64]) -> WorkingCopy {
    let mut copy = WorkingCopy::new(Object::new("Order").with("status", "open"));
    let owner = copy.add(
        Object::new("Customer")
            .with("email", email)
            .with("name", "Buyer"),
    );
    let lines: Vec<Slot> = quantities
        .iter()
        .map(|q| Slot::from(copy.add(Object::new("OrderLine").with("quantity", *q))))
        .collect();
    copy.set("customer", owner);
    copy.set("lines", lines);
    copy
}

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store.
    pub store: Store,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates an in-memory store with the fixture types registered.
    pub fn memory() -> Self {
        let store = Store::in_memory();
        register_fixture_types(&store).expect("register fixture types");
        Self {
            store,
            temp_dir: None,
        }
    }

    /// Creates a file-backed store in a temporary directory with the
    /// fixture types registered.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("create temp directory");
        let store = open_registered(&temp_dir.path().join(LOG_FILE));
        Self {
            store,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the log path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join(LOG_FILE))
    }

    /// Closes and reopens a file-backed store, registering the fixture
    /// types again.
    ///
    /// # Panics
    ///
    /// Panics for in-memory stores.
    pub fn reopen(self) -> Self {
        let Self { store, temp_dir } = self;
        let temp_dir = temp_dir.expect("only file stores can be reopened");
        drop(store);
        let store = open_registered(&temp_dir.path().join(LOG_FILE));
        Self {
            store,
            temp_dir: Some(temp_dir),
        }
    }
}

fn open_registered(path: &Path) -> Store {
    let store = Store::open_file(path, Config::default().sync_on_persist(false))
        .expect("open file store");
    register_fixture_types(&store).expect("register fixture types");
    store
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a temporary in-memory store.
///
/// # Example
///
/// ```rust
/// use entigraph_testkit::{account, with_temp_store};
///
/// with_temp_store(|store| {
///     store.save(&account(5)).unwrap();
///     assert_eq!(store.count("Account").unwrap(), 1);
/// });
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store.store)
}

/// Runs a test with a temporary file-backed store.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store, &Path) -> R,
{
    let test_store = TestStore::file();
    let path = test_store.path().expect("file store should have a path");
    f(&test_store.store, &path)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a store holding `count` accounts with balances `0..count`.
    pub fn populated_store(count: usize) -> TestStore {
        let test_store = TestStore::memory();
        let accounts: Vec<WorkingCopy> = (0..count as i64).map(account).collect();
        test_store
            .save_all(&accounts)
            .expect("save populated accounts");
        test_store
    }
}
