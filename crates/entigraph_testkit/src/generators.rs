//! Property-based test generators using proptest.
//!
//! Provides strategies for field values, random object graphs (shared
//! nodes, cycles, optionals, collections) and store operation sequences.

use entigraph_core::{
    CoreResult, Handle, IdKind, Object, Slot, Store, TypeDescriptor, VersionKind, WorkingCopy,
};
use proptest::prelude::*;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Entity type at the root of generated graphs.
pub const GRAPH_TYPE: &str = "Graph";

/// Embedded type of generated graph nodes.
pub const NODE_TYPE: &str = "Node";

/// Registers [`GRAPH_TYPE`] and [`NODE_TYPE`].
///
/// # Errors
///
/// Registration errors.
pub fn register_graph_types(store: &Store) -> CoreResult<()> {
    store.register(
        TypeDescriptor::entity(GRAPH_TYPE)
            .id("id", IdKind::Long)
            .version("version", VersionKind::Long)
            .build()?,
    )?;
    store.register(TypeDescriptor::embedded(NODE_TYPE).build()?)
}

/// Strategy for scalar field values.
pub fn leaf_slot_strategy() -> impl Strategy<Value = Slot> {
    prop_oneof![
        Just(Slot::Null),
        any::<bool>().prop_map(Slot::Bool),
        any::<i64>().prop_map(Slot::Int),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Slot::Text),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Slot::Bytes),
        any::<u128>().prop_map(|n| Slot::Uuid(Uuid::from_u128(n))),
    ]
}

/// Strategy for field values without references: scalars, lists, maps
/// and optionals, nested a few levels deep.
pub fn slot_strategy() -> impl Strategy<Value = Slot> {
    leaf_slot_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Slot::List),
            prop::collection::vec((leaf_slot_strategy(), inner.clone()), 0..4).prop_map(Slot::Map),
            inner.prop_map(Slot::some),
            Just(Slot::none()),
        ]
    })
}

fn fields_strategy() -> impl Strategy<Value = BTreeMap<String, Slot>> {
    prop::collection::btree_map("f_[a-z]{1,4}", slot_strategy(), 0..5)
}

/// A generated object graph: a root, embedded nodes and reference edges.
#[derive(Debug, Clone)]
pub struct GraphSpec {
    /// Plain fields of the root.
    pub root: BTreeMap<String, Slot>,
    /// Plain fields of each node.
    pub nodes: Vec<BTreeMap<String, Slot>>,
    /// `(from, to)`: `from` 0 is the root, `from` i+1 is node i; `to` is a
    /// node index.
    pub edges: Vec<(usize, usize)>,
}

impl GraphSpec {
    /// Builds a new working copy of the graph.
    ///
    /// Edge `i` becomes field `r{i}` of its source, so nodes may be shared
    /// and may form cycles.
    pub fn to_working_copy(&self) -> WorkingCopy {
        let mut root = Object::new(GRAPH_TYPE);
        for (name, value) in &self.root {
            root.set(name, value.clone());
        }
        let mut copy = WorkingCopy::new(root);

        let mut handles: Vec<Handle> = Vec::with_capacity(self.nodes.len());
        for fields in &self.nodes {
            let mut node = Object::new(NODE_TYPE);
            for (name, value) in fields {
                node.set(name, value.clone());
            }
            handles.push(copy.add(node));
        }

        for (i, (from, to)) in self.edges.iter().enumerate() {
            let source = match from {
                0 => copy.root(),
                n => handles[n - 1],
            };
            let target = handles[*to];
            if let Some(object) = copy.object_mut(source) {
                object.set(&format!("r{i}"), target);
            }
        }
        copy
    }
}

/// Strategy for graphs with up to `max_nodes` nodes.
pub fn graph_strategy(max_nodes: usize) -> impl Strategy<Value = GraphSpec> {
    (
        fields_strategy(),
        prop::collection::vec(fields_strategy(), 0..=max_nodes),
    )
        .prop_flat_map(|(root, nodes)| {
            let n = nodes.len();
            let edges = if n == 0 {
                Just(Vec::new()).boxed()
            } else {
                prop::collection::vec((0..=n, 0..n), 0..=n * 2).boxed()
            };
            (Just(root), Just(nodes), edges)
        })
        .prop_map(|(root, nodes, edges)| GraphSpec { root, nodes, edges })
}

/// An operation against a store of accounts.
#[derive(Debug, Clone)]
pub enum StoreOperation {
    /// Save a new account.
    Create {
        /// Opening balance.
        balance: i64,
    },
    /// Read an existing account, change it and save it.
    Update {
        /// Picks an existing account, modulo the number created.
        slot: usize,
        /// New balance.
        balance: i64,
    },
    /// Delete an existing account.
    Delete {
        /// Picks an existing account, modulo the number created.
        slot: usize,
    },
    /// Look an existing account up by id.
    Find {
        /// Picks an existing account, modulo the number created.
        slot: usize,
    },
}

/// Strategy for store operations.
pub fn store_operation_strategy() -> impl Strategy<Value = StoreOperation> {
    prop_oneof![
        3 => (0..1_000i64).prop_map(|balance| StoreOperation::Create { balance }),
        3 => (any::<usize>(), 0..1_000i64)
            .prop_map(|(slot, balance)| StoreOperation::Update { slot, balance }),
        1 => any::<usize>().prop_map(|slot| StoreOperation::Delete { slot }),
        2 => any::<usize>().prop_map(|slot| StoreOperation::Find { slot }),
    ]
}

/// Strategy for a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<StoreOperation>> {
    prop::collection::vec(store_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contains_ref(slot: &Slot) -> bool {
        let mut found = false;
        slot.for_each_ref(&mut |_| found = true);
        found
    }

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn slots_never_reference(slot in slot_strategy()) {
            prop_assert!(!contains_ref(&slot));
        }

        #[test]
        fn graphs_build_with_every_node(spec in graph_strategy(6)) {
            let copy = spec.to_working_copy();
            prop_assert_eq!(copy.heap().len(), spec.nodes.len() + 1);
            prop_assert_eq!(copy.type_name().as_str(), GRAPH_TYPE);
        }

        #[test]
        fn edges_point_at_nodes(spec in graph_strategy(4)) {
            for (from, to) in &spec.edges {
                prop_assert!(*from <= spec.nodes.len());
                prop_assert!(*to < spec.nodes.len());
            }
        }
    }
}
