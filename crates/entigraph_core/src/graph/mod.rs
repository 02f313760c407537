//! In-memory object graph.
//!
//! A [`Heap`] is an arena of [`Object`]s addressed by generational
//! [`Handle`]s. Handle equality is reference identity; field equality is
//! checked separately with [`graphs_equal`].

mod compare;
mod heap;
mod object;

pub use compare::graphs_equal;
pub use heap::{Handle, Heap};
pub use object::{Object, Slot};
