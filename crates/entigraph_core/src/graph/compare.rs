//! Structural comparison of graphs living in different heaps.

use super::heap::{Handle, Heap};
use super::object::Slot;
use std::collections::HashMap;

/// Returns true if the graph reachable from `a_root` in `a` has the same
/// shape and values as the one reachable from `b_root` in `b`.
///
/// References must correspond one-to-one: two distinct objects on one side
/// never match a single shared object on the other. Dangling references
/// never match.
#[must_use]
pub fn graphs_equal(a: &Heap, a_root: Handle, b: &Heap, b_root: Handle) -> bool {
    let mut matcher = Matcher {
        forward: HashMap::new(),
        backward: HashMap::new(),
        pending: Vec::new(),
    };
    if !matcher.pair(a_root, b_root) {
        return false;
    }
    while let Some((x, y)) = matcher.pending.pop() {
        let (Some(ox), Some(oy)) = (a.get(x), b.get(y)) else {
            return false;
        };
        if ox.type_name() != oy.type_name() || ox.field_count() != oy.field_count() {
            return false;
        }
        for ((kx, vx), (ky, vy)) in ox.fields().zip(oy.fields()) {
            if kx != ky || !matcher.slots(vx, vy) {
                return false;
            }
        }
    }
    true
}

struct Matcher {
    forward: HashMap<Handle, Handle>,
    backward: HashMap<Handle, Handle>,
    pending: Vec<(Handle, Handle)>,
}

impl Matcher {
    fn pair(&mut self, x: Handle, y: Handle) -> bool {
        match (self.forward.get(&x), self.backward.get(&y)) {
            (Some(fy), Some(bx)) => *fy == y && *bx == x,
            (None, None) => {
                self.forward.insert(x, y);
                self.backward.insert(y, x);
                self.pending.push((x, y));
                true
            }
            _ => false,
        }
    }

    fn slots(&mut self, x: &Slot, y: &Slot) -> bool {
        match (x, y) {
            (Slot::Ref(hx), Slot::Ref(hy)) => self.pair(*hx, *hy),
            (Slot::List(xs), Slot::List(ys)) => {
                xs.len() == ys.len() && xs.iter().zip(ys).all(|(a, b)| self.slots(a, b))
            }
            (Slot::Map(xs), Slot::Map(ys)) => {
                xs.len() == ys.len()
                    && xs
                        .iter()
                        .zip(ys)
                        .all(|((ka, va), (kb, vb))| self.slots(ka, kb) && self.slots(va, vb))
            }
            (Slot::Optional(Some(a)), Slot::Optional(Some(b))) => self.slots(a, b),
            _ => x == y,
        }
    }
}
