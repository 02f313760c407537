//! The store's single reader/writer lock.
//!
//! Operations run as closures under the lock. A closure that calls back into
//! the same lock on the same thread gets `LockReentry` instead of a deadlock,
//! which also rules out upgrading a read into a write. A write operation
//! receives a [`WriteScope`], through which it may run nested reads.

use crate::error::{CoreError, CoreResult};
use parking_lot::RwLock;
use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

static NEXT_LOCK_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static HELD: RefCell<Vec<(usize, Mode)>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Read,
    Write,
}

impl Mode {
    const fn as_str(self) -> &'static str {
        match self {
            Mode::Read => "read",
            Mode::Write => "write",
        }
    }
}

/// Marks the lock as held by this thread until dropped.
struct HoldMarker {
    id: usize,
}

impl HoldMarker {
    fn new(id: usize, mode: Mode) -> Self {
        HELD.with(|held| held.borrow_mut().push((id, mode)));
        Self { id }
    }
}

impl Drop for HoldMarker {
    fn drop(&mut self) {
        HELD.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|(id, _)| *id == self.id) {
                held.remove(pos);
            }
        });
    }
}

/// Exclusive access held by a write operation.
///
/// Dereferences to the guarded value.
#[derive(Debug)]
pub struct WriteScope<'a, T> {
    value: &'a mut T,
}

impl<T> WriteScope<'_, T> {
    /// Runs a nested read inside this write.
    ///
    /// The write already excludes every other holder, so this never waits.
    ///
    /// # Errors
    ///
    /// Whatever `op` returns.
    pub fn read<R>(&self, op: impl FnOnce(&T) -> CoreResult<R>) -> CoreResult<R> {
        op(self.value)
    }

    /// The guarded value, for borrowing disjoint fields at once.
    pub fn get_mut(&mut self) -> &mut T {
        self.value
    }
}

impl<T> Deref for WriteScope<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value
    }
}

impl<T> DerefMut for WriteScope<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value
    }
}

/// Shared reads, exclusive writes, optional wait limit.
#[derive(Debug)]
pub struct ReadWriteLock<T> {
    inner: RwLock<T>,
    id: usize,
    timeout: Option<Duration>,
}

impl<T> ReadWriteLock<T> {
    /// Wraps `value`; acquisition waits indefinitely.
    pub fn new(value: T) -> Self {
        Self::with_timeout(value, None)
    }

    /// Wraps `value`; acquisition gives up after `timeout`.
    pub fn with_timeout(value: T, timeout: Option<Duration>) -> Self {
        Self {
            inner: RwLock::new(value),
            id: NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed),
            timeout,
        }
    }

    fn held_here(&self) -> Option<Mode> {
        HELD.with(|held| {
            held.borrow()
                .iter()
                .rev()
                .find(|(id, _)| *id == self.id)
                .map(|(_, mode)| *mode)
        })
    }

    fn refuse_reentry(&self) -> CoreResult<()> {
        match self.held_here() {
            Some(mode) => Err(CoreError::LockReentry {
                held: mode.as_str(),
            }),
            None => Ok(()),
        }
    }

    /// Runs `op` with shared access.
    ///
    /// # Errors
    ///
    /// `LockReentry` when called from inside an operation on this lock,
    /// `LockTimeout` when the wait limit passes; otherwise whatever `op`
    /// returns.
    pub fn read<R>(&self, op: impl FnOnce(&T) -> CoreResult<R>) -> CoreResult<R> {
        self.refuse_reentry()?;
        let guard = match self.timeout {
            Some(waited) => self
                .inner
                .try_read_for(waited)
                .ok_or(CoreError::LockTimeout { waited })?,
            None => self.inner.read(),
        };
        let _marker = HoldMarker::new(self.id, Mode::Read);
        op(&guard)
    }

    /// Runs `op` with exclusive access.
    ///
    /// Reads nested in `op` go through [`WriteScope::read`]; calling
    /// [`ReadWriteLock::read`] from inside is still re-entry.
    ///
    /// # Errors
    ///
    /// As for [`ReadWriteLock::read`].
    pub fn write<R>(
        &self,
        op: impl FnOnce(&mut WriteScope<'_, T>) -> CoreResult<R>,
    ) -> CoreResult<R> {
        self.refuse_reentry()?;
        let mut guard = match self.timeout {
            Some(waited) => self
                .inner
                .try_write_for(waited)
                .ok_or(CoreError::LockTimeout { waited })?,
            None => self.inner.write(),
        };
        let _marker = HoldMarker::new(self.id, Mode::Write);
        op(&mut WriteScope { value: &mut *guard })
    }

    /// Consumes the lock, returning the value.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}
