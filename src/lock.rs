// src/lock.rs
//
// Single-writer, many-reader discipline (spec: "safe_read_lock"). A poisoned
// lock (a prior writer panicked mid-update) still yields its last-known-good
// guard rather than panicking every subsequent caller - the cache favours
// staying up with possibly-stale data over cascading the failure.

use log::trace;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub struct SafeLock<T> {
    name: &'static str,
    inner: RwLock<T>,
}

impl<T> SafeLock<T> {
    pub fn new(name: &'static str, value: T) -> Self {
        SafeLock {
            name,
            inner: RwLock::new(value),
        }
    }

    pub fn safe_read_lock(&self) -> RwLockReadGuard<'_, T> {
        trace!("{}: acquiring read lock", self.name);
        self.inner.read().unwrap_or_else(|poison| poison.into_inner())
    }

    pub fn safe_write_lock(&self) -> RwLockWriteGuard<'_, T> {
        trace!("{}: acquiring write lock", self.name);
        self.inner.write().unwrap_or_else(|poison| poison.into_inner())
    }
}
