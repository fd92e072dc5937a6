use std::sync::{LockResult, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

/// Take the guard even if a previous holder panicked.
///
/// Cache contents are disposable, so a poisoned lock only means an entry may
/// be stale until its TTL runs out.
fn recover<G>(result: LockResult<G>, op: &'static str, lock_kind: &'static str) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(
            op,
            lock_kind,
            result = "poisoned_recovered",
            "Recovered from poisoned cache lock"
        );
        poisoned.into_inner()
    })
}

pub(crate) fn read_entries<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockReadGuard<'a, T> {
    recover(lock.read(), op, "rwlock.read")
}

pub(crate) fn write_entries<'a, T>(
    lock: &'a RwLock<T>,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    recover(lock.write(), op, "rwlock.write")
}
