//! Per-resource write locks.
//!
//! At most one write per host resource is in flight at a time, across every
//! panel and room that embeds it. A second writer is refused immediately
//! rather than queued, so a client never applies an edit against a version
//! that is about to change under it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use odooxr_common::OfficeError;

use crate::protocol::ResourceRef;

#[derive(Debug, Default, Clone)]
pub struct PanelLocks {
    held: Arc<Mutex<HashSet<ResourceRef>>>,
}

impl PanelLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the write lock for `resource`, or fail with `Conflict` when a
    /// write is already in flight. Released when the guard drops.
    pub fn try_acquire(&self, resource: &ResourceRef) -> Result<WriteGuard, OfficeError> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if !held.insert(resource.clone()) {
            return Err(OfficeError::conflict(format!(
                "a write to {resource} is already in flight"
            )));
        }
        Ok(WriteGuard {
            held: self.held.clone(),
            resource: resource.clone(),
        })
    }

    pub fn is_locked(&self, resource: &ResourceRef) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(resource)
    }
}

#[derive(Debug)]
pub struct WriteGuard {
    held: Arc<Mutex<HashSet<ResourceRef>>>,
    resource: ResourceRef,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.resource);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_writer_conflicts_until_release() {
        let locks = PanelLocks::new();
        let invoice = ResourceRef::record("account.move", 42);

        let guard = locks.try_acquire(&invoice).unwrap();
        assert!(locks.is_locked(&invoice));
        let err = locks.try_acquire(&invoice).unwrap_err();
        assert!(matches!(err, OfficeError::Conflict { .. }));

        drop(guard);
        assert!(!locks.is_locked(&invoice));
        assert!(locks.try_acquire(&invoice).is_ok());
    }

    #[test]
    fn distinct_resources_do_not_block() {
        let locks = PanelLocks::new();
        let _a = locks.try_acquire(&ResourceRef::record("account.move", 42)).unwrap();
        let _b = locks.try_acquire(&ResourceRef::record("account.move", 43)).unwrap();
    }
}
