//! Scoped units of work held for the lifetime of a request.
//!
//! A host that must stay alive while requests are running (a mobile app
//! going to the background, a service draining before shutdown) implements
//! `UnitOfWork`. The dispatcher opens a `WorkGuard` on submission and the
//! guard ends the unit when dropped, after the completion has run or on any
//! path that abandons the request.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub trait UnitOfWork: Send + Sync + 'static {
    fn begin(&self, label: &str);
    fn end(&self, label: &str);
}

/// Ignores every scope.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWork;

impl UnitOfWork for NoWork {
    fn begin(&self, _label: &str) {}
    fn end(&self, _label: &str) {}
}

/// Counts open scopes.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    count: Arc<AtomicUsize>,
}

impl InFlight {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl UnitOfWork for InFlight {
    fn begin(&self, _label: &str) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn end(&self, _label: &str) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An open unit of work; ends it on drop.
pub struct WorkGuard {
    work: Arc<dyn UnitOfWork>,
    label: String,
}

impl WorkGuard {
    pub fn begin(work: Arc<dyn UnitOfWork>, label: impl Into<String>) -> Self {
        let label = label.into();
        work.begin(&label);
        Self { work, label }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        self.work.end(&self.label);
    }
}

impl std::fmt::Debug for WorkGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkGuard").field("label", &self.label).finish()
    }
}
