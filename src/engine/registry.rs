use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::model::Dependency;

/// The shared, internally synchronized set of dependencies under analysis.
///
/// Analyzers running in parallel may add and remove entries while the
/// engine takes snapshots; every operation holds the lock only for its own
/// duration.
#[derive(Debug, Default)]
pub struct DependencyRegistry {
    dependencies: Mutex<Vec<Arc<Dependency>>>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<Dependency>>> {
        self.dependencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a dependency; returns the shared handle to it.
    pub fn add(&self, dependency: Dependency) -> Arc<Dependency> {
        let dependency = Arc::new(dependency);
        self.lock().push(Arc::clone(&dependency));
        dependency
    }

    /// Adds an already shared dependency unless it is present.
    pub fn add_shared(&self, dependency: Arc<Dependency>) {
        let mut deps = self.lock();
        if !deps.iter().any(|d| d.id() == dependency.id()) {
            deps.push(dependency);
        }
    }

    pub fn remove(&self, dependency: &Dependency) -> bool {
        let mut deps = self.lock();
        let before = deps.len();
        deps.retain(|d| d.id() != dependency.id());
        deps.len() != before
    }

    /// Removes every dependency whose id is in `ids` under one lock.
    pub fn remove_all(&self, ids: &HashSet<u64>) -> usize {
        let mut deps = self.lock();
        let before = deps.len();
        deps.retain(|d| !ids.contains(&d.id()));
        before - deps.len()
    }

    pub fn contains(&self, dependency: &Dependency) -> bool {
        self.lock().iter().any(|d| d.id() == dependency.id())
    }

    /// An immutable copy of the current contents, in insertion order.
    pub fn snapshot(&self) -> Vec<Arc<Dependency>> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
