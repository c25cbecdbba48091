//! Diagnostics registry for engine-owned threads

use parking_lot::RwLock;
use std::collections::HashMap;
use std::thread::{Thread, ThreadId};
use tracing::debug;

/// Records threads that deliver completions. Registration is idempotent.
pub trait ThreadRegistry: Send + Sync {
    fn register(&self, thread: &Thread);
}

/// Default registry keeping a name per thread id
#[derive(Default)]
pub struct CallbackThreadRegistry {
    threads: RwLock<HashMap<ThreadId, String>>,
}

impl CallbackThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: ThreadId) -> bool {
        self.threads.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.threads.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.read().is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.threads.read().values().cloned().collect()
    }
}

impl ThreadRegistry for CallbackThreadRegistry {
    fn register(&self, thread: &Thread) {
        if self.threads.read().contains_key(&thread.id()) {
            return;
        }

        let name = thread
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{:?}", thread.id()));
        debug!("Registering decode callback thread {}", name);
        self.threads.write().entry(thread.id()).or_insert(name);
    }
}
