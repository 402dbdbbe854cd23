//! Per run key serialisation of pipeline executions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Keyed async mutex. Holding the guard for a run key excludes every other
/// request for the same key; different keys proceed in parallel.
#[derive(Clone, Default)]
pub struct RunLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl RunLocks {
    pub async fn lock(&self, run_key: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = match self.inner.lock() {
                Ok(locks) => locks,
                Err(poisoned) => poisoned.into_inner(),
            };
            // Entries nobody holds or waits on any more.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(run_key.to_string()).or_default())
        };
        entry.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}
