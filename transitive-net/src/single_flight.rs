// transitive-net/src/single_flight.rs
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Mutex as AsyncMutex;

/// Serializes work per key. Concurrent callers for the same key run one at a
/// time, so the second caller finds whatever the first one cached instead of
/// repeating the fetch. Distinct keys never wait on each other.
#[derive(Debug, Default)]
pub struct SingleFlight {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run<F, Fut, T>(&self, key: &str, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(key.to_string()).or_default().clone()
        };

        let result = {
            let _guard = lock.lock().await;
            work().await
        };

        // Drop the entry once nobody else holds or waits on it.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
        result
    }

    pub fn in_flight(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_runs_serially_and_sees_previous_result() {
        let flight = Arc::new(SingleFlight::new());
        let cached = Arc::new(Mutex::new(None::<u32>));
        let fetches = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flight = Arc::clone(&flight);
            let cached = Arc::clone(&cached);
            let fetches = Arc::clone(&fetches);
            handles.push(tokio::spawn(async move {
                flight
                    .run("g:a:1.0", || async {
                        let hit = *cached.lock().unwrap();
                        if let Some(hit) = hit {
                            return hit;
                        }
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        fetches.fetch_add(1, Ordering::SeqCst);
                        *cached.lock().unwrap() = Some(42);
                        42
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 42);
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(flight.in_flight(), 0);
    }
}
