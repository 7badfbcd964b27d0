//! Single-writer serialization for every mutating operation.

use crate::services::error::{StorageError, StorageResult};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, warn};

/// Process-wide gate: at most one upload, deletion or sweep runs at a time,
/// across all owner slots. Each gated operation also runs under a deadline;
/// when it expires the operation future is dropped, which rolls back any
/// open transaction.
#[derive(Clone, Debug)]
pub struct WriteGate {
    lock: Arc<Mutex<()>>,
    deadline: Duration,
}

impl WriteGate {
    pub fn new(deadline: Duration) -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            deadline,
        }
    }

    pub async fn run<F, T>(&self, op: &'static str, fut: F) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        let started = Instant::now();
        let guarded = async {
            let _guard = self.lock.lock().await;
            debug!(op, waited_ms = started.elapsed().as_millis() as u64, "write gate acquired");
            fut.await
        };

        match tokio::time::timeout(self.deadline, guarded).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, "gave up after {:?}", self.deadline);
                Err(StorageError::TimedOut(self.deadline))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn runs_one_operation_at_a_time() {
        let gate = WriteGate::new(Duration::from_secs(5));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let gate = gate.clone();
            let active = active.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                gate.run("test", async {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_deadline_is_reported() {
        let gate = WriteGate::new(Duration::from_millis(10));
        let result: StorageResult<()> = gate
            .run("slow", async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(StorageError::TimedOut(_))));
    }

    #[tokio::test]
    async fn gate_is_released_after_timeout() {
        let gate = WriteGate::new(Duration::from_millis(10));
        let _ = gate
            .run("slow", async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            })
            .await;
        let value = gate.run("fast", async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
