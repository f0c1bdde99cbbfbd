use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, Semaphore, watch};
use tokio::task::JoinSet;

use super::error::QueueError;

/// Unique work queue of hook task ids. Pushing an id that is still waiting
/// fails with [`QueueError::AlreadyInQueue`].
#[async_trait]
pub trait HookQueue: Send + Sync {
    async fn push(&self, task_id: i64) -> Result<(), QueueError>;

    /// Remove and return up to `limit` ids in FIFO order.
    async fn pop_batch(&self, limit: usize) -> Result<Vec<i64>, QueueError>;

    /// Resolve once items may be available.
    async fn wait_for_items(&self);
}

/// Consumer side of the queue.
#[async_trait]
pub trait QueueHandler: Send + Sync + 'static {
    async fn handle(&self, items: Vec<i64>);
}

// ---------------------------------------------------------------------------
// In-memory queue
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Pending {
    order: VecDeque<i64>,
    members: HashSet<i64>,
}

#[derive(Default)]
pub struct MemoryQueue {
    inner: Mutex<Pending>,
    pushed: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl HookQueue for MemoryQueue {
    async fn push(&self, task_id: i64) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().await;
        if !inner.members.insert(task_id) {
            return Err(QueueError::AlreadyInQueue);
        }
        inner.order.push_back(task_id);
        drop(inner);
        self.pushed.notify_one();
        Ok(())
    }

    async fn pop_batch(&self, limit: usize) -> Result<Vec<i64>, QueueError> {
        let mut inner = self.inner.lock().await;
        let n = limit.min(inner.order.len());
        let batch: Vec<i64> = inner.order.drain(..n).collect();
        for id in &batch {
            inner.members.remove(id);
        }
        Ok(batch)
    }

    async fn wait_for_items(&self) {
        self.pushed.notified().await;
    }
}

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    pub workers: usize,
    pub batch: usize,
}

/// Drain `queue` with up to `opts.workers` concurrent batches until shutdown.
/// Stops pulling as soon as shutdown is signalled and waits for batches that
/// are already being handled.
pub async fn run<H: QueueHandler>(
    queue: Arc<dyn HookQueue>,
    handler: Arc<H>,
    opts: PoolOptions,
    mut shutdown: watch::Receiver<()>,
) {
    tracing::info!(workers = opts.workers, batch = opts.batch, "hook queue workers started");

    let permits = Arc::new(Semaphore::new(opts.workers.max(1)));
    let mut inflight = JoinSet::new();

    loop {
        while let Some(res) = inflight.try_join_next() {
            if let Err(e) = res {
                tracing::error!(error = %e, "hook queue batch panicked");
            }
        }

        let permit = tokio::select! {
            _ = shutdown.changed() => break,
            permit = permits.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };

        let items = match queue.pop_batch(opts.batch.max(1)).await {
            Ok(items) => items,
            Err(e) => {
                tracing::error!(error = %e, "failed to pop hook queue");
                Vec::new()
            }
        };

        if items.is_empty() {
            drop(permit);
            tokio::select! {
                _ = shutdown.changed() => break,
                () = queue.wait_for_items() => {}
            }
            continue;
        }

        let handler = Arc::clone(&handler);
        inflight.spawn(async move {
            handler.handle(items).await;
            drop(permit);
        });
    }

    tracing::info!(inflight = inflight.len(), "hook queue workers shutting down");
    while let Some(res) = inflight.join_next().await {
        if let Err(e) = res {
            tracing::error!(error = %e, "hook queue batch panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn push_rejects_duplicates_until_popped() {
        let q = MemoryQueue::new();
        q.push(1).await.unwrap();
        q.push(2).await.unwrap();
        assert!(matches!(q.push(1).await, Err(QueueError::AlreadyInQueue)));
        assert_eq!(q.len().await, 2);

        assert_eq!(q.pop_batch(1).await.unwrap(), vec![1]);
        q.push(1).await.unwrap();
        assert_eq!(q.pop_batch(10).await.unwrap(), vec![2, 1]);
        assert!(q.is_empty().await);
    }

    struct Recorder {
        seen: Mutex<Vec<i64>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QueueHandler for Recorder {
        async fn handle(&self, items: Vec<i64>) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().await.extend(items);
        }
    }

    #[tokio::test]
    async fn pool_drains_queue_and_stops_on_shutdown() {
        let queue = Arc::new(MemoryQueue::new());
        for id in 1..=10 {
            queue.push(id).await.unwrap();
        }
        let handler = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        });
        let (tx, rx) = watch::channel(());

        let pool = tokio::spawn(run(
            queue.clone() as Arc<dyn HookQueue>,
            handler.clone(),
            PoolOptions {
                workers: 3,
                batch: 4,
            },
            rx,
        ));

        for _ in 0..100 {
            if handler.seen.lock().await.len() == 10 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // Items pushed while idle wake the pool.
        queue.push(11).await.unwrap();
        for _ in 0..100 {
            if handler.seen.lock().await.len() == 11 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), pool)
            .await
            .expect("pool did not stop")
            .unwrap();

        let mut seen = handler.seen.lock().await.clone();
        seen.sort_unstable();
        assert_eq!(seen, (1..=11).collect::<Vec<_>>());
        assert!(handler.calls.load(Ordering::SeqCst) >= 3);
    }
}
