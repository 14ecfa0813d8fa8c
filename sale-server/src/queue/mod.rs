//! 确认任务队列 - 下单与后台确认之间的缓冲
//!
//! 下单路径把 [`ConfirmationJob`] 丢进队列后立即返回 pending 回执；
//! 确认工作者从队列另一端消费。队列端口抽象成 trait，进程内实现
//! 用有界 mpsc，生产部署可替换为外部消息代理。
//!
//! 关闭语义：`close` 之后拒绝新任务，已入队的任务仍可被消费完，
//! 排空后 `consume` 返回 `None`，工作者据此退出。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::types::Timestamp;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock, mpsc};

/// Work item handed to the confirmation workers.
///
/// Carries everything compensation needs, so a failed confirmation never
/// has to read the order back before releasing stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationJob {
    pub order_id: String,
    pub user_id: String,
    pub product_id: String,
    pub quantity: u32,
    pub enqueued_at: Timestamp,
}

/// Queue errors
#[derive(Debug, Error, PartialEq)]
pub enum QueueError {
    #[error("Job queue is full")]
    Full,

    #[error("Job queue is closed")]
    Closed,
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Job transport port.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Hand a job to the queue without blocking. A full or closed queue is
    /// an error the caller must compensate for.
    async fn enqueue(&self, job: ConfirmationJob) -> QueueResult<()>;

    /// Receive the next job. Blocks while the queue is open and empty;
    /// returns `None` once the queue is closed and drained.
    async fn consume(&self) -> Option<ConfirmationJob>;

    /// Stop accepting jobs. Already queued jobs remain consumable.
    async fn close(&self);

    /// Jobs currently waiting in the queue. Reads 0 once closed.
    fn depth(&self) -> usize;
}

/// Bounded in-process queue. Workers share the receiving end through an
/// async mutex; whichever worker grabs the lock takes the next job.
/// Closing drops the sender, which lets parked consumers drain the
/// remaining jobs and then observe the end of the stream.
pub struct InMemoryJobQueue {
    tx: RwLock<Option<mpsc::Sender<ConfirmationJob>>>,
    rx: Mutex<mpsc::Receiver<ConfirmationJob>>,
}

impl InMemoryJobQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx: RwLock::new(Some(tx)),
            rx: Mutex::new(rx),
        }
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: ConfirmationJob) -> QueueResult<()> {
        let guard = self.tx.read().await;
        let tx = guard.as_ref().ok_or(QueueError::Closed)?;
        tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    async fn consume(&self) -> Option<ConfirmationJob> {
        self.rx.lock().await.recv().await
    }

    async fn close(&self) {
        self.tx.write().await.take();
    }

    fn depth(&self) -> usize {
        match self.tx.try_read() {
            Ok(guard) => guard
                .as_ref()
                .map(|tx| tx.max_capacity() - tx.capacity())
                .unwrap_or(0),
            Err(_) => 0,
        }
    }
}
