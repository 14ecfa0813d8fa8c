//! 确认工作者 - 后台订单确认
//!
//! 从任务队列消费 [`ConfirmationJob`]，模拟履约耗时后把订单推进到
//! confirmed，并向买家话题推送结果通知。
//!
//! ```text
//!   queue ──consume──▶ sleep(confirm_delay) ──▶ confirm (带重试)
//!                                                   │
//!                          ┌────────────────────────┼──────────────┐
//!                          ▼                        ▼              ▼
//!                      Ok / 已confirmed        InvalidState     重试耗尽
//!                      通知 confirmed          静默跳过         fail + 退还库存
//!                                              (取消方已退)     + 通知 failed
//! ```
//!
//! # 补偿约定
//!
//! 库存恰好退还一次：取消赢得换档就由取消方退，工作者赢得 failed
//! 换档就由工作者退。输掉换档的一方拿到 InvalidState，绝不再退。

use crate::broadcast::EventBroadcaster;
use crate::orders::{LedgerError, OrderLedger};
use crate::queue::{ConfirmationJob, JobQueue};
use crate::stock::StockLedger;
use crate::utils::{RetryPolicy, retry_if};
use shared::event::{SaleEvent, Topic};
use shared::models::OrderStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

const CONFIRMED_MESSAGE: &str = "Your order has been confirmed";
const FAILED_MESSAGE: &str =
    "Your order could not be processed. The reserved stock has been returned";

/// One confirmation worker. Cheap to clone; spawn one task per pool slot.
#[derive(Clone)]
pub struct ConfirmationWorker {
    queue: Arc<dyn JobQueue>,
    orders: Arc<OrderLedger>,
    stock: Arc<StockLedger>,
    broadcaster: Arc<EventBroadcaster>,
    confirm_delay: Duration,
    retry: RetryPolicy,
    shutdown: CancellationToken,
}

impl ConfirmationWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn JobQueue>,
        orders: Arc<OrderLedger>,
        stock: Arc<StockLedger>,
        broadcaster: Arc<EventBroadcaster>,
        confirm_delay: Duration,
        retry: RetryPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            orders,
            stock,
            broadcaster,
            confirm_delay,
            retry,
            shutdown,
        }
    }

    /// Consume jobs until shutdown is requested or the queue closes.
    ///
    /// The in-flight job always runs to completion; the shutdown token is
    /// only consulted between jobs, so no order is left half-settled.
    pub async fn run(self, worker_id: usize) {
        tracing::info!(worker_id, "Confirmation worker started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!(worker_id, "Shutdown requested, stopping worker");
                    break;
                }
                job = self.queue.consume() => match job {
                    Some(job) => self.process(job).await,
                    None => {
                        tracing::info!(worker_id, "Job queue closed, stopping worker");
                        break;
                    }
                }
            }
        }
    }

    async fn process(&self, job: ConfirmationJob) {
        // Simulated fulfillment latency (payment capture, warehouse call)
        sleep(self.confirm_delay).await;

        let outcome = retry_if(
            &self.retry,
            "order_confirm",
            || self.orders.confirm(&job.order_id),
            |e| matches!(e, LedgerError::Store(_)),
        )
        .await;

        match outcome {
            Ok(order) => {
                tracing::info!(order_id = %order.id, "✅ Order confirmed");
                self.notify(&job, OrderStatus::Confirmed, CONFIRMED_MESSAGE);
            }
            Err(LedgerError::InvalidState { status, .. }) => {
                // Settled while queued (user cancel beat us to the
                // transition). Whoever won the transition owns the refund.
                tracing::info!(
                    order_id = %job.order_id,
                    %status,
                    "Skipping confirmation, order already settled"
                );
            }
            Err(e) => self.abandon(&job, e).await,
        }
    }

    /// Store kept failing: push the order to `failed` and compensate.
    async fn abandon(&self, job: &ConfirmationJob, cause: LedgerError) {
        tracing::error!(
            order_id = %job.order_id,
            error = %cause,
            "Confirmation retries exhausted, failing order"
        );

        match self.orders.fail(&job.order_id).await {
            Ok(_) => {
                // We won the transition, so the refund is ours to make.
                // Exhaustion inside is already logged as an inconsistency.
                let _ = self
                    .stock
                    .release_with_retry(&job.product_id, job.quantity)
                    .await;
                self.notify(job, OrderStatus::Failed, FAILED_MESSAGE);
            }
            Err(LedgerError::InvalidState { status, .. }) => {
                tracing::info!(
                    order_id = %job.order_id,
                    %status,
                    "Order settled elsewhere, no compensation needed"
                );
            }
            Err(e) => {
                tracing::error!(
                    order_id = %job.order_id,
                    error = %e,
                    "Failed to mark order failed"
                );
            }
        }
    }

    fn notify(&self, job: &ConfirmationJob, status: OrderStatus, message: &str) {
        let delivered = self.broadcaster.publish(
            &Topic::user(&job.user_id),
            SaleEvent::order_notification(&job.order_id, status, message),
        );
        tracing::debug!(
            order_id = %job.order_id,
            user_id = %job.user_id,
            %status,
            delivered,
            "Order notification published"
        );
    }
}
