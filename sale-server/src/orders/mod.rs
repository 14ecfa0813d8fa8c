//! 订单总账 - 订单创建与生命周期裁决
//!
//! 订单状态机（全部目标态均为终态）：
//!
//! ```text
//!              ┌─→ confirmed   (后台确认完成)
//!    pending ──┼─→ cancelled   (用户时限内取消)
//!              └─→ failed      (确认重试耗尽)
//! ```
//!
//! # 裁决规则
//!
//! | 操作      | 校验顺序                                        |
//! |-----------|-------------------------------------------------|
//! | `cancel`  | 存在 → 归属 → 状态 pending → 时限内 → CAS 换档 |
//! | `confirm` | CAS 换档；已 confirmed 视为幂等成功             |
//! | `fail`    | CAS 换档；已离开 pending 一律报 InvalidState    |
//!
//! 所有并发裁决最终落在存储层的 CAS 换档上，上面的前置校验只
//! 负责给出精确的错误分类。库存补偿由调用方根据裁决结果执行，
//! 总账自身不碰库存。

pub mod store;

pub use store::{InMemoryOrderStore, OrderStore, StoreError, StoreResult};

use crate::pricing;
use rust_decimal::Decimal;
use shared::models::{Order, OrderStatus, Product, UserProfile};
use shared::types::Timestamp;
use std::sync::Arc;
use thiserror::Error;

/// Most orders returned by a history query.
pub const MAX_ORDER_HISTORY: usize = 100;

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Order {0} is not owned by the requester")]
    Forbidden(String),

    #[error("Invalid transition for order {order_id}: status is '{status}'")]
    InvalidState {
        order_id: String,
        status: OrderStatus,
    },

    #[error("Cancellation window expired for order {0}")]
    WindowExpired(String),

    #[error("Order store error: {0}")]
    Store(#[from] StoreError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Order ledger over a pluggable [`OrderStore`].
pub struct OrderLedger {
    store: Arc<dyn OrderStore>,
    cancel_window_secs: u64,
}

impl OrderLedger {
    pub fn new(store: Arc<dyn OrderStore>, cancel_window_secs: u64) -> Self {
        Self {
            store,
            cancel_window_secs,
        }
    }

    /// Create a pending order for an already-reserved purchase.
    ///
    /// Buyer identity and product name are denormalized onto the record;
    /// the total is derived from the charged unit price.
    pub async fn create(
        &self,
        user: &UserProfile,
        product: &Product,
        quantity: u32,
        unit_price: Decimal,
    ) -> LedgerResult<Order> {
        let order = Order {
            id: shared::util::order_id(),
            user_id: user.id.clone(),
            user_email: user.email.clone(),
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            quantity,
            unit_price,
            total_price: pricing::order_total(unit_price, quantity),
            status: OrderStatus::Pending,
            created_at: shared::util::now_millis(),
            cancellable: true,
        };
        self.store.insert(order.clone()).await?;

        tracing::debug!(
            order_id = %order.id,
            user_id = %order.user_id,
            product_id = %order.product_id,
            quantity,
            total = %order.total_price,
            "Order created"
        );
        Ok(order)
    }

    /// Cancel a pending order on behalf of `requester_id`.
    ///
    /// Checks run in a fixed order so callers get the most specific error:
    /// existence, then ownership, then status, then the cancellation
    /// deadline. The store transition is the final authority under
    /// concurrency; losing the race reports the actual status.
    pub async fn cancel(
        &self,
        order_id: &str,
        requester_id: &str,
        now: Timestamp,
    ) -> LedgerResult<Order> {
        let order = self
            .store
            .find(order_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(order_id.to_string()))?;

        if order.user_id != requester_id {
            return Err(LedgerError::Forbidden(order_id.to_string()));
        }
        if order.status != OrderStatus::Pending {
            return Err(LedgerError::InvalidState {
                order_id: order.id,
                status: order.status,
            });
        }
        let window_ms = self.cancel_window_secs as i64 * 1000;
        if now.saturating_sub(order.created_at) > window_ms {
            return Err(LedgerError::WindowExpired(order_id.to_string()));
        }

        let cancelled = self
            .transition(order_id, OrderStatus::Pending, OrderStatus::Cancelled)
            .await?;
        tracing::info!(order_id, requester_id, "Order cancelled");
        Ok(cancelled)
    }

    /// Confirm a pending order. Idempotent: confirming an already-confirmed
    /// order returns it unchanged, so job re-delivery is harmless.
    pub async fn confirm(&self, order_id: &str) -> LedgerResult<Order> {
        match self
            .store
            .transition(order_id, OrderStatus::Pending, OrderStatus::Confirmed)
            .await
        {
            Ok(order) => Ok(order),
            Err(StoreError::StatusConflict {
                actual: OrderStatus::Confirmed,
                ..
            }) => self
                .store
                .find(order_id)
                .await?
                .ok_or_else(|| LedgerError::NotFound(order_id.to_string())),
            Err(e) => Err(Self::map_store_error(e)),
        }
    }

    /// Mark a pending order failed. Not idempotent: any order that already
    /// left `pending` reports `InvalidState`, so compensation runs at most
    /// once.
    pub async fn fail(&self, order_id: &str) -> LedgerResult<Order> {
        let failed = self
            .transition(order_id, OrderStatus::Pending, OrderStatus::Failed)
            .await?;
        tracing::warn!(order_id, "Order marked failed");
        Ok(failed)
    }

    /// Look up a single order for its owner. Foreign orders report NotFound
    /// rather than Forbidden, so order ids cannot be probed.
    pub async fn find_for_user(
        &self,
        order_id: &str,
        requester_id: &str,
    ) -> LedgerResult<Order> {
        match self.store.find(order_id).await? {
            Some(order) if order.user_id == requester_id => Ok(order),
            _ => Err(LedgerError::NotFound(order_id.to_string())),
        }
    }

    /// Order history for a user, newest first.
    pub async fn history(&self, user_id: &str) -> LedgerResult<Vec<Order>> {
        Ok(self.store.for_user(user_id, MAX_ORDER_HISTORY).await?)
    }

    pub async fn pending_count(&self) -> LedgerResult<usize> {
        Ok(self.store.count_with_status(OrderStatus::Pending).await?)
    }

    async fn transition(
        &self,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
    ) -> LedgerResult<Order> {
        self.store
            .transition(order_id, from, to)
            .await
            .map_err(Self::map_store_error)
    }

    fn map_store_error(e: StoreError) -> LedgerError {
        match e {
            StoreError::NotFound(id) => LedgerError::NotFound(id),
            StoreError::StatusConflict {
                order_id, actual, ..
            } => LedgerError::InvalidState {
                order_id,
                status: actual,
            },
            other => LedgerError::Store(other),
        }
    }
}
