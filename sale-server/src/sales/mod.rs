//! 销售服务 - 秒杀下单编排
//!
//! 把目录、库存、限流、订单、队列、订阅各组件编排成对外操作。
//!
//! 下单主流程（失败即短路，括号内为错误分类）：
//!
//! ```text
//!   resolve user (Unauthorized)
//!     → rate limit  (RateLimited)
//!     → 数量校验    (Validation)
//!     → 商品查询    (NotFound)
//!     → reserve     (OutOfStock)
//!     → 计价 → 建单 → 入队
//!     → 返回 pending 回执
//! ```
//!
//! reserve 之后的任何失败都会把预留的库存退回去；入队失败还会把
//! 订单推到 failed，保证没有永远悬着的 pending 单。

pub mod error;

pub use error::{SaleError, SaleResult};

use crate::broadcast::{EventBroadcaster, SubscriptionRegistry};
use crate::catalog::{CachedCatalog, ProductDirectory};
use crate::orders::{LedgerError, OrderLedger};
use crate::pricing;
use crate::queue::{ConfirmationJob, JobQueue};
use crate::ratelimit::{Admission, RateLimiter};
use crate::stock::StockLedger;
use crate::users::UserDirectory;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::event::{SaleEvent, Topic};
use shared::models::{Order, OrderStatus};
use shared::types::Timestamp;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Rate-limit action label for purchase attempts.
pub const FLASH_BUY_ACTION: &str = "flash_buy";

const MSG_QUEUED: &str = "Order queued! Processing in background.";
const MSG_CANCELLED: &str = "Order cancelled successfully";
const MSG_RESTOCKED: &str = "Stock updated successfully";
const MSG_PRODUCT_NOT_FOUND: &str = "Product not found";
const MSG_ORDER_NOT_FOUND: &str = "Order not found";

/// Tunables for the purchase path.
#[derive(Debug, Clone)]
pub struct SalesPolicy {
    /// Purchase attempts allowed per user per window.
    pub rate_limit_max: u32,
    pub rate_limit_window_secs: u64,
    /// Upper bound on units per order; the lower bound is 1.
    pub max_quantity_per_order: u32,
    /// Must match the window the order ledger enforces; used for the
    /// caller-facing deadline message.
    pub cancel_window_secs: u64,
}

impl Default for SalesPolicy {
    fn default() -> Self {
        Self {
            rate_limit_max: 10,
            rate_limit_window_secs: 60,
            max_quantity_per_order: 10,
            cancel_window_secs: 300,
        }
    }
}

/// 下单回执
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub order_id: String,
    pub status: OrderStatus,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub message: String,
}

/// 取消回执
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelReceipt {
    pub order_id: String,
    pub refunded_quantity: u32,
    /// Stock level after the refund landed.
    pub stock: i64,
    pub message: String,
}

/// 补货回执
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestockReceipt {
    pub product_id: String,
    pub new_stock: i64,
    pub message: String,
}

/// Orchestrates one sale flow over the injected components.
pub struct SalesService {
    users: Arc<dyn UserDirectory>,
    catalog: Arc<CachedCatalog>,
    stock: Arc<StockLedger>,
    orders: Arc<OrderLedger>,
    limiter: Arc<RateLimiter>,
    queue: Arc<dyn JobQueue>,
    registry: Arc<SubscriptionRegistry>,
    broadcaster: Arc<EventBroadcaster>,
    policy: SalesPolicy,
}

impl SalesService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: Arc<dyn UserDirectory>,
        catalog: Arc<CachedCatalog>,
        stock: Arc<StockLedger>,
        orders: Arc<OrderLedger>,
        limiter: Arc<RateLimiter>,
        queue: Arc<dyn JobQueue>,
        registry: Arc<SubscriptionRegistry>,
        broadcaster: Arc<EventBroadcaster>,
        policy: SalesPolicy,
    ) -> Self {
        Self {
            users,
            catalog,
            stock,
            orders,
            limiter,
            queue,
            registry,
            broadcaster,
            policy,
        }
    }

    /// Admit one purchase attempt and hand it to the background pipeline.
    ///
    /// On success the order is persisted as `pending` and a confirmation
    /// job is queued; the receipt returns before the order settles.
    pub async fn purchase(
        &self,
        product_id: &str,
        quantity: u32,
        requester_id: &str,
    ) -> SaleResult<PurchaseReceipt> {
        let user = self
            .users
            .resolve(requester_id)
            .ok_or(SaleError::Unauthorized)?;

        match self.limiter.admit(
            &user.id,
            FLASH_BUY_ACTION,
            self.policy.rate_limit_max,
            self.policy.rate_limit_window_secs,
        ) {
            Admission::Allowed { remaining } => {
                tracing::debug!(user_id = %user.id, remaining, "Purchase attempt admitted");
            }
            Admission::Denied { retry_after_ms } => {
                return Err(SaleError::RateLimited { retry_after_ms });
            }
        }

        if quantity < 1 || quantity > self.policy.max_quantity_per_order {
            return Err(SaleError::Validation(format!(
                "Quantity must be between 1 and {}",
                self.policy.max_quantity_per_order
            )));
        }

        let product = self
            .catalog
            .find(product_id)
            .await
            .ok_or_else(|| SaleError::NotFound(MSG_PRODUCT_NOT_FOUND.into()))?;

        self.stock.reserve(product_id, quantity).await?;

        let unit_price = match pricing::charged_unit_price(&product) {
            Ok(price) => price,
            Err(e) => {
                // Catalog data is broken; give the units back and bail.
                self.rollback_reservation(product_id, quantity).await;
                return Err(SaleError::internal(e));
            }
        };

        let order = match self.orders.create(&user, &product, quantity, unit_price).await {
            Ok(order) => order,
            Err(e) => {
                self.rollback_reservation(product_id, quantity).await;
                return Err(SaleError::internal(e));
            }
        };

        let job = ConfirmationJob {
            order_id: order.id.clone(),
            user_id: user.id.clone(),
            product_id: product.id.clone(),
            quantity,
            enqueued_at: order.created_at,
        };
        if let Err(e) = self.queue.enqueue(job).await {
            self.fail_unqueued(&order).await;
            return Err(SaleError::Internal(anyhow::anyhow!(
                "confirmation queue rejected order {}: {e}",
                order.id
            )));
        }

        tracing::info!(
            order_id = %order.id,
            user_id = %user.id,
            product_id = %product.id,
            quantity,
            total = %order.total_price,
            "Purchase accepted"
        );

        Ok(PurchaseReceipt {
            order_id: order.id,
            status: OrderStatus::Pending,
            quantity,
            unit_price,
            total_price: order.total_price,
            message: MSG_QUEUED.to_string(),
        })
    }

    /// Cancel a pending order and refund its reservation.
    ///
    /// The ledger transition decides the race against the confirmation
    /// worker; only the winner refunds. The buyer is also notified on
    /// their topic, matching what the worker does for confirmations.
    pub async fn cancel(
        &self,
        order_id: &str,
        requester_id: &str,
        now: Timestamp,
    ) -> SaleResult<CancelReceipt> {
        let user = self
            .users
            .resolve(requester_id)
            .ok_or(SaleError::Unauthorized)?;

        let order = self
            .orders
            .cancel(order_id, &user.id, now)
            .await
            .map_err(|e| self.cancel_error(e))?;

        // Refund failures are logged inside as unresolved inconsistencies;
        // the cancellation itself already happened, so the receipt still
        // goes out with a best-effort level.
        let stock = match self
            .stock
            .release_with_retry(&order.product_id, order.quantity)
            .await
        {
            Ok(level) => level,
            Err(_) => self.stock.read(&order.product_id).await.unwrap_or_default(),
        };

        self.broadcaster.publish(
            &Topic::user(&user.id),
            SaleEvent::order_notification(&order.id, OrderStatus::Cancelled, MSG_CANCELLED),
        );

        Ok(CancelReceipt {
            order_id: order.id,
            refunded_quantity: order.quantity,
            stock,
            message: MSG_CANCELLED.to_string(),
        })
    }

    /// Current stock counter for a known product.
    pub async fn stock_level(&self, product_id: &str) -> SaleResult<i64> {
        self.catalog
            .find(product_id)
            .await
            .ok_or_else(|| SaleError::NotFound(MSG_PRODUCT_NOT_FOUND.into()))?;
        Ok(self.stock.read(product_id).await?)
    }

    /// Administrative stock top-up. Publishes the new level to product
    /// subscribers and invalidates the cached catalog entry.
    pub async fn restock(&self, product_id: &str, amount: u32) -> SaleResult<RestockReceipt> {
        if amount < 1 {
            return Err(SaleError::Validation(
                "Restock amount must be at least 1".into(),
            ));
        }
        self.catalog
            .find(product_id)
            .await
            .ok_or_else(|| SaleError::NotFound(MSG_PRODUCT_NOT_FOUND.into()))?;

        let new_stock = self.stock.release(product_id, amount).await?;
        self.catalog.invalidate(product_id).await;

        tracing::info!(product_id, amount, new_stock, "Product restocked");
        Ok(RestockReceipt {
            product_id: product_id.to_string(),
            new_stock,
            message: MSG_RESTOCKED.to_string(),
        })
    }

    /// One order, visible to its owner only.
    pub async fn order(&self, order_id: &str, requester_id: &str) -> SaleResult<Order> {
        let user = self
            .users
            .resolve(requester_id)
            .ok_or(SaleError::Unauthorized)?;
        self.orders
            .find_for_user(order_id, &user.id)
            .await
            .map_err(|e| match e {
                LedgerError::NotFound(_) => SaleError::NotFound(MSG_ORDER_NOT_FOUND.into()),
                other => SaleError::internal(other),
            })
    }

    /// The requester's order history, newest first.
    pub async fn orders_for_user(&self, requester_id: &str) -> SaleResult<Vec<Order>> {
        let user = self
            .users
            .resolve(requester_id)
            .ok_or(SaleError::Unauthorized)?;
        self.orders
            .history(&user.id)
            .await
            .map_err(SaleError::internal)
    }

    pub fn subscribe(
        &self,
        connection_id: &str,
        topic: Topic,
    ) -> broadcast::Receiver<SaleEvent> {
        self.registry.subscribe(connection_id, topic)
    }

    pub fn unsubscribe(&self, connection_id: &str, topic: &Topic) -> bool {
        self.registry.unsubscribe(connection_id, topic)
    }

    pub fn disconnect(&self, connection_id: &str) -> usize {
        self.registry.disconnect(connection_id)
    }

    async fn rollback_reservation(&self, product_id: &str, quantity: u32) {
        // Exhaustion inside is logged as an unresolved inconsistency.
        let _ = self.stock.release_with_retry(product_id, quantity).await;
    }

    /// The job never reached the queue, so no worker will ever settle this
    /// order: fail it here and refund. The caller gets a synchronous error,
    /// so no notification is published.
    async fn fail_unqueued(&self, order: &Order) {
        match self.orders.fail(&order.id).await {
            Ok(_) => {
                self.rollback_reservation(&order.product_id, order.quantity)
                    .await;
            }
            Err(LedgerError::InvalidState { status, .. }) => {
                tracing::info!(
                    order_id = %order.id,
                    %status,
                    "Order settled elsewhere, no compensation needed"
                );
            }
            Err(e) => {
                tracing::error!(
                    order_id = %order.id,
                    error = %e,
                    "Failed to settle unqueued order, record left pending"
                );
            }
        }
    }

    fn cancel_error(&self, e: LedgerError) -> SaleError {
        match e {
            LedgerError::NotFound(_) => SaleError::NotFound(MSG_ORDER_NOT_FOUND.into()),
            LedgerError::Forbidden(_) => SaleError::Forbidden,
            LedgerError::InvalidState { status, .. } => SaleError::InvalidState { status },
            LedgerError::WindowExpired(_) => SaleError::WindowExpired {
                window_mins: self.policy.cancel_window_secs / 60,
            },
            LedgerError::Store(e) => SaleError::internal(e),
        }
    }
}
