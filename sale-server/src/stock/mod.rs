//! 库存账本 - 秒杀库存的预留与释放
//!
//! 计数存储只有原子加 / 原子减，没有“余量足够才扣”的复合原语，
//! 所以预留采用先扣后查（decrement-then-check）：
//!
//! ```text
//!   reserve(qty):  DECR qty ──▶ 结果 >= 0 ?  ──是──▶ 预留成功
//!                                   │
//!                                   否（超卖）
//!                                   ▼
//!                            补偿 INCR qty，报告 OutOfStock
//! ```
//!
//! 失败路径上计数器会短暂为负，并发读者可能观察到这个负值。
//! 这是有界且自愈的异常，不是静默错误：补偿完成后计数回到调用
//! 前的值。需要守住的不变量是针对沉降后的值：所有在途操作完成
//! 后，`0 <= 库存 <= 初始库存`。整个序列不加任何外部锁。

pub mod counter;

pub use counter::{CounterError, CounterResult, CounterStore, InMemoryCounterStore};

use crate::broadcast::EventBroadcaster;
use crate::utils::retry::{RetryPolicy, retry_with_backoff};
use shared::{SaleEvent, Topic};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StockError {
    #[error("out of stock for product '{product_id}'")]
    OutOfStock { product_id: String },
    #[error("counter store error: {0}")]
    Store(#[from] CounterError),
}

pub type StockResult<T> = Result<T, StockError>;

/// Per-product available-unit accounting on top of a [`CounterStore`].
///
/// Every successful reserve/release publishes the new count on the product
/// topic (best effort, never blocking the mutation).
pub struct StockLedger {
    counters: Arc<dyn CounterStore>,
    broadcaster: Arc<EventBroadcaster>,
    compensation_retry: RetryPolicy,
}

impl StockLedger {
    pub fn new(counters: Arc<dyn CounterStore>, broadcaster: Arc<EventBroadcaster>) -> Self {
        Self {
            counters,
            broadcaster,
            compensation_retry: RetryPolicy::default(),
        }
    }

    fn stock_key(product_id: &str) -> String {
        format!("stock:{product_id}")
    }

    /// Install the opening stock for a product. Silent: no event, nobody is
    /// subscribed before the sale opens.
    pub async fn seed(&self, product_id: &str, qty: i64) -> StockResult<i64> {
        let level = self
            .counters
            .incr_by(&Self::stock_key(product_id), qty)
            .await?;
        tracing::debug!(product_id, level, "Seeded stock");
        Ok(level)
    }

    /// Try to remove `qty` units for `product_id`.
    ///
    /// Returns the post-decrement level on success. On insufficient stock the
    /// decrement is compensated and `OutOfStock` is returned; the counter is
    /// back at its pre-call value once the compensation lands.
    pub async fn reserve(&self, product_id: &str, qty: u32) -> StockResult<i64> {
        let key = Self::stock_key(product_id);
        let qty = i64::from(qty);

        let after = self.counters.decr_by(&key, qty).await?;
        if after < 0 {
            // Transiently negative until this compensating add completes.
            self.compensate(&key, product_id, qty).await;
            return Err(StockError::OutOfStock {
                product_id: product_id.to_string(),
            });
        }

        self.publish_level(product_id, after);
        Ok(after)
    }

    /// Return `qty` units to `product_id` (cancellation refund, failed
    /// confirmation, restock). Returns the new level.
    pub async fn release(&self, product_id: &str, qty: u32) -> StockResult<i64> {
        let level = self
            .counters
            .incr_by(&Self::stock_key(product_id), i64::from(qty))
            .await?;
        self.publish_level(product_id, level);
        Ok(level)
    }

    /// Like [`release`](Self::release), but retried with backoff. For
    /// compensation paths, where giving up silently would corrupt the
    /// stock invariant: exhaustion is logged as an unresolved inconsistency
    /// before the error is returned.
    pub async fn release_with_retry(&self, product_id: &str, qty: u32) -> StockResult<i64> {
        let result = retry_with_backoff(&self.compensation_retry, "stock_release", || {
            self.release(product_id, qty)
        })
        .await;

        if let Err(err) = &result {
            tracing::error!(
                product_id,
                qty,
                error = %err,
                "UNRESOLVED STOCK INCONSISTENCY: failed to return reserved units"
            );
        }
        result
    }

    /// Current advisory count. May be momentarily negative while a failed
    /// reservation is being compensated; settled values are in range.
    pub async fn read(&self, product_id: &str) -> StockResult<i64> {
        Ok(self.counters.get(&Self::stock_key(product_id)).await?)
    }

    /// Compensating add for a failed reservation. No event: the net change
    /// is zero and subscribers never saw the dip.
    async fn compensate(&self, key: &str, product_id: &str, qty: i64) {
        let result = retry_with_backoff(&self.compensation_retry, "reserve_rollback", || {
            self.counters.incr_by(key, qty)
        })
        .await;

        if let Err(err) = result {
            tracing::error!(
                product_id,
                qty,
                error = %err,
                "UNRESOLVED STOCK INCONSISTENCY: reservation rollback failed"
            );
        }
    }

    fn publish_level(&self, product_id: &str, level: i64) {
        self.broadcaster.publish(
            &Topic::product(product_id),
            SaleEvent::stock_update(product_id, level),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::DEFAULT_EVENT_CAPACITY;

    fn ledger() -> StockLedger {
        StockLedger::new(
            Arc::new(InMemoryCounterStore::new()),
            Arc::new(EventBroadcaster::new(DEFAULT_EVENT_CAPACITY)),
        )
    }

    #[tokio::test]
    async fn reserve_returns_post_decrement_level() {
        let stock = ledger();
        stock.seed("prod_1", 50).await.unwrap();

        assert_eq!(stock.reserve("prod_1", 3).await.unwrap(), 47);
        assert_eq!(stock.read("prod_1").await.unwrap(), 47);
    }

    #[tokio::test]
    async fn reserve_down_to_exactly_zero_succeeds() {
        let stock = ledger();
        stock.seed("prod_1", 5).await.unwrap();

        assert_eq!(stock.reserve("prod_1", 5).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_reserve_restores_the_counter() {
        let stock = ledger();
        stock.seed("prod_1", 2).await.unwrap();

        let err = stock.reserve("prod_1", 3).await.unwrap_err();
        assert!(matches!(err, StockError::OutOfStock { product_id } if product_id == "prod_1"));
        assert_eq!(stock.read("prod_1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn reserve_then_release_round_trips() {
        let stock = ledger();
        stock.seed("prod_1", 50).await.unwrap();

        stock.reserve("prod_1", 4).await.unwrap();
        assert_eq!(stock.release("prod_1", 4).await.unwrap(), 50);
        assert_eq!(stock.read("prod_1").await.unwrap(), 50);
    }

    #[tokio::test]
    async fn successful_mutations_publish_stock_updates() {
        let counters = Arc::new(InMemoryCounterStore::new());
        let broadcaster = Arc::new(EventBroadcaster::new(DEFAULT_EVENT_CAPACITY));
        let stock = StockLedger::new(counters, broadcaster.clone());
        stock.seed("prod_1", 10).await.unwrap();

        let mut rx = broadcaster.subscribe(&Topic::product("prod_1"));
        stock.reserve("prod_1", 1).await.unwrap();
        stock.release("prod_1", 1).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), SaleEvent::stock_update("prod_1", 9));
        assert_eq!(rx.recv().await.unwrap(), SaleEvent::stock_update("prod_1", 10));
    }

    #[tokio::test]
    async fn failed_reserve_publishes_nothing() {
        let counters = Arc::new(InMemoryCounterStore::new());
        let broadcaster = Arc::new(EventBroadcaster::new(DEFAULT_EVENT_CAPACITY));
        let stock = StockLedger::new(counters, broadcaster.clone());
        stock.seed("prod_1", 1).await.unwrap();

        let mut rx = broadcaster.subscribe(&Topic::product("prod_1"));
        let _ = stock.reserve("prod_1", 2).await.unwrap_err();

        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn concurrent_reservations_never_oversell() {
        let stock = Arc::new(ledger());
        stock.seed("prod_1", 10).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..25 {
            let stock = stock.clone();
            handles.push(tokio::spawn(
                async move { stock.reserve("prod_1", 1).await },
            ));
        }

        let mut won = 0;
        let mut lost = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => won += 1,
                Err(StockError::OutOfStock { .. }) => lost += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(won, 10);
        assert_eq!(lost, 15);
        assert_eq!(stock.read("prod_1").await.unwrap(), 0);
    }
}
