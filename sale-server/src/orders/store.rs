//! In-memory order persistence
//!
//! # 并发约定
//!
//! 状态变更只能走 [`OrderStore::transition`]，它是一次带前置状态比对的
//! 原子换档（CAS）。两个任务同时对同一订单换档时恰好一个成功，输掉
//! 的一方拿到 `StatusConflict`，由调用方决定跳过还是报错。

use async_trait::async_trait;
use dashmap::DashMap;
use shared::models::{Order, OrderStatus};
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Status conflict for order {order_id}: expected '{expected}', found '{actual}'")]
    StatusConflict {
        order_id: String,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    #[error("Order store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Order persistence port.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a freshly created order.
    async fn insert(&self, order: Order) -> StoreResult<()>;

    async fn find(&self, order_id: &str) -> StoreResult<Option<Order>>;

    /// Atomically move an order from `from` to `to`.
    ///
    /// Succeeds only when the stored status still equals `from`; otherwise
    /// returns [`StoreError::StatusConflict`] carrying the actual status.
    /// Returns the updated order on success.
    async fn transition(
        &self,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
    ) -> StoreResult<Order>;

    /// Orders belonging to `user_id`, newest first, at most `limit`.
    async fn for_user(&self, user_id: &str, limit: usize) -> StoreResult<Vec<Order>>;

    async fn count_with_status(&self, status: OrderStatus) -> StoreResult<usize>;
}

/// DashMap-backed store. The per-shard write lock taken by `get_mut` makes
/// the read-compare-write inside [`transition`](OrderStore::transition)
/// atomic for a given order id.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: DashMap<String, Order>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> StoreResult<()> {
        self.orders.insert(order.id.clone(), order);
        Ok(())
    }

    async fn find(&self, order_id: &str) -> StoreResult<Option<Order>> {
        Ok(self.orders.get(order_id).map(|o| o.clone()))
    }

    async fn transition(
        &self,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
    ) -> StoreResult<Order> {
        let mut entry = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| StoreError::NotFound(order_id.to_string()))?;

        if entry.status != from {
            return Err(StoreError::StatusConflict {
                order_id: order_id.to_string(),
                expected: from,
                actual: entry.status,
            });
        }

        entry.status = to;
        entry.cancellable = matches!(to, OrderStatus::Pending);
        Ok(entry.clone())
    }

    async fn for_user(&self, user_id: &str, limit: usize) -> StoreResult<Vec<Order>> {
        let mut orders: Vec<_> = self
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .map(|o| o.clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders.truncate(limit);
        Ok(orders)
    }

    async fn count_with_status(&self, status: OrderStatus) -> StoreResult<usize> {
        Ok(self.orders.iter().filter(|o| o.status == status).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    fn order(id: &str, user_id: &str, created_at: i64) -> Order {
        Order {
            id: id.into(),
            user_id: user_id.into(),
            user_email: format!("{user_id}@example.com"),
            product_id: "prod_1".into(),
            product_name: "Premium Wireless Headphones".into(),
            quantity: 1,
            unit_price: Decimal::new(17999, 2),
            total_price: Decimal::new(17999, 2),
            status: OrderStatus::Pending,
            created_at,
            cancellable: true,
        }
    }

    #[tokio::test]
    async fn transition_updates_status_and_cancellable() {
        let store = InMemoryOrderStore::new();
        store.insert(order("ord_1", "user_1", 1_000)).await.unwrap();

        let updated = store
            .transition("ord_1", OrderStatus::Pending, OrderStatus::Confirmed)
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Confirmed);
        assert!(!updated.cancellable);

        let stored = store.find("ord_1").await.unwrap().unwrap();
        assert_eq!(stored, updated);
    }

    #[tokio::test]
    async fn transition_rejects_stale_expectations() {
        let store = InMemoryOrderStore::new();
        store.insert(order("ord_1", "user_1", 1_000)).await.unwrap();
        store
            .transition("ord_1", OrderStatus::Pending, OrderStatus::Cancelled)
            .await
            .unwrap();

        let err = store
            .transition("ord_1", OrderStatus::Pending, OrderStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::StatusConflict {
                actual: OrderStatus::Cancelled,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn concurrent_transitions_admit_exactly_one_winner() {
        let store = Arc::new(InMemoryOrderStore::new());
        store.insert(order("ord_1", "user_1", 1_000)).await.unwrap();

        let mut handles = Vec::new();
        for target in [
            OrderStatus::Confirmed,
            OrderStatus::Cancelled,
            OrderStatus::Failed,
        ] {
            for _ in 0..8 {
                let store = store.clone();
                handles.push(tokio::spawn(async move {
                    store
                        .transition("ord_1", OrderStatus::Pending, target)
                        .await
                        .is_ok()
                }));
            }
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn for_user_is_newest_first_and_capped() {
        let store = InMemoryOrderStore::new();
        for i in 0..5 {
            store
                .insert(order(&format!("ord_{i}"), "user_1", 1_000 + i))
                .await
                .unwrap();
        }
        store.insert(order("ord_other", "user_2", 9_000)).await.unwrap();

        let orders = store.for_user("user_1", 3).await.unwrap();
        assert_eq!(orders.len(), 3);
        assert_eq!(orders[0].id, "ord_4");
        assert_eq!(orders[1].id, "ord_3");
        assert_eq!(orders[2].id, "ord_2");
    }

    #[tokio::test]
    async fn counts_filter_by_status() {
        let store = InMemoryOrderStore::new();
        store.insert(order("ord_1", "user_1", 1_000)).await.unwrap();
        store.insert(order("ord_2", "user_1", 2_000)).await.unwrap();
        store
            .transition("ord_2", OrderStatus::Pending, OrderStatus::Confirmed)
            .await
            .unwrap();

        assert_eq!(
            store.count_with_status(OrderStatus::Pending).await.unwrap(),
            1
        );
        assert_eq!(
            store
                .count_with_status(OrderStatus::Confirmed)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            store.count_with_status(OrderStatus::Failed).await.unwrap(),
            0
        );
    }
}
