//! 事件广播 - 库存与订单状态的实时分发
//!
//! ```text
//!                      ┌────────────────────────┐
//!  StockLedger ───────▶│                        │───▶ product:prod_1 订阅者
//!  SalesService ──────▶│    EventBroadcaster    │───▶ product:prod_2 订阅者
//!  ConfirmationWorker ▶│  (per-topic channels)  │───▶ user:u_42 订阅者
//!                      └────────────────────────┘
//! ```
//!
//! 发布是 fire-and-forget：发送方从不等待订阅方，没有持久化、
//! 没有重放、没有确认。晚加入的订阅者收不到历史事件；跟不上的
//! 订阅者丢最旧的事件（broadcast channel 语义）。
//!
//! # 主题
//!
//! - `product:{id}` - 库存变化（预留 / 释放 / 补货）
//! - `user:{id}` - 该用户的订单状态通知

use dashmap::DashMap;
use shared::{SaleEvent, Topic};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default capacity for per-topic channels.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Topic-keyed fan-out over tokio broadcast channels.
///
/// Channels are created lazily on first subscribe and pruned when a publish
/// finds no remaining receivers.
pub struct EventBroadcaster {
    channels: DashMap<Topic, broadcast::Sender<SaleEvent>>,
    capacity: usize,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    /// Open a subscription on `topic`. The returned receiver sees events
    /// published after this call only.
    pub fn subscribe(&self, topic: &Topic) -> broadcast::Receiver<SaleEvent> {
        self.channels
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publish `event` on `topic`. Never blocks; returns the number of
    /// receivers the event was handed to (0 when nobody listens).
    pub fn publish(&self, topic: &Topic, event: SaleEvent) -> usize {
        let Some(tx) = self.channels.get(topic) else {
            return 0;
        };

        match tx.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                drop(tx);
                // Last receiver is gone; drop the channel so dead topics
                // don't accumulate. A concurrent subscribe keeps it alive.
                self.channels
                    .remove_if(topic, |_, sender| sender.receiver_count() == 0);
                tracing::trace!(topic = %topic, "Event dropped: no active receivers");
                0
            }
        }
    }

    /// Number of live topics (with at least one channel allocated).
    pub fn topic_count(&self) -> usize {
        self.channels.len()
    }
}

/// Per-connection subscription bookkeeping.
///
/// 连接断开时必须调用 [`disconnect`](Self::disconnect) 清理其主题集合；
/// 订阅本身不落盘，连接的生命周期就是订阅的生命周期。
pub struct SubscriptionRegistry {
    broadcaster: Arc<EventBroadcaster>,
    clients: DashMap<String, HashSet<Topic>>,
}

impl SubscriptionRegistry {
    pub fn new(broadcaster: Arc<EventBroadcaster>) -> Self {
        Self {
            broadcaster,
            clients: DashMap::new(),
        }
    }

    /// Register `connection_id` on `topic` and open a receiver for it.
    ///
    /// Subscribing twice to the same topic is acknowledged with a fresh
    /// receiver without duplicating registry state.
    pub fn subscribe(
        &self,
        connection_id: &str,
        topic: Topic,
    ) -> broadcast::Receiver<SaleEvent> {
        let rx = self.broadcaster.subscribe(&topic);
        self.clients
            .entry(connection_id.to_string())
            .or_default()
            .insert(topic.clone());
        tracing::debug!(connection = connection_id, topic = %topic, "📦 Client subscribed");
        rx
    }

    /// Drop `topic` from the connection's set. Returns false when the
    /// connection never subscribed to it.
    pub fn unsubscribe(&self, connection_id: &str, topic: &Topic) -> bool {
        let removed = self
            .clients
            .get_mut(connection_id)
            .map(|mut topics| topics.remove(topic))
            .unwrap_or(false);
        if removed {
            tracing::debug!(connection = connection_id, topic = %topic, "Client unsubscribed");
        }
        removed
    }

    /// Clear every subscription of a connection. Returns how many topics
    /// were registered.
    pub fn disconnect(&self, connection_id: &str) -> usize {
        let removed = self
            .clients
            .remove(connection_id)
            .map(|(_, topics)| topics.len())
            .unwrap_or(0);
        tracing::debug!(
            connection = connection_id,
            topics = removed,
            "🔌 Client disconnected"
        );
        removed
    }

    /// Topics the connection currently listens to.
    pub fn topics_of(&self, connection_id: &str) -> Vec<Topic> {
        self.clients
            .get(connection_id)
            .map(|topics| topics.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn connection_count(&self) -> usize {
        self.clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::OrderStatus;

    #[tokio::test]
    async fn subscribers_receive_topic_events() {
        let broadcaster = EventBroadcaster::new(DEFAULT_EVENT_CAPACITY);
        let topic = Topic::product("prod_1");
        let mut rx = broadcaster.subscribe(&topic);

        let reached = broadcaster.publish(&topic, SaleEvent::stock_update("prod_1", 49));
        assert_eq!(reached, 1);
        assert_eq!(rx.recv().await.unwrap(), SaleEvent::stock_update("prod_1", 49));
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let broadcaster = EventBroadcaster::new(DEFAULT_EVENT_CAPACITY);
        let mut earbuds = broadcaster.subscribe(&Topic::product("prod_1"));
        let mut watch = broadcaster.subscribe(&Topic::product("prod_2"));

        broadcaster.publish(&Topic::product("prod_2"), SaleEvent::stock_update("prod_2", 29));

        assert_eq!(
            watch.recv().await.unwrap(),
            SaleEvent::stock_update("prod_2", 29)
        );
        assert!(matches!(
            earbuds.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let broadcaster = EventBroadcaster::new(DEFAULT_EVENT_CAPACITY);
        let reached = broadcaster.publish(
            &Topic::user("u_1"),
            SaleEvent::order_notification("ord-1", OrderStatus::Confirmed, "Order confirmed"),
        );
        assert_eq!(reached, 0);
    }

    #[tokio::test]
    async fn dead_topics_are_pruned_after_last_receiver_drops() {
        let broadcaster = EventBroadcaster::new(DEFAULT_EVENT_CAPACITY);
        let topic = Topic::product("prod_3");
        let rx = broadcaster.subscribe(&topic);
        assert_eq!(broadcaster.topic_count(), 1);

        drop(rx);
        broadcaster.publish(&topic, SaleEvent::stock_update("prod_3", 19));
        assert_eq!(broadcaster.topic_count(), 0);
    }

    #[tokio::test]
    async fn slow_subscribers_lose_oldest_events() {
        let broadcaster = EventBroadcaster::new(2);
        let topic = Topic::product("prod_1");
        let mut rx = broadcaster.subscribe(&topic);

        for count in [49, 48, 47] {
            broadcaster.publish(&topic, SaleEvent::stock_update("prod_1", count));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        assert_eq!(rx.recv().await.unwrap(), SaleEvent::stock_update("prod_1", 48));
        assert_eq!(rx.recv().await.unwrap(), SaleEvent::stock_update("prod_1", 47));
    }

    #[tokio::test]
    async fn registry_tracks_connection_topics() {
        let broadcaster = Arc::new(EventBroadcaster::new(DEFAULT_EVENT_CAPACITY));
        let registry = SubscriptionRegistry::new(broadcaster.clone());

        let _rx1 = registry.subscribe("conn-1", Topic::product("prod_1"));
        let _rx2 = registry.subscribe("conn-1", Topic::user("u_1"));
        let _rx3 = registry.subscribe("conn-1", Topic::product("prod_1"));

        let mut topics = registry.topics_of("conn-1");
        topics.sort_by_key(|t| t.to_string());
        assert_eq!(topics, vec![Topic::product("prod_1"), Topic::user("u_1")]);

        assert!(registry.unsubscribe("conn-1", &Topic::user("u_1")));
        assert!(!registry.unsubscribe("conn-1", &Topic::user("u_1")));
        assert_eq!(registry.topics_of("conn-1"), vec![Topic::product("prod_1")]);
    }

    #[tokio::test]
    async fn disconnect_clears_everything() {
        let broadcaster = Arc::new(EventBroadcaster::new(DEFAULT_EVENT_CAPACITY));
        let registry = SubscriptionRegistry::new(broadcaster);

        let _rx1 = registry.subscribe("conn-1", Topic::product("prod_1"));
        let _rx2 = registry.subscribe("conn-1", Topic::user("u_1"));
        assert_eq!(registry.connection_count(), 1);

        assert_eq!(registry.disconnect("conn-1"), 2);
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.disconnect("conn-1"), 0);
    }
}
