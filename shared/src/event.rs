//! 广播事件类型定义
//!
//! 事件在 sale-server 内部以及与订阅客户端之间共享。
//! 每个事件发布到一个主题（topic）上，主题按商品或用户划分：
//!
//! | Topic          | 文本形式        | 事件                 |
//! |----------------|-----------------|----------------------|
//! | `Product(id)`  | `product:{id}`  | 库存变化             |
//! | `User(id)`     | `user:{id}`     | 订单状态通知         |
//!
//! 发布是 fire-and-forget：无持久化、无重放、无确认，晚加入的
//! 订阅者收不到历史事件。

use crate::models::OrderStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 订阅主题
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// 某个商品的库存事件
    Product(String),
    /// 某个用户的订单事件
    User(String),
}

impl Topic {
    pub fn product(id: impl Into<String>) -> Self {
        Topic::Product(id.into())
    }

    pub fn user(id: impl Into<String>) -> Self {
        Topic::User(id.into())
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Product(id) => write!(f, "product:{id}"),
            Topic::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// `Topic` 文本解析错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid topic '{0}', expected 'product:{{id}}' or 'user:{{id}}'")]
pub struct TopicParseError(pub String);

impl FromStr for Topic {
    type Err = TopicParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("product", id)) if !id.is_empty() => Ok(Topic::Product(id.to_string())),
            Some(("user", id)) if !id.is_empty() => Ok(Topic::User(id.to_string())),
            _ => Err(TopicParseError(s.to_string())),
        }
    }
}

/// 广播事件负载
///
/// Serialized with an adjacent `type` tag so subscribers can dispatch
/// without knowing every variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SaleEvent {
    /// 库存数量变化（预留、释放、补货都会触发）
    StockUpdate { product_id: String, new_count: i64 },
    /// 订单状态通知（确认 / 取消 / 失败）
    OrderNotification {
        order_id: String,
        status: OrderStatus,
        message: String,
    },
}

impl SaleEvent {
    pub fn stock_update(product_id: impl Into<String>, new_count: i64) -> Self {
        SaleEvent::StockUpdate {
            product_id: product_id.into(),
            new_count,
        }
    }

    pub fn order_notification(
        order_id: impl Into<String>,
        status: OrderStatus,
        message: impl Into<String>,
    ) -> Self {
        SaleEvent::OrderNotification {
            order_id: order_id.into(),
            status,
            message: message.into(),
        }
    }
}
