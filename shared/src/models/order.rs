//! Order Model
//!
//! 订单记录与状态机类型。
//!
//! 状态机（全部目标态均为终态）：
//!
//! ```text
//!             ┌─→ confirmed
//!   pending ──┼─→ cancelled
//!             └─→ failed
//! ```
//!
//! 订单只增不删：取消 / 失败是终态，不是删除。

use crate::types::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 订单状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// 已受理，等待后台确认
    #[default]
    Pending,
    /// 确认完成
    Confirmed,
    /// 用户在时限内取消
    Cancelled,
    /// 确认重试耗尽
    Failed,
}

impl OrderStatus {
    /// Terminal states admit no further transition.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    /// Whether moving `self -> target` is a defined transition.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        matches!(self, OrderStatus::Pending) && target != OrderStatus::Pending
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "pending"),
            OrderStatus::Confirmed => write!(f, "confirmed"),
            OrderStatus::Cancelled => write!(f, "cancelled"),
            OrderStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Order entity
///
/// Created exactly once per accepted reservation; mutated only through
/// ledger transitions. Buyer email and product name are denormalized at
/// creation time so notifications never need a directory lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub user_email: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    /// Charged unit price at time of purchase (discount already applied)
    pub unit_price: Decimal,
    /// unit_price * quantity, rounded to 2 decimal places
    pub total_price: Decimal,
    pub status: OrderStatus,
    pub created_at: Timestamp,
    /// Cleared on any transition out of `pending`
    pub cancellable: bool,
}
