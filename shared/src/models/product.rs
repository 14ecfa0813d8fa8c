//! Product Model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Product entity
///
/// 商品目录数据，对本服务只读。价格与折扣在下单时读取，
/// 用于计算成交单价（见 sale-server 的 pricing 模块）。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: String,
    pub name: String,
    /// Category reference (String ID, required)
    pub category: String,
    /// Base unit price before any flash-sale discount
    pub price: Decimal,
    /// Discount in percentage (e.g., 40 = 40% off); only honored while
    /// `flash_sale` is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount: Option<u32>,
    pub flash_sale: bool,
    /// Units available when the sale opens; the live count is owned by the
    /// stock counter, not by this record
    pub initial_stock: i64,
}

impl Product {
    /// Discount actually in effect for this product (0 when not on sale).
    pub fn active_discount(&self) -> u32 {
        if self.flash_sale {
            self.discount.unwrap_or(0)
        } else {
            0
        }
    }
}
