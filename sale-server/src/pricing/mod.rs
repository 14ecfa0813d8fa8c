//! Money calculation utilities using rust_decimal for precision
//!
//! 成交价计算：秒杀折扣单价与订单总价。所有运算使用 `Decimal`，
//! 入账前归一到两位小数（银行家舍入）。

use rust_decimal::Decimal;
use shared::models::Product;
use thiserror::Error;

/// Rounding precision for monetary values (2 decimal places)
const DECIMAL_PLACES: u32 = 2;

/// Maximum allowed unit price
const MAX_PRICE: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

#[derive(Debug, Error, PartialEq)]
pub enum PricingError {
    #[error("price must be non-negative, got {0}")]
    NegativePrice(Decimal),
    #[error("price exceeds maximum allowed ({max}), got {0}", max = MAX_PRICE)]
    PriceTooLarge(Decimal),
    #[error("discount must be between 0 and 100, got {0}")]
    InvalidDiscount(u32),
}

pub type PricingResult<T> = Result<T, PricingError>;

/// Round to currency precision. Midpoints go to the nearest even digit.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp(DECIMAL_PLACES)
}

/// Charged unit price for a product at purchase time.
///
/// Flash-sale products sell at `price * (1 - discount/100)`; everything else
/// sells at the base price. The result is rounded to currency precision.
pub fn charged_unit_price(product: &Product) -> PricingResult<Decimal> {
    let base = product.price;
    if base.is_sign_negative() {
        return Err(PricingError::NegativePrice(base));
    }
    if base > MAX_PRICE {
        return Err(PricingError::PriceTooLarge(base));
    }

    let discount = product.active_discount();
    if discount > 100 {
        return Err(PricingError::InvalidDiscount(discount));
    }
    if discount == 0 {
        return Ok(round_money(base));
    }

    let rate = Decimal::ONE - Decimal::from(discount) / Decimal::ONE_HUNDRED;
    Ok(round_money(base * rate))
}

/// Order total: unit price times quantity, rounded to currency precision.
pub fn order_total(unit_price: Decimal, quantity: u32) -> Decimal {
    round_money(unit_price * Decimal::from(quantity))
}
