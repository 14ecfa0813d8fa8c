//! 销售边界错误
//!
//! 调用方可见的错误分类。Display 文案即对外文案，内部模块错误在
//! 这里收拢：可判定的业务失败映射到具体变体，其余折叠进 Internal。
//! 所有变体都在边界被恢复成失败结果，不会让进程崩溃。

use crate::stock::StockError;
use shared::models::OrderStatus;
use thiserror::Error;

/// Caller-visible failure taxonomy.
#[derive(Debug, Error)]
pub enum SaleError {
    /// Unknown product or order. Carries the caller-facing message.
    #[error("{0}")]
    NotFound(String),

    #[error("Not authorized to cancel this order")]
    Forbidden,

    #[error("Out of stock!")]
    OutOfStock,

    #[error("Too many requests. Please try again later.")]
    RateLimited { retry_after_ms: i64 },

    #[error("Cannot cancel order with status '{status}'. Only pending orders can be cancelled.")]
    InvalidState { status: OrderStatus },

    #[error("Order can only be cancelled within {window_mins} minutes of placement")]
    WindowExpired { window_mins: u64 },

    /// Requester id resolves to nobody. Credential checking itself lives
    /// outside this service; an unknown id is all we can see here.
    #[error("User not found")]
    Unauthorized,

    #[error("{0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type SaleResult<T> = Result<T, SaleError>;

impl SaleError {
    pub(crate) fn internal(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        SaleError::Internal(anyhow::Error::new(e))
    }
}

impl From<StockError> for SaleError {
    fn from(e: StockError) -> Self {
        match e {
            StockError::OutOfStock { .. } => SaleError::OutOfStock,
            StockError::Store(inner) => SaleError::internal(inner),
        }
    }
}
